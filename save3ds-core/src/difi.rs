use crate::byte_struct_common::Magic;
use crate::dpfs::{unwrap_dpfs, DpfsDescriptor};
use crate::error::*;
use crate::ivfc::{unwrap_ivfc, IvfcDescriptor};
use crate::random_access_file::*;
use byte_struct::*;

pub const DIFI_VERSION: u32 = 0x0001_0000;

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct DifiHeader {
    pub magic: Magic,
    pub version: u32,
    pub ivfc_descriptor_offset: u64,
    pub ivfc_descriptor_size: u64,
    pub dpfs_descriptor_offset: u64,
    pub dpfs_descriptor_size: u64,
    pub partition_hash_offset: u64,
    pub partition_hash_size: u64,
    pub external_ivfc_level4: u8,
    pub dpfs_selector: u8,
    pub padding: u16,
    pub ivfc_level4_offset: u64,
}

/// A fully unwrapped DIFI partition: the level-4 IVFC bytes, materialized
/// once in memory (see spec §5: DPFS/IVFC read patterns are not strictly
/// sequential and 0xDD poisoning requires a buffer).
pub struct DifiPartition {
    data: Vec<u8>,
    /// The DIFI header's `isData` flag (named `externalIvfcLevel4` in this
    /// port): whether level 4 is stored outside the DPFS-protected region.
    /// DISA uses this bit to sanity-check that partition A is SAVE and
    /// partition B, when present, is DATA (spec §4.4).
    pub is_data: bool,
}

impl DifiPartition {
    /// `descriptor` holds the header, the IVFC/DPFS descriptors and the
    /// master hash (this region is itself integrity-checked by the
    /// enclosing DIFF/DISA table). `partition` holds the raw DPFS/IVFC
    /// level bytes the descriptor's offsets point into -- a separate
    /// region of the outer container.
    pub fn new(descriptor: &[u8], partition: &[u8]) -> Result<DifiPartition, Error> {
        let header: DifiHeader = {
            let mut buf = vec![0; DifiHeader::BYTE_LEN];
            buf.copy_from_slice(
                descriptor
                    .get(..DifiHeader::BYTE_LEN)
                    .ok_or(Error::OutOfBound)?,
            );
            DifiHeader::read_bytes(&buf)
        };

        if header.magic.v != *b"DIFI" {
            return make_error(Error::MagicMismatch);
        }
        if header.version != DIFI_VERSION {
            return make_error(Error::VersionMismatch);
        }
        if header.dpfs_selector > 1 {
            return make_error(Error::InvalidValue);
        }

        let ivfc_descriptor: IvfcDescriptor =
            read_bytes_at(descriptor, header.ivfc_descriptor_offset as usize)?;
        ivfc_descriptor.validate_magic()?;

        let dpfs_descriptor: DpfsDescriptor =
            read_bytes_at(descriptor, header.dpfs_descriptor_offset as usize)?;
        dpfs_descriptor.validate_magic()?;

        let master_hash_begin = header.partition_hash_offset as usize;
        let master_hash_end = master_hash_begin + header.partition_hash_size as usize;
        let master_hash = descriptor
            .get(master_hash_begin..master_hash_end)
            .ok_or(Error::OutOfBound)?;

        let external_level4_offset = if header.external_ivfc_level4 != 0 {
            Some(header.ivfc_level4_offset)
        } else {
            None
        };

        let active = unwrap_dpfs(partition, &dpfs_descriptor, header.dpfs_selector)?;

        let level4 = unwrap_ivfc(
            &active,
            partition,
            &ivfc_descriptor,
            master_hash,
            external_level4_offset,
        )?;

        Ok(DifiPartition {
            data: level4,
            is_data: header.external_ivfc_level4 != 0,
        })
    }
}

fn read_bytes_at<T: ByteStruct>(raw: &[u8], offset: usize) -> Result<T, Error> {
    let bytes = raw.get(offset..offset + T::BYTE_LEN).ok_or(Error::OutOfBound)?;
    Ok(T::read_bytes(bytes))
}

impl RandomAccessFile for DifiPartition {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error> {
        if pos + buf.len() > self.data.len() {
            return make_error(Error::OutOfBound);
        }
        buf.copy_from_slice(&self.data[pos..pos + buf.len()]);
        Ok(())
    }
    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(DifiHeader::BYTE_LEN, 0x44);
    }
}
