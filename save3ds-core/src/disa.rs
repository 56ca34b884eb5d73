use crate::active_table::select_active;
use crate::byte_struct_common::Magic;
use crate::crypto::sha256;
use crate::difi::DifiPartition;
use crate::error::*;
use crate::signer::Signer;
use byte_struct::*;
use log::{info, warn};

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DisaPartitionDescriptorInfo {
    offset: u64,
    size: u64,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DisaPartitionInfo {
    offset: u64,
    size: u64,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DisaHeader {
    magic: Magic,
    version: u32,
    partition_count: u32,
    padding1: u32,
    secondary_table_offset: u64,
    primary_table_offset: u64,
    table_size: u64,
    partition_descriptor: [DisaPartitionDescriptorInfo; 2],
    partition: [DisaPartitionInfo; 2],
    active_table: u8,
}

const DISA_VERSION: u32 = 0x0004_0000;

pub struct Disa {
    pub partitions: Vec<DifiPartition>,
}

impl Disa {
    /// Partition 0 is always SAVE; partition 1, when present, is the
    /// optional DATA partition.
    pub fn save(&self) -> &DifiPartition {
        &self.partitions[0]
    }

    pub fn data(&self) -> Option<&DifiPartition> {
        self.partitions.get(1)
    }
}

/// Unwraps a DISA container (spec §4.4): one or two DIFI partitions guarded
/// by a shared active-table selector and, optionally, an outer CMAC.
pub fn open_disa(raw: &[u8], signer: Option<(&dyn Signer, &[u8; 16])>) -> Result<Disa, Error> {
    let signature = raw.get(0..0x10).ok_or(Error::OutOfBound)?;
    let header_bytes = raw.get(0x100..0x200).ok_or(Error::OutOfBound)?;

    match signer {
        Some((signer, key)) => {
            let mut sig = [0u8; 16];
            sig.copy_from_slice(signature);
            if !signer.verify(key, header_bytes.to_vec(), &sig) {
                return make_error(Error::SignatureMismatch);
            }
        }
        None => info!("no key available, skipping DISA header signature check"),
    }

    let header: DisaHeader = DisaHeader::read_bytes(header_bytes);
    if header.magic.v != *b"DISA" {
        return make_error(Error::MagicMismatch);
    }
    if header.version != DISA_VERSION {
        return make_error(Error::VersionMismatch);
    }
    if header.partition_count != 1 && header.partition_count != 2 {
        return make_error(Error::InvalidValue);
    }

    let table_size = header.table_size as usize;
    let primary = raw
        .get(header.primary_table_offset as usize..header.primary_table_offset as usize + table_size)
        .ok_or(Error::OutOfBound)?
        .to_vec();
    let secondary = raw
        .get(
            header.secondary_table_offset as usize
                ..header.secondary_table_offset as usize + table_size,
        )
        .ok_or(Error::OutOfBound)?
        .to_vec();

    // DISA's table hash lives inside the signed header, at the same byte
    // range a signature-less CMAC block would otherwise hash: bytes 0x6C..0x8C.
    let table_hash = header_bytes.get(0x6C..0x8C).ok_or(Error::OutOfBound)?;
    let active = select_active(&[primary, secondary], header.active_table)?;
    if sha256(active) != table_hash {
        return make_error(Error::HashMismatch);
    }

    let mut partitions = Vec::with_capacity(header.partition_count as usize);
    for i in 0..header.partition_count as usize {
        let d = &header.partition_descriptor[i];
        let p = &header.partition[i];
        let descriptor = active
            .get(d.offset as usize..d.offset as usize + d.size as usize)
            .ok_or(Error::OutOfBound)?;
        let partition_raw = raw
            .get(p.offset as usize..p.offset as usize + p.size as usize)
            .ok_or(Error::OutOfBound)?;
        let partition = DifiPartition::new(descriptor, partition_raw)?;
        match i {
            0 if partition.is_data => warn!("SAVE partition is marked as DATA"),
            1 if !partition.is_data => warn!("DATA partition is not marked as DATA"),
            _ => {}
        }
        partitions.push(partition);
    }

    Ok(Disa { partitions })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(DisaHeader::BYTE_LEN, 0x69);
    }
}
