use crate::byte_struct_common::Magic;
use crate::crypto::sha256;
use crate::error::*;
use byte_struct::*;
use log::warn;

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct IvfcLevelDescriptor {
    pub offset: u64,
    pub size: u64,
    pub log2_block_size: u32,
    pub padding: u32,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct IvfcDescriptor {
    pub magic: Magic,
    pub version: u32,
    pub master_hash_size: u64,
    pub level1: IvfcLevelDescriptor,
    pub level2: IvfcLevelDescriptor,
    pub level3: IvfcLevelDescriptor,
    pub level4: IvfcLevelDescriptor,
    pub descriptor_size: u64,
}

impl IvfcDescriptor {
    pub fn validate_magic(&self) -> Result<(), Error> {
        if self.magic.v != *b"IVFC" {
            return make_error(Error::MagicMismatch);
        }
        if self.version != IVFC_VERSION {
            return make_error(Error::VersionMismatch);
        }
        Ok(())
    }
}

pub const IVFC_VERSION: u32 = 0x0002_0000;
pub const POISON_BYTE: u8 = 0xDD;

/// Verifies `data` (truncated to its real length, zero-padded to
/// `block_len` per chunk before hashing) against the 32-byte hash chunks in
/// `hashes`, poisoning any chunk whose hash does not match. Used once per
/// IVFC level, chained level 1 -> level 4.
fn poison_level(data: &[u8], hashes: &[u8], block_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut offset = 0;
    let mut hash_offset = 0;
    while offset < data.len() {
        let take = (data.len() - offset).min(block_len);
        let mut padded = vec![0u8; block_len];
        padded[..take].copy_from_slice(&data[offset..offset + take]);
        let hash = sha256(&padded);
        let expected = &hashes[hash_offset..hash_offset + 32];
        if hash == expected {
            out.extend_from_slice(&data[offset..offset + take]);
        } else {
            warn!(
                "IVFC block hash mismatch at offset {}, poisoning {} bytes",
                offset, take
            );
            out.extend(std::iter::repeat(POISON_BYTE).take(take));
        }
        offset += take;
        hash_offset += 32;
    }
    out
}

/// `unwrap_ivfc`: given the DPFS-active view (and optionally the partition's
/// raw bytes, for an out-of-band level 4) plus the master hash, verifies and
/// returns level 4's bytes -- the semantically valid unwrapped image.
pub fn unwrap_ivfc(
    active: &[u8],
    partition: &[u8],
    desc: &IvfcDescriptor,
    master_hash: &[u8],
    external_level4_offset: Option<u64>,
) -> Result<Vec<u8>, Error> {
    if desc.master_hash_size as usize != master_hash.len() {
        return make_error(Error::SizeMismatch);
    }
    if desc.descriptor_size != 0x78 {
        warn!(
            "unexpected IVFC descriptor self-size field {:#x}",
            desc.descriptor_size
        );
    }

    let slice = |level: &IvfcLevelDescriptor, source: &[u8]| -> Result<&[u8], Error> {
        let begin = level.offset as usize;
        let end = begin + level.size as usize;
        if end > source.len() {
            return make_error(Error::OutOfBound);
        }
        Ok(&source[begin..end])
    };

    let level1_raw = slice(&desc.level1, active)?;
    let level1 = poison_level(level1_raw, master_hash, 1 << desc.level1.log2_block_size);

    let level2_raw = slice(&desc.level2, active)?;
    let level2 = poison_level(level2_raw, &level1, 1 << desc.level2.log2_block_size);

    let level3_raw = slice(&desc.level3, active)?;
    let level3 = poison_level(level3_raw, &level2, 1 << desc.level3.log2_block_size);

    let level4_raw = if let Some(offset) = external_level4_offset {
        let begin = offset as usize;
        let end = begin + desc.level4.size as usize;
        partition.get(begin..end).ok_or(Error::OutOfBound)?
    } else {
        slice(&desc.level4, active)?
    };
    let level4 = poison_level(level4_raw, &level3, 1 << desc.level4.log2_block_size);

    Ok(level4)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(IvfcDescriptor::BYTE_LEN, 0x78);
    }

    #[test]
    fn matching_block_passes_through_unpoisoned() {
        let data = vec![0x42u8; 16];
        let hash = sha256(&data);
        let out = poison_level(&data, &hash, 16);
        assert_eq!(out, data);
    }

    #[test]
    fn mismatched_block_is_poisoned() {
        let data = vec![0x42u8; 16];
        let mut bad_hash = sha256(&data);
        bad_hash[0] ^= 1;
        let out = poison_level(&data, &bad_hash, 16);
        assert_eq!(out, vec![POISON_BYTE; 16]);
    }

    #[test]
    fn last_block_is_zero_padded_before_hashing() {
        // 5 bytes of data, block length 8: the hash covers 5 real bytes + 3 zero bytes.
        let data = vec![1, 2, 3, 4, 5];
        let mut padded = data.clone();
        padded.resize(8, 0);
        let hash = sha256(&padded);
        let out = poison_level(&data, &hash, 8);
        assert_eq!(out, data);
    }
}
