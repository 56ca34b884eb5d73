use crate::active_table::select_active;
use crate::byte_struct_common::Magic;
use crate::crypto::sha256;
use crate::difi::DifiPartition;
use crate::error::*;
use crate::signer::Signer;
use byte_struct::*;
use log::info;

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DiffHeader {
    magic: Magic,
    version: u32,
    secondary_table_offset: u64,
    primary_table_offset: u64,
    table_size: u64,
    partition_offset: u64,
    partition_size: u64,
    active_table: u8,
    padding: [u8; 3],
    sha: [u8; 0x20],
    unique_id: u64,
}

const DIFF_VERSION: u32 = 0x0003_0000;

pub struct Diff {
    pub partition: DifiPartition,
    pub unique_id: u64,
}

/// Unwraps a DIFF container (spec §4.3): a single DIFI partition guarded by
/// an active-table selector and, optionally, an outer CMAC. `raw` is the
/// whole container image; `signer` is the id-specific CMAC block builder and
/// the 16-byte key, when available -- callers without a key get a logged
/// notice instead of a hard failure, per spec §6.
pub fn open_diff(raw: &[u8], signer: Option<(&dyn Signer, &[u8; 16])>) -> Result<Diff, Error> {
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
        None => info!("no key available, skipping DIFF header signature check"),
    }

    let header: DiffHeader = DiffHeader::read_bytes(header_bytes);
    if header.magic.v != *b"DIFF" {
        return make_error(Error::MagicMismatch);
    }
    if header.version != DIFF_VERSION {
        return make_error(Error::VersionMismatch);
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

    let active = select_active(&[primary, secondary], header.active_table)?;
    if sha256(active) != header.sha {
        return make_error(Error::HashMismatch);
    }

    let partition_raw = raw
        .get(
            header.partition_offset as usize
                ..header.partition_offset as usize + header.partition_size as usize,
        )
        .ok_or(Error::OutOfBound)?;

    let partition = DifiPartition::new(active, partition_raw)?;

    Ok(Diff {
        partition,
        unique_id: header.unique_id,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(DiffHeader::BYTE_LEN, 0x5C);
    }
}
