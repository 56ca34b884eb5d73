use crate::byte_struct_common::Magic;
use crate::error::*;
use byte_struct::*;

/// One level of the three-level double-buffered region: two equal-size
/// halves back to back, each `1 << log2_block_len` bytes per block.
#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct DpfsLevelDescriptor {
    pub offset: u64,
    pub size: u64,
    pub log2_block_size: u32,
    pub padding: u32,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct DpfsDescriptor {
    pub magic: Magic,
    pub version: u32,
    pub level1: DpfsLevelDescriptor,
    pub level2: DpfsLevelDescriptor,
    pub level3: DpfsLevelDescriptor,
}

impl DpfsDescriptor {
    pub fn validate_magic(&self) -> Result<(), Error> {
        if self.magic.v != *b"DPFS" {
            return make_error(Error::MagicMismatch);
        }
        if self.version != DPFS_VERSION {
            return make_error(Error::VersionMismatch);
        }
        Ok(())
    }
}

pub const DPFS_VERSION: u32 = 0x0001_0000;

/// Applies one level's selector (a bit stream, MSB-first per big-endian
/// 32-bit word) against a pair of equal-length halves, producing the
/// selected byte stream. See spec §4.1's bit-by-bit application rule.
fn apply_selector(selector: &[u8], halves: &[&[u8]; 2], block_len: usize, out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut cursor = [0usize; 2];
    'outer: for word in selector.chunks(4) {
        let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        for bit in (0..32).rev() {
            let select = ((word >> bit) & 1) as usize;
            let remaining = out_len - out.len();
            if remaining == 0 {
                break 'outer;
            }
            let take = remaining.min(block_len);
            let half = halves[select];
            out.extend_from_slice(&half[cursor[select]..cursor[select] + take]);
            cursor[select] += take;
            // the unselected half's cursor still advances in lockstep, since
            // both halves are addressed by the same running block offset.
            cursor[1 - select] += take;
            if out.len() == out_len {
                break 'outer;
            }
        }
    }
    out
}

/// `unwrap_dpfs`: reconstructs the L3-active bytes of a three-level
/// double-buffered region out of the raw partition bytes.
pub fn unwrap_dpfs(raw: &[u8], desc: &DpfsDescriptor, l1_selector: u8) -> Result<Vec<u8>, Error> {
    if l1_selector > 1 {
        return make_error(Error::InvalidValue);
    }

    let halves = |level: &DpfsLevelDescriptor| -> Result<[&[u8]; 2], Error> {
        let half_len = level.size as usize;
        let base = level.offset as usize;
        let end = base + half_len * 2;
        if end > raw.len() {
            return make_error(Error::OutOfBound);
        }
        Ok([&raw[base..base + half_len], &raw[base + half_len..end]])
    };

    let l1 = halves(&desc.level1)?;
    let l1_active = l1[l1_selector as usize];

    let l2 = halves(&desc.level2)?;
    let l2_block_len = 1usize << desc.level2.log2_block_size;
    let l2_active = apply_selector(l1_active, &l2, l2_block_len, desc.level2.size as usize);

    let l3 = halves(&desc.level3)?;
    let l3_block_len = 1usize << desc.level3.log2_block_size;
    let l3_active = apply_selector(&l2_active, &l3, l3_block_len, desc.level3.size as usize);

    Ok(l3_active)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(DpfsDescriptor::BYTE_LEN, 0x50);
    }

    #[test]
    fn selector_picks_whole_half_when_all_bits_equal() {
        let a = vec![0xAAu8; 64];
        let b = vec![0xBBu8; 64];
        // selector of all zero bits picks half 0 entirely
        let selector = vec![0u8; 4];
        let out = apply_selector(&selector, &[&a, &b], 8, 64);
        assert_eq!(out, a);

        let selector = vec![0xFFu8; 4];
        let out = apply_selector(&selector, &[&a, &b], 8, 64);
        assert_eq!(out, b);
    }

    #[test]
    fn l1_selector_out_of_range_is_invalid() {
        let desc = DpfsDescriptor {
            magic: Magic { v: *b"DPFS" },
            version: DPFS_VERSION,
            level1: DpfsLevelDescriptor {
                offset: 0,
                size: 8,
                log2_block_size: 3,
                padding: 0,
            },
            level2: DpfsLevelDescriptor {
                offset: 16,
                size: 8,
                log2_block_size: 3,
                padding: 0,
            },
            level3: DpfsLevelDescriptor {
                offset: 32,
                size: 8,
                log2_block_size: 3,
                padding: 0,
            },
        };
        let raw = vec![0u8; 48];
        assert!(unwrap_dpfs(&raw, &desc, 2).is_err());
    }
}
