use crate::error::*;
use byte_struct::*;
use log::warn;
use std::cell::RefCell;

bitfields!(
    #[derive(PartialEq, Clone, Copy, Debug)]
    EntryHalf: u32 {
        index: 31,
        flag: 1,
    }
);

#[derive(ByteStruct, PartialEq, Clone, Copy, Debug)]
#[byte_struct_le]
struct FatEntry {
    u: EntryHalf,
    v: EntryHalf,
}

/// The save filesystem's block allocation table: a chain of start/expand
/// flagged entries over `0..=fatSize`, entry 0 being the free-chain head.
/// Every anomaly the walker can hit is a recoverable warning (spec §7);
/// the `visited` bitset below is the walker's only mutable state.
pub struct Fat {
    entries: Vec<FatEntry>,
    data: Vec<u8>,
    block_len: usize,
    visited: RefCell<Vec<bool>>,
}

impl Fat {
    pub fn new(table: &[u8], data: Vec<u8>, block_len: usize) -> Result<Fat, Error> {
        if table.len() % FatEntry::BYTE_LEN != 0 {
            return make_error(Error::SizeMismatch);
        }
        let count = table.len() / FatEntry::BYTE_LEN;
        let block_count = count - 1;
        if data.len() != block_count * block_len {
            warn!(
                "FAT size disagrees with data region: {} blocks implied by FAT, {} bytes in data region at block_len {}",
                block_count,
                data.len(),
                block_len
            );
        }
        let entries = (0..count)
            .map(|i| FatEntry::read_bytes(&table[i * FatEntry::BYTE_LEN..(i + 1) * FatEntry::BYTE_LEN]))
            .collect();
        Ok(Fat {
            entries,
            data,
            block_len,
            visited: RefCell::new(vec![false; count]),
        })
    }

    fn entry(&self, index: usize) -> Result<FatEntry, Error> {
        self.entries.get(index).copied().ok_or(Error::OutOfBound)
    }

    /// Walks the chain starting at `start_block0` (0-based), invoking
    /// `block_callback` once per 0-based block index, in chain order.
    pub fn walk(&self, start_block0: usize, mut block_callback: impl FnMut(usize)) -> Result<(), Error> {
        let start = start_block0 + 1;
        let mut current = start;
        let mut previous = 0usize;
        while current != 0 {
            let entry = self.entry(current)?;

            if (entry.u.flag == 1) != (current == start) {
                warn!("FAT entry {} has an inconsistent start flag", current);
            }
            if entry.u.index as usize != previous {
                warn!(
                    "FAT entry {} has a broken back-link (expected {}, found {})",
                    current, previous, entry.u.index
                );
            }

            let node_end = if entry.v.flag == 1 {
                let expand_start = self.entry(current + 1)?;
                if expand_start.u.flag != 1
                    || expand_start.v.flag == 1
                    || expand_start.u.index as usize != current
                {
                    warn!("FAT expansion run at {} has a broken starting entry", current);
                }
                let node_end = expand_start.v.index as usize;
                let expand_end = self.entry(node_end)?;
                if expand_end.u.index as usize != current
                    || expand_end.v.index as usize != node_end
                    || expand_end.u.flag != 1
                    || expand_end.v.flag == 1
                {
                    warn!("FAT expansion run at {} has a broken ending entry", current);
                }
                node_end
            } else {
                current
            };

            for i in current..=node_end {
                let mut visited = self.visited.borrow_mut();
                match visited.get(i) {
                    Some(false) => visited[i] = true,
                    Some(true) => warn!("FAT block {} visited more than once", i),
                    None => warn!("FAT walk stepped on out-of-bound index {}", i),
                }
                drop(visited);
                block_callback(i - 1);
            }

            previous = current;
            current = entry.v.index as usize;
        }
        Ok(())
    }

    /// Marks entry 0 and the free chain it heads as visited, completing the
    /// accounting `all_visited` relies on.
    pub fn visit_free_block(&self) -> Result<(), Error> {
        let head = self.entry(0)?;
        if head.u.index != 0 || head.u.flag == 1 || head.v.flag == 1 {
            warn!("FAT free chain head has unexpected flags");
        }
        self.visited.borrow_mut()[0] = true;
        if head.v.index != 0 {
            self.walk(head.v.index as usize - 1, |_| {})?;
        }
        Ok(())
    }

    /// True iff every entry was touched by exactly one walked chain (the
    /// allocated files plus the free chain). False means a leaked block.
    pub fn all_visited(&self) -> bool {
        self.visited.borrow().iter().all(|&v| v)
    }

    /// Reassembles a file's bytes by walking its chain and copying
    /// `min(remaining, block_len)` bytes per block from the data region.
    pub fn read_file(&self, start_block0: usize, size: usize) -> Result<Vec<u8>, Error> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(size);
        self.walk(start_block0, |block_index| {
            if out.len() >= size {
                return;
            }
            let begin = block_index * self.block_len;
            let take = (size - out.len()).min(self.block_len);
            match self.data.get(begin..begin + take) {
                Some(slice) => out.extend_from_slice(slice),
                None => warn!("FAT block {} falls outside the data region", block_index),
            }
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry_bytes(u_index: u32, u_flag: u32, v_index: u32, v_flag: u32) -> [u8; 8] {
        let entry = FatEntry {
            u: EntryHalf {
                index: u_index,
                flag: u_flag,
            },
            v: EntryHalf {
                index: v_index,
                flag: v_flag,
            },
        };
        let mut buf = [0u8; 8];
        entry.write_bytes(&mut buf);
        buf
    }

    #[test]
    fn struct_size() {
        assert_eq!(FatEntry::BYTE_LEN, 8);
    }

    #[test]
    fn single_block_file_walks_once() {
        // entry 0: free head (unused here); entry 1: start, no next, no expand.
        let mut table = Vec::new();
        table.extend(entry_bytes(0, 0, 0, 0));
        table.extend(entry_bytes(0, 1, 0, 0));
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0xAA];
        let fat = Fat::new(&table, data, 0x200).unwrap();
        let mut blocks = Vec::new();
        fat.walk(0, |b| blocks.push(b)).unwrap();
        assert_eq!(blocks, vec![0]);
    }

    #[test]
    fn expansion_run_walks_every_block_in_the_run() {
        // blockIndex=4 (1-based entry 5), a 3-block expansion run covering
        // blocks 4,5,6 with no further chain link after it.
        let mut table = Vec::new();
        table.extend(entry_bytes(0, 0, 0, 0)); // 0: free head (unused here)
        table.extend(entry_bytes(0, 0, 0, 0)); // 1: unused
        table.extend(entry_bytes(0, 0, 0, 0)); // 2: unused
        table.extend(entry_bytes(0, 0, 0, 0)); // 3: unused
        table.extend(entry_bytes(0, 0, 0, 0)); // 4: unused
        table.extend(entry_bytes(0, 1, 0, 1)); // 5: start+expand, chain ends after this run
        table.extend(entry_bytes(5, 1, 7, 0)); // 6: expansion start pairing entry, nodeEnd=7
        table.extend(entry_bytes(5, 1, 7, 0)); // 7: expansion end pairing entry
        table.extend(entry_bytes(0, 0, 0, 0)); // 8: unused
        let data = vec![0u8; 7 * 0x200];
        let fat = Fat::new(&table, data, 0x200).unwrap();
        let mut blocks = Vec::new();
        fat.walk(4, |b| blocks.push(b)).unwrap();
        assert_eq!(blocks, vec![4, 5, 6]);
    }

    #[test]
    fn zero_size_file_reads_nothing_and_does_not_walk() {
        let table = vec![0u8; 16];
        let fat = Fat::new(&table, vec![], 0x200).unwrap();
        assert_eq!(fat.read_file(0, 0).unwrap(), Vec::<u8>::new());
        assert!(!fat.all_visited());
    }

    #[test]
    fn all_visited_true_once_every_chain_and_the_free_list_are_walked() {
        let mut table = Vec::new();
        table.extend(entry_bytes(0, 0, 2, 0)); // 0: free head, points at block 1 (entry 2)
        table.extend(entry_bytes(0, 1, 0, 0)); // 1: allocated, single block
        table.extend(entry_bytes(0, 1, 0, 0)); // 2: free, single block
        let data = vec![0u8; 2 * 0x200];
        let fat = Fat::new(&table, data, 0x200).unwrap();
        fat.walk(0, |_| {}).unwrap();
        fat.visit_free_block().unwrap();
        assert!(fat.all_visited());
    }
}
