use sha2::{Digest, Sha256};

/// Hashes the movable.sed key-Y into the SD "id0" directory name used by the
/// console's SD card layout: SHA-256 of the key, bytes reordered in groups
/// of 4 (little-endian 32-bit word order), printed as lowercase hex.
pub fn hash_movable(key: [u8; 16]) -> String {
    let mut hasher = Sha256::new();
    hasher.input(&key);
    let hash = hasher.result();
    let mut result = String::new();
    for index in &[3, 2, 1, 0, 7, 6, 5, 4, 11, 10, 9, 8, 15, 14, 13, 12] {
        result.push_str(&format!("{:02x}", hash[*index]));
    }
    result
}

pub fn align_up(offset: usize, align: usize) -> usize {
    offset + (align - offset % align) % align
}

pub fn divide_up(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn divide_up_rounds_up() {
        assert_eq!(divide_up(0, 512), 0);
        assert_eq!(divide_up(1, 512), 1);
        assert_eq!(divide_up(512, 512), 1);
        assert_eq!(divide_up(513, 512), 2);
    }
}
