//! SD "SD decryption" fingerprint (spec §6): the per-file AES-CTR transform
//! a title's save/ExtData/Title DB images are wrapped in on an SD card.
//! Scope is the algebra only -- this crate does not resolve a console's
//! `movable.sed` or its `Nintendo 3DS/<id0>` directory layout (mounting as
//! a live filesystem is out of scope); callers supply `keyX`/`keyY` and the
//! logical SD path directly.

use crate::crypto::sha256;
use crate::key_engine::scramble;

/// Derives the initial AES-CTR counter for a given SD path: UTF-16LE encode
/// `path` with a trailing NUL, SHA-256 it, split into two 16-byte halves
/// and XOR them together.
pub fn sd_counter(path: &str) -> [u8; 16] {
    let mut utf16le = Vec::with_capacity((path.len() + 1) * 2);
    for unit in path.encode_utf16() {
        utf16le.extend_from_slice(&unit.to_le_bytes());
    }
    utf16le.extend_from_slice(&0u16.to_le_bytes());

    let hash = sha256(&utf16le);
    let mut ctr = [0u8; 16];
    for i in 0..16 {
        ctr[i] = hash[i] ^ hash[i + 16];
    }
    ctr
}

/// The scrambled AES-CTR key for SD decryption: `scramble(keyX, keyY)`.
pub fn sd_key(key_x: [u8; 16], key_y: [u8; 16]) -> [u8; 16] {
    scramble(key_x, key_y)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sd_counter_is_deterministic_and_path_sensitive() {
        let a = sd_counter("/00000000/00000001");
        let b = sd_counter("/00000000/00000001");
        let c = sd_counter("/00000000/00000002");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sd_key_matches_the_underlying_scramble() {
        let x = [1; 16];
        let y = [2; 16];
        assert_eq!(sd_key(x, y), scramble(x, y));
    }
}
