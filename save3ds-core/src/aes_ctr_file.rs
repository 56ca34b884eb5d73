use crate::error::*;
use crate::misc::divide_up;
use crate::random_access_file::RandomAccessFile;
use aes::block_cipher_trait::generic_array::GenericArray;
use aes::block_cipher_trait::*;
use aes::Aes128;
use std::rc::Rc;

fn seek_ctr(ctr: &mut [u8; 16], mut block_index: usize) {
    for i in (8..16).rev() {
        block_index += ctr[i] as usize;
        ctr[i] = (block_index & 0xFF) as u8;
        block_index >>= 8;
    }
}

/// A read-only AES-128-CTR decrypting view over an encrypted file (spec
/// §6's "SD decryption"): the whole stream is one counter run seeded from
/// [`crate::sd::sd_counter`], with no block-cache -- extraction reads each
/// file front-to-back exactly once.
pub struct AesCtrFile {
    data: Rc<dyn RandomAccessFile>,
    aes128: Aes128,
    ctr: [u8; 16],
    len: usize,
}

impl AesCtrFile {
    pub fn new(data: Rc<dyn RandomAccessFile>, key: [u8; 16], ctr: [u8; 16]) -> AesCtrFile {
        let len = data.len();
        let aes128 = Aes128::new(GenericArray::from_slice(&key));
        AesCtrFile {
            data,
            aes128,
            ctr,
            len,
        }
    }

    fn pad(&self, block_index: usize) -> [u8; 16] {
        let mut ctr = self.ctr;
        seek_ctr(&mut ctr, block_index);
        let block_buf = GenericArray::from_mut_slice(&mut ctr);
        self.aes128.encrypt_block(block_buf);
        ctr
    }
}

impl RandomAccessFile for AesCtrFile {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error> {
        let end = pos + buf.len();
        if end > self.len() {
            return make_error(Error::OutOfBound);
        }
        self.data.read(pos, buf)?;

        let begin_block = pos / 16;
        let end_block = divide_up(end, 16);
        for i in begin_block..end_block {
            let pad = self.pad(i);
            let data_begin = std::cmp::max(i * 16, pos);
            let data_end = std::cmp::min((i + 1) * 16, end);
            for p in data_begin..data_end {
                buf[p - pos] ^= pad[p - i * 16];
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory_file::MemoryFile;

    #[test]
    fn decrypting_what_was_encrypted_with_the_same_key_and_counter_round_trips() {
        let plain: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
        let key = [7u8; 16];
        let ctr = [3u8; 16];

        let encrypted = {
            let source = Rc::new(MemoryFile::new(plain.clone()));
            let enc = AesCtrFile::new(source, key, ctr);
            let mut buf = vec![0u8; plain.len()];
            // MemoryFile is all-zero-XOR-pad here; reading it through the
            // CTR view directly yields ciphertext because the plaintext
            // source already equals `plain`.
            enc.read(0, &mut buf).unwrap();
            buf
        };

        let decrypted = {
            let source = Rc::new(MemoryFile::new(encrypted));
            let dec = AesCtrFile::new(source, key, ctr);
            let mut buf = vec![0u8; plain.len()];
            dec.read(0, &mut buf).unwrap();
            buf
        };

        assert_eq!(decrypted, plain);
    }

    #[test]
    fn partial_reads_match_a_full_read_at_the_same_offsets() {
        let plain: Vec<u8> = (0..64u16).map(|i| i as u8).collect();
        let key = [1u8; 16];
        let ctr = [2u8; 16];
        let source = Rc::new(MemoryFile::new(plain));
        let file = AesCtrFile::new(source, key, ctr);

        let mut whole = vec![0u8; 64];
        file.read(0, &mut whole).unwrap();

        let mut partial = vec![0u8; 20];
        file.read(17, &mut partial).unwrap();
        assert_eq!(partial, whole[17..37]);
    }
}
