use crate::error::*;
use byte_struct::*;

/// A read-only, randomly addressable byte source. Every container layer
/// (sub-slices, DPFS halves, IVFC levels, FAT files, AES-CTR decryption) is a
/// small adapter implementing this trait over another one, so a fully
/// unwrapped file is a chain of these wrapping the raw input bytes.
pub trait RandomAccessFile {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn read_struct<T: ByteStruct>(file: &dyn RandomAccessFile, pos: usize) -> Result<T, Error> {
    let mut buf = vec![0; T::BYTE_LEN];
    file.read(pos, &mut buf)?;
    Ok(T::read_bytes(&buf))
}

pub fn read_to_vec(file: &dyn RandomAccessFile) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0; file.len()];
    file.read(0, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn fuzzer(file: &dyn RandomAccessFile, plain: &[u8]) {
    use rand::prelude::*;
    assert_eq!(file.len(), plain.len());
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        if plain.is_empty() {
            break;
        }
        let pos = rng.gen_range(0, plain.len());
        let len = rng.gen_range(1, plain.len() - pos + 1);
        let mut buf = vec![0; len];
        file.read(pos, &mut buf).unwrap();
        assert_eq!(buf, plain[pos..pos + len]);
    }
}
