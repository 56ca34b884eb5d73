use crate::error::*;
use crate::random_access_file::*;

/// Implements `RandomAccessFile` over an in-memory buffer. Used pervasively
/// by tests as a stand-in for disk- or SD/NAND-backed files.
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> MemoryFile {
        MemoryFile { data }
    }
}

impl RandomAccessFile for MemoryFile {
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
    fn reads_back_what_was_constructed() {
        let file = MemoryFile::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0; 3];
        file.read(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn out_of_bound_read_errors() {
        let file = MemoryFile::new(vec![0; 4]);
        let mut buf = [0; 2];
        assert!(file.read(3, &mut buf).is_err());
    }
}
