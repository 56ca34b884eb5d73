use crate::error::*;
use crate::random_access_file::*;
use std::cell::RefCell;
use std::fs::File;
use std::io::prelude::*;
use std::io::SeekFrom;

/// Implements `RandomAccessFile` over an open disk file, for the common case
/// of a save/ExtData/title-db image that lives on the host filesystem.
pub struct DiskFile {
    file: RefCell<File>,
    len: usize,
}

impl DiskFile {
    pub fn new(file: File) -> Result<DiskFile, Error> {
        let len = file.metadata()?.len() as usize;
        Ok(DiskFile {
            file: RefCell::new(file),
            len,
        })
    }
}

impl RandomAccessFile for DiskFile {
    fn read(&self, pos: usize, buf: &mut [u8]) -> Result<(), Error> {
        if pos + buf.len() > self.len {
            return make_error(Error::OutOfBound);
        }
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(pos as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }
    fn len(&self) -> usize {
        self.len
    }
}
