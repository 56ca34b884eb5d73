use crate::byte_struct_common::Magic;
use crate::diff::Diff;
use crate::error::*;
use crate::fat::Fat;
use crate::fs_meta::{FsInfo, MetaTable, TitleDbSchema};
use crate::random_access_file::{read_struct, read_to_vec};
use byte_struct::*;
use log::warn;
use std::convert::TryInto;

const BDRI_VERSION: u32 = 0x0003_0000;
const ROOT_INDEX: u32 = 1;
const DIR_KEY_LEN: usize = 4;
const DIR_INFO_LEN: usize = 24;
const FILE_KEY_LEN: usize = 12;
const FILE_INFO_LEN: usize = 28;

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DbHeader {
    magic: Magic,
    version: u32,
    fs_info_offset: u64,
    image_size: u64,
    image_block_len: u32,
    padding: u32,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DbDirKey {
    parent: u32,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DbDir {
    next: u32,
    sub_dir: u32,
    sub_file: u32,
    padding: [u8; 12],
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DbFileKey {
    parent: u32,
    title_id: u64,
}

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct DbFile {
    next: u32,
    padding1: u32,
    block: u32,
    size: u64,
    padding2: u64,
}

pub struct TitleDbDirEntry {
    pub index: u32,
    pub sub_dir: u32,
    pub sub_file: u32,
    pub next: u32,
}

pub struct TitleDbFileEntry {
    pub index: u32,
    pub title_id: u64,
    pub next: u32,
    pub block: u32,
    pub size: u64,
}

/// The BDRI title database's directory/file tree and block allocation
/// table (spec §4.5-§4.7): same shape as a SAVE filesystem but keyed by
/// `titleId` instead of a name, and always embedded in a single DIFF
/// partition (there is no separate DATA-partition variant for Title DB).
pub struct TitleDb {
    fat: Fat,
    dirs: MetaTable<TitleDbSchema>,
    files: MetaTable<TitleDbSchema>,
}

impl TitleDb {
    pub fn open_root(&self) -> Result<TitleDbDirEntry, Error> {
        self.open_dir(ROOT_INDEX)
    }

    pub fn open_dir(&self, index: u32) -> Result<TitleDbDirEntry, Error> {
        let bytes = self.dirs.info_at(index)?;
        let info = DbDir::read_bytes(bytes);
        if info.padding != [0; 12] {
            warn!("title DB directory entry {} has a non-zero reserved field", index);
        }
        Ok(TitleDbDirEntry {
            index,
            sub_dir: info.sub_dir,
            sub_file: info.sub_file,
            next: info.next,
        })
    }

    pub fn open_file(&self, index: u32) -> Result<TitleDbFileEntry, Error> {
        let info = DbFile::read_bytes(self.files.info_at(index)?);
        let key = DbFileKey::read_bytes(self.files.key_at(index)?);
        Ok(TitleDbFileEntry {
            index,
            title_id: key.title_id,
            next: info.next,
            block: info.block,
            size: info.size,
        })
    }

    pub fn list_sub_dir(&self, dir: &TitleDbDirEntry) -> Result<Vec<TitleDbDirEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_dir;
        while index != 0 {
            let entry = self.open_dir(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }

    pub fn list_sub_file(&self, dir: &TitleDbDirEntry) -> Result<Vec<TitleDbFileEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_file;
        while index != 0 {
            let entry = self.open_file(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }

    pub fn read_file(&self, file: &TitleDbFileEntry) -> Result<Vec<u8>, Error> {
        self.fat.read_file(file.block as usize, file.size as usize)
    }
}

/// Unwraps a BDRI title database already unwrapped from its DIFF container
/// (spec §4.5): magic `"BDRI"` sits directly at the start of the DIFF
/// partition, with no further preheader.
pub fn open_title_db(diff: &Diff) -> Result<TitleDb, Error> {
    let partition = &diff.partition;
    let header: DbHeader = read_struct(partition, 0)?;
    if header.magic.v != *b"BDRI" {
        return make_error(Error::MagicMismatch);
    }
    if header.version != BDRI_VERSION {
        return make_error(Error::VersionMismatch);
    }

    let fs_info: FsInfo = read_struct(partition, header.fs_info_offset as usize)?;
    if fs_info.data_block_count != fs_info.fat_size {
        warn!(
            "title DB data_block_count ({}) disagrees with fat_size ({})",
            fs_info.data_block_count, fs_info.fat_size
        );
    }

    let partition_bytes = read_to_vec(partition)?;
    let block_len = fs_info.block_len as usize;

    let dir_hash = slice_of(&partition_bytes, fs_info.dir_hash_offset as usize, fs_info.dir_buckets as usize * 4)?.to_vec();
    let file_hash = slice_of(&partition_bytes, fs_info.file_hash_offset as usize, fs_info.file_buckets as usize * 4)?.to_vec();
    let fat_table = slice_of(&partition_bytes, fs_info.fat_offset as usize, (fs_info.fat_size as usize + 1) * 8)?;
    let data = slice_of(
        &partition_bytes,
        fs_info.data_offset as usize,
        fs_info.data_block_count as usize * block_len,
    )?
    .to_vec();

    let fat = Fat::new(fat_table, data, block_len)?;

    let dir_table_len = (fs_info.max_dir as usize + 2) * (DIR_KEY_LEN + DIR_INFO_LEN + 4);
    let file_table_len = (fs_info.max_file as usize + 1) * (FILE_KEY_LEN + FILE_INFO_LEN + 4);
    let dir_table = fat.read_file(fs_info.dir_table.block_index as usize, dir_table_len)?;
    let file_table = fat.read_file(fs_info.file_table.block_index as usize, file_table_len)?;

    let dirs = MetaTable::<TitleDbSchema>::new(dir_hash, dir_table, DIR_KEY_LEN, DIR_INFO_LEN)?;
    let files = MetaTable::<TitleDbSchema>::new(file_hash, file_table, FILE_KEY_LEN, FILE_INFO_LEN)?;

    dirs.verify_buckets();
    files.verify_buckets();
    dirs.validate_dummy_chain()?;
    files.validate_dummy_chain()?;

    Ok(TitleDb { fat, dirs, files })
}

fn slice_of(data: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    data.get(offset..offset + len).ok_or(Error::OutOfBound)
}

/// Parses the 0x10-byte "TICK" preheader `ticket-extract` reads without
/// ever unwrapping the DIFF/BDRI body behind it: magic plus three `u32`
/// info fields (spec §6).
pub struct TicketPreheader {
    pub field0: u32,
    pub field1: u32,
    pub field2: u32,
}

pub fn read_ticket_preheader(raw: &[u8]) -> Result<TicketPreheader, Error> {
    let magic = raw.get(0..4).ok_or(Error::OutOfBound)?;
    if magic != b"TICK" {
        return make_error(Error::MagicMismatch);
    }
    let field0 = u32::from_le_bytes(raw.get(4..8).ok_or(Error::OutOfBound)?.try_into().unwrap());
    let field1 = u32::from_le_bytes(raw.get(8..12).ok_or(Error::OutOfBound)?.try_into().unwrap());
    let field2 = u32::from_le_bytes(raw.get(12..16).ok_or(Error::OutOfBound)?.try_into().unwrap());
    Ok(TicketPreheader { field0, field1, field2 })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(DbHeader::BYTE_LEN, 0x20);
        assert_eq!(DbDirKey::BYTE_LEN, DIR_KEY_LEN);
        assert_eq!(DbDir::BYTE_LEN, DIR_INFO_LEN);
        assert_eq!(DbFileKey::BYTE_LEN, FILE_KEY_LEN);
        assert_eq!(DbFile::BYTE_LEN, FILE_INFO_LEN);
    }

    #[test]
    fn ticket_preheader_reads_magic_and_three_fields() {
        let mut raw = Vec::new();
        raw.extend(b"TICK");
        raw.extend(&7u32.to_le_bytes());
        raw.extend(&8u32.to_le_bytes());
        raw.extend(&9u32.to_le_bytes());
        let pre = read_ticket_preheader(&raw).unwrap();
        assert_eq!((pre.field0, pre.field1, pre.field2), (7, 8, 9));
    }

    #[test]
    fn ticket_preheader_rejects_bad_magic() {
        let raw = vec![0u8; 16];
        assert!(read_ticket_preheader(&raw).is_err());
    }
}
