use crate::byte_struct_common::Magic;
use crate::disa::Disa;
use crate::error::*;
use crate::fat::Fat;
use crate::fs_meta::{FsInfo, MetaTable, NameSchema};
use crate::random_access_file::{read_struct, read_to_vec, RandomAccessFile};
use crate::save_ext_common::{SaveExtDir, SaveExtKey};
use byte_struct::*;
use log::warn;

const SAVE_VERSION: u32 = 0x0004_0000;

#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct SaveHeader {
    magic: Magic,
    version: u32,
    fs_info_offset: u64,
    image_size: u64,
    image_block_len: u32,
    padding: u32,
}

/// A file record: a block-chain start and a byte length, the chain itself
/// living in the shared FAT.
#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct SaveFile {
    next: u32,
    padding1: u32,
    block: u32,
    size: u64,
    padding2: u32,
}

/// One resolved directory entry: its own table index, name and children.
pub struct DirEntry {
    pub index: u32,
    pub name: [u8; 16],
    pub sub_dir: u32,
    pub sub_file: u32,
    pub next: u32,
}

/// One resolved file entry: its own table index, name, and FAT chain start
/// and byte length (as declared by the directory, not the chain itself).
pub struct FileEntry {
    pub index: u32,
    pub name: [u8; 16],
    pub next: u32,
    pub block: u32,
    pub size: u64,
}

const ROOT_INDEX: u32 = 1;
const SAVE_FILE_INFO_LEN: usize = 24;
const SAVE_DIR_INFO_LEN: usize = 16;
const KEY_LEN: usize = 20;

/// The SAVE partition's directory/file tree and block allocation table
/// (spec §4.5): a Name-schema pair of hash tables over a shared FAT, reading
/// straight out of whichever partition actually holds the table bytes.
pub struct SaveFs {
    fat: Fat,
    dirs: MetaTable<NameSchema>,
    files: MetaTable<NameSchema>,
}

impl SaveFs {
    pub fn open_root(&self) -> Result<DirEntry, Error> {
        self.open_dir(ROOT_INDEX)
    }

    pub fn open_dir(&self, index: u32) -> Result<DirEntry, Error> {
        let (info, key) = self.dir_at(index)?;
        Ok(DirEntry {
            index,
            name: key.name,
            sub_dir: info.sub_dir,
            sub_file: info.sub_file,
            next: info.next,
        })
    }

    pub fn open_file(&self, index: u32) -> Result<FileEntry, Error> {
        let (info, key) = self.file_at(index)?;
        Ok(FileEntry {
            index,
            name: key.name,
            next: info.next,
            block: info.block,
            size: info.size,
        })
    }

    pub fn open_sub_dir(&self, parent: &DirEntry, name: [u8; 16]) -> Result<DirEntry, Error> {
        let key = SaveExtKey {
            parent: parent.index,
            name,
        };
        let (index, _) = self.dirs.get(&key_bytes(&key))?;
        self.open_dir(index)
    }

    pub fn open_sub_file(&self, parent: &DirEntry, name: [u8; 16]) -> Result<FileEntry, Error> {
        let key = SaveExtKey {
            parent: parent.index,
            name,
        };
        let (index, _) = self.files.get(&key_bytes(&key))?;
        self.open_file(index)
    }

    pub fn list_sub_dir(&self, dir: &DirEntry) -> Result<Vec<DirEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_dir;
        while index != 0 {
            let entry = self.open_dir(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }

    pub fn list_sub_file(&self, dir: &DirEntry) -> Result<Vec<FileEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_file;
        while index != 0 {
            let entry = self.open_file(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }

    pub fn read_file(&self, file: &FileEntry) -> Result<Vec<u8>, Error> {
        self.fat.read_file(file.block as usize, file.size as usize)
    }

    fn dir_at(&self, index: u32) -> Result<(SaveExtDir, SaveExtKey), Error> {
        let bytes = self.dirs.info_at(index)?;
        let info = SaveExtDir::read_bytes(bytes);
        if info.padding != 0 {
            warn!("directory entry {} has a non-zero reserved field", index);
        }
        let key_bytes = self.dirs.key_at(index)?;
        Ok((info, SaveExtKey::read_bytes(key_bytes)))
    }

    fn file_at(&self, index: u32) -> Result<(SaveFile, SaveExtKey), Error> {
        let bytes = self.files.info_at(index)?;
        let info = SaveFile::read_bytes(bytes);
        let key_bytes = self.files.key_at(index)?;
        Ok((info, SaveExtKey::read_bytes(key_bytes)))
    }
}

fn key_bytes(key: &SaveExtKey) -> Vec<u8> {
    let mut buf = vec![0u8; SaveExtKey::BYTE_LEN];
    key.write_bytes(&mut buf);
    buf
}

/// Unwraps the SAVE partition (and, when present, the companion DATA
/// partition) of a DISA container into a navigable filesystem (spec §4.5).
pub fn open_save_fs(disa: &Disa) -> Result<SaveFs, Error> {
    let save = disa.save();
    let header: SaveHeader = read_struct(save, 0)?;
    if header.magic.v != *b"SAVE" {
        return make_error(Error::MagicMismatch);
    }
    if header.version != SAVE_VERSION {
        return make_error(Error::VersionMismatch);
    }

    let fs_info: FsInfo = read_struct(save, header.fs_info_offset as usize)?;
    if fs_info.data_block_count != fs_info.fat_size {
        warn!(
            "SAVE data_block_count ({}) disagrees with fat_size ({})",
            fs_info.data_block_count, fs_info.fat_size
        );
    }

    let save_bytes = read_to_vec(save)?;
    let block_len = fs_info.block_len as usize;

    let dir_hash = slice_of(&save_bytes, fs_info.dir_hash_offset as usize, fs_info.dir_buckets as usize * 4)?;
    let file_hash = slice_of(&save_bytes, fs_info.file_hash_offset as usize, fs_info.file_buckets as usize * 4)?;
    let fat_table = slice_of(&save_bytes, fs_info.fat_offset as usize, (fs_info.fat_size as usize + 1) * 8)?;

    let data = if let Some(data_partition) = disa.data() {
        read_to_vec(data_partition)?
    } else {
        slice_of(
            &save_bytes,
            fs_info.data_offset as usize,
            fs_info.data_block_count as usize * block_len,
        )?
        .to_vec()
    };

    let fat = Fat::new(fat_table, data, block_len)?;

    let dir_table_len = (fs_info.max_dir as usize + 2) * (KEY_LEN + SAVE_DIR_INFO_LEN + 4);
    let file_table_len = (fs_info.max_file as usize + 1) * (KEY_LEN + SAVE_FILE_INFO_LEN + 4);

    let dir_table = if disa.data().is_some() {
        slice_of(&save_bytes, fs_info.dir_table.to_offset(), dir_table_len)?.to_vec()
    } else {
        fat.read_file(fs_info.dir_table.block_index as usize, dir_table_len)?
    };
    let file_table = if disa.data().is_some() {
        slice_of(&save_bytes, fs_info.file_table.to_offset(), file_table_len)?.to_vec()
    } else {
        fat.read_file(fs_info.file_table.block_index as usize, file_table_len)?
    };

    let dirs = MetaTable::<NameSchema>::new(dir_hash.to_vec(), dir_table, KEY_LEN, SAVE_DIR_INFO_LEN)?;
    let files = MetaTable::<NameSchema>::new(file_hash.to_vec(), file_table, KEY_LEN, SAVE_FILE_INFO_LEN)?;

    dirs.verify_buckets();
    files.verify_buckets();
    dirs.validate_dummy_chain()?;
    files.validate_dummy_chain()?;

    Ok(SaveFs { fat, dirs, files })
}

fn slice_of(data: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    data.get(offset..offset + len).ok_or(Error::OutOfBound)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(SaveHeader::BYTE_LEN, 0x20);
        assert_eq!(SaveFile::BYTE_LEN, SAVE_FILE_INFO_LEN);
    }
}
