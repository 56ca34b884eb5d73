use crate::byte_struct_common::Magic;
use crate::diff::Diff;
use crate::error::*;
use crate::fat::Fat;
use crate::fs_meta::{FsInfo, MetaTable, NameSchema};
use crate::random_access_file::{read_struct, read_to_vec};
use crate::save_ext_common::{SaveExtDir, SaveExtKey};
use byte_struct::*;
use log::warn;

const VSXE_VERSION: u32 = 0x0003_0000;
const ROOT_INDEX: u32 = 1;
const KEY_LEN: usize = 20;
const DIR_INFO_LEN: usize = 16;
const FILE_INFO_LEN: usize = 24;

/// The VSXE metadata header. Everything past `padding` (the mount-context
/// fields the console fills in at runtime) is irrelevant to extraction and
/// only checked for the reserved-field-non-zero warning (spec §7).
#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct ExtHeader {
    magic: Magic,
    version: u32,
    fs_info_offset: u64,
    image_size: u64,
    image_block_len: u32,
    padding: u32,
    unknown: u64,
    action: u32,
    unknown2: u32,
    mount_id: u32,
    unknown3: u32,
    mount_path: [[u8; 0x10]; 0x10],
}

/// A file record's info half. `block` is vestigial here (ExtData file
/// content lives in its own sibling DIFF image, not in this FAT); the field
/// that matters is `unique_id`, reinterpreting the byte range SAVE/Title DB
/// use for a size (spec §4.5's File entry note).
#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
struct ExtFile {
    next: u32,
    padding1: u32,
    block: u32,
    unique_id: u64,
    padding2: u32,
}

pub struct ExtDirEntry {
    pub index: u32,
    pub name: [u8; 16],
    pub sub_dir: u32,
    pub sub_file: u32,
    pub next: u32,
}

pub struct ExtFileEntry {
    pub index: u32,
    pub name: [u8; 16],
    pub next: u32,
    pub unique_id: u64,
}

/// The directory/file tree of one ExtData root, read out of its VSXE
/// metadata DIFF (spec §4.5). File content never lives here: each entry
/// only carries enough to find and verify its sibling per-file DIFF image
/// (spec §4.8's `fileId = index + 1`, `fileId / 126`, `fileId % 126` path).
pub struct ExtDataMeta {
    dirs: MetaTable<NameSchema>,
    files: MetaTable<NameSchema>,
}

impl ExtDataMeta {
    pub fn open_root(&self) -> Result<ExtDirEntry, Error> {
        self.open_dir(ROOT_INDEX)
    }

    pub fn open_dir(&self, index: u32) -> Result<ExtDirEntry, Error> {
        let info = SaveExtDir::read_bytes(self.dirs.info_at(index)?);
        let key = SaveExtKey::read_bytes(self.dirs.key_at(index)?);
        Ok(ExtDirEntry {
            index,
            name: key.name,
            sub_dir: info.sub_dir,
            sub_file: info.sub_file,
            next: info.next,
        })
    }

    pub fn open_file(&self, index: u32) -> Result<ExtFileEntry, Error> {
        let info = ExtFile::read_bytes(self.files.info_at(index)?);
        let key = SaveExtKey::read_bytes(self.files.key_at(index)?);
        Ok(ExtFileEntry {
            index,
            name: key.name,
            next: info.next,
            unique_id: info.unique_id,
        })
    }

    pub fn list_sub_dir(&self, dir: &ExtDirEntry) -> Result<Vec<ExtDirEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_dir;
        while index != 0 {
            let entry = self.open_dir(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }

    pub fn list_sub_file(&self, dir: &ExtDirEntry) -> Result<Vec<ExtFileEntry>, Error> {
        let mut result = Vec::new();
        let mut index = dir.sub_file;
        while index != 0 {
            let entry = self.open_file(index)?;
            index = entry.next;
            result.push(entry);
        }
        Ok(result)
    }
}

/// The per-file sub-path an ExtData file record resolves to, relative to
/// the ExtData root's own `idHigh/idLow` directory: `fidHigh/fidLow`, both
/// zero-padded 8-digit hex (spec §4.8).
pub fn file_path_segments(table_index: u32) -> (String, String) {
    let file_id = table_index as u64 + 1;
    let fid_high = file_id / 126;
    let fid_low = file_id % 126;
    (format!("{:08x}", fid_high), format!("{:08x}", fid_low))
}

/// Parses a VSXE metadata image already unwrapped from its DIFF container.
pub fn open_ext_data_meta(diff: &Diff) -> Result<ExtDataMeta, Error> {
    let meta = &diff.partition;
    let header: ExtHeader = read_struct(meta, 0)?;
    if header.magic.v != *b"VSXE" {
        return make_error(Error::MagicMismatch);
    }
    if header.version != VSXE_VERSION {
        return make_error(Error::VersionMismatch);
    }
    if header.unknown != 0 || header.unknown2 != 0 || header.unknown3 != 0 {
        warn!("VSXE header reserved fields are non-zero");
    }

    let fs_info: FsInfo = read_struct(meta, header.fs_info_offset as usize)?;
    if fs_info.data_block_count != fs_info.fat_size {
        warn!(
            "ExtData data_block_count ({}) disagrees with fat_size ({})",
            fs_info.data_block_count, fs_info.fat_size
        );
    }

    let meta_bytes = read_to_vec(meta)?;
    let block_len = fs_info.block_len as usize;

    let dir_hash = slice_of(&meta_bytes, fs_info.dir_hash_offset as usize, fs_info.dir_buckets as usize * 4)?.to_vec();
    let file_hash = slice_of(&meta_bytes, fs_info.file_hash_offset as usize, fs_info.file_buckets as usize * 4)?.to_vec();
    let fat_table = slice_of(&meta_bytes, fs_info.fat_offset as usize, (fs_info.fat_size as usize + 1) * 8)?;
    let data = slice_of(
        &meta_bytes,
        fs_info.data_offset as usize,
        fs_info.data_block_count as usize * block_len,
    )?
    .to_vec();

    let fat = Fat::new(fat_table, data, block_len)?;

    let dir_table_len = (fs_info.max_dir as usize + 2) * (KEY_LEN + DIR_INFO_LEN + 4);
    let file_table_len = (fs_info.max_file as usize + 1) * (KEY_LEN + FILE_INFO_LEN + 4);
    let dir_table = fat.read_file(fs_info.dir_table.block_index as usize, dir_table_len)?;
    let file_table = fat.read_file(fs_info.file_table.block_index as usize, file_table_len)?;

    let dirs = MetaTable::<NameSchema>::new(dir_hash, dir_table, KEY_LEN, DIR_INFO_LEN)?;
    let files = MetaTable::<NameSchema>::new(file_hash, file_table, KEY_LEN, FILE_INFO_LEN)?;

    dirs.verify_buckets();
    files.verify_buckets();
    dirs.validate_dummy_chain()?;
    files.validate_dummy_chain()?;

    Ok(ExtDataMeta { dirs, files })
}

fn slice_of(data: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    data.get(offset..offset + len).ok_or(Error::OutOfBound)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(ExtHeader::BYTE_LEN, 0x138);
        assert_eq!(ExtFile::BYTE_LEN, 24);
    }

    #[test]
    fn file_path_segments_follow_the_fileid_formula() {
        // table index 0 -> fileId 1 -> fidHigh 0, fidLow 1
        assert_eq!(file_path_segments(0), ("00000000".into(), "00000001".into()));
        // table index 251 -> fileId 252 -> fidHigh 2, fidLow 0
        assert_eq!(file_path_segments(251), ("00000002".into(), "00000000".into()));
    }
}
