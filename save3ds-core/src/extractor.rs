use crate::db::{TitleDb, TitleDbDirEntry};
use crate::diff::{open_diff, Diff};
use crate::disk_file::DiskFile;
use crate::error::*;
use crate::ext_data::{file_path_segments, ExtDataMeta, ExtDirEntry, ExtFileEntry};
use crate::random_access_file::read_to_vec;
use crate::save_fs::{DirEntry, SaveFs};
use crate::signer::Signer;
use log::warn;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

fn name_to_string(name: &[u8; 16]) -> String {
    let trimmed: Vec<u8> = name.iter().cloned().take_while(|c| *c != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

fn write_output(out_dir: Option<&Path>, name: &str, bytes: &[u8]) -> Result<(), Error> {
    if let Some(dir) = out_dir {
        fs::write(dir.join(name), bytes)?;
    }
    Ok(())
}

fn make_dir(out_dir: Option<&Path>, name: &str) -> Result<Option<PathBuf>, Error> {
    match out_dir {
        Some(dir) => {
            let sub = dir.join(name);
            fs::create_dir_all(&sub)?;
            Ok(Some(sub))
        }
        None => Ok(None),
    }
}

/// Walks a SAVE directory tree (spec §4.8): children, then files, then
/// sibling directories, writing each file's reassembled bytes if `out_dir`
/// is configured (a `None` root still walks everything, for verification).
pub fn extract_save_tree(fs_: &SaveFs, dir: &DirEntry, out_dir: Option<&Path>) -> Result<(), Error> {
    for child in fs_.list_sub_dir(dir)? {
        let name = name_to_string(&child.name);
        let child_out = make_dir(out_dir, &name)?;
        extract_save_tree(fs_, &child, child_out.as_deref())?;
    }
    for file in fs_.list_sub_file(dir)? {
        let name = name_to_string(&file.name);
        let bytes = fs_.read_file(&file)?;
        write_output(out_dir, &name, &bytes)?;
    }
    Ok(())
}

/// Locates an ExtData subfile's sibling DIFF image on disk: the directory
/// CLI input already resolved to `<root>/<idHigh>/<idLow>`, plus the
/// `fidHigh/fidLow` pair each file entry's table index resolves to.
pub struct ExtDataLocation {
    pub root: PathBuf,
}

impl ExtDataLocation {
    pub fn file_path(&self, table_index: u32) -> PathBuf {
        let (fid_high, fid_low) = file_path_segments(table_index);
        self.root.join(fid_high).join(fid_low)
    }
}

/// Opens one ExtData subfile's DIFF container from disk and checks its
/// `uniqueId` against the meta entry's recorded value (a recoverable
/// mismatch per spec §7, not a fatal error).
pub fn open_ext_data_file(
    location: &ExtDataLocation,
    entry: &ExtFileEntry,
    signer: Option<(&dyn Signer, &[u8; 16])>,
) -> Result<Diff, Error> {
    let path = location.file_path(entry.index);
    let disk = DiskFile::new(File::open(&path)?)?;
    let raw = read_to_vec(&disk)?;
    let diff = open_diff(&raw, signer)?;
    if diff.unique_id != entry.unique_id {
        warn!(
            "ExtData file {} has unique id {:#x}, meta expected {:#x}",
            path.display(),
            diff.unique_id,
            entry.unique_id
        );
    }
    Ok(diff)
}

/// Walks an ExtData directory tree the same way as [`extract_save_tree`],
/// except each file's content comes from a sibling DIFF image rather than
/// the meta FAT (spec §4.8's ExtData dumper).
pub fn extract_ext_data_tree(
    meta: &ExtDataMeta,
    location: &ExtDataLocation,
    signer: Option<(&dyn Signer, &[u8; 16])>,
    dir: &ExtDirEntry,
    out_dir: Option<&Path>,
) -> Result<(), Error> {
    for child in meta.list_sub_dir(dir)? {
        let name = name_to_string(&child.name);
        let child_out = make_dir(out_dir, &name)?;
        extract_ext_data_tree(meta, location, signer, &child, child_out.as_deref())?;
    }
    for file in meta.list_sub_file(dir)? {
        let name = name_to_string(&file.name);
        let diff = open_ext_data_file(location, &file, signer)?;
        let bytes = read_to_vec(&diff.partition)?;
        write_output(out_dir, &name, &bytes)?;
    }
    Ok(())
}

/// Walks a Title DB tree. Directory records carry no name (spec §4.7's
/// `DbDirKey` is parent-only), so subdirectories are not materialized as
/// named output directories; every file is written flat, named by its
/// `titleId` as 16 lowercase hex digits.
pub fn extract_title_db_tree(db: &TitleDb, dir: &TitleDbDirEntry, out_dir: Option<&Path>) -> Result<(), Error> {
    for child in db.list_sub_dir(dir)? {
        extract_title_db_tree(db, &child, out_dir)?;
    }
    for file in db.list_sub_file(dir)? {
        let name = format!("{:016x}", file.title_id);
        let bytes = db.read_file(&file)?;
        write_output(out_dir, &name, &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_to_string_trims_trailing_nul() {
        let mut raw = [0u8; 16];
        raw[0..6].copy_from_slice(b"README");
        assert_eq!(name_to_string(&raw), "README");
    }

    #[test]
    fn ext_data_location_joins_fid_segments() {
        let location = ExtDataLocation {
            root: PathBuf::from("/tmp/extdata/00000000/00000001"),
        };
        let path = location.file_path(0);
        assert_eq!(path, PathBuf::from("/tmp/extdata/00000000/00000001/00000000/00000001"));
    }
}
