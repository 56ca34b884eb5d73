use byte_struct::*;

/// Directory record info shared by the Name-schema filesystems (SAVE data
/// and ExtData): a free-standing singly linked list of children in each of
/// `sub_dir`/`sub_file`, `next` linking siblings under the same parent.
#[derive(ByteStruct, Clone, Copy, Debug)]
#[byte_struct_le]
pub struct SaveExtDir {
    pub next: u32,
    pub sub_dir: u32,
    pub sub_file: u32,
    pub padding: u32,
}

/// Directory/file record key shared by the Name-schema filesystems: a
/// parent directory index plus a 16-byte fixed-width name.
#[derive(ByteStruct, Clone, Copy, PartialEq, Debug)]
#[byte_struct_le]
pub struct SaveExtKey {
    pub parent: u32,
    pub name: [u8; 16],
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_size() {
        assert_eq!(SaveExtDir::BYTE_LEN, 16);
        assert_eq!(SaveExtKey::BYTE_LEN, 20);
    }
}
