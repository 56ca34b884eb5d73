use byte_struct::*;

#[derive(ByteStruct, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[byte_struct_le]
pub struct U64le {
    pub v: u64,
}

#[derive(ByteStruct, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[byte_struct_le]
pub struct U32le {
    pub v: u32,
}

#[derive(ByteStruct, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[byte_struct_le]
pub struct U16le {
    pub v: u16,
}

#[derive(ByteStruct, Clone, Copy, PartialEq, Eq, Debug)]
#[byte_struct_le]
pub struct Magic {
    pub v: [u8; 4],
}
