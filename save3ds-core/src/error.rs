use thiserror::Error;

/// Fatal error conditions per the error-handling policy: each of these aborts
/// the operation that detects it. Recoverable conditions (IVFC poisoning,
/// FAT chain anomalies, unique-ID mismatches, reserved-field warnings) are
/// logged with `log::warn!` at the detection site instead of being modeled
/// as variants here, since by definition they never abort the call.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),

    #[error("magic value mismatch")]
    MagicMismatch,

    #[error("version mismatch")]
    VersionMismatch,

    #[error("size or offset out of bound")]
    OutOfBound,

    #[error("size mismatch")]
    SizeMismatch,

    #[error("value is invalid for this field")]
    InvalidValue,

    #[error("partition table hash mismatch")]
    HashMismatch,

    #[error("CMAC signature mismatch")]
    SignatureMismatch,

    #[error("FAT chain is broken beyond recovery")]
    BrokenFat,

    #[error("entry not found")]
    NotFound,

    #[error("missing required key material for this operation")]
    MissingKey,

    #[error("this container kind is not supported")]
    Unsupported,
}

pub(crate) fn make_error<T>(e: Error) -> Result<T, Error> {
    Err(e)
}
