#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Not found")]
    NotFound,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("IO: {0}")]
    Io(IoError),
    #[error("FS: {0}")]
    Fs(FsError),
}

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("Out of range")]
    OutOfRange,
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("Inconsistent")]
    Inconsistent,
    #[error("Is a directory")]
    IsDirectory,
    #[error("Out of bounds")]
    OutOfBounds,
}

pub type Result<T> = core::result::Result<T, Error>;
