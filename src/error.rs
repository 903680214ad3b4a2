//! error kinds returned by every file operation
//!
//! Each call surfaces exactly one [EfsError]. Front ends turn it into a
//! message or an exit code with [EfsError::to_errno].
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EfsError {
    /// filename has no directory entry
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    /// write or delete attempted against a read-only file
    #[error("access denied: {0} is read-only")]
    AccessDenied(String),

    /// write or flush through a descriptor opened in `ReadOnly` mode
    #[error("file is opened read-only")]
    ReadOnlyFile,

    #[error("no free block left on the volume")]
    VolumeFull,

    #[error("no free directory slot")]
    DirectoryFull,

    #[error("open file table is full ({0} slots)")]
    TooManyOpenFiles(usize),

    #[error("filename {name:?} is longer than {max} bytes")]
    NameTooLong { name: String, max: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// logical offset past the last direct pointer of the inode
    #[error("offset {offset} exceeds the addressable range of {limit} bytes")]
    FileTooLarge { offset: u64, limit: u64 },

    /// the file is already held by an open descriptor
    #[error("file is busy: {0}")]
    FileBusy(String),

    #[error("incorrect volume password")]
    InvalidPassword,

    /// a volume structure failed its magic or digest check
    #[error("corrupted volume: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EfsError {
    /// Map the error to a POSIX errno.
    ///
    /// The match has no wildcard arm, a new variant will not compile until
    /// it is given an errno.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::AccessDenied(_) => libc::EACCES,
            Self::ReadOnlyFile => libc::EBADF,
            Self::VolumeFull => libc::ENOSPC,
            Self::DirectoryFull => libc::ENOSPC,
            Self::TooManyOpenFiles(_) => libc::EMFILE,
            Self::NameTooLong { .. } => libc::ENAMETOOLONG,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::FileBusy(_) => libc::EBUSY,
            Self::InvalidPassword => libc::EPERM,
            Self::Corrupted(_) => libc::EIO,
            Self::Io(_) => libc::EIO,
        }
    }
}

impl From<bincode::error::EncodeError> for EfsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        EfsError::Corrupted(format!("encode failed: {e}"))
    }
}

impl From<bincode::error::DecodeError> for EfsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        EfsError::Corrupted(format!("decode failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, EfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(EfsError::NotFound("a".into()).to_errno(), libc::ENOENT);
        assert_eq!(EfsError::VolumeFull.to_errno(), libc::ENOSPC);
        assert_eq!(EfsError::TooManyOpenFiles(4).to_errno(), libc::EMFILE);
        assert_eq!(
            EfsError::FileTooLarge {
                offset: 10,
                limit: 8
            }
            .to_errno(),
            libc::EFBIG
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(EfsError::from(io).to_errno(), libc::EIO);
    }

    #[test]
    fn test_error_messages() {
        let e = EfsError::NameTooLong {
            name: "abc".into(),
            max: 2,
        };
        assert_eq!(e.to_string(), r#"filename "abc" is longer than 2 bytes"#);
        assert_eq!(
            EfsError::AccessDenied("a.txt".into()).to_string(),
            "access denied: a.txt is read-only"
        );
    }
}
