use crate::datatype::DataType;
use crate::group::GroupError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Contribution size for rank {rank} is {value}, sizes must not be negative")]
    Configuration { rank: usize, value: i64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Region [{offset}, {offset} + {extent}) exceeds dimension of size {bound}")]
    OutOfBounds { offset: u64, extent: u64, bound: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Name already exists: {0}")]
    DuplicateName(String),
    #[error("No such object: {0}")]
    NotFound(String),
    #[error("Element type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: DataType, found: DataType },
    #[error("Selection mismatch: {0}")]
    SelectionMismatch(String),
    #[error("Workers disagree on dataset {0}")]
    InconsistentLayout(String),
    #[error("Store catalog error: {0}")]
    Catalog(String),
    #[error(transparent)]
    Group(#[from] GroupError),
}

impl Error {
    /// Stable name of the error kind, for reporting before a worker aborts.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration { .. } | Error::InvalidConfig(_) => "ConfigurationError",
            Error::OutOfBounds { .. } => "OutOfBoundsError",
            Error::Io(_) | Error::Catalog(_) => "IOError",
            Error::DuplicateName(_) => "DuplicateNameError",
            Error::NotFound(_) => "NotFoundError",
            Error::TypeMismatch { .. } => "TypeMismatchError",
            Error::SelectionMismatch(_) => "SelectionMismatchError",
            Error::InconsistentLayout(_) => "InconsistentLayoutError",
            Error::Group(_) => "GroupError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
