pub mod disk;
pub mod record;

pub use disk::{read_record, write_record};
pub use record::KeyRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u8),
}
