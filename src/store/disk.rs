use std::path::Path;

use super::{KeyRecord, StoreError};

/// Serialize `record` as CBOR to `path`, replacing any existing file.
pub fn write_record(path: &Path, record: &KeyRecord) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    std::fs::write(path, buf)?;
    tracing::debug!(path = %path.display(), origin = %record.origin, "Key record written");
    Ok(())
}

/// Read a key record and check that its key material decodes.
pub fn read_record(path: &Path) -> Result<KeyRecord, StoreError> {
    let bytes = std::fs::read(path)?;
    let record: KeyRecord = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    record.key_material()?;
    Ok(record)
}
