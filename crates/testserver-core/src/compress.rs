//! Gzip encoding for static responses

use crate::{Error, Result};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Gzip-encode `data` on the calling thread
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Gzip-encode `data` on the blocking pool
pub async fn gzip_async(data: Bytes) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || gzip(&data))
        .await
        .map_err(|e| Error::Internal(format!("gzip task failed: {}", e)))?
        .map(Bytes::from)
        .map_err(Error::from)
}
