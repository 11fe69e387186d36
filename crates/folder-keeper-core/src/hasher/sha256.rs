use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::error::{io_err, Result};

/// SHA-256 of the full file content as 64 lowercase hex characters.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_data(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Folder-level checksum over `(relative_route, content_checksum)` pairs.
///
/// Items are sorted by route (byte-wise), their checksums concatenated with
/// no separator, and the concatenation hashed. Input order does not matter.
/// An empty folder hashes the empty string.
pub fn aggregate_checksum<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut sorted: Vec<(&str, &str)> = items.into_iter().collect();
    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut hasher = Sha256::new();
    for (_, checksum) in &sorted {
        hasher.update(checksum.as_bytes());
    }
    hex::encode(hasher.finalize())
}
