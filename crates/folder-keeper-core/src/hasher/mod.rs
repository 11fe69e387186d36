pub mod sha256;

pub use sha256::{aggregate_checksum, file_checksum, hash_data};
