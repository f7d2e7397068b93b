//! Model serialization.
//!
//! Fitted scalers and encoder weights are stored in the `SafeTensors` format:
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: tensor names, dtypes, shapes, data_offsets, __metadata__]
//! [Raw tensor data: F32 values in little-endian]
//! ```
//!
//! Every write goes to a temporary file in the destination directory and is
//! renamed into place, so a reader never observes a half-written file.
//!
//! ```rust
//! use simfin::serialization::safetensors::{self, TensorMap, UserMetadata};
//!
//! let dir = tempfile::tempdir().expect("tempdir");
//! let path = dir.path().join("weights.safetensors");
//!
//! let mut tensors = TensorMap::new();
//! tensors.insert("w".to_string(), (vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]));
//! safetensors::save_safetensors(&path, &tensors, &UserMetadata::new()).expect("save");
//!
//! let file = safetensors::load_safetensors(&path).expect("load");
//! let (data, shape) = file.tensor("w").expect("tensor present");
//! assert_eq!(shape, vec![2, 2]);
//! assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0]);
//! ```

pub mod safetensors;

pub use safetensors::{SafeTensorsFile, SafeTensorsMetadata, TensorMap, UserMetadata};

use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Writes `bytes` to `path` via a temporary sibling file and a rename.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the write or
/// rename fails.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
