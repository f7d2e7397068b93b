//! `SafeTensors` format implementation for model serialization.
//!
//! Only F32 tensors are written or read; the stored models never use any
//! other dtype.

use crate::error::{Result, SimfinError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Metadata for a single tensor in `SafeTensors` format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Data type of the tensor (always "F32").
    pub dtype: String,
    /// Shape of the tensor (e.g., `[n_features]` or `[out, in]`).
    pub shape: Vec<usize>,
    /// Data offsets `[start, end]` in the raw data section.
    pub data_offsets: [usize; 2],
}

/// Complete `SafeTensors` metadata structure.
/// Uses `BTreeMap` for deterministic JSON serialization (sorted keys).
pub type SafeTensorsMetadata = BTreeMap<String, TensorMetadata>;

/// User metadata from the `__metadata__` header section.
pub type UserMetadata = BTreeMap<String, String>;

/// Tensor name to `(data, shape)`.
pub type TensorMap = BTreeMap<String, (Vec<f32>, Vec<usize>)>;

/// Encodes tensors and user metadata into `SafeTensors` bytes.
///
/// # Errors
///
/// Returns an error if a tensor's data length disagrees with its shape or
/// JSON serialization fails.
pub fn to_bytes(tensors: &TensorMap, user_metadata: &UserMetadata) -> Result<Vec<u8>> {
    let mut header = serde_json::Map::new();

    if !user_metadata.is_empty() {
        let meta_obj: serde_json::Map<String, serde_json::Value> = user_metadata
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        header.insert(
            "__metadata__".to_string(),
            serde_json::Value::Object(meta_obj),
        );
    }

    let mut raw_data = Vec::new();
    let mut current_offset = 0;

    for (name, (data, shape)) in tensors {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(SimfinError::FormatError(format!(
                "tensor '{name}' has {} values but shape {shape:?}",
                data.len()
            )));
        }

        let start_offset = current_offset;
        let end_offset = current_offset + data.len() * 4;

        let tensor_meta = TensorMetadata {
            dtype: "F32".to_string(),
            shape: shape.clone(),
            data_offsets: [start_offset, end_offset],
        };
        header.insert(name.clone(), serde_json::to_value(tensor_meta)?);

        for &value in data {
            raw_data.extend_from_slice(&value.to_le_bytes());
        }
        current_offset = end_offset;
    }

    let metadata_json = serde_json::to_string(&header)?;
    let metadata_bytes = metadata_json.as_bytes();
    let metadata_len = metadata_bytes.len() as u64;

    let mut output = Vec::with_capacity(8 + metadata_bytes.len() + raw_data.len());
    output.extend_from_slice(&metadata_len.to_le_bytes());
    output.extend_from_slice(metadata_bytes);
    output.extend_from_slice(&raw_data);
    Ok(output)
}

/// Saves tensors and user metadata to a `SafeTensors` file atomically.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn save_safetensors<P: AsRef<Path>>(
    path: P,
    tensors: &TensorMap,
    user_metadata: &UserMetadata,
) -> Result<()> {
    let bytes = to_bytes(tensors, user_metadata)?;
    super::atomic_write(path, &bytes)
}

/// A parsed `SafeTensors` file held in memory.
#[derive(Debug, Clone)]
pub struct SafeTensorsFile {
    metadata: SafeTensorsMetadata,
    user_metadata: UserMetadata,
    raw_data: Vec<u8>,
}

impl SafeTensorsFile {
    /// Parses `SafeTensors` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::FormatError`] if the header is truncated or the
    /// metadata is not valid JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let metadata_len = validate_and_read_header(bytes)?;
        let (metadata, user_metadata) = parse_metadata(bytes, metadata_len)?;
        Ok(Self {
            metadata,
            user_metadata,
            raw_data: bytes[8 + metadata_len..].to_vec(),
        })
    }

    /// Tensor metadata, keyed by name.
    #[must_use]
    pub fn metadata(&self) -> &SafeTensorsMetadata {
        &self.metadata
    }

    /// Contents of the `__metadata__` header section.
    #[must_use]
    pub fn user_metadata(&self) -> &UserMetadata {
        &self.user_metadata
    }

    /// All tensor names, sorted.
    #[must_use]
    pub fn tensor_names(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }

    /// Extracts tensor `name` as `(data, shape)`.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::FormatError`] if the tensor is missing or its
    /// data is invalid.
    pub fn tensor(&self, name: &str) -> Result<(Vec<f32>, Vec<usize>)> {
        let meta = self
            .metadata
            .get(name)
            .ok_or_else(|| SimfinError::FormatError(format!("missing '{name}' tensor")))?;
        let data = extract_tensor(&self.raw_data, meta)?;
        Ok((data, meta.shape.clone()))
    }

    /// Reads a `__metadata__` entry and parses it.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::FormatError`] if the key is missing or does not
    /// parse as `T`.
    pub fn parse_user<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        let raw = self
            .user_metadata
            .get(key)
            .ok_or_else(|| SimfinError::FormatError(format!("missing '{key}' metadata")))?;
        raw.parse()
            .map_err(|_| SimfinError::FormatError(format!("invalid '{key}' metadata: {raw}")))
    }
}

/// Loads a `SafeTensors` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid `SafeTensors`.
pub fn load_safetensors<P: AsRef<Path>>(path: P) -> Result<SafeTensorsFile> {
    let bytes = fs::read(path)?;
    SafeTensorsFile::from_bytes(&bytes)
}

fn validate_and_read_header(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 8 {
        return Err(SimfinError::FormatError(format!(
            "invalid SafeTensors file: {} bytes, need at least 8 bytes for header",
            bytes.len()
        )));
    }

    let mut header_bytes = [0u8; 8];
    header_bytes.copy_from_slice(&bytes[0..8]);
    let metadata_len = u64::from_le_bytes(header_bytes) as usize;

    if metadata_len == 0 {
        return Err("invalid SafeTensors file: metadata length is 0".into());
    }
    if metadata_len > bytes.len() - 8 {
        return Err(SimfinError::FormatError(format!(
            "invalid SafeTensors file: metadata length {metadata_len} exceeds file size"
        )));
    }

    Ok(metadata_len)
}

fn parse_metadata(bytes: &[u8], metadata_len: usize) -> Result<(SafeTensorsMetadata, UserMetadata)> {
    let metadata_str = std::str::from_utf8(&bytes[8..8 + metadata_len])
        .map_err(|e| SimfinError::FormatError(format!("metadata is not valid UTF-8: {e}")))?;

    let raw: serde_json::Value = serde_json::from_str(metadata_str)
        .map_err(|e| SimfinError::FormatError(format!("JSON parsing failed: {e}")))?;

    let serde_json::Value::Object(map) = raw else {
        return Err("invalid SafeTensors file: header is not a JSON object".into());
    };

    let mut metadata = SafeTensorsMetadata::new();
    let mut user_metadata = UserMetadata::new();

    for (key, value) in map {
        if key == "__metadata__" {
            if let serde_json::Value::Object(meta_map) = value {
                for (mk, mv) in meta_map {
                    if let serde_json::Value::String(s) = mv {
                        user_metadata.insert(mk, s);
                    }
                }
            }
            continue;
        }
        let tensor_meta: TensorMetadata = serde_json::from_value(value)
            .map_err(|e| SimfinError::FormatError(format!("tensor '{key}': {e}")))?;
        metadata.insert(key, tensor_meta);
    }

    Ok((metadata, user_metadata))
}

/// Extracts an F32 tensor from raw `SafeTensors` data.
///
/// # Errors
///
/// Returns an error if the offsets are out of bounds, the byte count is not
/// a multiple of 4, or the dtype is not F32.
pub fn extract_tensor(raw_data: &[u8], tensor_meta: &TensorMetadata) -> Result<Vec<f32>> {
    let [start, end] = tensor_meta.data_offsets;

    if end > raw_data.len() {
        return Err(SimfinError::FormatError(format!(
            "invalid data offset: end={end} exceeds data size={}",
            raw_data.len()
        )));
    }
    if start > end {
        return Err(SimfinError::FormatError(format!(
            "invalid data offset: start={start} > end={end}"
        )));
    }
    if tensor_meta.dtype != "F32" {
        return Err(SimfinError::FormatError(format!(
            "unsupported dtype: {}. Supported: F32",
            tensor_meta.dtype
        )));
    }

    let tensor_bytes = &raw_data[start..end];
    if tensor_bytes.len() % 4 != 0 {
        return Err(SimfinError::FormatError(format!(
            "invalid F32 tensor data: size {} is not a multiple of 4 bytes",
            tensor_bytes.len()
        )));
    }

    Ok(tensor_bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
#[path = "safetensors_tests.rs"]
mod tests;
