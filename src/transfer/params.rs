use std::path::PathBuf;

use derive_builder::Builder;

use crate::core::Hash;
use crate::resume::ResumeData;

/// Everything needed to add a transfer to a session
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct AddTransferParams {
    /// Content hash of the file
    pub hash: Hash,
    /// Size of the file in bytes
    pub size: u64,
    pub file_path: PathBuf,
    #[builder(default)]
    pub paused: bool,
    /// Piece hashes, when already known
    #[builder(default)]
    pub hash_set: Vec<Hash>,
    #[builder(default, setter(strip_option))]
    pub resume_data: Option<ResumeData>,
}

impl AddTransferParams {
    pub fn builder() -> AddTransferParamsBuilder {
        AddTransferParamsBuilder::default()
    }

    /// Parameters restoring a transfer from its resume data
    pub fn from_resume_data(resume_data: ResumeData, file_path: impl Into<PathBuf>) -> Self {
        Self {
            hash: resume_data.hash,
            size: resume_data.size,
            file_path: file_path.into(),
            paused: false,
            hash_set: resume_data.hash_set.clone(),
            resume_data: Some(resume_data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_defaults() {
        let params = AddTransferParams::builder()
            .hash(Hash::digest(b"foo"))
            .size(1024u64)
            .file_path("/tmp/foo")
            .build()
            .unwrap();

        assert_eq!(params.size, 1024);
        assert_eq!(params.file_path, PathBuf::from("/tmp/foo"));
        assert!(!params.paused);
        assert!(params.hash_set.is_empty());
        assert!(params.resume_data.is_none());
    }

    #[test]
    fn missing_hash() {
        let result = AddTransferParams::builder()
            .size(1024u64)
            .file_path("/tmp/foo")
            .build();

        assert!(result.is_err());
    }
}
