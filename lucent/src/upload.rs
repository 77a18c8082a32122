//! Upload policy checks a transport layer runs before handing files to a batch.

use thiserror::Error;

use crate::batch::UploadedFile;
use crate::config::UploadPolicy;
use crate::session::validate_entry_name;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("No files were uploaded")]
    Empty,

    #[error("'{name}' is not a plain file name")]
    InvalidName { name: String },

    #[error("'{name}' has an unsupported extension (allowed: {allowed})")]
    UnsupportedExtension { name: String, allowed: String },

    #[error("Upload of {size} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },
}

impl UploadPolicy {
    /// Checks names, extensions and the total payload size of one request.
    pub fn validate(&self, files: &[UploadedFile]) -> Result<(), UploadError> {
        if files.is_empty() {
            return Err(UploadError::Empty);
        }

        let allowed: Vec<&str> = self.allowed_extensions.iter().map(String::as_str).collect();
        for file in files {
            if validate_entry_name(&file.name).is_err() {
                return Err(UploadError::InvalidName {
                    name: file.name.clone(),
                });
            }
            if !common::file_utils::has_extension(&file.name, &allowed) {
                return Err(UploadError::UnsupportedExtension {
                    name: file.name.clone(),
                    allowed: allowed.join(", "),
                });
            }
        }

        let size: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
        if size > self.max_payload_bytes {
            tracing::warn!(
                size,
                max = self.max_payload_bytes,
                "Upload rejected: payload too large"
            );
            return Err(UploadError::PayloadTooLarge {
                size,
                max: self.max_payload_bytes,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: usize) -> UploadedFile {
        UploadedFile::new(name, vec![0; size])
    }

    #[test]
    fn test_accepts_allowed_files() {
        let policy = UploadPolicy::default();
        let files = vec![file("a.png", 10), file("b.JPG", 10), file("c.jpeg", 10)];
        assert_eq!(policy.validate(&files), Ok(()));
    }

    #[test]
    fn test_rejects_empty_upload() {
        assert_eq!(UploadPolicy::default().validate(&[]), Err(UploadError::Empty));
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let err = UploadPolicy::default()
            .validate(&[file("a.png", 1), file("notes.txt", 1)])
            .unwrap_err();
        assert!(
            matches!(err, UploadError::UnsupportedExtension { ref name, .. } if name == "notes.txt")
        );
        assert!(err.to_string().contains("png, jpg, jpeg"));
    }

    #[test]
    fn test_rejects_path_names() {
        let err = UploadPolicy::default()
            .validate(&[file("../a.png", 1)])
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidName { .. }));
    }

    #[test]
    fn test_payload_limit_is_total() {
        let policy = UploadPolicy {
            max_payload_bytes: 100,
            ..Default::default()
        };
        assert!(policy.validate(&[file("a.png", 60), file("b.png", 40)]).is_ok());
        assert_eq!(
            policy.validate(&[file("a.png", 60), file("b.png", 41)]),
            Err(UploadError::PayloadTooLarge { size: 101, max: 100 })
        );
    }
}
