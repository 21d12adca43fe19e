use sanctum_core::config::FilesConfig;

use crate::error::{FileError, FileResult};
use crate::metadata::FileInput;

/// Lowercase the MIME type and strip any `; param=…` suffix.
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Upload policy: size ceiling plus MIME allow-list.
#[derive(Debug, Clone)]
pub struct FilePolicy {
    max_file_bytes: u64,
    allowed: Vec<String>,
}

impl FilePolicy {
    pub fn from_config(cfg: &FilesConfig) -> Self {
        Self {
            max_file_bytes: cfg.max_file_bytes,
            allowed: cfg.allowed_mime_types.iter().map(|m| normalize_mime(m)).collect(),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn is_allowed(&self, mime: &str) -> bool {
        let mime = normalize_mime(mime);
        let top = mime.split('/').next().unwrap_or("");
        self.allowed.iter().any(|entry| match entry.strip_suffix("/*") {
            Some(prefix) => prefix == top && mime.len() > top.len() + 1,
            None => *entry == mime,
        })
    }

    pub fn validate(&self, file: &FileInput) -> FileResult<()> {
        let size = file.size();
        if size > self.max_file_bytes {
            return Err(FileError::FileTooLarge {
                size,
                max: self.max_file_bytes,
            });
        }
        if !self.is_allowed(&file.mime_type) {
            return Err(FileError::UnsupportedFileType(file.mime_type.clone()));
        }
        Ok(())
    }
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self::from_config(&FilesConfig::default())
    }
}
