use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Prefix every stored document key starts with.
pub const UPLOAD_PREFIX: &str = "documents/";

/// File as received from the applicant, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Reference kept on the record once an upload has been accepted and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub storage_key: String,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document {0} not found")]
    Missing(String),
}

/// File-storage backend receiving validated uploads.
pub trait DocumentStorage: Send + Sync {
    fn save(&self, upload: &UploadedFile) -> Result<StoredDocument, StorageError>;
    fn delete(&self, storage_key: &str) -> Result<(), StorageError>;
}

static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Final path component of an uploaded name, with separators from either platform removed.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

fn next_storage_key(file_name: &str) -> String {
    let sequence = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{UPLOAD_PREFIX}{sequence:08}-{file_name}")
}

fn describe(upload: &UploadedFile) -> StoredDocument {
    let file_name = sanitize_file_name(&upload.file_name);
    let content_type = mime_guess::from_path(&file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    StoredDocument {
        storage_key: next_storage_key(&file_name),
        file_name,
        size: upload.size(),
        content_type,
    }
}

/// Keeps uploads in memory; used by tests and throwaway deployments.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDocumentStorage {
    pub fn contains(&self, storage_key: &str) -> bool {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .contains_key(storage_key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("storage mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStorage for InMemoryDocumentStorage {
    fn save(&self, upload: &UploadedFile) -> Result<StoredDocument, StorageError> {
        let document = describe(upload);
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(document.storage_key.clone(), upload.bytes.clone());
        Ok(document)
    }

    fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .remove(storage_key)
            .map(|_| ())
            .ok_or_else(|| StorageError::Missing(storage_key.to_string()))
    }
}

/// Writes uploads under a media root, e.g. `media/documents/00000001-t4.pdf`.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentStorage {
    media_root: PathBuf,
}

impl FilesystemDocumentStorage {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    fn path_for(&self, storage_key: &str) -> PathBuf {
        self.media_root.join(storage_key)
    }
}

impl DocumentStorage for FilesystemDocumentStorage {
    fn save(&self, upload: &UploadedFile) -> Result<StoredDocument, StorageError> {
        let document = describe(upload);
        let path = self.path_for(&document.storage_key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StorageError::Unavailable(format!("{}: {err}", parent.display())))?;
        }
        fs::write(&path, &upload.bytes)
            .map_err(|err| StorageError::Unavailable(format!("{}: {err}", path.display())))?;
        Ok(document)
    }

    fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        let path = self.path_for(storage_key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::Missing(storage_key.to_string()))
            }
            Err(err) => Err(StorageError::Unavailable(format!(
                "{}: {err}",
                path.display()
            ))),
        }
    }
}
