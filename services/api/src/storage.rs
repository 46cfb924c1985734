//! services/api/src/storage.rs
//!
//! Per-user on-disk layout:
//!
//! ```text
//! <data_dir>/users.json
//! <data_dir>/users/<username>/pdfs/<filename>.pdf
//! <data_dir>/users/<username>/vector_index/index.json
//! ```
//!
//! Snapshots and the users file are written to a temporary sibling and renamed
//! into place so a crash never leaves a half-written file behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use study_assistant_core::ports::{PortError, PortResult};
use study_assistant_core::VectorIndex;
use tokio::io::AsyncWriteExt;

const PDF_DIR: &str = "pdfs";
const INDEX_DIR: &str = "vector_index";
const INDEX_FILE: &str = "index.json";

/// Rejects names that could escape their parent directory.
fn validate_path_component(kind: &str, name: &str) -> PortResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
        return Err(PortError::Validation(format!("Invalid {kind}: '{name}'")));
    }
    Ok(())
}

pub fn validate_filename(filename: &str) -> PortResult<()> {
    validate_path_component("filename", filename)
}

pub fn validate_username(username: &str) -> PortResult<()> {
    validate_path_component("username", username)
}

pub fn is_pdf_filename(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

/// The directories owned by one user.
#[derive(Debug, Clone)]
pub struct UserPaths {
    root: PathBuf,
}

impl UserPaths {
    pub fn new(data_dir: &Path, username: &str) -> PortResult<Self> {
        validate_username(username)?;
        Ok(Self {
            root: data_dir.join("users").join(username),
        })
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join(PDF_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    pub fn index_file(&self) -> PathBuf {
        self.index_dir().join(INDEX_FILE)
    }

    pub fn pdf_path(&self, filename: &str) -> PortResult<PathBuf> {
        validate_filename(filename)?;
        Ok(self.pdf_dir().join(filename))
    }

    pub async fn ensure_dirs(&self) -> PortResult<()> {
        tokio::fs::create_dir_all(self.pdf_dir()).await.map_err(io_error)?;
        tokio::fs::create_dir_all(self.index_dir()).await.map_err(io_error)?;
        Ok(())
    }

    /// Stores an uploaded file. Fails with `Conflict` if the name is taken;
    /// the exclusive create makes the check race-free.
    pub async fn store_pdf(&self, filename: &str, data: &[u8]) -> PortResult<PathBuf> {
        let path = self.pdf_path(filename)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => PortError::Conflict(format!(
                    "File '{filename}' already exists. Delete it first or upload with a different name."
                )),
                _ => io_error(e),
            })?;

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(io_error(e));
        }
        Ok(path)
    }

    pub async fn pdf_exists(&self, filename: &str) -> PortResult<bool> {
        let path = self.pdf_path(filename)?;
        tokio::fs::try_exists(&path).await.map_err(io_error)
    }

    pub async fn remove_pdf(&self, filename: &str) -> PortResult<()> {
        let path = self.pdf_path(filename)?;
        tokio::fs::remove_file(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound("PDF not found".to_string()),
            _ => io_error(e),
        })
    }

    /// Stored PDF filenames, sorted.
    pub async fn list_pdfs(&self) -> PortResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.pdf_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            if let Some(name) = entry.file_name().to_str() {
                if is_pdf_filename(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn save_index(&self, index: &VectorIndex) -> PortResult<PathBuf> {
        let bytes = serde_json::to_vec(index).map_err(|e| PortError::Unexpected(e.to_string()))?;
        let path = self.index_file();
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Loads the persisted snapshot, if one exists.
    pub async fn load_index(&self) -> PortResult<Option<VectorIndex>> {
        let path = self.index_file();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        let index = serde_json::from_slice(&bytes).map_err(|e| {
            PortError::Unexpected(format!("Corrupt vector index at {}: {}", path.display(), e))
        })?;
        Ok(Some(index))
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it into place.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> PortResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(io_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error)
}

pub fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("I/O error: {e}"))
}
