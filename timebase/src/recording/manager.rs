//! Recording file manager.
//!
//! Handles listing, metadata extraction, renaming and deletion of stream
//! files in the recordings directory.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use timebase_core::{scan, PacketLayout};

use crate::config::get_project_dirs;

/// File extension of packet stream recordings
pub const EXTENSION: &str = "tbs";

/// Get the default recordings directory path
pub fn recordings_dir() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.data_dir().join("recordings"))
        .unwrap_or_else(|| PathBuf::from("./recordings"))
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to {action} {filename}")]
    Io {
        action: &'static str,
        filename: String,
        #[source]
        source: io::Error,
    },
}

/// Information about a recording file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    /// Filename (without path)
    pub filename: String,
    /// Full path to the file
    #[serde(skip_serializing)]
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Number of complete packets
    pub packets: u64,
    /// Seconds between first and last packet
    pub duration_seconds: f32,
    pub first_timestamp: Option<f32>,
    /// Bytes of an incomplete final packet, if any
    pub tail_bytes: u64,
    /// File modification time (Unix timestamp ms)
    pub modified_ms: u64,
}

/// Manager for recording files
pub struct RecordingManager {
    base_dir: PathBuf,
    layout: PacketLayout,
}

impl RecordingManager {
    /// Create a manager over the default recordings directory
    pub fn new(layout: PacketLayout) -> Self {
        Self::with_base_dir(recordings_dir(), layout)
    }

    /// Create with a custom base directory
    pub fn with_base_dir(base_dir: PathBuf, layout: PacketLayout) -> Self {
        if let Err(e) = fs::create_dir_all(&base_dir) {
            error!("Failed to create recordings directory: {}", e);
        } else {
            debug!("Recordings directory: {}", base_dir.display());
        }
        // Canonical so the containment check compares like with like
        let base_dir = base_dir.canonicalize().unwrap_or(base_dir);
        Self { base_dir, layout }
    }

    /// Get the base directory path
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// List all recordings, newest first
    pub fn list_recordings(&self) -> Vec<RecordingInfo> {
        let mut recordings = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == EXTENSION) {
                    if let Some(info) = self.get_recording_info(&path) {
                        recordings.push(info);
                    }
                }
            }
        }

        recordings.sort_by(|a, b| {
            b.modified_ms
                .cmp(&a.modified_ms)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        recordings
    }

    /// Summarise a stream file; `None` if it can't be read
    pub fn get_recording_info(&self, path: &Path) -> Option<RecordingInfo> {
        let filename = path.file_name()?.to_str()?.to_string();

        let metadata = fs::metadata(path).ok()?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let summary = match scan(path, self.layout) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return None;
            }
        };

        Some(RecordingInfo {
            filename,
            path: path.to_path_buf(),
            size: metadata.len(),
            packets: summary.packets,
            duration_seconds: summary.duration(),
            first_timestamp: summary.first_timestamp,
            tail_bytes: summary.tail_bytes,
            modified_ms,
        })
    }

    /// Get recording by filename
    pub fn get_recording(&self, filename: &str) -> Option<RecordingInfo> {
        let path = self.get_recording_path(filename);
        if path.is_file() && self.is_safe_path(&path) {
            self.get_recording_info(&path)
        } else {
            None
        }
    }

    /// Get full path for a recording
    pub fn get_recording_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// Delete a recording
    pub fn delete_recording(&self, filename: &str) -> Result<(), ManagerError> {
        let path = self.get_recording_path(filename);

        if !path.exists() {
            return Err(ManagerError::NotFound(filename.to_string()));
        }
        if !self.is_safe_path(&path) {
            return Err(ManagerError::InvalidPath(filename.to_string()));
        }

        fs::remove_file(&path).map_err(|source| ManagerError::Io {
            action: "delete",
            filename: filename.to_string(),
            source,
        })?;
        info!("Deleted recording: {}", path.display());
        Ok(())
    }

    /// Rename a recording, adding the extension if missing
    pub fn rename_recording(&self, filename: &str, new_filename: &str) -> Result<(), ManagerError> {
        let new_filename = with_extension(new_filename);

        let old_path = self.get_recording_path(filename);
        let new_path = self.get_recording_path(&new_filename);

        if !old_path.exists() {
            return Err(ManagerError::NotFound(filename.to_string()));
        }
        if new_path.exists() {
            return Err(ManagerError::AlreadyExists(new_filename));
        }
        if !self.is_safe_path(&old_path) {
            return Err(ManagerError::InvalidPath(filename.to_string()));
        }
        if !self.is_safe_path(&new_path) {
            return Err(ManagerError::InvalidPath(new_filename));
        }

        fs::rename(&old_path, &new_path).map_err(|source| ManagerError::Io {
            action: "rename",
            filename: filename.to_string(),
            source,
        })?;
        info!(
            "Renamed recording: {} -> {}",
            old_path.display(),
            new_path.display()
        );
        Ok(())
    }

    /// Generate a unique filename for a new recording
    pub fn generate_filename(&self, prefix: Option<&str>) -> String {
        let now = chrono::Utc::now();
        let prefix = prefix.unwrap_or("recording");
        let base_name = format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"));

        let mut name = format!("{}.{}", base_name, EXTENSION);
        let mut counter = 1;
        while self.base_dir.join(&name).exists() {
            name = format!("{}_{}.{}", base_name, counter, EXTENSION);
            counter += 1;
        }

        name
    }

    /// Check if a path is safely within our base directory
    fn is_safe_path(&self, path: &Path) -> bool {
        match path.canonicalize() {
            Ok(canonical) => canonical.starts_with(&self.base_dir),
            Err(_) => {
                // Path doesn't exist yet, check parent
                path.parent()
                    .and_then(|parent| parent.canonicalize().ok())
                    .is_some_and(|parent| parent.starts_with(&self.base_dir))
            }
        }
    }
}

impl Default for RecordingManager {
    fn default() -> Self {
        Self::new(PacketLayout::default())
    }
}

fn with_extension(filename: &str) -> String {
    let suffix = format!(".{}", EXTENSION);
    if filename.ends_with(&suffix) {
        filename.to_string()
    } else {
        format!("{}{}", filename, suffix)
    }
}
