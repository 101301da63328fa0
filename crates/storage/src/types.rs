//! Value types shared by storage implementations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Mime type reported for directories.
pub const DIRECTORY_MIME_TYPE: &str = "httpd/unix-directory";

/// Kind of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// Result of a stat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
    /// Entry kind.
    pub kind: FileKind,
}

impl FileStat {
    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Whether the entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// Permission bitmask of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Permissions(u32);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const READ: Permissions = Permissions(1);
    pub const UPDATE: Permissions = Permissions(2);
    pub const CREATE: Permissions = Permissions(4);
    pub const DELETE: Permissions = Permissions(8);
    pub const SHARE: Permissions = Permissions(16);
    pub const ALL: Permissions = Permissions(31);

    /// Raw bitmask value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy of this mask with every bit of `other` cleared.
    pub fn without(&self, other: Permissions) -> Permissions {
        Permissions(self.0 & !other.0)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

/// Everything a storage knows about one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub stat: FileStat,
    pub mime_type: String,
    pub etag: String,
    pub permissions: Permissions,
}

/// Supported content hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "sha256")]
    Sha256,
}

impl HashAlgorithm {
    /// Get the string representation of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mode a file stream is opened with, mirroring fopen mode strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// "r": read only, file must exist.
    Read,
    /// "r+": read and write, file must exist.
    ReadWrite,
    /// "w": write only, truncate or create.
    Write,
    /// "w+": read and write, truncate or create.
    WriteRead,
    /// "a": append, create if missing.
    Append,
}

impl OpenMode {
    /// Whether this is one of the "r" modes.
    ///
    /// Read modes open an existing file and never create one.
    pub fn is_read(&self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    /// Whether a stream opened with this mode accepts writes.
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    /// fopen-style mode string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::Write => "w",
            OpenMode::WriteRead => "w+",
            OpenMode::Append => "a",
        }
    }
}

impl FromStr for OpenMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Binary and text flags don't change semantics here
        let mode: String = s.chars().filter(|c| *c != 'b' && *c != 't').collect();
        match mode.as_str() {
            "r" => Ok(OpenMode::Read),
            "r+" => Ok(OpenMode::ReadWrite),
            "w" => Ok(OpenMode::Write),
            "w+" => Ok(OpenMode::WriteRead),
            "a" | "a+" => Ok(OpenMode::Append),
            _ => Err(StorageError::InvalidArgument(format!(
                "unsupported open mode: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of a path lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    Shared,
    Exclusive,
}

/// Guess a mime type from a path's extension.
///
/// # Arguments
/// * `path` - Storage path of a regular file
pub fn mime_type_for(path: &str) -> &'static str {
    let extension: String = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
