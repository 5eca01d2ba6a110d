//! Core VFS types.
//!
//! These are the JSON-facing shapes returned by `scandir`, `fileinfo` and
//! `find`, plus the operation vocabulary the authorization pipeline and the
//! dispatcher share.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use strum::{AsRefStr, Display, EnumString};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Dir,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Dir)
    }
}

/// Metadata for one entry, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Entry name (last path component).
    pub filename: String,
    /// Full virtual path, `protocol://relative/path`.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// MIME type guessed from the extension; `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Last modification time, unix millis.
    pub mtime: u64,
}

impl FileInfo {
    /// Describe a regular file.
    pub fn file(filename: impl Into<String>, path: impl Into<String>, size: u64, mtime: u64) -> Self {
        let filename = filename.into();
        let mime = Some(mime_for(&filename).to_string());
        Self {
            filename,
            path: path.into(),
            kind: FileType::File,
            size,
            mime,
            mtime,
        }
    }

    /// Describe a directory.
    pub fn dir(filename: impl Into<String>, path: impl Into<String>, mtime: u64) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            kind: FileType::Dir,
            size: 0,
            mime: None,
            mtime,
        }
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// A file delivered by the `upload` operation.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Target name inside the destination directory.
    pub filename: String,
    pub data: Vec<u8>,
}

/// Convert a `SystemTime` into unix millis, clamping pre-epoch times to 0.
pub fn millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The VFS operation set.
///
/// Parsed from the endpoint name (`/FS/<op>`). `unlink` is accepted as an
/// older spelling of `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum VfsOp {
    Exists,
    Read,
    Write,
    Mkdir,
    Move,
    Copy,
    #[strum(to_string = "delete", serialize = "unlink")]
    Delete,
    Scandir,
    Fileinfo,
    Upload,
    Find,
    #[strum(to_string = "freespace", serialize = "free_space")]
    FreeSpace,
}

impl VfsOp {
    /// Operations refused on read-only mounts.
    pub const MUTATING: [VfsOp; 6] = [
        VfsOp::Upload,
        VfsOp::Write,
        VfsOp::Delete,
        VfsOp::Copy,
        VfsOp::Move,
        VfsOp::Mkdir,
    ];

    pub fn is_mutating(&self) -> bool {
        Self::MUTATING.contains(self)
    }
}

/// Guess a MIME type from a file name's extension.
pub fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" | "md" | "log" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
