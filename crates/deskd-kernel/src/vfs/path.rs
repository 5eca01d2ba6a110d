//! Virtual path parsing.
//!
//! A virtual path is `protocol://relative/path`. Parsing only splits on the
//! first `://`; assigning the default protocol to bare paths is policy and
//! happens in [`MountTable::resolve`](super::MountTable::resolve).

use std::fmt;

/// Separator between protocol and path.
pub const SEPARATOR: &str = "://";

/// A parsed `protocol://path` pair.
///
/// The path keeps whatever the caller wrote after the separator, so
/// `home:///a/b.txt` parses to protocol `home` and path `/a/b.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    pub protocol: String,
    pub path: String,
}

impl VirtualPath {
    pub fn new(protocol: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            path: path.into(),
        }
    }

    /// Split `input` on its first `://`.
    ///
    /// Returns `(Some(protocol), path)` when a separator is present and
    /// `(None, input)` when it is not.
    pub fn split(input: &str) -> (Option<&str>, &str) {
        match input.split_once(SEPARATOR) {
            Some((protocol, path)) => (Some(protocol), path),
            None => (None, input),
        }
    }

    /// Parse `input`, using `default_protocol` when it has no scheme.
    pub fn parse(input: &str, default_protocol: &str) -> Self {
        let (protocol, path) = Self::split(input);
        Self::new(protocol.unwrap_or(default_protocol), path)
    }

    /// Join a child name onto this path.
    pub fn join(&self, name: &str) -> Self {
        Self::new(self.protocol.clone(), join(&self.path, name))
    }

    /// Last path component, or empty for the root.
    pub fn filename(&self) -> &str {
        self.path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.protocol, SEPARATOR, self.path)
    }
}

/// Join a relative path and a child name with exactly one `/`.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
