//! Virtual filesystem.
//!
//! Client paths look like `protocol://relative/path`. Key components:
//!
//! - [`VirtualPath`] - parsed `protocol://path` pair
//! - [`MountTable`] - protocol to mount lookup, default protocol, enabled flag
//! - [`TransportRegistry`] - routes operations to the owning [`Transport`]
//! - [`LocalTransport`] - directory on disk, optionally per user
//! - [`MemoryTransport`] - ephemeral in-memory tree
//!
//! Resolution never touches the host filesystem. Mapping a relative path
//! to real storage is each transport's job.

pub mod backends;
mod error;
mod mount;
mod path;
mod registry;
mod transport;
mod types;

pub use backends::{LocalTransport, MemoryTransport};
pub use error::{VfsError, VfsResult};
pub use mount::{Mount, MountTable, Resolved};
pub use path::{join, VirtualPath, SEPARATOR};
pub use registry::TransportRegistry;
pub use transport::{OpContext, Transport};
pub use types::{mime_for, millis, FileInfo, FileType, UploadFile, VfsOp};
