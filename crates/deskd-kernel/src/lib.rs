//! # deskd-kernel
//!
//! The request core of deskd: everything between "a request arrived" and
//! "a backend did something".
//!
//! - [`vfs`] resolves `protocol://path` strings against the mount table and
//!   routes file operations to transports
//! - [`auth`] runs the authorization pipeline (session → group → mount →
//!   blacklist) and defines the authenticator collaborator
//! - [`api`] holds the API method table and the built-in methods
//! - [`loader`] turns a [`DeskConfig`] into a frozen [`Instance`]

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod loader;
pub mod packages;
pub mod session;
pub mod spawner;
pub mod storage;
pub mod vfs;

pub use api::{ApiMethod, ApiTable, LegacyMethod};
pub use auth::{authorize, AuthRequest, Authenticator, Credentials, LOGIN_METHOD};
pub use config::{ConfigError, DeskConfig, MountConfig};
pub use context::RequestContext;
pub use error::{CoreError, CoreResult};
pub use instance::Instance;
pub use loader::{load, LoadError, ModuleRegistry};
pub use packages::{PackageApi, PackageManifest, PackageRegistry};
pub use session::{Session, SessionStore};
pub use storage::{Storage, StorageError};
pub use vfs::{
    FileInfo, FileType, Mount, MountTable, OpContext, Transport, TransportRegistry, UploadFile,
    VfsError, VfsOp, VfsResult, VirtualPath,
};
