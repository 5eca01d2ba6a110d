//! deskd server library
//!
//! HTTP front end and request dispatcher for deskd.

pub mod constants;
pub mod dispatch;
pub mod http;
pub mod packages;
pub mod static_files;

use std::sync::Arc;

use deskd_kernel::ModuleRegistry;

pub use dispatch::{Dispatcher, Outcome, Request, RequestState, Response, Route};
pub use http::router;
pub use packages::{SettingsPackage, SETTINGS_PACKAGE};

/// Kernel defaults plus the package APIs this server ships.
pub fn modules() -> ModuleRegistry {
    let mut modules = ModuleRegistry::with_defaults();
    modules.package_api(SETTINGS_PACKAGE, Arc::new(SettingsPackage));
    modules
}
