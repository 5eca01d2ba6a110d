//! API methods.
//!
//! Every `POST /API/<name>` call is looked up in the [`ApiTable`], a
//! name → [`ApiMethod`] map fixed at boot. Old-style callback handlers are
//! wrapped by [`LegacyMethod`] so nothing downstream sees their shape.

mod builtin;
mod legacy;
mod table;

pub use builtin::{
    register_builtins, ApplicationMethod, LoginMethod, LogoutMethod, PackagesMethod,
    SettingsMethod,
};
pub use legacy::{LegacyCallback, LegacyFn, LegacyMethod};
pub use table::{ApiMethod, ApiTable};
