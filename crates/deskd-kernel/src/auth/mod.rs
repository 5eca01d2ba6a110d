//! Authentication and authorization.
//!
//! [`Authenticator`] implementations handle login/logout and session
//! validity. [`authorize`] is the pipeline every request passes before
//! it reaches a transport, an API method or a package.

mod authenticator;
mod pipeline;

pub use authenticator::{Authenticator, Credentials, DemoAuthenticator, StaticAuthenticator};
pub use pipeline::{authorize, AuthRequest, Stage, LOGIN_METHOD};
