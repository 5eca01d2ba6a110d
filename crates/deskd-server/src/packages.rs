//! Package APIs shipped with the server.

use async_trait::async_trait;
use serde_json::Value;

use deskd_kernel::{CoreError, CoreResult, PackageApi, RequestContext};

/// Path of the settings application.
pub const SETTINGS_PACKAGE: &str = "default/Settings";

/// Server half of `default/Settings`.
///
/// `test` echoes `"test"` and is used as a liveness probe.
#[derive(Debug, Default)]
pub struct SettingsPackage;

#[async_trait]
impl PackageApi for SettingsPackage {
    async fn call(&self, _ctx: &RequestContext, method: &str, _args: Value) -> CoreResult<Value> {
        match method {
            "test" => Ok(Value::String("test".to_string())),
            other => Err(CoreError::invalid_argument(format!(
                "{} has no method {}",
                SETTINGS_PACKAGE, other
            ))),
        }
    }
}
