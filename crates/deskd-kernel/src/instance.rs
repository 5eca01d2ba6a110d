//! The instance descriptor.
//!
//! Built once by [`load`](crate::loader::load) and shared as
//! `Arc<Instance>`. Nothing in it is replaced after boot; session contents
//! are the only per-caller state and live behind [`SessionStore`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::ApiTable;
use crate::auth::Authenticator;
use crate::config::DeskConfig;
use crate::packages::PackageRegistry;
use crate::session::SessionStore;
use crate::spawner::SpawnerSet;
use crate::storage::Storage;
use crate::vfs::{MountTable, TransportRegistry};

pub struct Instance {
    pub config: DeskConfig,
    pub authenticator: Arc<dyn Authenticator>,
    pub storage: Arc<dyn Storage>,
    pub transports: TransportRegistry,
    pub mounts: MountTable,
    pub api: ApiTable,
    pub packages: PackageRegistry,
    pub sessions: Arc<SessionStore>,
    pub(crate) spawners: SpawnerSet,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("authenticator", &self.authenticator.name())
            .field("storage", &self.storage.name())
            .field("transports", &self.transports)
            .field("mounts", &self.mounts)
            .field("api", &self.api)
            .field("packages", &self.packages)
            .field("spawners", &self.spawners)
            .finish()
    }
}

impl Instance {
    /// Number of running package spawners.
    pub fn spawner_count(&self) -> usize {
        self.spawners.len()
    }

    /// Stop spawners, then tear down the authenticator and storage.
    pub async fn shutdown(&self) {
        self.spawners.shutdown().await;
        if let Err(e) = self.authenticator.destroy().await {
            warn!(authenticator = self.authenticator.name(), error = %e, "destroy failed");
        }
        if let Err(e) = self.storage.destroy().await {
            warn!(storage = self.storage.name(), error = %e, "destroy failed");
        }
        info!("instance shut down");
    }
}
