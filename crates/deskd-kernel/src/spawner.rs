//! Package helper processes.
//!
//! Spawners are started once at boot and killed at shutdown. A spawner
//! that exits on its own is not restarted.

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::packages::SpawnerConfig;

struct Spawned {
    package: String,
    child: Child,
}

/// Children started for packages.
#[derive(Default)]
pub struct SpawnerSet {
    children: Mutex<Vec<Spawned>>,
}

impl std::fmt::Debug for SpawnerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnerSet")
            .field("children", &self.len())
            .finish()
    }
}

impl SpawnerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `config` for `package` and track the child.
    pub fn spawn(&self, package: &str, config: &SpawnerConfig) -> std::io::Result<Option<u32>> {
        let child = Command::new(&config.command)
            .args(&config.args)
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id();
        info!(package, command = %config.command, ?pid, "spawner started");

        self.children.lock().push(Spawned {
            package: package.to_string(),
            child,
        });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill every tracked child and wait for it to exit.
    pub async fn shutdown(&self) {
        let children = std::mem::take(&mut *self.children.lock());
        for mut spawned in children {
            if let Err(e) = spawned.child.kill().await {
                warn!(package = %spawned.package, error = %e, "failed to kill spawner");
            } else {
                info!(package = %spawned.package, "spawner stopped");
            }
        }
    }
}
