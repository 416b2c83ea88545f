//! Runtime context threaded into C5/C6/C7, replacing the Go source's
//! process-wide `db`/`slaves`/`groups` package globals (`master/daemon.go`,
//! `master/group.go`) per spec.md §9's design note. Tests construct their
//! own isolated `Context` instead of relying on process state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{Config, GroupConfig, SlaveConfig};
use crate::db::Store;
use crate::error::MasterError;
use crate::rpc_client::SlaveClient;

pub struct Context {
    pub store: Store,
    pub slaves: HashMap<String, SlaveConfig>,
    pub groups: HashMap<String, GroupConfig>,
    /// One connection per worker, lazily dialed and reused across
    /// reconciliation ticks. `InitSlaves` (`daemon.go`) dials eagerly at
    /// startup; we keep the same eager-connect behavior in `Context::new`.
    clients: HashMap<String, Arc<Mutex<SlaveClient>>>,
}

impl Context {
    pub async fn new(config: &Config, store: Store) -> Result<Self, MasterError> {
        let groups = config
            .groups
            .iter()
            .cloned()
            .map(|g| (g.id.clone(), g))
            .collect::<HashMap<_, _>>();

        if !groups.contains_key(crate::config::DEFAULT_GROUP_ID) {
            return Err(MasterError::Fatal(
                "group 'default' is required".to_string(),
            ));
        }

        let mut clients = HashMap::new();
        for (id, slave) in &config.slaves {
            match SlaveClient::connect(slave).await {
                Ok(client) => {
                    clients.insert(id.clone(), Arc::new(Mutex::new(client)));
                }
                Err(err) => {
                    tracing::warn!(worker = %id, error = %err, "failed to dial slave at startup");
                }
            }
        }

        Ok(Self {
            store,
            slaves: config.slaves.clone(),
            groups,
            clients,
        })
    }

    pub fn default_group(&self) -> &GroupConfig {
        self.groups
            .get(crate::config::DEFAULT_GROUP_ID)
            .expect("Context::new guarantees the default group exists")
    }

    /// Returns a handle to the worker's client, reconnecting on demand if
    /// the initial dial failed or the channel has since dropped.
    pub async fn client(&mut self, worker_id: &str) -> Result<Arc<Mutex<SlaveClient>>, MasterError> {
        if let Some(client) = self.clients.get(worker_id) {
            return Ok(client.clone());
        }
        let slave = self
            .slaves
            .get(worker_id)
            .ok_or_else(|| MasterError::NotFound(format!("unknown worker {worker_id}")))?;
        let client = Arc::new(Mutex::new(SlaveClient::connect(slave).await?));
        self.clients.insert(worker_id.to_string(), client.clone());
        Ok(client)
    }
}
