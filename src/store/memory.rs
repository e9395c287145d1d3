//! In-memory store implementations.
//!
//! Reference implementations of the store contracts, backed by mutex-guarded
//! maps. These carry the default conflict policy (mutual exclusion unless two
//! ids are explicitly marked compatible) and are what the integration tests
//! run against.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::Settings;
use crate::control::types::{AppMapping, ConfigId, TunnelConfig};
use crate::store::{ConfigStore, MappingChange, MappingStore, Page, PageToken, StoreError};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_PAGE_SIZE: usize = 30;

fn pair(a: ConfigId, b: ConfigId) -> (ConfigId, ConfigId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// In-memory table of tunnel configurations.
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<ConfigId, TunnelConfig>>,
    /// Unordered pairs of ids allowed to be active together
    compatible: Mutex<HashSet<(ConfigId, ConfigId)>>,
    tx: broadcast::Sender<ConfigId>,
}

impl MemoryConfigStore {
    /// Create an empty store with the default notification capacity.
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with an explicit notification buffer size.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        MemoryConfigStore {
            configs: Mutex::new(HashMap::new()),
            compatible: Mutex::new(HashSet::new()),
            tx,
        }
    }

    /// Create an empty store tuned per crate settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_channel_capacity(settings.notify.channel_capacity)
    }

    /// Insert or replace a configuration row. This is the external
    /// import/editor flow; the control plane itself never creates rows.
    pub fn insert(&self, config: TunnelConfig) {
        let id = config.id;
        self.configs.lock().unwrap().insert(id, config);
        let _ = self.tx.send(id);
    }

    /// Mark two configurations as allowed to be active at the same time.
    /// Without this, activation is mutually exclusive.
    pub fn mark_compatible(&self, a: ConfigId, b: ConfigId) {
        self.compatible.lock().unwrap().insert(pair(a, b));
    }

    /// Number of configuration rows.
    pub fn len(&self) -> usize {
        self.configs.lock().unwrap().len()
    }

    /// Whether the store holds no configurations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, id: ConfigId) -> Result<Option<TunnelConfig>, StoreError> {
        Ok(self.configs.lock().unwrap().get(&id).cloned())
    }

    async fn set_active(&self, id: ConfigId, active: bool) -> Result<(), StoreError> {
        {
            let mut configs = self.configs.lock().unwrap();
            let config = configs
                .get_mut(&id)
                .ok_or_else(|| StoreError::Backend(format!("no such config row: {id}")))?;
            config.is_active = active;
        }
        debug!(config_id = %id, active, "config row committed");
        let _ = self.tx.send(id);
        Ok(())
    }

    async fn active_configs(&self) -> Result<Vec<TunnelConfig>, StoreError> {
        let mut active: Vec<TunnelConfig> = self
            .configs
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }

    fn conflicts_with(&self, candidate: &TunnelConfig, active: &[TunnelConfig]) -> bool {
        let compatible = self.compatible.lock().unwrap();
        active
            .iter()
            .filter(|c| c.id != candidate.id)
            .any(|c| !compatible.contains(&pair(candidate.id, c.id)))
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigId> {
        self.tx.subscribe()
    }
}

/// In-memory table of app-to-configuration mappings, keyed by app id so each
/// application holds at most one routing target.
pub struct MemoryMappingStore {
    rows: Mutex<BTreeMap<String, AppMapping>>,
    page_size: usize,
    case_insensitive: bool,
    tx: broadcast::Sender<MappingChange>,
}

impl MemoryMappingStore {
    /// Create an empty store with the default page size and a
    /// case-insensitive filter policy.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_PAGE_SIZE, true, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with explicit pagination and filter policy.
    pub fn with_options(page_size: usize, case_insensitive: bool, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        MemoryMappingStore {
            rows: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            case_insensitive,
            tx,
        }
    }

    /// Create an empty store with pagination, filter policy and notification
    /// buffer taken from crate settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_options(
            settings.query.page_size,
            settings.query.case_insensitive_filter,
            settings.notify.channel_capacity,
        )
    }

    /// Insert or replace the mapping for an application. This is the
    /// external assignment flow.
    pub fn upsert(&self, mapping: AppMapping) {
        let mut affected = vec![mapping.config_id];
        let previous = self
            .rows
            .lock()
            .unwrap()
            .insert(mapping.app_id.clone(), mapping);
        if let Some(old) = previous {
            if !affected.contains(&old.config_id) {
                affected.push(old.config_id);
            }
        }
        let _ = self.tx.send(MappingChange { config_ids: affected });
    }

    /// Remove the mapping for an application, if any.
    pub fn remove(&self, app_id: &str) -> Option<AppMapping> {
        let removed = self.rows.lock().unwrap().remove(app_id);
        if let Some(ref mapping) = removed {
            let _ = self.tx.send(MappingChange {
                config_ids: vec![mapping.config_id],
            });
        }
        removed
    }

    /// Total number of mapping rows.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Whether the store holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, mapping: &AppMapping, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        if self.case_insensitive {
            let pattern = pattern.to_lowercase();
            mapping.app_name.to_lowercase().contains(&pattern)
                || mapping.app_id.to_lowercase().contains(&pattern)
        } else {
            mapping.app_name.contains(pattern) || mapping.app_id.contains(pattern)
        }
    }
}

impl Default for MemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn query(
        &self,
        pattern: &str,
        token: PageToken,
    ) -> Result<Page<AppMapping>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let matched: Vec<&AppMapping> =
            rows.values().filter(|m| self.matches(m, pattern)).collect();

        let offset = token.0 as usize;
        let items: Vec<AppMapping> = matched
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|m| (*m).clone())
            .collect();

        let consumed = offset + items.len();
        let next = if consumed < matched.len() {
            Some(PageToken(consumed as u64))
        } else {
            None
        };
        Ok(Page { items, next })
    }

    async fn count_by_config(&self, id: ConfigId) -> Result<u64, StoreError> {
        let count = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.config_id == id)
            .count();
        Ok(count as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<MappingChange> {
        self.tx.subscribe()
    }
}
