//! Activation state machine for tunnel configurations.
//!
//! Gates and performs transitions on the active flag. The set of active
//! configurations is owned by the config store; every mutation funnels
//! through [`ActivationController::enable`] and
//! [`ActivationController::disable`], which gives the conflict invariant a
//! single choke point.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::eligibility;
use crate::control::error::{ActivationError, ActivationResult};
use crate::control::types::{ConfigId, TunnelConfig};
use crate::store::ConfigStore;

/// Controller for enabling and disabling tunnel configurations.
///
/// `can_enable` is a cheap, synchronous pre-flight over a cached snapshot of
/// the active set; `enable` is the authority and re-validates against the
/// live store under a commit lock. Callers must trust the return value of
/// `enable`, not an earlier `can_enable` answer.
pub struct ActivationController<S: ConfigStore> {
    store: Arc<S>,

    /// Snapshot of the active configurations, refreshed from store
    /// notifications and on every local commit
    active: Arc<RwLock<Vec<TunnelConfig>>>,

    /// Serializes enable/disable commits. The conflict predicate spans
    /// configuration rows, so the check and the write must not interleave
    /// with another writer's.
    commit_lock: Mutex<()>,

    refresh_task: JoinHandle<()>,
}

impl<S: ConfigStore> ActivationController<S> {
    /// Create a controller over the given store, seeding the active-set
    /// snapshot and subscribing to change notifications.
    pub async fn new(store: Arc<S>) -> ActivationResult<Self> {
        let active = Arc::new(RwLock::new(store.active_configs().await?));
        let refresh_task = Self::start_refresh_task(store.clone(), active.clone());
        Ok(ActivationController {
            store,
            active,
            commit_lock: Mutex::new(()),
            refresh_task,
        })
    }

    /// Keep the active-set snapshot in step with the store. A lagged
    /// receiver just reloads; individual ids are not replayed.
    fn start_refresh_task(
        store: Arc<S>,
        active: Arc<RwLock<Vec<TunnelConfig>>>,
    ) -> JoinHandle<()> {
        let mut rx = store.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(id) => debug!(config_id = %id, "config change notification"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "config notifications lagged, reloading snapshot");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
                match store.active_configs().await {
                    Ok(fresh) => *active.write().unwrap() = fresh,
                    Err(e) => warn!(error = %e, "failed to refresh active set"),
                }
            }
        })
    }

    /// Pre-flight eligibility check. Synchronous, side-effect-free and
    /// repeatable: the same store state yields the same answer. Evaluated
    /// against the cached active set, so the result may be one notification
    /// cycle behind the store.
    pub fn can_enable(&self, config: &TunnelConfig) -> bool {
        let active = self.active.read().unwrap();
        eligibility::can_coexist(config, &active, |c, a| self.store.conflicts_with(c, a))
    }

    /// Enable a configuration.
    ///
    /// Re-reads the config and the live active set under the commit lock and
    /// re-evaluates eligibility before writing, closing the check-then-act
    /// race against concurrent callers. Enabling an already active
    /// configuration is a no-op success.
    pub async fn enable(&self, id: ConfigId) -> ActivationResult<()> {
        let _guard = self.commit_lock.lock().await;

        let config = self
            .store
            .get(id)
            .await?
            .ok_or(ActivationError::NotFound(id))?;
        if config.is_active {
            debug!(config_id = %id, "already active, nothing to do");
            return Ok(());
        }

        let live = self.store.active_configs().await?;
        if !eligibility::can_coexist(&config, &live, |c, a| self.store.conflicts_with(c, a)) {
            info!(config_id = %id, "enable rejected, conflicts with active tunnel");
            return Err(ActivationError::Conflict(id));
        }

        self.store.set_active(id, true).await?;

        // Make the commit visible to can_enable immediately rather than a
        // notification cycle later.
        {
            let mut cached = self.active.write().unwrap();
            *cached = live;
            let mut enabled = config;
            enabled.is_active = true;
            cached.push(enabled);
            cached.sort_by_key(|c| c.id);
        }

        info!(config_id = %id, "tunnel configuration enabled");
        Ok(())
    }

    /// Disable a configuration, releasing its resource claim.
    ///
    /// Idempotent: disabling an already inactive configuration succeeds
    /// without touching the store. Fails only when the id does not exist.
    pub async fn disable(&self, id: ConfigId) -> ActivationResult<()> {
        let _guard = self.commit_lock.lock().await;

        let config = self
            .store
            .get(id)
            .await?
            .ok_or(ActivationError::NotFound(id))?;
        if !config.is_active {
            debug!(config_id = %id, "already inactive, nothing to do");
            return Ok(());
        }

        self.store.set_active(id, false).await?;
        self.active.write().unwrap().retain(|c| c.id != id);

        info!(config_id = %id, "tunnel configuration disabled");
        Ok(())
    }

    /// Current snapshot of the active configurations.
    pub fn active_snapshot(&self) -> Vec<TunnelConfig> {
        self.active.read().unwrap().clone()
    }
}

impl<S: ConfigStore> Drop for ActivationController<S> {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}
