//! Wiring of store, engine, bridge and sweeper.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tollgate_approval::{ApprovalStore, EngineConfig, ExpirySweeper, PolicyEngine};
use tollgate_config::Config;
use tollgate_core::Clock;
use tollgate_events::NotificationBridge;
use tollgate_storage::{KvStore, MemoryKvStore, ScopedKvStore};
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Engine tunables from the `[policy]` section.
#[must_use]
pub fn engine_config(config: &Config) -> EngineConfig {
    EngineConfig {
        default_window: config.policy.timed_window(),
        max_window: config.policy.max_window(),
        notify_on_auto_approve: config.policy.notify_on_auto_approve,
    }
}

/// Open the KV backend selected by `[storage]`: SurrealKV at `path` when set,
/// memory otherwise.
///
/// # Errors
///
/// Fails if the durable store cannot be opened, or `path` is set in a build
/// without the `kv` feature.
pub fn open_kv(config: &Config) -> RuntimeResult<Arc<dyn KvStore>> {
    match &config.storage.path {
        None => {
            warn!("no storage.path configured, approval records will not survive a restart");
            Ok(Arc::new(MemoryKvStore::new()))
        },
        #[cfg(feature = "kv")]
        Some(path) => {
            let store = tollgate_storage::SurrealKvStore::open(path)?;
            info!(path = %path.display(), "opened durable approval store");
            Ok(Arc::new(store))
        },
        #[cfg(not(feature = "kv"))]
        Some(path) => Err(RuntimeError::DurableStorageUnavailable(
            path.display().to_string(),
        )),
    }
}

/// A running approval engine with its background sweeper.
pub struct ApprovalRuntime {
    engine: Arc<PolicyEngine>,
    cancel: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ApprovalRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRuntime")
            .field("engine", &self.engine)
            .field("sweeper_running", &self.sweeper.is_some())
            .finish()
    }
}

impl ApprovalRuntime {
    /// Build the engine over `kv` and start the sweeper if enabled.
    ///
    /// # Errors
    ///
    /// Fails if the namespace is invalid, or if the sweeper is enabled and
    /// no Tokio runtime is running.
    pub fn start(config: &Config, kv: Arc<dyn KvStore>) -> RuntimeResult<Self> {
        Self::start_with_clock(config, kv, None)
    }

    /// [`start`](Self::start) with an explicit time source.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start).
    pub fn start_with_clock(
        config: &Config,
        kv: Arc<dyn KvStore>,
        clock: Option<Arc<dyn Clock>>,
    ) -> RuntimeResult<Self> {
        let scoped = ScopedKvStore::new(kv, config.storage.namespace.clone())?;
        let store = ApprovalStore::with_io_timeout(scoped, config.storage.io_timeout());
        let bridge = NotificationBridge::with_capacity(config.events.channel_capacity);

        let mut engine = PolicyEngine::new(store, bridge, engine_config(config));
        if let Some(clock) = clock {
            engine = engine.with_clock(clock);
        }
        let engine = Arc::new(engine);

        let cancel = CancellationToken::new();
        let sweeper = if config.sweeper.enabled {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(RuntimeError::NoRuntime);
            }
            let sweeper = ExpirySweeper::new(Arc::clone(&engine), config.sweeper.interval());
            Some(sweeper.spawn(cancel.clone()))
        } else {
            info!("expiry sweeper disabled, expiry is enforced on evaluation only");
            None
        };

        info!(
            namespace = %config.storage.namespace,
            timed_window_secs = config.policy.timed_window_secs,
            "approval runtime started"
        );

        Ok(Self {
            engine,
            cancel,
            sweeper,
        })
    }

    /// Open the configured backend and start.
    ///
    /// # Errors
    ///
    /// As for [`open_kv`] and [`start`](Self::start).
    pub fn open(config: &Config) -> RuntimeResult<Self> {
        Self::start(config, open_kv(config)?)
    }

    /// The policy engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// The bridge policy events are published on.
    #[must_use]
    pub fn bridge(&self) -> &NotificationBridge {
        self.engine.bridge()
    }

    /// Whether the background sweeper was started.
    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweeper and wait for it. Windows it already finalized stay
    /// finalized.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SweeperFailed`] if the sweeper task panicked.
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        self.cancel.cancel();
        if let Some(handle) = self.sweeper.take() {
            handle
                .await
                .map_err(|e| RuntimeError::SweeperFailed(e.to_string()))?;
        }
        info!("approval runtime stopped");
        Ok(())
    }
}

impl Drop for ApprovalRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
