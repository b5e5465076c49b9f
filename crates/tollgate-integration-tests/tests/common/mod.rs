//! Shared harness for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tollgate_approval::PolicyEngine;
use tollgate_config::Config;
use tollgate_core::{Clock, ManualClock, SessionId, Timestamp};
use tollgate_events::{FilterSubscriber, PolicyEvent};
use tollgate_runtime::ApprovalRuntime;
use tollgate_storage::{KvStore, MemoryKvStore};

/// Fixed start instant for every harness clock.
pub const T0: i64 = 1_700_000_000;

pub const HOUR: Duration = Duration::from_secs(3_600);
pub const MINUTE: Duration = Duration::from_secs(60);

/// A runtime over an in-memory store, driven by a manual clock, with every
/// published event recorded.
pub struct Harness {
    pub runtime: ApprovalRuntime,
    pub clock: Arc<ManualClock>,
    pub kv: Arc<dyn KvStore>,
    events: Arc<Mutex<Vec<PolicyEvent>>>,
}

impl Harness {
    /// Sweeper disabled; tests drive expiry through the engine.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.sweeper.enabled = false;
        Self::with(config, Arc::new(MemoryKvStore::new()))
    }

    pub fn with(config: Config, kv: Arc<dyn KvStore>) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_epoch_secs(T0).unwrap()));
        let runtime = ApprovalRuntime::start_with_clock(
            &config,
            Arc::clone(&kv),
            Some(Arc::clone(&clock) as Arc<dyn Clock>),
        )
        .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        runtime
            .bridge()
            .subscribe(Arc::new(FilterSubscriber::new(
                "recorder",
                move |event: &PolicyEvent| sink.lock().unwrap().push(event.clone()),
            )));

        Self {
            runtime,
            clock,
            kv,
            events,
        }
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        self.runtime.engine()
    }

    pub async fn paired(&self, name: &str) -> SessionId {
        let id = SessionId::new(name);
        self.engine().register_session(&id).await.unwrap();
        id
    }

    pub fn events(&self) -> Vec<PolicyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(PolicyEvent::event_type)
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}
