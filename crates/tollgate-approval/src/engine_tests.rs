#![allow(clippy::arithmetic_side_effects)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tollgate_core::ManualClock;
use tollgate_events::FilterSubscriber;
use tollgate_storage::{KvStore, MemoryKvStore, ScopedKvStore, StorageError, StorageResult};

use super::*;
use crate::store::DEFAULT_NAMESPACE;

const T0: i64 = 1_700_000_000;
const HOUR: Duration = Duration::from_secs(3_600);
const MINUTE: Duration = Duration::from_secs(60);

/// KV store double with an adjustable delay and a switch that fails writes.
#[derive(Default)]
struct FlakyKv {
    inner: MemoryKvStore,
    delay: Mutex<Duration>,
    fail_writes: AtomicBool,
}

impl FlakyKv {
    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("disk unplugged".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.pause().await;
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.pause().await;
        self.check_write()?;
        self.inner.set(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.pause().await;
        self.check_write()?;
        self.inner.delete(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.pause().await;
        self.inner.list_keys(namespace).await
    }
}

struct Harness {
    engine: Arc<PolicyEngine>,
    clock: Arc<ManualClock>,
    kv: Arc<FlakyKv>,
    events: Arc<Mutex<Vec<PolicyEvent>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_io_timeout(Duration::from_secs(2))
    }

    fn with_io_timeout(io_timeout: Duration) -> Self {
        let kv = Arc::new(FlakyKv::default());
        let scoped =
            ScopedKvStore::new(Arc::clone(&kv) as Arc<dyn KvStore>, DEFAULT_NAMESPACE).unwrap();
        let store = ApprovalStore::with_io_timeout(scoped, io_timeout);

        let events = Arc::new(Mutex::new(Vec::new()));
        let bridge = NotificationBridge::new();
        let sink = Arc::clone(&events);
        bridge.subscribe(Arc::new(FilterSubscriber::new(
            "recorder",
            move |event: &PolicyEvent| sink.lock().unwrap().push(event.clone()),
        )));

        let clock = Arc::new(ManualClock::new(Timestamp::from_epoch_secs(T0).unwrap()));
        let engine = PolicyEngine::new(store, bridge, EngineConfig::default())
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);

        Self {
            engine: Arc::new(engine),
            clock,
            kv,
            events,
        }
    }

    async fn registered(id: &str) -> (Self, SessionId) {
        let h = Self::new();
        let id = SessionId::new(id);
        h.engine.register_session(&id).await.unwrap();
        (h, id)
    }

    fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(PolicyEvent::event_type)
            .collect()
    }

    fn take_events(&self) -> Vec<PolicyEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Raw stored state, bypassing the engine.
    async fn stored(&self, id: &SessionId) -> Option<ApprovalState> {
        let scoped =
            ScopedKvStore::new(Arc::clone(&self.kv) as Arc<dyn KvStore>, DEFAULT_NAMESPACE)
                .unwrap();
        ApprovalStore::new(scoped).get(id).await.unwrap()
    }
}

fn new_mode(event: &PolicyEvent) -> Option<ApprovalMode> {
    match event {
        PolicyEvent::PolicyChanged { new_mode, .. } => Some(*new_mode),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_session_requires_approval() {
    let (h, id) = Harness::registered("phone").await;

    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    let status = h.engine.status(&id).await.unwrap();
    assert_eq!(status.mode, ApprovalMode::RequireApproval);
    assert!(status.notify_on_auto_approve);
    assert!(h.event_types().is_empty());
}

#[tokio::test]
async fn register_is_idempotent() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.set_always_approve(&id).await.unwrap();

    let again = h.engine.register_session(&id).await.unwrap();
    assert_eq!(again.mode(), ApprovalMode::AlwaysApprove);
}

#[tokio::test]
async fn unknown_session_is_reported_everywhere() {
    let h = Harness::new();
    let id = SessionId::new("ghost");

    let is_unknown = |r: &ApprovalError| matches!(r, ApprovalError::UnknownSession { .. });
    assert!(is_unknown(&h.engine.evaluate(&id).await.unwrap_err()));
    assert!(is_unknown(&h.engine.remaining_approval_window(&id).await.unwrap_err()));
    assert!(is_unknown(&h.engine.set_always_approve(&id).await.unwrap_err()));
    assert!(is_unknown(&h.engine.set_require_approval(&id).await.unwrap_err()));
    assert!(is_unknown(&h.engine.grant_timed_approval(&id, HOUR).await.unwrap_err()));
    assert!(is_unknown(&h.engine.set_notify_on_auto_approve(&id, false).await.unwrap_err()));
    assert!(is_unknown(&h.engine.revoke_session(&id).await.unwrap_err()));
    assert!(h.event_types().is_empty());
}

#[tokio::test]
async fn revoke_deletes_and_announces() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.set_always_approve(&id).await.unwrap();
    h.take_events();

    h.engine.revoke_session(&id).await.unwrap();

    assert_eq!(h.event_types(), vec!["session_revoked"]);
    assert!(h.stored(&id).await.is_none());
    assert!(matches!(
        h.engine.evaluate(&id).await,
        Err(ApprovalError::UnknownSession { .. })
    ));

    // Re-pairing starts from scratch.
    let fresh = h.engine.register_session(&id).await.unwrap();
    assert_eq!(fresh.mode(), ApprovalMode::RequireApproval);
}

// ---------------------------------------------------------------------------
// Timed windows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_hour_window_lifecycle() {
    let (h, id) = Harness::registered("phone").await;
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );

    h.engine
        .grant_timed_approval(&id, 3 * HOUR)
        .await
        .unwrap();

    h.clock.advance(HOUR);
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(2 * HOUR)
    );

    h.clock.advance(2 * HOUR + MINUTE);
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    assert_eq!(h.engine.remaining_approval_window(&id).await.unwrap(), None);
    assert_eq!(
        h.stored(&id).await.unwrap(),
        ApprovalState::require_approval(true)
    );

    let events = h.take_events();
    let types: Vec<_> = events.iter().map(PolicyEvent::event_type).collect();
    assert_eq!(
        types,
        vec!["policy_changed", "approval_window_expired", "policy_changed"]
    );
    assert_eq!(new_mode(&events[0]), Some(ApprovalMode::TimedAutoApprove));
    assert_eq!(new_mode(&events[2]), Some(ApprovalMode::RequireApproval));
}

#[tokio::test]
async fn window_boundary_is_exclusive() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();

    h.clock.advance(HOUR - Duration::from_secs(1));
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(Duration::from_secs(1))
    );

    h.clock.advance(Duration::from_secs(1));
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
}

#[tokio::test]
async fn second_grant_replaces_first() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, 3 * HOUR).await.unwrap();
    h.clock.advance(HOUR);

    h.engine.grant_timed_approval(&id, 30 * MINUTE).await.unwrap();
    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(30 * MINUTE)
    );

    h.clock.advance(31 * MINUTE);
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
}

#[tokio::test]
async fn default_window_is_three_hours() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_default_window(&id).await.unwrap();

    let status = h.engine.status(&id).await.unwrap();
    assert_eq!(status.mode, ApprovalMode::TimedAutoApprove);
    assert_eq!(status.remaining, Some(3 * HOUR));
    assert_eq!(status.to_string(), "don't ask for 3h");
}

#[tokio::test]
async fn invalid_windows_are_rejected() {
    let (h, id) = Harness::registered("phone").await;

    assert!(matches!(
        h.engine.grant_timed_approval(&id, Duration::ZERO).await,
        Err(ApprovalError::InvalidWindow(_))
    ));
    assert!(matches!(
        h.engine
            .grant_timed_approval(&id, Duration::from_millis(900))
            .await,
        Err(ApprovalError::InvalidWindow(_))
    ));
    assert!(matches!(
        h.engine
            .grant_timed_approval(&id, EngineConfig::default().max_window + Duration::from_secs(1))
            .await,
        Err(ApprovalError::InvalidWindow(_))
    ));
    assert_eq!(
        h.stored(&id).await.unwrap().mode(),
        ApprovalMode::RequireApproval
    );
}

#[tokio::test]
async fn unknown_session_wins_over_invalid_window() {
    let h = Harness::new();
    let ghost = SessionId::new("never-paired");

    assert!(matches!(
        h.engine.grant_timed_approval(&ghost, Duration::ZERO).await,
        Err(ApprovalError::UnknownSession { .. })
    ));
    assert!(matches!(
        h.engine
            .grant_timed_approval(&ghost, EngineConfig::default().max_window * 2)
            .await,
        Err(ApprovalError::UnknownSession { .. })
    ));
    assert!(h.take_events().is_empty());
}

#[tokio::test]
async fn fractional_grant_time_is_floored() {
    let (h, id) = Harness::registered("phone").await;
    let start_ms = T0 * 1_000;
    h.clock
        .set(Timestamp::from_epoch_millis(start_ms + 700).unwrap());

    h.engine
        .grant_timed_approval(&id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(
        h.stored(&id).await.unwrap().expires_at(),
        Timestamp::from_epoch_secs(T0 + 10)
    );
    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(Duration::from_millis(9_300))
    );

    h.clock
        .set(Timestamp::from_epoch_millis(start_ms + 9_900).unwrap());
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);

    // Less than ten seconds after the grant, but past the whole-second
    // deadline.
    h.clock
        .set(Timestamp::from_epoch_millis(start_ms + 10_200).unwrap());
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
}

#[tokio::test]
async fn mutating_a_lapsed_window_announces_the_expiry_first() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, MINUTE).await.unwrap();
    h.clock.advance(2 * MINUTE);

    h.engine.set_always_approve(&id).await.unwrap();

    let events = h.take_events();
    let modes: Vec<_> = events.iter().map(new_mode).collect();
    assert_eq!(
        modes,
        vec![
            Some(ApprovalMode::TimedAutoApprove),
            None,
            Some(ApprovalMode::RequireApproval),
            Some(ApprovalMode::AlwaysApprove),
        ]
    );
}

#[tokio::test]
async fn backwards_clock_jump_lengthens_the_window() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();

    h.clock
        .set(Timestamp::from_epoch_secs(T0 - 3_600).unwrap());
    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(2 * HOUR)
    );
}

// ---------------------------------------------------------------------------
// Always / require / notify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn always_approve_overrides_timed_window() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();

    h.engine.set_always_approve(&id).await.unwrap();
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
    assert_eq!(h.engine.remaining_approval_window(&id).await.unwrap(), None);

    h.clock.advance(240 * HOUR);
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
}

#[tokio::test]
async fn require_approval_clears_window() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();

    let state = h.engine.set_require_approval(&id).await.unwrap();
    assert_eq!(state.expires_at(), None);
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
}

#[tokio::test]
async fn repeated_mutations_publish_once() {
    let (h, id) = Harness::registered("phone").await;

    h.engine.set_require_approval(&id).await.unwrap();
    assert!(h.event_types().is_empty());

    h.engine.set_always_approve(&id).await.unwrap();
    h.engine.set_always_approve(&id).await.unwrap();
    assert_eq!(h.event_types(), vec!["policy_changed"]);

    // Same instant, same duration: nothing changes.
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    assert_eq!(h.event_types().len(), 2);
}

#[tokio::test]
async fn notify_flag_is_independent_of_mode() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.set_always_approve(&id).await.unwrap();
    h.take_events();

    let state = h.engine.set_notify_on_auto_approve(&id, false).await.unwrap();
    assert_eq!(state.mode(), ApprovalMode::AlwaysApprove);
    assert!(!state.notify_on_auto_approve());
    assert!(h.event_types().is_empty());

    let evaluation = h.engine.assess(&id).await.unwrap();
    assert_eq!(evaluation.decision, Decision::Allow);
    assert!(!evaluation.notify_user);

    // Mode changes keep the flag.
    let state = h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    assert!(!state.notify_on_auto_approve());
}

#[tokio::test]
async fn auto_approval_asks_to_notify_by_default() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();

    let evaluation = h.engine.assess(&id).await.unwrap();
    assert!(evaluation.notify_user);
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_store_fails_safe() {
    let h = Harness::with_io_timeout(Duration::from_millis(50));
    let id = SessionId::new("phone");
    h.engine.register_session(&id).await.unwrap();
    h.engine.set_always_approve(&id).await.unwrap();

    h.kv.set_delay(Duration::from_millis(250));
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    assert!(matches!(
        h.engine.set_require_approval(&id).await,
        Err(ApprovalError::StoreUnavailable(_))
    ));

    h.kv.set_delay(Duration::ZERO);
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_session_fails_safe() {
    let h = Harness::with_io_timeout(Duration::from_millis(50));
    let id = SessionId::new("phone");
    h.engine.register_session(&id).await.unwrap();

    let entered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&entered);
    h.engine.bridge().subscribe(Arc::new(FilterSubscriber::new(
        "slow",
        move |event: &PolicyEvent| {
            if matches!(event, PolicyEvent::PolicyChanged { .. }) {
                flag.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
            }
        },
    )));

    let mutation = {
        let engine = Arc::clone(&h.engine);
        let id = id.clone();
        tokio::spawn(async move { engine.set_always_approve(&id).await })
    };
    while !entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = std::time::Instant::now();
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    assert!(started.elapsed() < Duration::from_millis(250));

    mutation.await.unwrap().unwrap();
    assert_eq!(h.engine.evaluate(&id).await.unwrap(), Decision::Allow);
    assert_eq!(h.engine.locks.len(), 0);
}

#[tokio::test]
async fn failed_write_leaves_state_unchanged() {
    let (h, id) = Harness::registered("phone").await;
    h.kv.set_fail_writes(true);

    assert!(matches!(
        h.engine.set_always_approve(&id).await,
        Err(ApprovalError::StoreUnavailable(_))
    ));
    assert!(h.event_types().is_empty());

    h.kv.set_fail_writes(false);
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
}

#[tokio::test]
async fn expiry_still_enforced_when_finalize_write_fails() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    h.take_events();
    h.clock.advance(2 * HOUR);

    h.kv.set_fail_writes(true);
    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    assert!(h.event_types().is_empty());
    assert_eq!(
        h.stored(&id).await.unwrap().mode(),
        ApprovalMode::TimedAutoApprove
    );

    // The next read retries the rewrite and announces it once.
    h.kv.set_fail_writes(false);
    h.engine.evaluate(&id).await.unwrap();
    h.engine.evaluate(&id).await.unwrap();
    assert_eq!(
        h.event_types(),
        vec!["approval_window_expired", "policy_changed"]
    );
}

#[tokio::test]
async fn corrupt_record_fails_safe() {
    let h = Harness::new();
    let id = SessionId::new("phone");
    h.kv
        .set(DEFAULT_NAMESPACE, "phone", br#"{"mode":2,"expires_at":12}"#.to_vec())
        .await
        .unwrap();

    assert_eq!(
        h.engine.evaluate(&id).await.unwrap(),
        Decision::RequiresInteractiveApproval
    );
    assert!(matches!(
        h.engine.set_always_approve(&id).await,
        Err(ApprovalError::CorruptRecord { .. })
    ));
}

// ---------------------------------------------------------------------------
// Sweeper hook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expire_if_due_only_touches_lapsed_windows() {
    let (h, id) = Harness::registered("phone").await;
    assert!(!h.engine.expire_if_due(&id).await.unwrap());

    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    assert!(!h.engine.expire_if_due(&id).await.unwrap());

    h.clock.advance(HOUR);
    h.take_events();
    assert!(h.engine.expire_if_due(&id).await.unwrap());
    assert!(!h.engine.expire_if_due(&id).await.unwrap());

    let events = h.take_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.metadata().source == SWEEPER_SOURCE));
    assert!(!h.engine.expire_if_due(&SessionId::new("ghost")).await.unwrap());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evaluations_agree() {
    let (h, id) = Harness::registered("phone").await;
    h.engine.grant_timed_approval(&id, HOUR).await.unwrap();
    h.take_events();
    // Park the clock exactly on the deadline so every caller races the
    // finalization.
    h.clock.advance(HOUR);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let engine = Arc::clone(&h.engine);
        let id = id.clone();
        tasks.push(tokio::spawn(async move { engine.evaluate(&id).await }));
    }

    for task in tasks {
        assert_eq!(
            task.await.unwrap().unwrap(),
            Decision::RequiresInteractiveApproval
        );
    }
    assert_eq!(
        h.event_types(),
        vec!["approval_window_expired", "policy_changed"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grants_do_not_stack() {
    let (h, id) = Harness::registered("phone").await;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&h.engine);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            engine.grant_timed_approval(&id, HOUR).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(
        h.engine.remaining_approval_window(&id).await.unwrap(),
        Some(HOUR)
    );
    // Identical grants at one instant collapse into a single change.
    assert_eq!(h.event_types(), vec!["policy_changed"]);
}
