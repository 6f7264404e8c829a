//! Sync - ビューのスナップショット同期
//!
//! Each mounted view owns one snapshot and converges it to the store by
//! polling on an interval plus push hints. Overlapping fetches may race;
//! every fetch carries a sequence number and a response older than the last
//! applied one is dropped.
//!
//! # 状態遷移
//! - Idle -> Loading -> Ready | LoadErrored
//! - Ready -> (refreshing) -> Ready, with `error` set while stale
//! - Ready(polling) -> Ready(idle) once a detail view sees a terminal task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::scope::{PollIntervals, Scope};
use crate::domain::{ApiError, TaskId, TaskStatus};
use crate::ports::TaskApi;

/// Phase of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Blocking first load.
    Loading,
    Ready,
    /// First load failed; there is no snapshot to show.
    LoadErrored,
}

/// Published state of one view.
#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub phase: Phase,
    pub data: Option<T>,
    /// Blocking while `LoadErrored`, otherwise the last background failure.
    pub error: Option<ApiError>,
    pub refreshing: bool,
    pub polling: bool,
}

impl<T> ViewState<T> {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            error: None,
            refreshing: false,
            polling: false,
        }
    }

    /// A snapshot is shown but the last refresh failed.
    pub fn is_stale(&self) -> bool {
        self.phase == Phase::Ready && self.error.is_some()
    }
}

/// A task status change delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// What actions need from a view: a forced refresh and the optimistic delete.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn resync(&self);

    fn forget_task(&self, id: &TaskId);
}

#[derive(Debug, Default)]
struct Sequence {
    issued: u64,
    applied: u64,
    in_flight: u32,
}

struct Shared<S: Scope> {
    scope: S,
    api: Arc<dyn TaskApi>,
    state: watch::Sender<ViewState<S::Data>>,
    seq: Mutex<Sequence>,
    polling: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
}

impl<S: Scope> Shared<S> {
    fn sequence(&self) -> MutexGuard<'_, Sequence> {
        // the lock is never held across a panic point that leaves it torn
        self.seq.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Option<u64> {
        let mut seq = self.sequence();
        if self.is_closed() {
            return None;
        }
        seq.issued += 1;
        seq.in_flight += 1;
        self.state.send_modify(|st| {
            st.refreshing = st.phase != Phase::Loading;
        });
        Some(seq.issued)
    }

    fn settle(&self, issued: u64, result: Result<S::Data, ApiError>) {
        let mut seq = self.sequence();
        seq.in_flight = seq.in_flight.saturating_sub(1);
        if self.is_closed() {
            tracing::debug!(kind = ?self.scope.kind(), issued, "response after unmount discarded");
            return;
        }
        let in_flight = seq.in_flight > 0;
        if issued <= seq.applied {
            tracing::debug!(
                kind = ?self.scope.kind(),
                issued,
                applied = seq.applied,
                "stale response discarded"
            );
            self.state.send_modify(|st| st.refreshing = in_flight);
            return;
        }
        seq.applied = issued;

        let mut stop_polling = false;
        self.state.send_modify(|st| {
            match result {
                Ok(data) => {
                    stop_polling = !self.scope.keeps_polling(&data);
                    st.phase = Phase::Ready;
                    st.data = Some(data);
                    st.error = None;
                }
                Err(err) if st.data.is_some() => {
                    tracing::warn!(kind = ?self.scope.kind(), error = %err, "background refresh failed, keeping snapshot");
                    st.error = Some(err);
                }
                Err(err) => {
                    tracing::warn!(kind = ?self.scope.kind(), error = %err, "view load failed");
                    st.phase = Phase::LoadErrored;
                    st.error = Some(err);
                }
            }
            st.refreshing = in_flight;
            if stop_polling {
                st.polling = false;
            }
        });
        drop(seq);

        if stop_polling && self.stop_polling() {
            tracing::debug!(kind = ?self.scope.kind(), "terminal snapshot, polling stopped");
        }
    }

    fn abandon(&self) {
        let mut seq = self.sequence();
        seq.in_flight = seq.in_flight.saturating_sub(1);
    }

    /// Returns whether polling was active.
    fn stop_polling(&self) -> bool {
        let was_polling = self.polling.send_replace(false);
        if was_polling {
            self.state.send_modify(|st| st.polling = false);
        }
        was_polling
    }

    async fn refresh(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let Some(issued) = self.begin() else {
            return;
        };
        let result = tokio::select! {
            _ = raised(&mut shutdown, true) => {
                self.abandon();
                return;
            }
            result = self.scope.fetch(self.api.as_ref()) => result,
        };
        self.settle(issued, result);
    }

    fn forget(&self, id: &TaskId) {
        let mut seq = self.sequence();
        if self.is_closed() {
            return;
        }
        // responses issued before the removal must not bring the row back
        seq.applied = seq.issued;
        let mut removed = false;
        self.state.send_if_modified(|st| {
            if let Some(data) = st.data.as_mut() {
                removed = self.scope.forget(data, id);
            }
            removed
        });
        if removed {
            tracing::debug!(kind = ?self.scope.kind(), task_id = %id, "row removed optimistically");
        }
    }

    async fn observe_push(self: Arc<Self>, update: StatusUpdate) {
        if !self.scope.tracks(&update.task_id, update.status) {
            return;
        }
        if self.stop_polling() {
            tracing::debug!(task_id = %update.task_id, status = %update.status, "terminal push, final resync");
            self.refresh().await;
        }
    }

    fn close(&self) {
        // taking the lock orders the flag against settle()
        let _seq = self.sequence();
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        self.polling.send_replace(false);
    }
}

/// SyncController はビューを生成する
#[derive(Clone)]
pub struct SyncController {
    api: Arc<dyn TaskApi>,
    intervals: PollIntervals,
    push: Option<broadcast::Sender<StatusUpdate>>,
}

impl SyncController {
    pub fn new(api: Arc<dyn TaskApi>, intervals: PollIntervals) -> Self {
        Self {
            api,
            intervals,
            push: None,
        }
    }

    /// Views mounted afterwards react to pushed status changes.
    pub fn with_push(mut self, updates: broadcast::Sender<StatusUpdate>) -> Self {
        self.push = Some(updates);
        self
    }

    pub fn intervals(&self) -> PollIntervals {
        self.intervals
    }

    /// Mounts a view on the interval configured for its kind.
    pub fn mount<S: Scope>(&self, scope: S) -> ViewHandle<S> {
        let period = self.intervals.for_kind(scope.kind());
        self.mount_with_interval(scope, period)
    }

    /// Mounts a view: one blocking load, then background refreshes every
    /// `period`. Must be called inside a Tokio runtime.
    ///
    /// # Panics
    /// If `period` is zero.
    pub fn mount_with_interval<S: Scope>(&self, scope: S, period: Duration) -> ViewHandle<S> {
        assert!(!period.is_zero(), "poll interval must be non-zero");
        let mut initial = ViewState::idle();
        initial.phase = Phase::Loading;
        initial.polling = true;
        let (state_tx, state_rx) = watch::channel(initial);
        let (polling_tx, _) = watch::channel(true);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            scope,
            api: Arc::clone(&self.api),
            state: state_tx,
            seq: Mutex::new(Sequence::default()),
            polling: polling_tx,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
        });
        tracing::debug!(kind = ?shared.scope.kind(), ?period, "view mounted");

        tokio::spawn(poll_loop(Arc::clone(&shared), period));
        if let Some(push) = &self.push {
            tokio::spawn(push_loop(Arc::clone(&shared), push.subscribe()));
        }

        ViewHandle {
            shared,
            state: state_rx,
        }
    }
}

/// Resolves once the flag holds `value`, or its sender is gone. The borrow
/// of the watched value ends before this returns.
pub(super) async fn raised(flag: &mut watch::Receiver<bool>, value: bool) {
    let _ = flag.wait_for(|current| *current == value).await;
}

async fn poll_loop<S: Scope>(shared: Arc<Shared<S>>, period: Duration) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut polling = shared.polling.subscribe();

    Arc::clone(&shared).refresh().await;

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = raised(&mut shutdown, true) => break,
            _ = raised(&mut polling, false) => break,
            _ = ticker.tick() => {
                // not awaited: a slow fetch must not hold back the next tick
                tokio::spawn(Arc::clone(&shared).refresh());
            }
        }
    }
    tracing::debug!(kind = ?shared.scope.kind(), "poll timer stopped");
}

async fn push_loop<S: Scope>(shared: Arc<Shared<S>>, mut updates: broadcast::Receiver<StatusUpdate>) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = raised(&mut shutdown, true) => break,
            update = updates.recv() => match update {
                Ok(update) => Arc::clone(&shared).observe_push(update).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(kind = ?shared.scope.kind(), skipped, "view lagged behind push channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Handle to a mounted view. Dropping it unmounts the view: the timer stops
/// and responses that arrive afterwards are ignored.
pub struct ViewHandle<S: Scope> {
    shared: Arc<Shared<S>>,
    state: watch::Receiver<ViewState<S::Data>>,
}

impl<S: Scope> ViewHandle<S> {
    pub fn scope(&self) -> &S {
        &self.shared.scope
    }

    /// Current state, cloned.
    pub fn state(&self) -> ViewState<S::Data> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<S::Data>> {
        self.state.clone()
    }

    /// Waits until the state satisfies `pred` and returns it.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&ViewState<S::Data>) -> bool,
    ) -> ViewState<S::Data> {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(pred).await {
            return state.clone();
        }
        rx.borrow().clone()
    }

    pub fn is_polling(&self) -> bool {
        self.state.borrow().polling
    }

    /// Forced fetch outside the timer; returns once it has settled.
    pub async fn resync(&self) {
        Arc::clone(&self.shared).refresh().await;
    }

    /// Re-runs the blocking load after a failed one; on a loaded view this is
    /// a plain resync.
    pub async fn retry_load(&self) {
        if self.shared.is_closed() {
            return;
        }
        self.shared.state.send_if_modified(|st| {
            if matches!(st.phase, Phase::Idle | Phase::LoadErrored) {
                st.phase = Phase::Loading;
                st.error = None;
                true
            } else {
                false
            }
        });
        self.resync().await;
    }

    /// Optimistically removes `id` from the snapshot.
    pub fn forget_task(&self, id: &TaskId) {
        self.shared.forget(id);
    }

    /// Applies a pushed status change directly.
    pub async fn observe_push_status(&self, update: StatusUpdate) {
        Arc::clone(&self.shared).observe_push(update).await;
    }

    pub fn unmount(self) {}
}

impl<S: Scope> Drop for ViewHandle<S> {
    fn drop(&mut self) {
        self.shared.close();
        tracing::debug!(kind = ?self.shared.scope.kind(), "view unmounted");
    }
}

#[async_trait]
impl<S: Scope> SyncTarget for ViewHandle<S> {
    async fn resync(&self) {
        ViewHandle::resync(self).await;
    }

    fn forget_task(&self, id: &TaskId) {
        ViewHandle::forget_task(self, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::scope::{DetailScope, ListScope, StatsScope, ViewKind};
    use crate::domain::{SubmitRequest, TaskStats, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU64;

    /// Scope whose fetches take scripted time and name the call that made them.
    #[derive(Clone, Default)]
    struct Scripted {
        calls: Arc<AtomicU64>,
        delays: Arc<Mutex<VecDeque<Duration>>>,
    }

    impl Scripted {
        fn with_delays(delays: &[u64]) -> Self {
            let scripted = Self::default();
            scripted
                .delays
                .lock()
                .unwrap()
                .extend(delays.iter().map(|s| Duration::from_secs(*s)));
            scripted
        }
    }

    #[async_trait]
    impl Scope for Scripted {
        type Data = Vec<TaskId>;

        fn kind(&self) -> ViewKind {
            ViewKind::List
        }

        async fn fetch(&self, _api: &dyn TaskApi) -> Result<Vec<TaskId>, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
            tokio::time::sleep(delay).await;
            Ok(vec![TaskId::new(format!("call-{call}")), TaskId::new("keep")])
        }

        fn forget(&self, data: &mut Vec<TaskId>, id: &TaskId) -> bool {
            let before = data.len();
            data.retain(|existing| existing != id);
            before != data.len()
        }
    }

    fn controller(store: &InMemoryTaskStore) -> SyncController {
        SyncController::new(Arc::new(store.clone()), PollIntervals::default())
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test(start_paused = true)]
    async fn background_loops_are_send() {
        let store = InMemoryTaskStore::new();
        let (updates, _) = broadcast::channel(4);
        let view = controller(&store)
            .with_push(updates.clone())
            .mount(ListScope::default());

        let poll = poll_loop(Arc::clone(&view.shared), Duration::from_secs(1));
        let push = push_loop(Arc::clone(&view.shared), updates.subscribe());
        assert_send(&poll);
        assert_send(&push);
    }

    #[tokio::test(start_paused = true)]
    async fn raised_flag_leaves_sender_usable() {
        let (flag, mut rx) = watch::channel(false);
        flag.send_replace(true);
        raised(&mut rx, true).await;
        // a guard kept alive here would block the writer
        flag.send_replace(false);
        raised(&mut rx, false).await;
        assert!(!*rx.borrow());
    }

    async fn running_task(store: &InMemoryTaskStore) -> TaskId {
        let id = store
            .submit_task(&SubmitRequest::new("read the release notes"))
            .await
            .unwrap()
            .id;
        store.start(&id).await.unwrap();
        id
    }

    #[tokio::test(start_paused = true)]
    async fn detail_polling_stops_after_terminal_fetch() {
        let store = InMemoryTaskStore::new();
        let id = running_task(&store).await;
        let view = controller(&store).mount(DetailScope::new(id.clone()));

        let state = view.wait_for(|s| s.phase == Phase::Ready).await;
        assert!(state.polling);

        store.complete(&id, serde_json::json!({"ok": true})).await.unwrap();
        let state = view.wait_for(|s| !s.polling).await;
        assert_eq!(state.data.unwrap().status, TaskStatus::Completed);
        assert!(!view.is_polling());

        let calls = store.call_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_background_refresh_keeps_snapshot() {
        let store = InMemoryTaskStore::new();
        running_task(&store).await;
        let view = controller(&store).mount(ListScope::default());
        let loaded = view.wait_for(|s| s.phase == Phase::Ready).await;

        store.set_offline(true).await;
        let stale = view.wait_for(|s| s.error.is_some()).await;
        assert!(stale.is_stale());
        assert_eq!(stale.data, loaded.data);

        store.set_offline(false).await;
        let fresh = view.wait_for(|s| s.error.is_none()).await;
        assert_eq!(fresh.phase, Phase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_load_blocks_until_retry() {
        let store = InMemoryTaskStore::new();
        store.set_offline(true).await;
        let view = controller(&store).mount(ListScope::default());

        let state = view.wait_for(|s| s.phase == Phase::LoadErrored).await;
        assert!(state.data.is_none());
        assert!(state.error.is_some());

        store.set_offline(false).await;
        view.retry_load().await;
        let state = view.state();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.data, Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn older_response_is_discarded() {
        let store = InMemoryTaskStore::new();
        // load, then a slow fetch overtaken by a fast one
        let scope = Scripted::with_delays(&[0, 10, 1]);
        let view = controller(&store).mount_with_interval(scope, Duration::from_secs(3600));
        view.wait_for(|s| s.phase == Phase::Ready).await;

        tokio::join!(view.resync(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            view.resync().await;
        });

        let data = view.state().data.unwrap();
        assert_eq!(data[0], TaskId::new("call-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_forget_fences_in_flight_refresh() {
        let store = InMemoryTaskStore::new();
        let scope = Scripted::with_delays(&[0, 5]);
        let view = controller(&store).mount_with_interval(scope, Duration::from_secs(3600));
        view.wait_for(|s| s.phase == Phase::Ready).await;

        tokio::join!(view.resync(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            view.forget_task(&TaskId::new("keep"));
        });

        let data = view.state().data.unwrap();
        assert_eq!(data, vec![TaskId::new("call-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_ignores_late_response() {
        let store = InMemoryTaskStore::new();
        let scope = Scripted::with_delays(&[10]);
        let view = controller(&store).mount_with_interval(scope, Duration::from_secs(1));
        let rx = view.subscribe();

        tokio::time::sleep(Duration::from_secs(1)).await;
        view.unmount();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let state = rx.borrow().clone();
        assert_eq!(state.phase, Phase::Loading);
        assert!(state.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_push_stops_detail_polling_with_one_resync() {
        let store = InMemoryTaskStore::new();
        let id = running_task(&store).await;
        let (updates, _) = broadcast::channel(16);
        let view = controller(&store)
            .with_push(updates.clone())
            .mount(DetailScope::new(id.clone()));
        view.wait_for(|s| s.phase == Phase::Ready).await;

        store.fail(&id, "agent crashed").await.unwrap();
        let calls = store.call_count();
        updates
            .send(StatusUpdate {
                task_id: id.clone(),
                status: TaskStatus::Failed,
            })
            .unwrap();

        let state = view
            .wait_for(|s| !s.polling && s.data.as_ref().is_some_and(|t| t.is_terminal()))
            .await;
        assert_eq!(state.data.unwrap().error_details.as_deref(), Some("agent crashed"));
        assert_eq!(store.call_count(), calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_for_other_task_is_ignored() {
        let store = InMemoryTaskStore::new();
        let id = running_task(&store).await;
        let view = controller(&store).mount(DetailScope::new(id));
        view.wait_for(|s| s.phase == Phase::Ready).await;

        view.observe_push_status(StatusUpdate {
            task_id: TaskId::new("someone-else"),
            status: TaskStatus::Completed,
        })
        .await;
        assert!(view.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_view_shows_zeros_when_store_lacks_stats() {
        let store = InMemoryTaskStore::new();
        running_task(&store).await;
        store.disable_stats().await;

        let view = controller(&store).mount(StatsScope);
        let state = view.wait_for(|s| s.phase != Phase::Loading).await;
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.data, Some(TaskStats::zero()));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "poll interval must be non-zero")]
    async fn zero_interval_is_rejected_at_mount() {
        let store = InMemoryTaskStore::new();
        let _view = controller(&store).mount_with_interval(ListScope::default(), Duration::ZERO);
    }
}
