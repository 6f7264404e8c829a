//! Channel - プッシュチャネルの監視ループ
//!
//! One background task owns the connection: it reconnects after the policy
//! delay, re-sends subscriptions on every new connection, applies messages to
//! the console in delivery order and fans status changes out to views.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::console::ConsoleState;
use super::reconnect::ReconnectPolicy;
use super::sync::{StatusUpdate, raised};
use crate::domain::{ClientFrame, PushMessage, TaskId};
use crate::ports::{PushConnection, PushTransport};

const STATUS_FANOUT_CAPACITY: usize = 64;

/// Handle to the push channel and its console state.
///
/// Dropping the handle closes the connection; [`ConsoleHandle::close`] also
/// waits for the background task to finish.
pub struct ConsoleHandle {
    console: Arc<watch::Sender<ConsoleState>>,
    state: watch::Receiver<ConsoleState>,
    updates: broadcast::Sender<StatusUpdate>,
    subscribe_tx: mpsc::UnboundedSender<TaskId>,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl ConsoleHandle {
    /// Spawns the supervisor. Must be called inside a Tokio runtime.
    pub fn open(transport: Arc<dyn PushTransport>, policy: ReconnectPolicy) -> Self {
        let (console_tx, state) = watch::channel(ConsoleState::default());
        let console = Arc::new(console_tx);
        let (updates, _) = broadcast::channel(STATUS_FANOUT_CAPACITY);
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            transport,
            policy,
            console: Arc::clone(&console),
            updates: updates.clone(),
            subscribe_rx,
            shutdown: shutdown_rx,
            subscriptions: Vec::new(),
        };
        let join = tokio::spawn(supervisor.run());

        Self {
            console,
            state,
            updates,
            subscribe_tx,
            shutdown,
            join: Some(join),
        }
    }

    pub fn state(&self) -> ConsoleState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsoleState> {
        self.state.clone()
    }

    /// Waits until the console satisfies `pred` and returns it.
    pub async fn wait_for(&self, pred: impl FnMut(&ConsoleState) -> bool) -> ConsoleState {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(pred).await {
            return state.clone();
        }
        rx.borrow().clone()
    }

    /// Sender views listen on; pass to `SyncController::with_push`.
    pub fn status_updates(&self) -> broadcast::Sender<StatusUpdate> {
        self.updates.clone()
    }

    /// Follows `id`: processing indicator on, and a subscription to its
    /// messages.
    pub fn track(&self, id: TaskId) {
        self.console.send_modify(|console| console.track(id.clone()));
        self.subscribe_task(id);
    }

    /// Asks the server for messages about `id`, now and after reconnects.
    pub fn subscribe_task(&self, id: TaskId) {
        if self.subscribe_tx.send(id).is_err() {
            tracing::debug!("push channel already closed, subscription dropped");
        }
    }

    pub async fn close(mut self) {
        self.shutdown.send_replace(true);
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            tracing::warn!(error = %err, "push supervisor ended abnormally");
        }
    }
}

impl Drop for ConsoleHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

enum Disconnect {
    Shutdown,
    Lost,
}

struct Supervisor {
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    console: Arc<watch::Sender<ConsoleState>>,
    updates: broadcast::Sender<StatusUpdate>,
    subscribe_rx: mpsc::UnboundedReceiver<TaskId>,
    shutdown: watch::Receiver<bool>,
    /// Every task subscribed so far, in request order.
    subscriptions: Vec<TaskId>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            let connected = tokio::select! {
                _ = raised(&mut self.shutdown, true) => break,
                connected = self.transport.connect() => connected,
            };
            let mut conn = match connected {
                Ok(conn) => conn,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    let delay = self.policy.next_delay(failures);
                    tracing::warn!(error = %err, ?delay, "push channel connect failed");
                    if self.pause(delay).await {
                        continue;
                    }
                    break;
                }
            };
            failures = 0;
            self.console.send_modify(|console| console.connected = true);
            tracing::info!(subscriptions = self.subscriptions.len(), "push channel connected");

            let end = self.serve(conn.as_mut()).await;
            conn.close().await;
            self.console.send_modify(|console| console.connected = false);

            match end {
                Disconnect::Shutdown => break,
                Disconnect::Lost => {
                    let delay = self.policy.next_delay(1);
                    tracing::warn!(?delay, "push channel lost, reconnecting");
                    if !self.pause(delay).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("push supervisor stopped");
    }

    /// Sleeps unless shutdown comes first; returns whether to keep going.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = raised(&mut self.shutdown, true) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn serve(&mut self, conn: &mut dyn PushConnection) -> Disconnect {
        for id in &self.subscriptions {
            let frame = ClientFrame::Subscribe {
                task_id: id.clone(),
            };
            if let Err(err) = conn.send(frame.encode()).await {
                tracing::warn!(error = %err, "re-subscribe failed");
                return Disconnect::Lost;
            }
        }

        loop {
            tokio::select! {
                _ = raised(&mut self.shutdown, true) => return Disconnect::Shutdown,
                id = self.subscribe_rx.recv() => {
                    let Some(id) = id else {
                        return Disconnect::Shutdown;
                    };
                    let frame = ClientFrame::Subscribe { task_id: id.clone() };
                    if !self.subscriptions.contains(&id) {
                        self.subscriptions.push(id);
                    }
                    if let Err(err) = conn.send(frame.encode()).await {
                        tracing::warn!(error = %err, "subscribe failed");
                        return Disconnect::Lost;
                    }
                }
                frame = conn.recv() => match frame {
                    Some(Ok(raw)) => self.deliver(&raw),
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "push channel read failed");
                        return Disconnect::Lost;
                    }
                    None => return Disconnect::Lost,
                }
            }
        }
    }

    fn deliver(&self, raw: &str) {
        let message = match PushMessage::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                let preview: String = raw.chars().take(120).collect();
                tracing::warn!(error = %err, frame = %preview, "malformed push frame dropped");
                return;
            }
        };
        let mut change = None;
        self.console.send_modify(|console| change = console.apply(&message));
        if let Some((task_id, status)) = change {
            // no receivers is fine: no view is mounted
            let _ = self.updates.send(StatusUpdate { task_id, status });
        }
    }
}
