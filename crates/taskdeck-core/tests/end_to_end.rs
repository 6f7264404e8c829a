//! Submit, list, push completion, detail settles: the whole client against
//! the in-memory store and a scripted push channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use taskdeck_core::app::{
    ActionOutcome, DashboardBuilder, DetailScope, ListScope, Phase, StatsScope,
};
use taskdeck_core::domain::{ApiError, SubmitRequest, TaskStatus};
use taskdeck_core::impls::InMemoryTaskStore;
use taskdeck_core::ports::{PushConnection, PushTransport};
use tokio::sync::mpsc;

/// Hands out one connection fed by the test; later connects fail.
struct ScriptedPush {
    incoming: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

struct ScriptedConnection {
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl PushTransport for ScriptedPush {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, ApiError> {
        match self.incoming.lock().unwrap().take() {
            Some(incoming) => Ok(Box::new(ScriptedConnection { incoming })),
            None => Err(ApiError::network_unreachable("scripted://push", "gone")),
        }
    }
}

#[async_trait]
impl PushConnection for ScriptedConnection {
    async fn recv(&mut self) -> Option<Result<String, ApiError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn send(&mut self, _frame: String) -> Result<(), ApiError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[tokio::test(start_paused = true)]
async fn submit_list_push_detail() {
    let store = InMemoryTaskStore::new();
    let (frames, incoming) = mpsc::unbounded_channel();
    let dashboard = DashboardBuilder::new()
        .api(Arc::new(store.clone()))
        .push(Arc::new(ScriptedPush {
            incoming: Mutex::new(Some(incoming)),
        }))
        .build()
        .unwrap();
    let console = dashboard.console.as_ref().unwrap();

    let list = dashboard.sync.mount(ListScope::default());
    let stats = dashboard.sync.mount(StatsScope);
    let loaded = list.wait_for(|s| s.phase == Phase::Ready).await;
    assert!(loaded.data.unwrap().is_empty());

    // submit, then navigate to the new task
    let outcome = dashboard
        .actions
        .submit(
            &SubmitRequest::new("Find the opening hours of the museum"),
            &[&list, &stats],
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Submitted { .. }));
    let id = outcome.navigate_to().unwrap().clone();

    let rows = list.state().data.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(stats.state().data.unwrap().pending, 1);

    console.track(id.clone());
    let detail = dashboard.sync.mount(DetailScope::new(id.clone()));
    let state = detail.wait_for(|s| s.phase == Phase::Ready).await;
    assert!(state.polling);
    assert!(console.state().processing);

    // the worker finishes and the server pushes the transition
    store.start(&id).await.unwrap();
    store
        .complete(&id, json!({"hours": "10:00-18:00"}))
        .await
        .unwrap();
    frames
        .send(format!(
            r#"{{"type":"task_status","task_id":"{id}","status":"completed","content":"Task finished"}}"#
        ))
        .unwrap();

    let console_state = console.wait_for(|c| !c.processing).await;
    assert_eq!(console_state.active_task, None);

    let settled = detail
        .wait_for(|s| !s.polling && s.data.as_ref().is_some_and(|t| t.is_terminal()))
        .await;
    let task = settled.data.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_data, Some(json!({"hours": "10:00-18:00"})));

    // with only the detail view left, nothing polls any more
    drop(list);
    drop(stats);
    let calls = store.call_count();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(store.call_count(), calls);
    assert!(!detail.is_polling());

    drop(detail);
    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_task_retry_navigates_to_new_task() {
    let store = InMemoryTaskStore::new();
    let dashboard = DashboardBuilder::new()
        .api(Arc::new(store.clone()))
        .build()
        .unwrap();

    let list = dashboard.sync.mount(ListScope::default());
    let outcome = dashboard
        .actions
        .submit(&SubmitRequest::new("Download the quarterly report"), &[&list])
        .await
        .unwrap();
    let original = outcome.navigate_to().unwrap().clone();
    store.fail(&original, "login wall").await.unwrap();

    let detail = dashboard.sync.mount(DetailScope::new(original.clone()));
    let failed = detail
        .wait_for(|s| s.phase == Phase::Ready)
        .await
        .data
        .unwrap();
    assert!(!detail.is_polling());

    let retried = dashboard.actions.retry(&failed, &[&list]).await.unwrap();
    let new_id = retried.navigate_to().unwrap().clone();
    assert_ne!(new_id, original);

    let rows = list.state().data.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, new_id);
    assert_eq!(
        store.snapshot(&original).await.unwrap().error_details.as_deref(),
        Some("login wall")
    );
}
