//! Durable event bus.
//!
//! Every published event is appended to the store first; the in-process
//! notifier only wakes SSE producers, which then re-query the database.
//! Consumers never read from an in-memory queue, so a reconnecting client
//! and a live one see exactly the same stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use wh_domain::Result;
use wh_store::{now_ts, EventRow, Store};

pub struct EventBus {
    store: Arc<Store>,
    notify: Notify,
}

impl EventBus {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            notify: Notify::new(),
        }
    }

    /// Append an event and wake every waiting consumer. Safe from any
    /// number of producers; never blocks on consumers.
    pub fn publish(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        kind: &str,
        payload: &serde_json::Value,
    ) -> Result<EventRow> {
        let event = self
            .store
            .insert_event(session_id, turn_id, step_id, kind, now_ts(), payload)?;
        self.notify.notify_waiters();
        Ok(event)
    }

    /// Block up to `timeout` for a publish. Returns `true` when signalled,
    /// `false` on timeout (the caller emits a heartbeat and re-queries).
    pub async fn wait_for_new(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }

    pub fn events_since(
        &self,
        session_id: Option<&str>,
        since_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EventRow>> {
        self.store.events_since(session_id, since_id, limit)
    }

    pub fn session_events_since(
        &self,
        session_id: &str,
        since_id: Option<i64>,
        since_seq: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EventRow>> {
        self.store
            .session_events_since(session_id, since_id, since_seq, limit)
    }

    pub fn latest_event_id(&self) -> Result<i64> {
        self.store.latest_event_id()
    }
}
