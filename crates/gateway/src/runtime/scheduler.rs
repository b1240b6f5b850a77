//! Per-session turn admission and lifecycle.
//!
//! At most one turn runs per session. A second submission while one is
//! in flight fails with [`Error::Busy`] (HTTP 409 at the surface). The
//! registry mutex is held only for slot checks and registration, never
//! across an await: admission reserves the slot first, so two concurrent
//! submissions see exactly one winner.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use wh_domain::{Error, Result};
use wh_store::TurnRow;

use crate::runtime::cancel::CancelToken;
use crate::runtime::{title, turn};
use crate::state::AppState;

struct TurnHandle {
    turn_id: String,
    cancel: CancelToken,
    join: JoinHandle<()>,
}

enum Slot {
    /// Admission passed, runner not yet registered.
    Reserved,
    Running(TurnHandle),
}

impl Slot {
    fn is_active(&self) -> bool {
        match self {
            Slot::Reserved => true,
            Slot::Running(handle) => !handle.join.is_finished(),
        }
    }
}

#[derive(Default)]
pub struct SessionScheduler {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a user message: reject if a turn is active, persist the
    /// message, create the turn row, kick off title generation for the
    /// session's first message, and launch the runner task.
    pub fn start_turn(
        &self,
        state: &AppState,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnRow> {
        // Reserve the slot; concurrent submitters race on this lock and
        // exactly one wins.
        {
            let mut slots = self.slots.lock();
            if slots.get(session_id).map(Slot::is_active).unwrap_or(false) {
                return Err(Error::Busy);
            }
            slots.insert(session_id.to_string(), Slot::Reserved);
        }

        let admitted = (|| -> Result<TurnRow> {
            state.store.add_message(session_id, "user", user_text)?;
            state.store.touch_session(session_id)?;

            if state.store.count_user_messages(session_id)? == 1 {
                title::spawn_title_task(state, session_id, user_text);
            }

            state.store.create_turn(session_id, user_text)
        })();

        let turn = match admitted {
            Ok(turn) => turn,
            Err(e) => {
                self.slots.lock().remove(session_id);
                return Err(e);
            }
        };

        let cancel = CancelToken::new();
        let join = {
            let state = state.clone();
            let session_id = session_id.to_string();
            let turn_id = turn.id.clone();
            let user_text = user_text.to_string();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                turn::run_turn(&state, &session_id, &turn_id, &user_text, &cancel).await;
                state.store.touch_session(&session_id).ok();
                state.scheduler.unregister(&session_id, &turn_id);
            })
        };

        self.slots.lock().insert(
            session_id.to_string(),
            Slot::Running(TurnHandle {
                turn_id: turn.id.clone(),
                cancel,
                join,
            }),
        );

        Ok(turn)
    }

    /// Request cancellation of the session's running turn. Returns `true`
    /// when a live turn was signalled.
    pub fn cancel(&self, session_id: &str) -> bool {
        let slots = self.slots.lock();
        match slots.get(session_id) {
            Some(Slot::Running(handle)) if !handle.join.is_finished() => {
                handle.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Whether the session currently has an active turn.
    pub fn is_running(&self, session_id: &str) -> bool {
        self.slots
            .lock()
            .get(session_id)
            .map(Slot::is_active)
            .unwrap_or(false)
    }

    /// The active turn id, if any.
    pub fn running_turn(&self, session_id: &str) -> Option<String> {
        match self.slots.lock().get(session_id) {
            Some(Slot::Running(handle)) if !handle.join.is_finished() => {
                Some(handle.turn_id.clone())
            }
            _ => None,
        }
    }

    /// Cancel and abort the session's turn task (used by session delete,
    /// where the runner must not keep writing into cascading rows).
    pub fn abort(&self, session_id: &str) {
        let slot = self.slots.lock().remove(session_id);
        if let Some(Slot::Running(handle)) = slot {
            handle.cancel.cancel();
            handle.join.abort();
        }
    }

    fn unregister(&self, session_id: &str, turn_id: &str) {
        let mut slots = self.slots.lock();
        let owned = matches!(
            slots.get(session_id),
            Some(Slot::Running(handle)) if handle.turn_id == turn_id
        );
        if owned {
            slots.remove(session_id);
        }
    }

    /// Wait until the session has no active turn (test and shutdown aid).
    pub async fn wait_idle(&self, session_id: &str) {
        while self.is_running(session_id) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
