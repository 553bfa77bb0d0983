//! Session registry
//!
//! Maps caller-chosen ids to live [`Session`]s. Each id has its own slot
//! lock, so creating a session for one id never blocks work on another,
//! while concurrent first access to the same id still yields one process.

use super::config::BashConfig;
use super::session::Session;
use super::shell::{resolve_default_shell, ShellSpec};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct SlotState {
    session: Option<Arc<Session>>,
    /// Set once the slot is unlinked from the map; callers must re-fetch.
    retired: bool,
}

impl SlotState {
    fn retire(&mut self) -> Option<Arc<Session>> {
        self.retired = true;
        self.session.take()
    }
}

type Slot = Arc<Mutex<SlotState>>;

/// Keyed registry of persistent shell sessions.
pub struct SessionManager {
    shell: ShellSpec,
    config: BashConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionManager {
    /// Registry spawning `shell` for new sessions.
    #[must_use]
    pub fn new(shell: ShellSpec, config: BashConfig) -> Self {
        Self {
            shell,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registry using the shell resolved from the host environment.
    #[must_use]
    pub fn from_env(config: BashConfig) -> Self {
        Self::new(resolve_default_shell(), config)
    }

    /// Shell used for new sessions.
    #[must_use]
    pub fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    /// Limits applied to sessions and to tools sharing this registry.
    #[must_use]
    pub fn config(&self) -> &BashConfig {
        &self.config
    }

    async fn slot(&self, id: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    /// Return the active session for `id`, starting a new one if needed.
    pub async fn get_session(&self, id: &str) -> Result<Arc<Session>> {
        loop {
            let slot = self.slot(id).await;
            let mut state = slot.lock().await;
            if state.retired {
                continue;
            }

            if let Some(session) = state.session.as_ref() {
                if session.is_active() {
                    return Ok(Arc::clone(session));
                }
                debug!(session_id = %id, "Replacing inactive session");
            }

            let session = Arc::new(Session::start(id, self.shell.clone(), self.config.clone())?);
            state.session = Some(Arc::clone(&session));
            return Ok(session);
        }
    }

    /// Close and forget the session for `id`. Unknown ids are ignored.
    pub async fn close_session(&self, id: &str) {
        let slot = self.slots.lock().await.remove(id);
        let Some(slot) = slot else {
            return;
        };
        let session = slot.lock().await.retire();
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Close every tracked session.
    pub async fn close_all_sessions(&self) {
        let slots: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();
        if slots.is_empty() {
            return;
        }
        info!(count = slots.len(), "Closing all shell sessions");

        let closes = slots.into_iter().map(|(_, slot)| async move {
            let session = slot.lock().await.retire();
            if let Some(session) = session {
                session.close().await;
            }
        });
        futures::future::join_all(closes).await;
    }

    /// Ids of sessions that are currently active.
    pub async fn list_sessions(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut ids = Vec::new();
        for (id, slot) in slots {
            // A slot held by an in-flight creation is reported once it lands.
            if let Ok(state) = slot.try_lock() {
                if state.session.as_ref().is_some_and(|s| s.is_active()) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        ids
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.list_sessions().await.len()
    }

    /// Whether no session is active.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}
