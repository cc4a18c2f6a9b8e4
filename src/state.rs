use crate::models::{ChatMessage, WorkspaceId};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Conversation threads keyed by workspace. Readers get clones; only the
/// advisor writes.
#[derive(Debug, Default)]
pub struct ConversationStore {
    threads: DashMap<WorkspaceId, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, workspace_id: WorkspaceId, message: ChatMessage) {
        self.threads.entry(workspace_id).or_default().push(message);
    }

    /// Swaps the whole thread in one write so readers never see a half-loaded
    /// history.
    pub fn replace(&self, workspace_id: WorkspaceId, messages: Vec<ChatMessage>) {
        self.threads.insert(workspace_id, messages);
    }

    pub fn messages(&self, workspace_id: WorkspaceId) -> Vec<ChatMessage> {
        self.threads
            .get(&workspace_id)
            .map(|thread| thread.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self, workspace_id: WorkspaceId) -> usize {
        self.threads.get(&workspace_id).map_or(0, |thread| thread.len())
    }

    pub fn remove(&self, workspace_id: WorkspaceId) {
        self.threads.remove(&workspace_id);
    }

    pub fn clear(&self) {
        self.threads.clear();
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Idle,
    Sending,
}

/// One send slot per workspace. The tokio mutex queues waiters in FIFO order,
/// so sends for a workspace run one at a time in submission order.
#[derive(Debug, Default)]
pub struct SendSlots {
    slots: DashMap<WorkspaceId, Arc<Mutex<()>>>,
    sending: Arc<DashMap<WorkspaceId, ()>>,
}

impl SendSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, workspace_id: WorkspaceId) -> SendPermit {
        // Clone the slot out so no map guard is held across the await.
        let slot = self.slots.entry(workspace_id).or_default().value().clone();
        let guard = slot.lock_owned().await;
        self.sending.insert(workspace_id, ());
        SendPermit {
            workspace_id,
            sending: self.sending.clone(),
            _guard: guard,
        }
    }

    /// Drops a workspace's slot. A send already holding the slot finishes
    /// normally; later sends get a fresh slot.
    pub fn remove(&self, workspace_id: WorkspaceId) {
        self.slots.remove(&workspace_id);
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, workspace_id: WorkspaceId) -> SendState {
        if self.sending.contains_key(&workspace_id) {
            SendState::Sending
        } else {
            SendState::Idle
        }
    }
}

// Held for the duration of one send; dropping it returns the workspace to Idle.
#[derive(Debug)]
pub struct SendPermit {
    workspace_id: WorkspaceId,
    sending: Arc<DashMap<WorkspaceId, ()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.sending.remove(&self.workspace_id);
    }
}
