use crate::models::WorkspaceId;
use dashmap::DashMap;
use serde::Serialize;

// The LLM session a workspace is currently chatting against.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionBinding {
    pub session_id: String,
    pub documents: Vec<String>,
}

/// Per-workspace session bindings. Each workspace holds at most one binding
/// and a new bind replaces it outright.
#[derive(Debug, Default)]
pub struct SessionBinder {
    bindings: DashMap<WorkspaceId, SessionBinding>,
}

impl SessionBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, workspace_id: WorkspaceId, session_id: impl Into<String>, documents: Vec<String>) {
        let session_id = session_id.into();
        log::info!(
            "Binding workspace {} to session {} ({} documents)",
            workspace_id,
            session_id,
            documents.len()
        );
        self.bindings.insert(
            workspace_id,
            SessionBinding {
                session_id,
                documents,
            },
        );
    }

    pub fn binding(&self, workspace_id: WorkspaceId) -> Option<SessionBinding> {
        self.bindings.get(&workspace_id).map(|entry| entry.value().clone())
    }

    pub fn session_id(&self, workspace_id: WorkspaceId) -> Option<String> {
        self.bindings
            .get(&workspace_id)
            .map(|entry| entry.session_id.clone())
    }

    /// Documents attached to the bound session, empty when unbound.
    pub fn current_documents(&self, workspace_id: WorkspaceId) -> Vec<String> {
        self.bindings
            .get(&workspace_id)
            .map(|entry| entry.documents.clone())
            .unwrap_or_default()
    }

    pub fn unbind(&self, workspace_id: WorkspaceId) -> Option<SessionBinding> {
        self.bindings.remove(&workspace_id).map(|(_, binding)| binding)
    }

    pub fn clear(&self) {
        self.bindings.clear();
    }
}
