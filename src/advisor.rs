use crate::api::{BackendApi, HttpLlmProvider, LlmApiProvider, RestBackend};
use crate::config::{self, AdvisorConfig, PromptDefaults};
use crate::error::AdvisorError;
use crate::models::{ApiResponse, ChatMessage, Identity, UserId, WorkspaceId, WorkspaceWithDocuments};
use crate::notify::{Notice, Notifier};
use crate::session::{SessionBinder, SessionBinding};
use crate::state::{ConversationStore, SendSlots, SendState};
use crate::storage::LocalStore;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Client-side state and operations for one signed-in browser session.
///
/// Cloning is cheap and every clone shares the same state, so an `Advisor`
/// can be handed to background tasks and rendering code alike. Rendering only
/// reads; all writes go through the operations in `auth`, `chat`,
/// `workspace` and `admin`.
#[derive(Clone)]
pub struct Advisor {
    pub(crate) backend: Arc<dyn BackendApi>,
    pub(crate) llm: Arc<dyn LlmApiProvider>,
    pub(crate) store: LocalStore,
    pub(crate) conversations: Arc<ConversationStore>,
    pub(crate) sessions: Arc<SessionBinder>,
    pub(crate) send_slots: Arc<SendSlots>,
    pub(crate) notifier: Notifier,
    pub(crate) identity: Arc<RwLock<Option<Identity>>>,
    pub(crate) workspaces: Arc<RwLock<Vec<WorkspaceWithDocuments>>>,
    pub(crate) selected: Arc<RwLock<Option<WorkspaceId>>>,
    pub(crate) last_error: Arc<RwLock<Option<String>>>,
    pub(crate) prompt_defaults: PromptDefaults,
}

impl Advisor {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        llm: Arc<dyn LlmApiProvider>,
        store: LocalStore,
        prompt_defaults: PromptDefaults,
    ) -> Self {
        Self {
            backend,
            llm,
            store,
            conversations: Arc::new(ConversationStore::new()),
            sessions: Arc::new(SessionBinder::new()),
            send_slots: Arc::new(SendSlots::new()),
            notifier: Notifier::new(),
            identity: Arc::new(RwLock::new(None)),
            workspaces: Arc::new(RwLock::new(Vec::new())),
            selected: Arc::new(RwLock::new(None)),
            last_error: Arc::new(RwLock::new(None)),
            prompt_defaults,
        }
    }

    /// Wires the HTTP clients and the on-disk local store from configuration.
    pub async fn from_config(config: &AdvisorConfig) -> Result<Self, anyhow::Error> {
        let api_key = config::get_api_key(config.llm_api_key_ref.as_deref())?;
        let backend: Arc<dyn BackendApi> =
            Arc::new(RestBackend::new(&config.api_base_url, config.request_timeout)?);
        let llm: Arc<dyn LlmApiProvider> = Arc::new(HttpLlmProvider::new(
            &config.llm_api_base_url,
            api_key,
            config.request_timeout,
        )?);
        let store = LocalStore::open(&config.store_path)
            .await
            .context("Failed to open local store")?;

        Ok(Self::new(backend, llm, store, config.prompt_defaults.clone()))
    }

    // --- Read side ---

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn messages(&self, workspace_id: WorkspaceId) -> Vec<ChatMessage> {
        self.conversations.messages(workspace_id)
    }

    pub fn session_binding(&self, workspace_id: WorkspaceId) -> Option<SessionBinding> {
        self.sessions.binding(workspace_id)
    }

    pub fn current_documents(&self, workspace_id: WorkspaceId) -> Vec<String> {
        self.sessions.current_documents(workspace_id)
    }

    pub fn send_state(&self, workspace_id: WorkspaceId) -> SendState {
        self.send_slots.state(workspace_id)
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }

    pub async fn current_user_id(&self) -> Option<UserId> {
        self.identity.read().await.as_ref().map(Identity::user_id)
    }

    pub async fn workspaces(&self) -> Vec<WorkspaceWithDocuments> {
        self.workspaces.read().await.clone()
    }

    pub async fn selected_workspace(&self) -> Option<WorkspaceId> {
        *self.selected.read().await
    }

    /// Documents attached to the selected workspace's session.
    pub async fn current_session_documents(&self) -> Vec<String> {
        match self.selected_workspace().await {
            Some(ws_id) => self.sessions.current_documents(ws_id),
            None => Vec::new(),
        }
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    // --- Shared helpers for the operation modules ---

    pub(crate) async fn require_user(&self) -> Result<Identity, AdvisorError> {
        self.identity().await.ok_or_else(|| {
            self.notifier.error("User not authenticated");
            AdvisorError::NotAuthenticated
        })
    }

    pub(crate) async fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.notifier.error(message.clone());
        *self.last_error.write().await = Some(message);
    }

    /// Unwraps a backend envelope. Transport failures and `success: false`
    /// both raise an error notice; `failure` is the notice text when the
    /// backend gives no message of its own.
    pub(crate) fn checked<T>(
        &self,
        result: anyhow::Result<ApiResponse<T>>,
        failure: &str,
    ) -> Result<T, AdvisorError> {
        match result {
            Ok(response) if response.success => Ok(response.data),
            Ok(response) => {
                log::error!("{}: backend replied {:?}", failure, response.message);
                let err = AdvisorError::rejected(response.message, failure);
                self.notifier.error(err.to_string());
                Err(err)
            }
            Err(e) => {
                log::error!("{}: {:?}", failure, e);
                self.notifier.error(failure);
                Err(AdvisorError::Transport(e))
            }
        }
    }

    pub(crate) async fn clear_error(&self) {
        *self.last_error.write().await = None;
    }

    /// Drops everything held for a workspace: thread, binding, send slot and
    /// selection.
    pub(crate) async fn forget_workspace(&self, workspace_id: WorkspaceId) {
        self.conversations.remove(workspace_id);
        self.sessions.unbind(workspace_id);
        self.send_slots.remove(workspace_id);
        let mut selected = self.selected.write().await;
        if *selected == Some(workspace_id) {
            *selected = None;
        }
    }
}
