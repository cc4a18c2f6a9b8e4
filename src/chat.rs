//! Conversation loading and sending for a workspace.

use crate::advisor::Advisor;
use crate::error::{AdvisorError, AdvisorResult};
use crate::extract::collect_document_names;
use crate::history::{group_by_session, latest_session, rank_sessions, sort_records, to_messages, SessionGroup};
use crate::models::{ChatMessage, PromptQuery, PromptRecord, UserId, WorkspaceId};
use chrono::Utc;

const GENERIC_APOLOGY: &str = "Sorry, I couldn't process your request. Please try again later.";
const HISTORY_LOAD_FAILED: &str = "Failed to load chat history";

/// How a send ended. Both variants leave a user message and a bot message
/// appended to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Answered(ChatMessage),
    Failed { reason: String, message: ChatMessage },
}

impl SendOutcome {
    pub fn bot_message(&self) -> &ChatMessage {
        match self {
            SendOutcome::Answered(message) => message,
            SendOutcome::Failed { message, .. } => message,
        }
    }
}

impl Advisor {
    /// Resumes the most recent session of a workspace.
    ///
    /// The most recent session is the one holding the highest prompt id. Its
    /// records become the conversation and its session id becomes the
    /// workspace binding. With no stored prompts the conversation is emptied
    /// and no binding is created. On any failure the current state is kept.
    pub async fn load_latest(&self, workspace_id: WorkspaceId, user_id: UserId) -> AdvisorResult<()> {
        log::info!("Loading latest chat history for workspace {} user {}", workspace_id, user_id);
        let records = self
            .fetch_prompts(PromptQuery::workspace(workspace_id, user_id))
            .await?;

        let groups = group_by_session(records);
        let Some(latest) = latest_session(&groups) else {
            log::info!("No chat history for workspace {}", workspace_id);
            self.conversations.replace(workspace_id, Vec::new());
            return Ok(());
        };

        let messages = to_messages(&latest.prompts, Utc::now());
        log::info!(
            "Loaded {} messages for workspace {} from session {}",
            messages.len(),
            workspace_id,
            latest.session_id
        );
        self.sessions
            .bind(workspace_id, latest.session_id.clone(), latest.documents.clone());
        self.conversations.replace(workspace_id, messages);
        Ok(())
    }

    /// Replaces the conversation of `record`'s workspace with the full session
    /// `record` belongs to, and binds that session.
    pub async fn load_session(&self, record: &PromptRecord) -> AdvisorResult<()> {
        log::info!(
            "Loading session {} for workspace {}",
            record.session_id,
            record.ws_id
        );
        let mut records = self
            .fetch_prompts(PromptQuery::session(record.ws_id, record.user_id, &record.session_id))
            .await?;
        sort_records(&mut records);

        let documents = collect_document_names(records.iter().map(|p| p.response_text.as_str()));
        let messages = to_messages(&records, Utc::now());

        self.conversations.replace(record.ws_id, messages);
        self.sessions
            .bind(record.ws_id, record.session_id.clone(), documents);
        self.notifier.success("Loaded chat history");
        Ok(())
    }

    /// Past sessions of a workspace for the signed-in user, most recent first.
    pub async fn session_history(&self, workspace_id: WorkspaceId) -> AdvisorResult<Vec<SessionGroup>> {
        let identity = self.require_user().await?;
        let records = self
            .fetch_prompts(PromptQuery::workspace(workspace_id, identity.user_id()))
            .await?;
        Ok(rank_sessions(group_by_session(records)))
    }

    pub(crate) async fn fetch_prompts(&self, query: PromptQuery) -> AdvisorResult<Vec<PromptRecord>> {
        log::debug!("Fetching prompts for {:?}", query);
        self.checked(self.backend.list_prompts(&query).await, HISTORY_LOAD_FAILED)
    }

    /// Sends a question from the signed-in user in `workspace_id`.
    ///
    /// The question is appended before anything else happens and stays even
    /// when the send fails. Failures become a bot message carrying the reason;
    /// only a missing identity is returned as an error, and in that case
    /// nothing is appended.
    ///
    /// Sends for one workspace run one at a time in submission order, so each
    /// question is directly followed by its answer.
    pub async fn send(&self, workspace_id: WorkspaceId, text: &str) -> AdvisorResult<SendOutcome> {
        let identity = self.require_user().await?;
        let _permit = self.send_slots.acquire(workspace_id).await;
        self.clear_error().await;

        self.conversations
            .append(workspace_id, ChatMessage::user(text, Utc::now()));

        let Some(session_id) = self.sessions.session_id(workspace_id) else {
            let reason = AdvisorError::NoSession { workspace_id }.to_string();
            log::warn!("Send in workspace {} without a bound session", workspace_id);
            return Ok(self.fail_send(workspace_id, reason).await);
        };

        let answer = match self.llm.query(text, &session_id).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("LLM query failed for workspace {}: {:?}", workspace_id, e);
                return Ok(self.fail_send(workspace_id, e.to_string()).await);
            }
        };

        let message = ChatMessage::bot(answer.answer.clone(), Some(answer.sources), Utc::now());
        self.conversations.append(workspace_id, message.clone());

        let record = PromptRecord {
            prompt_id: None,
            prompt_text: text.to_string(),
            response_text: answer.answer,
            model_name: self.prompt_defaults.model_name.clone(),
            temperature: self.prompt_defaults.temperature,
            token_usage: self.prompt_defaults.token_usage,
            ws_id: workspace_id,
            user_id: identity.user_id(),
            session_id,
            is_active: true,
            workspace: None,
            user: None,
        };
        match self.backend.save_prompt(&record).await {
            Ok(response) if !response.success => {
                log::warn!("Prompt history save was rejected: {}", response.message)
            }
            Ok(_) => log::debug!("Saved prompt for workspace {}", workspace_id),
            Err(e) => log::error!("Failed to save prompt history: {:?}", e),
        }

        Ok(SendOutcome::Answered(message))
    }

    async fn fail_send(&self, workspace_id: WorkspaceId, reason: String) -> SendOutcome {
        let reason = if reason.trim().is_empty() {
            GENERIC_APOLOGY.to_string()
        } else {
            reason
        };
        let message = ChatMessage::bot(reason.clone(), None, Utc::now());
        self.conversations.append(workspace_id, message.clone());
        self.record_error(reason.clone()).await;
        SendOutcome::Failed { reason, message }
    }
}
