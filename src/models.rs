use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub type WorkspaceId = i64;
pub type UserId = i64;
pub type PromptId = i64;

pub const SUPER_ADMIN_ROLE: i64 = 1;
pub const GUEST_ROLE: i64 = 2;

// --- Backend envelope ---

// Workspace, document and prompt endpoints wrap their payload like this.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: T,
}

// --- Workspaces and documents ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Workspace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<WorkspaceId>,
    pub ws_name: String,
    pub user_id: UserId,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_doc_id: Option<i64>,
    #[serde(default)]
    pub ws_doc_path: String,
    pub ws_doc_name: String,
    #[serde(default)]
    pub ws_doc_extn: String,
    #[serde(default)]
    pub ws_doc_for: String,
    pub ws_id: WorkspaceId,
    pub user_id: UserId,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Document {
    /// Metadata row for a freshly uploaded file. The extension falls back to
    /// "pdf" when the name has none.
    pub fn for_upload(file_name: &str, ws_id: WorkspaceId, user_id: UserId) -> Self {
        let extension = match file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_string(),
            _ => "pdf".to_string(),
        };
        Self {
            ws_doc_id: None,
            ws_doc_path: String::new(),
            ws_doc_name: file_name.to_string(),
            ws_doc_extn: extension,
            ws_doc_for: String::new(),
            ws_id,
            user_id,
            is_active: true,
        }
    }
}

// A workspace as shown in the sidebar, with its document list attached.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkspaceWithDocuments {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub documents: Vec<Document>,
    pub file_count: usize,
}

// --- Prompt history ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorkspaceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<WorkspaceId>,
    pub ws_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub user_name: String,
}

/// One persisted question/answer turn.
///
/// Records carry no timestamp; ordering within a session comes from
/// `prompt_id` alone, with a missing id sorting as 0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PromptRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<PromptId>,
    pub prompt_text: String,
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub model_name: String,
    // The history endpoints return this as a numeric string.
    #[serde(default, deserialize_with = "number_or_string")]
    pub temperature: f64,
    #[serde(default)]
    pub token_usage: i64,
    pub ws_id: WorkspaceId,
    pub user_id: UserId,
    pub session_id: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, rename = "workspaces", skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceRef>,
    #[serde(default, rename = "users", skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
}

impl PromptRecord {
    pub fn order_key(&self) -> PromptId {
        self.prompt_id.unwrap_or(0)
    }
}

// Filter for `GET /prompts`. Unset fields are left out of the query string.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct PromptQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<WorkspaceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<PromptId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl PromptQuery {
    pub fn workspace(ws_id: WorkspaceId, user_id: UserId) -> Self {
        Self {
            ws_id: Some(ws_id),
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn session(ws_id: WorkspaceId, user_id: UserId, session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Self::workspace(ws_id, user_id)
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

// --- LLM service ---

/// A citation attached to an answer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Source {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub file: String,
    // Some answers send `"page": null` for citations without a page.
    #[serde(default, deserialize_with = "null_as_default")]
    pub page: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LlmAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u32>,
}

// A file picked for upload, held in memory.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.file_name.to_ascii_lowercase().ends_with(".pdf")
    }
}

// --- Conversation ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Bot,
}

// Represents a single message in a workspace conversation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            kind: MessageKind::User,
            timestamp,
            sources: None,
        }
    }

    pub fn bot(
        content: impl Into<String>,
        sources: Option<Vec<Source>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            kind: MessageKind::Bot,
            timestamp,
            sources,
        }
    }

    /// Rebuilds the user/bot pair for a stored record. The timestamps are
    /// synthetic: the question is stamped one second before `now`.
    pub fn pair_from_record(
        record: &PromptRecord,
        sources: Vec<Source>,
        now: DateTime<Utc>,
    ) -> [Self; 2] {
        [
            Self::user(record.prompt_text.clone(), now - Duration::seconds(1)),
            Self::bot(record.response_text.clone(), Some(sources), now),
        ]
    }
}

// --- Auth ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoleRef {
    pub role_id: i64,
    #[serde(default)]
    pub role_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_mobile: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pi_roles: Option<Vec<RoleRef>>,
}

impl User {
    /// First role attached to the account, guest when none is present.
    pub fn primary_role(&self) -> i64 {
        self.pi_roles
            .as_ref()
            .and_then(|roles| roles.first())
            .map(|role| role.role_id)
            .unwrap_or(GUEST_ROLE)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SigninRequest {
    pub user_email: String,
    pub user_pwd: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SignupRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_pwd: String,
    pub user_mobile: String,
    pub gender: String,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "statusCode")]
    pub status_code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Vec<User>>,
    #[serde(default, rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(default, rename = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub is_app_valid: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserForManagement {
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    #[serde(default)]
    pub user_mobile: String,
    #[serde(default)]
    pub gender: String,
    pub is_active: bool,
}

// The signed-in user as held in memory and mirrored to the local store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Identity {
    pub user: User,
    pub role_id: i64,
    pub expiry_date: Option<String>,
    pub is_app_valid: bool,
}

impl Identity {
    pub fn user_id(&self) -> UserId {
        self.user.user_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.role_id == SUPER_ADMIN_ROLE
    }
}

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
