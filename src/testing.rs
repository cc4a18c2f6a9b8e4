//! In-memory stand-ins for the backend and LLM service used by unit tests.

use crate::advisor::Advisor;
use crate::api::{BackendApi, LlmApiProvider};
use crate::config::PromptDefaults;
use crate::models::{
    ApiResponse, AuthResponse, Document, Identity, LlmAnswer, PromptQuery, PromptRecord, RoleRef,
    SigninRequest, SignupRequest, UploadFile, UploadReceipt, User, UserForManagement, UserId,
    Workspace, WorkspaceId,
};
use crate::storage::LocalStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MockBackend {
    pub workspaces: Mutex<Vec<Workspace>>,
    pub documents: Mutex<Vec<Document>>,
    pub prompts: Mutex<Vec<PromptRecord>>,
    pub saved_prompts: Mutex<Vec<PromptRecord>>,
    pub prompt_queries: Mutex<Vec<PromptQuery>>,
    pub users: Mutex<Vec<UserForManagement>>,
    pub sign_in_response: Mutex<Option<AuthResponse>>,
    pub fail_prompt_list: AtomicBool,
    pub reject_prompt_list: AtomicBool,
    pub fail_prompt_save: AtomicBool,
    pub failing_document_lists: Mutex<Vec<WorkspaceId>>,
    next_id: AtomicI64,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.next_id.store(100, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn with_prompts(prompts: Vec<PromptRecord>) -> Arc<Self> {
        let backend = Self::new();
        *backend.prompts.lock().unwrap() = prompts;
        backend
    }

    pub fn add_workspace(&self, ws_id: WorkspaceId, name: &str, user_id: UserId) {
        self.workspaces.lock().unwrap().push(Workspace {
            ws_id: Some(ws_id),
            ws_name: name.to_string(),
            user_id,
            is_active: true,
        });
    }

    pub fn prompt_list_calls(&self) -> usize {
        self.prompt_queries.lock().unwrap().len()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn ok<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        message: String::new(),
        data,
    }
}

fn rejected<T>(data: T, message: &str) -> ApiResponse<T> {
    ApiResponse {
        success: false,
        message: message.to_string(),
        data,
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn list_workspaces(&self, user_id: Option<UserId>) -> Result<ApiResponse<Vec<Workspace>>> {
        let workspaces = self
            .workspaces
            .lock()
            .unwrap()
            .iter()
            .filter(|ws| user_id.map_or(true, |id| ws.user_id == id))
            .cloned()
            .collect();
        Ok(ok(workspaces))
    }

    async fn create_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>> {
        let created = Workspace {
            ws_id: Some(self.next_id()),
            ..workspace.clone()
        };
        self.workspaces.lock().unwrap().push(created.clone());
        Ok(ok(Some(created)))
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>> {
        let mut workspaces = self.workspaces.lock().unwrap();
        match workspaces.iter_mut().find(|ws| ws.ws_id == workspace.ws_id) {
            Some(existing) => {
                *existing = workspace.clone();
                Ok(ok(Some(workspace.clone())))
            }
            None => Ok(rejected(None, "Workspace not found")),
        }
    }

    async fn delete_workspace(&self, ws_id: WorkspaceId) -> Result<ApiResponse<Option<Workspace>>> {
        let mut workspaces = self.workspaces.lock().unwrap();
        let before = workspaces.len();
        workspaces.retain(|ws| ws.ws_id != Some(ws_id));
        if workspaces.len() < before {
            Ok(ok(None))
        } else {
            Ok(rejected(None, ""))
        }
    }

    async fn list_documents(&self, ws_id: Option<WorkspaceId>, _user_id: Option<UserId>) -> Result<Vec<Document>> {
        if let Some(id) = ws_id {
            if self.failing_document_lists.lock().unwrap().contains(&id) {
                anyhow::bail!("Failed to fetch documents");
            }
        }
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|doc| ws_id.map_or(true, |id| doc.ws_id == id))
            .cloned()
            .collect())
    }

    async fn create_document(&self, document: &Document) -> Result<ApiResponse<Option<Document>>> {
        let created = Document {
            ws_doc_id: Some(self.next_id()),
            ..document.clone()
        };
        self.documents.lock().unwrap().push(created.clone());
        Ok(ok(Some(created)))
    }

    async fn delete_document(&self, doc_id: i64) -> Result<ApiResponse<Option<Document>>> {
        self.documents
            .lock()
            .unwrap()
            .retain(|doc| doc.ws_doc_id != Some(doc_id));
        Ok(ok(None))
    }

    async fn save_prompt(&self, prompt: &PromptRecord) -> Result<ApiResponse<Option<PromptRecord>>> {
        if self.fail_prompt_save.load(Ordering::SeqCst) {
            anyhow::bail!("Failed to save prompt history");
        }
        self.saved_prompts.lock().unwrap().push(prompt.clone());
        let stored = PromptRecord {
            prompt_id: Some(self.next_id()),
            ..prompt.clone()
        };
        self.prompts.lock().unwrap().push(stored.clone());
        Ok(ok(Some(stored)))
    }

    async fn list_prompts(&self, query: &PromptQuery) -> Result<ApiResponse<Vec<PromptRecord>>> {
        self.prompt_queries.lock().unwrap().push(query.clone());
        if self.fail_prompt_list.load(Ordering::SeqCst) {
            anyhow::bail!("Failed to fetch prompt history");
        }
        if self.reject_prompt_list.load(Ordering::SeqCst) {
            return Ok(rejected(Vec::new(), "History unavailable"));
        }
        let prompts = self
            .prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| query.ws_id.map_or(true, |id| p.ws_id == id))
            .filter(|p| query.user_id.map_or(true, |id| p.user_id == id))
            .filter(|p| query.session_id.as_ref().map_or(true, |id| &p.session_id == id))
            .cloned()
            .collect();
        Ok(ok(prompts))
    }

    async fn sign_in(&self, _request: &SigninRequest) -> Result<AuthResponse> {
        self.sign_in_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Invalid credentials"))
    }

    async fn sign_up(&self, _request: &SignupRequest) -> Result<AuthResponse> {
        Ok(AuthResponse {
            success: true,
            msg: "created".to_string(),
            ..AuthResponse::default()
        })
    }

    async fn list_users(&self, _role_id: i64) -> Result<Vec<UserForManagement>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn update_user(&self, user: &UserForManagement) -> Result<AuthResponse> {
        let mut users = self.users.lock().unwrap();
        if let Some(existing) = users.iter_mut().find(|u| u.user_id == user.user_id) {
            *existing = user.clone();
        }
        Ok(AuthResponse {
            success: true,
            ..AuthResponse::default()
        })
    }
}

pub struct MockLlm {
    pub answers: Mutex<VecDeque<Result<LlmAnswer, String>>>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub queries: Mutex<Vec<(String, String)>>,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub upload_result: Mutex<Result<UploadReceipt, String>>,
}

impl MockLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(VecDeque::new()),
            delays: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            upload_result: Mutex::new(Ok(UploadReceipt {
                success: true,
                session_id: Some("llm-session-1".to_string()),
                message: None,
                chunks: Some(3),
            })),
        })
    }

    pub fn push_answer(&self, answer: LlmAnswer) {
        self.answers.lock().unwrap().push_back(Ok(answer));
    }

    pub fn push_failure(&self, reason: &str) {
        self.answers.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmApiProvider for MockLlm {
    async fn upload_document(&self, file: &UploadFile, session_key: &str) -> Result<UploadReceipt> {
        self.uploads
            .lock()
            .unwrap()
            .push((file.file_name.clone(), session_key.to_string()));
        self.upload_result
            .lock()
            .unwrap()
            .clone()
            .map_err(|reason| anyhow::anyhow!(reason))
    }

    async fn query(&self, question: &str, session_id: &str) -> Result<LlmAnswer> {
        self.queries
            .lock()
            .unwrap()
            .push((question.to_string(), session_id.to_string()));
        let delay = self.delays.lock().unwrap().get(question).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(reason)) => Err(anyhow::anyhow!(reason)),
            None => Ok(LlmAnswer {
                answer: format!("answer to {}", question),
                sources: Vec::new(),
            }),
        }
    }
}

pub fn user(user_id: UserId, role_id: i64) -> User {
    User {
        user_id,
        user_name: format!("user{}", user_id),
        user_email: format!("user{}@example.com", user_id),
        user_mobile: String::new(),
        gender: "OTHER".to_string(),
        is_active: true,
        pi_roles: Some(vec![RoleRef {
            role_id,
            role_name: String::new(),
        }]),
    }
}

pub fn identity(user_id: UserId, role_id: i64) -> Identity {
    Identity {
        user: user(user_id, role_id),
        role_id,
        expiry_date: None,
        is_app_valid: true,
    }
}

pub async fn advisor(backend: Arc<MockBackend>, llm: Arc<MockLlm>) -> Advisor {
    let store = LocalStore::in_memory().await.unwrap();
    Advisor::new(backend, llm, store, PromptDefaults::default())
}

/// An advisor with `user_id` already signed in as a guest.
pub async fn signed_in_advisor(backend: Arc<MockBackend>, llm: Arc<MockLlm>, user_id: UserId) -> Advisor {
    let advisor = advisor(backend, llm).await;
    *advisor.identity.write().await = Some(identity(user_id, crate::models::GUEST_ROLE));
    advisor
}
