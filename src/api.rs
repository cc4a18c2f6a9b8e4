use crate::models::{
    ApiResponse, AuthResponse, Document, LlmAnswer, PromptQuery, PromptRecord, SigninRequest,
    SignupRequest, UploadFile, UploadReceipt, UserForManagement, UserId, Workspace, WorkspaceId,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_PREFIX: &str = "/api/v1";
const GENERIC_API_ERROR: &str = "An error occurred";

/// The workspace/document/prompt/user REST backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_workspaces(&self, user_id: Option<UserId>) -> Result<ApiResponse<Vec<Workspace>>>;
    async fn create_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>>;
    async fn update_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>>;
    async fn delete_workspace(&self, ws_id: WorkspaceId) -> Result<ApiResponse<Option<Workspace>>>;

    /// Documents of a workspace. A response that is not a successful list is
    /// treated as "no documents".
    async fn list_documents(&self, ws_id: Option<WorkspaceId>, user_id: Option<UserId>) -> Result<Vec<Document>>;
    async fn create_document(&self, document: &Document) -> Result<ApiResponse<Option<Document>>>;
    async fn delete_document(&self, doc_id: i64) -> Result<ApiResponse<Option<Document>>>;

    async fn save_prompt(&self, prompt: &PromptRecord) -> Result<ApiResponse<Option<PromptRecord>>>;
    async fn list_prompts(&self, query: &PromptQuery) -> Result<ApiResponse<Vec<PromptRecord>>>;

    async fn sign_in(&self, request: &SigninRequest) -> Result<AuthResponse>;
    async fn sign_up(&self, request: &SignupRequest) -> Result<AuthResponse>;
    async fn list_users(&self, role_id: i64) -> Result<Vec<UserForManagement>>;
    async fn update_user(&self, user: &UserForManagement) -> Result<AuthResponse>;
}

/// The document-grounded LLM service.
#[async_trait]
pub trait LlmApiProvider: Send + Sync {
    /// Uploads a PDF; `session_key` scopes the upload on the service side.
    async fn upload_document(&self, file: &UploadFile, session_key: &str) -> Result<UploadReceipt>;
    async fn query(&self, question: &str, session_id: &str) -> Result<LlmAnswer>;
}

// Decodes a 2xx body as `T`; anything else becomes an error carrying the
// backend's `message` when it sent one.
async fn handle_response<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<Failed to read error body>".to_string());
        log::error!("{} failed with status {}: {}", what, status, error_body);
        let message = serde_json::from_str::<serde_json::Value>(&error_body)
            .ok()
            .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_API_ERROR.to_string());
        return Err(anyhow::anyhow!(message));
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("Malformed response from {}", what))
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

// --- Backend REST implementation ---

pub struct RestBackend {
    client: Client,
    base_url: String,
}

impl RestBackend {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: format!("{}{}", api_base_url.trim_end_matches('/'), API_PREFIX),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[async_trait]
impl BackendApi for RestBackend {
    async fn list_workspaces(&self, user_id: Option<UserId>) -> Result<ApiResponse<Vec<Workspace>>> {
        log::debug!("Fetching workspaces for user {:?}", user_id);
        let mut request = self.client.get(self.url("workspaces"));
        if let Some(user_id) = user_id {
            request = request.query(&[("user_id", user_id)]);
        }
        let response = request.send().await.context("Failed to fetch workspaces")?;
        handle_response(response, "GET /workspaces").await
    }

    async fn create_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>> {
        log::info!("Creating workspace '{}'", workspace.ws_name);
        let body = Workspace {
            is_active: true,
            ..workspace.clone()
        };
        let response = self
            .client
            .post(self.url("workspaces"))
            .json(&body)
            .send()
            .await
            .context("Failed to create workspace")?;
        handle_response(response, "POST /workspaces").await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<ApiResponse<Option<Workspace>>> {
        log::info!("Updating workspace {:?}", workspace.ws_id);
        let response = self
            .client
            .put(self.url("workspaces"))
            .json(workspace)
            .send()
            .await
            .context("Failed to update workspace")?;
        handle_response(response, "PUT /workspaces").await
    }

    async fn delete_workspace(&self, ws_id: WorkspaceId) -> Result<ApiResponse<Option<Workspace>>> {
        log::warn!("Deleting workspace {}", ws_id);
        let response = self
            .client
            .delete(self.url("workspaces"))
            .json(&json!({ "ws_id": ws_id, "is_active": false }))
            .send()
            .await
            .context("Failed to delete workspace")?;
        handle_response(response, "DELETE /workspaces").await
    }

    async fn list_documents(&self, ws_id: Option<WorkspaceId>, user_id: Option<UserId>) -> Result<Vec<Document>> {
        let mut params: Vec<(&str, i64)> = Vec::new();
        if let Some(ws_id) = ws_id {
            params.push(("ws_id", ws_id));
        }
        if let Some(user_id) = user_id {
            params.push(("user_id", user_id));
        }
        let response = self
            .client
            .get(self.url("ws-docs"))
            .query(&params)
            .send()
            .await
            .context("Failed to fetch documents")?;
        let envelope: ApiResponse<serde_json::Value> =
            handle_response(response, "GET /ws-docs").await?;

        if envelope.success && envelope.data.is_array() {
            let documents: Vec<Document> = serde_json::from_value(envelope.data)
                .context("Malformed document list")?;
            log::debug!("Fetched {} documents for workspace {:?}", documents.len(), ws_id);
            Ok(documents)
        } else {
            log::warn!("Document list response did not match the expected format");
            Ok(Vec::new())
        }
    }

    async fn create_document(&self, document: &Document) -> Result<ApiResponse<Option<Document>>> {
        log::info!("Registering document '{}' in workspace {}", document.ws_doc_name, document.ws_id);
        let response = self
            .client
            .post(self.url("ws-docs"))
            .json(document)
            .send()
            .await
            .context("Failed to upload document")?;
        handle_response(response, "POST /ws-docs").await
    }

    async fn delete_document(&self, doc_id: i64) -> Result<ApiResponse<Option<Document>>> {
        log::warn!("Deleting document {}", doc_id);
        let response = self
            .client
            .delete(self.url("ws-docs"))
            .json(&json!({ "ws_doc_id": doc_id, "is_active": false }))
            .send()
            .await
            .context("Failed to delete document")?;
        handle_response(response, "DELETE /ws-docs").await
    }

    async fn save_prompt(&self, prompt: &PromptRecord) -> Result<ApiResponse<Option<PromptRecord>>> {
        log::debug!("Saving prompt for workspace {} session {}", prompt.ws_id, prompt.session_id);
        let response = self
            .client
            .post(self.url("prompts"))
            .json(prompt)
            .send()
            .await
            .context("Failed to save prompt history")?;
        handle_response(response, "POST /prompts").await
    }

    async fn list_prompts(&self, query: &PromptQuery) -> Result<ApiResponse<Vec<PromptRecord>>> {
        log::debug!("Fetching prompts: {:?}", query);
        let response = self
            .client
            .get(self.url("prompts"))
            .query(query)
            .send()
            .await
            .context("Failed to fetch prompt history")?;
        handle_response(response, "GET /prompts").await
    }

    async fn sign_in(&self, request: &SigninRequest) -> Result<AuthResponse> {
        log::info!("Signing in {}", request.user_email);
        let response = self
            .client
            .post(self.url("signin"))
            .json(request)
            .send()
            .await
            .context("Failed to sign in")?;
        handle_response(response, "POST /signin").await
    }

    async fn sign_up(&self, request: &SignupRequest) -> Result<AuthResponse> {
        log::info!("Signing up {}", request.user_email);
        let response = self
            .client
            .post(self.url("signup"))
            .json(request)
            .send()
            .await
            .context("Failed to sign up")?;
        handle_response(response, "POST /signup").await
    }

    async fn list_users(&self, role_id: i64) -> Result<Vec<UserForManagement>> {
        let response = self
            .client
            .get(self.url("user"))
            .query(&[("role_id", role_id)])
            .send()
            .await
            .context("Failed to fetch users")?;
        let envelope: DataEnvelope<Vec<UserForManagement>> =
            handle_response(response, "GET /user").await?;
        Ok(envelope.data)
    }

    async fn update_user(&self, user: &UserForManagement) -> Result<AuthResponse> {
        log::info!("Updating user {}", user.user_id);
        let response = self
            .client
            .put(self.url("user"))
            .json(user)
            .send()
            .await
            .context("Failed to update user")?;
        handle_response(response, "PUT /user").await
    }
}

// --- LLM service implementation ---

pub struct HttpLlmProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmProvider {
    pub fn new(llm_api_base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: llm_api_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl LlmApiProvider for HttpLlmProvider {
    async fn upload_document(&self, file: &UploadFile, session_key: &str) -> Result<UploadReceipt> {
        log::info!(
            "Uploading '{}' ({} bytes) to LLM service under key {}",
            file.file_name,
            file.bytes.len(),
            session_key
        );
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str("application/pdf")
            .context("Invalid upload mime type")?;
        let form = Form::new()
            .part("files", part)
            .text("session_id", session_key.to_string());

        let response = self
            .authorize(self.client.post(format!("{}/upload-pdf", self.base_url)))
            .multipart(form)
            .send()
            .await
            .context("Failed to upload document to LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            log::error!("LLM upload failed with status {}", status);
            return Err(anyhow::anyhow!("Failed to upload document to LLM API"));
        }
        response
            .json::<UploadReceipt>()
            .await
            .context("Malformed upload response from LLM API")
    }

    async fn query(&self, question: &str, session_id: &str) -> Result<LlmAnswer> {
        log::info!("Querying LLM service for session {}", session_id);
        let response = self
            .authorize(self.client.post(format!("{}/ask-question", self.base_url)))
            .json(&json!({ "session_id": session_id, "question": question }))
            .send()
            .await
            .context("Failed to query LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!("LLM query failed with status {}: {}", status, error_body);
            return Err(anyhow::anyhow!("Failed to query LLM API"));
        }
        response
            .json::<LlmAnswer>()
            .await
            .context("Malformed answer from LLM API")
    }
}
