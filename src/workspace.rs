use crate::advisor::Advisor;
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{Document, UploadFile, Workspace, WorkspaceId, WorkspaceWithDocuments};
use futures::future::join_all;

const NOT_INDEXED: &str = "The document was saved but could not be prepared for chat";

impl Advisor {
    /// Reloads the signed-in user's workspaces along with their documents.
    ///
    /// Document lists are fetched concurrently. A workspace whose list cannot
    /// be fetched is kept with no documents.
    pub async fn refresh_workspaces(&self) -> AdvisorResult<Vec<WorkspaceWithDocuments>> {
        let identity = self.require_user().await?;
        let user_id = identity.user_id();
        let workspaces = self.checked(
            self.backend.list_workspaces(Some(user_id)).await,
            "Failed to load workspaces",
        )?;

        let fetches = workspaces.into_iter().map(move |workspace| async move {
            let documents = match workspace.ws_id {
                Some(ws_id) => match self.backend.list_documents(Some(ws_id), Some(user_id)).await {
                    Ok(documents) => documents,
                    Err(e) => {
                        log::error!("Error fetching documents for workspace {}: {:?}", ws_id, e);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            WorkspaceWithDocuments {
                file_count: documents.len(),
                workspace,
                documents,
            }
        });
        let loaded = join_all(fetches).await;

        log::info!("Loaded {} workspaces for user {}", loaded.len(), user_id);
        *self.workspaces.write().await = loaded.clone();
        Ok(loaded)
    }

    pub async fn create_workspace(&self, name: &str) -> AdvisorResult<Workspace> {
        let identity = self.require_user().await?;
        let name = name.trim();
        if self.name_taken(name, None).await {
            return Err(self.duplicate(name));
        }

        let request = Workspace {
            ws_id: None,
            ws_name: name.to_string(),
            user_id: identity.user_id(),
            is_active: true,
        };
        let created = self.checked(
            self.backend.create_workspace(&request).await,
            "Failed to create workspace",
        )?;
        self.notifier.success("Workspace created successfully");
        self.refresh_quietly().await;
        Ok(created.unwrap_or(request))
    }

    /// Renames a workspace. The duplicate-name check only runs when the name
    /// actually changes.
    pub async fn update_workspace(&self, workspace: Workspace) -> AdvisorResult<Workspace> {
        let identity = self.require_user().await?;
        let name = workspace.ws_name.trim().to_string();

        let current_name = self
            .workspaces
            .read()
            .await
            .iter()
            .find(|ws| ws.workspace.ws_id == workspace.ws_id)
            .map(|ws| ws.workspace.ws_name.clone());
        let renamed = current_name.map_or(true, |current| !current.eq_ignore_ascii_case(&name));
        if renamed && self.name_taken(&name, workspace.ws_id).await {
            return Err(self.duplicate(&name));
        }

        let request = Workspace {
            ws_name: name,
            user_id: identity.user_id(),
            ..workspace
        };
        let updated = self.checked(
            self.backend.update_workspace(&request).await,
            "Failed to update workspace",
        )?;
        self.notifier.success("Workspace updated successfully");
        self.refresh_quietly().await;
        Ok(updated.unwrap_or(request))
    }

    /// Soft-deletes a workspace and drops its conversation, binding and
    /// selection.
    pub async fn delete_workspace(&self, workspace_id: WorkspaceId) -> AdvisorResult<()> {
        self.require_user().await?;
        self.checked(
            self.backend.delete_workspace(workspace_id).await,
            "Failed to delete workspace",
        )?;
        self.forget_workspace(workspace_id).await;
        self.notifier.success("Workspace deleted successfully");
        self.refresh_quietly().await;
        Ok(())
    }

    /// Makes `workspace_id` the active workspace and resumes its latest
    /// session.
    pub async fn select_workspace(&self, workspace_id: WorkspaceId) -> AdvisorResult<()> {
        let identity = self.require_user().await?;
        *self.selected.write().await = Some(workspace_id);
        self.load_latest(workspace_id, identity.user_id()).await
    }

    /// Uploads a PDF into the selected workspace.
    ///
    /// The LLM service indexes the file under a new session which replaces the
    /// workspace's binding, and the conversation starts over. The document
    /// metadata is recorded with the backend even when the LLM upload fails.
    pub async fn upload_document(&self, file: UploadFile) -> AdvisorResult<Document> {
        let identity = self.require_user().await?;
        let Some(workspace_id) = self.selected_workspace().await else {
            let err = AdvisorError::NoWorkspaceSelected;
            self.notifier.error(err.to_string());
            return Err(err);
        };
        if !file.is_pdf() {
            let err = AdvisorError::UnsupportedFile(file.file_name.clone());
            self.notifier.error(err.to_string());
            return Err(err);
        }

        log::info!(
            "Uploading {} ({} bytes) to workspace {}",
            file.file_name,
            file.bytes.len(),
            workspace_id
        );
        let session_key = workspace_id.to_string();
        match self.llm.upload_document(&file, &session_key).await {
            Ok(receipt) if receipt.success => {
                let session_id = receipt.session_id.unwrap_or(session_key);
                self.sessions
                    .bind(workspace_id, session_id, vec![file.file_name.clone()]);
                self.conversations.replace(workspace_id, Vec::new());
            }
            Ok(receipt) => {
                log::warn!(
                    "LLM service did not accept {}: {}",
                    file.file_name,
                    receipt.message.unwrap_or_default()
                );
                self.notifier.info(NOT_INDEXED);
            }
            Err(e) => {
                log::error!("Error uploading {} to the LLM service: {:?}", file.file_name, e);
                self.notifier.info(NOT_INDEXED);
            }
        }

        let document = Document::for_upload(&file.file_name, workspace_id, identity.user_id());
        let created = self.checked(
            self.backend.create_document(&document).await,
            "Failed to upload document",
        )?;
        self.notifier.success("Document uploaded successfully");
        self.refresh_quietly().await;
        Ok(created.unwrap_or(document))
    }

    pub async fn delete_document(&self, doc_id: i64) -> AdvisorResult<()> {
        self.require_user().await?;
        self.checked(
            self.backend.delete_document(doc_id).await,
            "Failed to delete document",
        )?;
        self.notifier.success("Document deleted successfully");
        self.refresh_quietly().await;
        Ok(())
    }

    async fn name_taken(&self, name: &str, except: Option<WorkspaceId>) -> bool {
        self.workspaces.read().await.iter().any(|ws| {
            except.map_or(true, |id| ws.workspace.ws_id != Some(id))
                && ws.workspace.ws_name.trim().eq_ignore_ascii_case(name)
        })
    }

    fn duplicate(&self, name: &str) -> AdvisorError {
        let err = AdvisorError::DuplicateWorkspace(name.to_string());
        self.notifier.error(err.to_string());
        err
    }

    // The mutation already succeeded; a failed reload only leaves the cached
    // list stale.
    async fn refresh_quietly(&self) {
        if let Err(e) = self.refresh_workspaces().await {
            log::warn!("Workspace list refresh failed: {}", e);
        }
    }
}
