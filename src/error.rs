use thiserror::Error;

use crate::models::WorkspaceId;

/// Errors surfaced by the advisor operations.
///
/// The HTTP and storage layers work in `anyhow::Result`; their failures arrive
/// here wrapped as `Transport` or `Storage`.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("You do not have access to this section")]
    Forbidden,

    #[error("Please select a workspace first")]
    NoWorkspaceSelected,

    #[error("No session found. Please upload a document first.")]
    NoSession { workspace_id: WorkspaceId },

    #[error("Only PDF files are supported")]
    UnsupportedFile(String),

    #[error("A workspace with this name already exists.")]
    DuplicateWorkspace(String),

    #[error("You have consumed the free tier of Prototype, please connect with Product team to enable the features.")]
    AppNotEnabled,

    /// The backend answered but reported `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl AdvisorError {
    pub fn rejected(message: impl Into<String>, fallback: &str) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::Rejected(fallback.to_string())
        } else {
            Self::Rejected(message)
        }
    }

    /// Local preconditions are known before any network call is made.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated
                | Self::Forbidden
                | Self::NoWorkspaceSelected
                | Self::NoSession { .. }
                | Self::UnsupportedFile(_)
                | Self::DuplicateWorkspace(_)
        )
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
