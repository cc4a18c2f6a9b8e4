//! User management for super admins.

use crate::advisor::Advisor;
use crate::error::{AdvisorError, AdvisorResult};
use crate::history::{group_by_session, rank_sessions, SessionGroup};
use crate::models::{Identity, PromptQuery, UserForManagement, UserId};

impl Advisor {
    pub async fn list_users(&self, role_id: i64) -> AdvisorResult<Vec<UserForManagement>> {
        self.require_super_admin().await?;
        self.backend.list_users(role_id).await.map_err(|e| {
            log::error!("Error fetching users: {:?}", e);
            self.notifier.error("Failed to load users");
            AdvisorError::Transport(e)
        })
    }

    pub async fn update_user(&self, user: UserForManagement) -> AdvisorResult<()> {
        self.require_super_admin().await?;
        let response = self.backend.update_user(&user).await.map_err(|e| {
            log::error!("Error updating user {}: {:?}", user.user_id, e);
            self.notifier.error("Failed to update user");
            AdvisorError::Transport(e)
        })?;
        if !response.success {
            let err = AdvisorError::rejected(response.msg, "Failed to update user");
            self.notifier.error(err.to_string());
            return Err(err);
        }
        self.notifier.success("User updated successfully");
        Ok(())
    }

    /// Every session a user has held across all workspaces, most recent first.
    pub async fn user_chat_history(&self, user_id: UserId) -> AdvisorResult<Vec<SessionGroup>> {
        self.require_super_admin().await?;
        let records = self.fetch_prompts(PromptQuery::user(user_id)).await?;
        Ok(rank_sessions(group_by_session(records)))
    }

    async fn require_super_admin(&self) -> AdvisorResult<Identity> {
        let identity = self.require_user().await?;
        if !identity.is_super_admin() {
            log::warn!("User {} is not allowed to manage users", identity.user_id());
            let err = AdvisorError::Forbidden;
            self.notifier.error(err.to_string());
            return Err(err);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record;
    use crate::models::{PromptRecord, SUPER_ADMIN_ROLE};
    use crate::testing::{identity, signed_in_advisor, MockBackend, MockLlm};

    fn managed(user_id: UserId, name: &str) -> UserForManagement {
        UserForManagement {
            user_id,
            user_name: name.to_string(),
            user_email: format!("{}@example.com", name),
            user_mobile: String::new(),
            gender: "OTHER".to_string(),
            is_active: true,
        }
    }

    async fn admin(backend: std::sync::Arc<MockBackend>) -> Advisor {
        let advisor = signed_in_advisor(backend, MockLlm::new(), 1).await;
        *advisor.identity.write().await = Some(identity(1, SUPER_ADMIN_ROLE));
        advisor
    }

    #[tokio::test]
    async fn guests_cannot_manage_users() {
        let advisor = signed_in_advisor(MockBackend::new(), MockLlm::new(), 7).await;
        assert!(matches!(advisor.list_users(2).await, Err(AdvisorError::Forbidden)));
        assert!(matches!(
            advisor.user_chat_history(7).await,
            Err(AdvisorError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn admin_deactivates_a_user() {
        let backend = MockBackend::new();
        backend.users.lock().unwrap().push(managed(7, "dana"));
        let advisor = admin(backend.clone()).await;

        let mut users = advisor.list_users(2).await.unwrap();
        assert_eq!(users.len(), 1);

        users[0].is_active = false;
        advisor.update_user(users.remove(0)).await.unwrap();
        assert!(!backend.users.lock().unwrap()[0].is_active);
    }

    #[tokio::test]
    async fn chat_history_spans_workspaces_and_ranks_sessions() {
        let other_workspace = PromptRecord {
            ws_id: 2,
            ..record(Some(8), "s-2", "from pricing.pdf")
        };
        let backend = MockBackend::with_prompts(vec![
            record(Some(3), "s-1", "first"),
            other_workspace,
            record(Some(1), "s-1", "zeroth"),
        ]);
        let advisor = admin(backend.clone()).await;

        let groups = advisor.user_chat_history(7).await.unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].session_id, "s-2");
        assert_eq!(groups[0].documents, vec!["pricing.pdf".to_string()]);
        assert_eq!(groups[1].prompts[0].prompt_id, Some(1));
        assert_eq!(
            backend.prompt_queries.lock().unwrap()[0],
            PromptQuery::user(7)
        );
    }
}
