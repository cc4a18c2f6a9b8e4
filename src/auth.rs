use crate::advisor::Advisor;
use crate::error::{AdvisorError, AdvisorResult};
use crate::models::{AuthResponse, Identity, SigninRequest, SignupRequest, User, GUEST_ROLE};

const USER_KEY: &str = "user";
const ROLE_KEY: &str = "userRole";
const EXPIRY_KEY: &str = "expiryDate";
const APP_VALID_KEY: &str = "isAppValid";
const IDENTITY_KEYS: [&str; 4] = [USER_KEY, ROLE_KEY, EXPIRY_KEY, APP_VALID_KEY];

impl Advisor {
    /// Signs in and remembers the identity in the local store.
    ///
    /// Accounts whose app access has lapsed are refused even when the
    /// credentials are good.
    pub async fn sign_in(&self, email: &str, password: &str) -> AdvisorResult<Identity> {
        let request = SigninRequest {
            user_email: email.trim().to_string(),
            user_pwd: password.to_string(),
        };
        let response = match self.backend.sign_in(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Login error: {:?}", e);
                self.notifier
                    .error("Failed to sign in. Please check your credentials.");
                return Err(AdvisorError::Transport(e));
            }
        };

        let AuthResponse {
            success,
            msg,
            data,
            expiry_date,
            is_app_valid,
            ..
        } = response;
        let user = match data.and_then(|users| users.into_iter().next()) {
            Some(user) if success => user,
            _ => {
                let err = AdvisorError::rejected(msg, "Failed to sign in");
                self.notifier.error(err.to_string());
                return Err(err);
            }
        };
        if is_app_valid != Some(true) {
            let err = AdvisorError::AppNotEnabled;
            self.notifier.error(err.to_string());
            return Err(err);
        }

        let identity = Identity {
            role_id: user.primary_role(),
            user,
            expiry_date,
            is_app_valid: true,
        };
        self.save_identity(&identity).await?;
        *self.identity.write().await = Some(identity.clone());

        log::info!(
            "User {} signed in with role {}",
            identity.user_id(),
            identity.role_id
        );
        self.notifier.success("Signed in successfully");
        Ok(identity)
    }

    pub async fn sign_up(&self, request: SignupRequest) -> AdvisorResult<()> {
        let response = match self.backend.sign_up(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Signup error: {:?}", e);
                self.notifier
                    .error("Failed to create account. Please try again.");
                return Err(AdvisorError::Transport(e));
            }
        };
        if !response.success {
            let err = AdvisorError::rejected(response.msg, "Failed to create account");
            self.notifier.error(err.to_string());
            return Err(err);
        }
        self.notifier
            .success("Account created successfully. Please sign in.");
        Ok(())
    }

    /// Forgets the signed-in user along with every conversation, binding and
    /// cached workspace.
    pub async fn logout(&self) -> AdvisorResult<()> {
        *self.identity.write().await = None;
        *self.workspaces.write().await = Vec::new();
        *self.selected.write().await = None;
        self.clear_error().await;
        self.conversations.clear();
        self.sessions.clear();
        self.send_slots.clear();

        self.store
            .remove_all(&IDENTITY_KEYS)
            .await
            .map_err(AdvisorError::Storage)?;
        self.notifier.success("Logged out successfully");
        Ok(())
    }

    /// Loads a previously saved identity. Stored user data that no longer
    /// parses is discarded together with the other identity keys.
    pub async fn restore_identity(&self) -> AdvisorResult<Option<Identity>> {
        let Some(raw_user) = self.store.get(USER_KEY).await.map_err(AdvisorError::Storage)? else {
            log::debug!("No stored identity");
            return Ok(None);
        };

        let user: User = match serde_json::from_str(&raw_user) {
            Ok(user) => user,
            Err(e) => {
                log::error!("Failed to parse user data: {}", e);
                self.store
                    .remove_all(&IDENTITY_KEYS)
                    .await
                    .map_err(AdvisorError::Storage)?;
                return Ok(None);
            }
        };

        let role_id = self
            .stored(ROLE_KEY)
            .await?
            .and_then(|role| role.trim().parse().ok())
            .unwrap_or(GUEST_ROLE);
        let expiry_date = self.stored(EXPIRY_KEY).await?;
        let is_app_valid = self
            .stored(APP_VALID_KEY)
            .await?
            .map_or(true, |valid| valid == "true");

        let identity = Identity {
            user,
            role_id,
            expiry_date,
            is_app_valid,
        };
        log::info!("Restored identity for user {}", identity.user_id());
        *self.identity.write().await = Some(identity.clone());
        Ok(Some(identity))
    }

    async fn stored(&self, key: &str) -> AdvisorResult<Option<String>> {
        self.store.get(key).await.map_err(AdvisorError::Storage)
    }

    async fn save_identity(&self, identity: &Identity) -> AdvisorResult<()> {
        let user = serde_json::to_string(&identity.user)
            .map_err(|e| AdvisorError::Storage(e.into()))?;
        let writes = async {
            self.store.set(USER_KEY, &user).await?;
            self.store
                .set(ROLE_KEY, &identity.role_id.to_string())
                .await?;
            match &identity.expiry_date {
                Some(expiry) => self.store.set(EXPIRY_KEY, expiry).await?,
                None => self.store.remove(EXPIRY_KEY).await?,
            }
            self.store
                .set(APP_VALID_KEY, &identity.is_app_valid.to_string())
                .await
        };
        writes.await.map_err(AdvisorError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record;
    use crate::models::SUPER_ADMIN_ROLE;
    use crate::notify::NoticeLevel;
    use crate::testing::{advisor, signed_in_advisor, user, MockBackend, MockLlm};

    fn accepted(role_id: i64, is_app_valid: Option<bool>) -> AuthResponse {
        AuthResponse {
            success: true,
            status_code: "200".to_string(),
            data: Some(vec![user(3, role_id)]),
            access_token: Some("token".to_string()),
            expiry_date: Some("2026-12-31".to_string()),
            is_app_valid,
            ..AuthResponse::default()
        }
    }

    #[tokio::test]
    async fn sign_in_saves_identity_to_the_local_store() {
        let backend = MockBackend::new();
        *backend.sign_in_response.lock().unwrap() = Some(accepted(SUPER_ADMIN_ROLE, Some(true)));
        let advisor = advisor(backend, MockLlm::new()).await;

        let identity = advisor.sign_in("user3@example.com", "secret").await.unwrap();

        assert!(identity.is_super_admin());
        assert_eq!(advisor.current_user_id().await, Some(3));
        assert_eq!(advisor.store.get("userRole").await.unwrap().as_deref(), Some("1"));
        assert_eq!(
            advisor.store.get("expiryDate").await.unwrap().as_deref(),
            Some("2026-12-31")
        );
        assert_eq!(advisor.store.get("isAppValid").await.unwrap().as_deref(), Some("true"));
        let stored: User = serde_json::from_str(&advisor.store.get("user").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.user_id, 3);
    }

    #[tokio::test]
    async fn lapsed_accounts_are_refused() {
        let backend = MockBackend::new();
        *backend.sign_in_response.lock().unwrap() = Some(accepted(2, None));
        let advisor = advisor(backend, MockLlm::new()).await;
        let mut notices = advisor.subscribe();

        let err = advisor.sign_in("user3@example.com", "secret").await.unwrap_err();

        assert!(matches!(err, AdvisorError::AppNotEnabled));
        assert!(advisor.identity().await.is_none());
        assert_eq!(advisor.store.get("user").await.unwrap(), None);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn sign_in_without_user_data_fails() {
        let backend = MockBackend::new();
        *backend.sign_in_response.lock().unwrap() = Some(AuthResponse {
            success: true,
            data: Some(Vec::new()),
            ..AuthResponse::default()
        });
        let advisor = advisor(backend, MockLlm::new()).await;

        let err = advisor.sign_in("a@b.c", "x").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to sign in");
        assert!(advisor.identity().await.is_none());
    }

    #[tokio::test]
    async fn transport_failure_on_sign_in_is_reported() {
        let advisor = advisor(MockBackend::new(), MockLlm::new()).await;
        let err = advisor.sign_in("a@b.c", "x").await.unwrap_err();
        assert!(matches!(err, AdvisorError::Transport(_)));
        assert!(advisor.identity().await.is_none());
    }

    #[tokio::test]
    async fn identity_survives_a_restart() {
        let backend = MockBackend::new();
        *backend.sign_in_response.lock().unwrap() = Some(accepted(2, Some(true)));
        let first = advisor(backend.clone(), MockLlm::new()).await;
        first.sign_in("user3@example.com", "secret").await.unwrap();

        let restarted = Advisor::new(
            backend,
            MockLlm::new(),
            first.store.clone(),
            Default::default(),
        );
        let identity = restarted.restore_identity().await.unwrap().unwrap();
        assert_eq!(identity.user_id(), 3);
        assert_eq!(identity.role_id, 2);
        assert_eq!(identity.expiry_date.as_deref(), Some("2026-12-31"));
        assert!(identity.is_app_valid);
    }

    #[tokio::test]
    async fn corrupt_stored_user_clears_every_key() {
        let advisor = advisor(MockBackend::new(), MockLlm::new()).await;
        advisor.store.set("user", "{not json").await.unwrap();
        advisor.store.set("userRole", "1").await.unwrap();
        advisor.store.set("isAppValid", "true").await.unwrap();

        assert!(advisor.restore_identity().await.unwrap().is_none());
        assert!(advisor.identity().await.is_none());
        assert_eq!(advisor.store.get("userRole").await.unwrap(), None);
        assert_eq!(advisor.store.get("isAppValid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn logout_clears_identity_and_workspace_state() {
        let backend = MockBackend::with_prompts(vec![record(Some(1), "s-1", "hi")]);
        let advisor = signed_in_advisor(backend, MockLlm::new(), 7).await;
        advisor.store.set("user", "{}").await.unwrap();
        advisor.select_workspace(1).await.unwrap();
        advisor.send(1, "still there?").await.unwrap();
        assert!(advisor.session_binding(1).is_some());
        assert_eq!(advisor.send_slots.len(), 1);

        advisor.logout().await.unwrap();

        assert!(advisor.identity().await.is_none());
        assert!(advisor.messages(1).is_empty());
        assert!(advisor.session_binding(1).is_none());
        assert_eq!(advisor.send_slots.len(), 0);
        assert_eq!(advisor.selected_workspace().await, None);
        assert_eq!(advisor.store.get("user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_up_announces_the_new_account() {
        let advisor = advisor(MockBackend::new(), MockLlm::new()).await;
        let mut notices = advisor.subscribe();
        let request = SignupRequest {
            user_name: "Dana".to_string(),
            user_email: "dana@example.com".to_string(),
            user_pwd: "secret".to_string(),
            user_mobile: "555".to_string(),
            gender: "FEMALE".to_string(),
            is_active: true,
        };
        advisor.sign_up(request).await.unwrap();
        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "Account created successfully. Please sign in.");
        assert!(advisor.identity().await.is_none());
    }
}
