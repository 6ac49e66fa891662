//! Session service
//!
//! Sign-in and sign-out as operations on an explicit [`Session`].

use std::sync::Arc;

use crate::auth::Session;
use crate::data::{AuthPayload, User, UserRepository};
use crate::error::AppError;
use crate::metrics::{SIGN_OUTS_TOTAL, USERS_CREATED_TOTAL};

/// Session service
pub struct SessionService {
    users: Arc<dyn UserRepository>,
}

impl SessionService {
    /// Create new session service
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Resolve the user behind `payload` and remember them in `session`
    ///
    /// The user is created on the first sign-in for its `(provider, uid)`.
    /// Persistence errors are returned untouched and leave the session as
    /// it was.
    pub async fn sign_in(
        &self,
        session: &mut Session,
        payload: &AuthPayload,
    ) -> Result<User, AppError> {
        let (user, created) = self.users.find_or_create_from_auth(payload).await?;

        if created {
            USERS_CREATED_TOTAL
                .with_label_values(&[payload.provider.as_str()])
                .inc();
            tracing::info!(
                provider = %user.provider,
                user_id = %user.id,
                "User created on first sign-in"
            );
        }

        session.set_user_id(user.id.clone());

        tracing::info!(
            provider = %user.provider,
            user_id = %user.id,
            created,
            "Signed in"
        );

        Ok(user)
    }

    /// Forget everything the session holds
    ///
    /// Safe to call on an empty session.
    pub fn sign_out(&self, session: &mut Session) {
        let user_id = session.user_id().map(ToOwned::to_owned);
        session.clear();
        SIGN_OUTS_TOTAL.inc();

        tracing::info!(user_id = ?user_id, "Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, MockUserRepository};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("service-session.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn user(id: &str, uid: &str) -> User {
        User {
            id: id.to_string(),
            provider: "facebook".to_string(),
            uid: uid.to_string(),
            name: None,
            email: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sign_in_creates_user_and_sets_session() {
        let (db, _temp_dir) = create_test_db().await;
        let service = SessionService::new(db.clone());
        let mut session = Session::default();

        let user = service
            .sign_in(&mut session, &AuthPayload::new("facebook", "123"))
            .await
            .unwrap();

        assert_eq!(user.provider, "facebook");
        assert_eq!(user.uid, "123");
        assert_eq!(session.user_id(), Some(user.id.as_str()));
        assert_eq!(db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_sign_in_reuses_user() {
        let (db, _temp_dir) = create_test_db().await;
        let service = SessionService::new(db.clone());
        let payload = AuthPayload::new("facebook", "123");

        let mut first_session = Session::default();
        let first = service.sign_in(&mut first_session, &payload).await.unwrap();

        let mut second_session = Session::default();
        let second = service.sign_in(&mut second_session, &payload).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second_session.user_id(), Some(first.id.as_str()));
        assert_eq!(db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sign_in_uses_existing_user_without_creating() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_or_create_from_auth()
            .times(1)
            .returning(|payload| Ok((user("01EXISTING", &payload.uid), false)));

        let service = SessionService::new(Arc::new(users));
        let mut session = Session::default();

        let signed_in = service
            .sign_in(&mut session, &AuthPayload::new("facebook", "123"))
            .await
            .unwrap();

        assert_eq!(signed_in.id, "01EXISTING");
        assert_eq!(session.user_id(), Some("01EXISTING"));
    }

    #[tokio::test]
    async fn persistence_failure_propagates_and_leaves_session_alone() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_or_create_from_auth()
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let service = SessionService::new(Arc::new(users));
        let mut session = Session::default();
        session.set("locale", "en");

        let result = service
            .sign_in(&mut session, &AuthPayload::new("facebook", "123"))
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(session.user_id(), None);
        assert_eq!(session.get("locale"), Some("en"));
    }

    #[test]
    fn sign_out_clears_every_key() {
        let service = SessionService::new(Arc::new(MockUserRepository::new()));
        let mut session = Session::default();
        session.set_user_id("01USER");
        session.set("return_to", "/somewhere");

        service.sign_out(&mut session);

        assert!(session.is_empty());
        assert_eq!(session.user_id(), None);
    }

    #[test]
    fn sign_out_on_empty_session_is_fine() {
        let service = SessionService::new(Arc::new(MockUserRepository::new()));
        let mut session = Session::default();

        service.sign_out(&mut session);
        service.sign_out(&mut session);

        assert!(session.is_empty());
    }
}
