use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const USER_ID: &str = "user_id";
pub const USER_NAME: &str = "user_name";
pub const ROLE: &str = "role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    #[default]
    Child,
    Guest,
}

/// The caller of a write request, as vouched for by the auth layer.
/// Nothing downstream re-verifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, user_name: impl Into<String>) -> Self {
        Self { user_id, user_name: user_name.into(), role: Role::default() }
    }

    /// Stores the identity on the session. The login flow calls this once it
    /// has authenticated someone.
    pub async fn save(&self, session: &Session) -> AppResult<()> {
        session.insert(USER_ID, self.user_id).await?;
        session.insert(USER_NAME, &self.user_name).await?;
        session.insert(ROLE, self.role).await?;
        Ok(())
    }

    pub async fn load(session: &Session) -> AppResult<Identity> {
        let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
            return Err(AppError::Unauthorized);
        };
        let Some(user_name) = session.get::<String>(USER_NAME).await? else {
            return Err(AppError::Unauthorized);
        };
        let role = session.get::<Role>(ROLE).await?.unwrap_or_default();

        Ok(Identity { user_id, user_name, role })
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        Identity::load(&session).await
    }
}
