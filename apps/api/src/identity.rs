//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified subject
//! in `x-user-id`. No header means an anonymous guest, which is a distinct
//! variant rather than a magic user id.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
const MAX_USER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Guest,
}

impl Identity {
    pub fn parse(header: Option<&str>) -> Result<Self, AppError> {
        let Some(raw) = header else {
            return Ok(Identity::Guest);
        };
        let id = raw.trim();
        let valid = !id.is_empty()
            && id.len() <= MAX_USER_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Identity::User(id.to_string()))
        } else {
            Err(AppError::Unauthorized)
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::User(id) => Some(id),
            Identity::Guest => None,
        }
    }

    /// Storage folder for this caller. Guests get a per-job folder so two
    /// guests never share a slot.
    pub fn storage_prefix(&self, job_id: &str) -> String {
        match self {
            Identity::User(id) => format!("users/{id}"),
            Identity::Guest => format!("guests/{job_id}"),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(USER_ID_HEADER) {
            Some(value) => Some(value.to_str().map_err(|_| AppError::Unauthorized)?),
            None => None,
        };
        Identity::parse(header)
    }
}
