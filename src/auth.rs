//! Request-scoped identity.
//!
//! Tokens are issued and verified elsewhere. This service only turns a bearer
//! token into a user id and role by asking an [`IdentityResolver`], and hands
//! the resulting [`Identity`] to every operation explicitly.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::provider::ProviderError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Tutor,
    Student,
}

impl Role {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Role::Manager),
            "tutor" => Some(Role::Tutor),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Manager | Role::Tutor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(alias = "_id", alias = "userId")]
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
        }
    }

    pub fn require_staff(&self, action: &str) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("only tutors and managers may {}", action)))
        }
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the token is unknown or expired.
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AppError>;
}

/// Asks the auth service who owns the token (`GET {base}/me`).
pub struct HttpIdentityResolver {
    client: Client,
    me_url: String,
}

impl HttpIdentityResolver {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            me_url: format!("{}/me", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AppError> {
        let response = self
            .client
            .get(&self.me_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let identity = response
            .json::<Identity>()
            .await
            .map_err(|e| ProviderError::Payload(format!("auth service identity: {}", e)))?;
        Ok(Some(identity))
    }
}

/// Fixed token table for development and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, identity: Identity) -> Self {
        self.tokens.insert(token.to_string(), identity);
        self
    }

    /// Parses `token:user:role` triples separated by commas.
    pub fn parse(table: &str) -> Result<Self, String> {
        let mut resolver = Self::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            let [token, user, role] = parts.as_slice() else {
                return Err(format!("expected token:user:role, got '{}'", entry));
            };
            let role = Role::from_name(role).ok_or_else(|| format!("unknown role '{}'", role))?;
            resolver = resolver.with_token(token, Identity::new(user, role));
        }
        Ok(resolver)
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>, AppError> {
        Ok(self.tokens.get(token).cloned())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        state
            .identity
            .resolve(token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("unknown or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_token_table() {
        let resolver =
            StaticIdentityResolver::parse("t1:alice:student, t2:bob:Tutor,").unwrap();

        assert_eq!(resolver.tokens["t1"], Identity::new("alice", Role::Student));
        assert_eq!(resolver.tokens["t2"].role, Role::Tutor);
    }

    #[test]
    fn rejects_malformed_token_table() {
        assert!(StaticIdentityResolver::parse("t1:alice").is_err());
        assert!(StaticIdentityResolver::parse("t1:alice:dean").is_err());
    }

    #[test]
    fn staff_roles() {
        assert!(Role::Manager.is_staff());
        assert!(Role::Tutor.is_staff());
        assert!(!Role::Student.is_staff());

        let err = Identity::new("s", Role::Student).require_staff("review").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn reads_bearer_header() {
        let (parts, _) = axum::http::Request::builder()
            .header(header::AUTHORIZATION, "Bearer  abc ")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc"));

        let (parts, _) = axum::http::Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
