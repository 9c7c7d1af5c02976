//! Caller identity
//!
//! The identity provider in front of the orchestrator authenticates requests
//! and forwards the principal in two headers. They are trusted as given.

use axum::{extract::FromRequestParts, http::request::Parts};
use conductor_core::domain::principal::{Principal, Role};

use crate::api::error::ApiError;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";

/// The authenticated principal making a request
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Principal);

impl Caller {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.0.has_at_least(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("requires role {} or above", role)))
        }
    }

    /// Checks a principal filter; only admins may look at other principals
    pub fn scope(&self, requested: Option<i64>) -> Result<Option<i64>, ApiError> {
        match requested {
            Some(id) if id != self.id() => {
                self.require(Role::Admin)?;
                Ok(Some(id))
            }
            other => Ok(other),
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, PRINCIPAL_ID_HEADER)?
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized("invalid principal id".to_string()))?;

        let role = header(parts, PRINCIPAL_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(Caller(Principal::new(id, role)))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller(Principal::new(5, role))
    }

    #[test]
    fn test_scope_own_or_all() {
        assert_eq!(caller(Role::User).scope(None).unwrap(), None);
        assert_eq!(caller(Role::User).scope(Some(5)).unwrap(), Some(5));
    }

    #[test]
    fn test_scope_other_principal_needs_admin() {
        assert!(matches!(
            caller(Role::User).scope(Some(6)),
            Err(ApiError::Forbidden(_))
        ));
        assert_eq!(caller(Role::Admin).scope(Some(6)).unwrap(), Some(6));
        assert_eq!(caller(Role::SuperAdmin).scope(Some(6)).unwrap(), Some(6));
    }
}
