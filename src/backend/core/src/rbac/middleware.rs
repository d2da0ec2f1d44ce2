//! Caller identity resolution for Axum handlers.
//!
//! The session token is taken from `Authorization: Bearer <token>` or, when no
//! bearer header is present, from the configured session cookie. It resolves
//! to an [`Identity`] only when the session exists and is active and its owner
//! exists and is not banned. Anything else yields an anonymous caller, which
//! the authorization gate then denies with `Unauthenticated`.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::models::Identity;
use crate::error::{BastionError, Result};
use crate::store::AdminStore;

/// Looks up the identity behind a session token.
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn AdminStore>,
    cookie_name: String,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn AdminStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            store,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Extract the raw session token from request headers.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        if let Some(token) = bearer {
            return Some(token.to_string());
        }

        CookieJar::from_headers(headers)
            .get(&self.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    }

    /// Resolve a token to the identity of a live, unbanned user.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Identity>> {
        let Some(session) = self.store.get_session(token).await? else {
            debug!("Unknown session token");
            return Ok(None);
        };
        if !session.is_active_at(now) {
            debug!(user_id = %session.user_id, "Expired session");
            return Ok(None);
        }
        let Some(user) = self.store.get_user(&session.user_id).await? else {
            debug!(user_id = %session.user_id, "Session owner no longer exists");
            return Ok(None);
        };
        if user.is_banned_at(now) {
            debug!(user_id = %user.id, "Session owner is banned");
            return Ok(None);
        }
        Ok(Some(Identity::from(&user)))
    }
}

/// The resolved caller of the current request, `None` when anonymous.
#[derive(Debug, Clone, Default)]
pub struct CurrentIdentity(pub Option<Identity>);

impl CurrentIdentity {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }

    /// The identity, or an `Unauthenticated` error.
    pub fn require(&self) -> Result<&Identity> {
        self.0.as_ref().ok_or_else(BastionError::unauthenticated)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
    SessionResolver: FromRef<S>,
{
    type Rejection = BastionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        if let Some(identity) = parts.extensions.get::<CurrentIdentity>() {
            return Ok(identity.clone());
        }

        let resolver = SessionResolver::from_ref(state);
        let identity = match resolver.token_from_headers(&parts.headers) {
            Some(token) => resolver.resolve(&token, Utc::now()).await?,
            None => None,
        };

        let current = CurrentIdentity(identity);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{Role, RoleSet, SessionRecord, UserRecord};
    use crate::store::InMemoryStore;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn resolver(store: Arc<InMemoryStore>) -> SessionResolver {
        SessionResolver::new(store, "bastion.session_token")
    }

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let resolver = resolver(Arc::new(InMemoryStore::new()));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-header"));
        headers.insert("cookie", HeaderValue::from_static("bastion.session_token=tok-cookie"));
        assert_eq!(resolver.token_from_headers(&headers).as_deref(), Some("tok-header"));

        headers.remove(AUTHORIZATION);
        assert_eq!(resolver.token_from_headers(&headers).as_deref(), Some("tok-cookie"));

        assert!(resolver.token_from_headers(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_resolve_requires_live_session_and_unbanned_owner() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let mut user = UserRecord::new("Ana", "ana@example.com")
            .with_roles(RoleSet::single(Role::Admin));
        store.insert_user(&user).await.unwrap();
        store
            .insert_session(&SessionRecord::new("live", user.id.clone(), now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .insert_session(&SessionRecord::new("dead", user.id.clone(), now - Duration::hours(1)))
            .await
            .unwrap();

        let resolver = resolver(store.clone());
        let identity = resolver.resolve("live", now).await.unwrap().unwrap();
        assert_eq!(identity.id, user.id);
        assert!(identity.is_admin());

        assert!(resolver.resolve("dead", now).await.unwrap().is_none());
        assert!(resolver.resolve("missing", now).await.unwrap().is_none());

        user.ban("abuse", None);
        store.update_user(&user).await.unwrap();
        assert!(resolver.resolve("live", now).await.unwrap().is_none());
    }
}
