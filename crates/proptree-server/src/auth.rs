use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, AUTHORIZATION};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use proptree_core::{RequestContext, TraceId};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Header carrying the caller's correlation id, echoed on every response.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

// Keeps `iat + ttl` well inside chrono's range.
const MAX_TOKEN_TTL_SECS: i64 = 100 * 365 * 24 * 3600;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
}

impl Identity {
    pub fn user(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

/// Decides who is calling. Every operation endpoint goes through a gate
/// before any store access.
#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Claims carried by a proptree access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User name.
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
}

/// HS256 JWTs signed with a secret shared between the server and whoever
/// issues tokens.
#[derive(Clone)]
pub struct SharedSecretGate {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl SharedSecretGate {
    pub fn new(secret: &str, token_ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: Duration::seconds(
                i64::try_from(token_ttl_secs)
                    .unwrap_or(MAX_TOKEN_TTL_SECS)
                    .min(MAX_TOKEN_TTL_SECS),
            ),
        }
    }

    /// Issue a token for `user` with the gate's default lifetime.
    pub fn issue(&self, user: &str) -> ServerResult<String> {
        self.issue_with_ttl(user, self.token_ttl)
    }

    pub fn issue_with_ttl(&self, user: &str, ttl: Duration) -> ServerResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServerError::Internal(format!("token generation failed: {e}")))
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> ServerResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "invalid token signature",
                _ => "malformed token",
            };
            ServerError::Unauthenticated(reason.to_string())
        })?;
        if data.claims.sub.is_empty() {
            return Err(ServerError::Unauthenticated("token has no subject".into()));
        }
        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityGate for SharedSecretGate {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let claims = self.verify(token)?;
                Ok(Identity::user(claims.sub))
            }
            Credentials::Anonymous => Err(ServerError::Unauthenticated(
                "missing bearer token".into(),
            )),
        }
    }
}

impl std::fmt::Debug for SharedSecretGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretGate")
            .field("secret", &"******")
            .field("token_ttl_secs", &self.token_ttl.num_seconds())
            .finish()
    }
}

fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            // Authorization scheme is case-insensitive
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default()
}

/// Authenticates the caller and installs a [`RequestContext`] for the handler.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let credentials = match extract_bearer_token(&req) {
        Some(token) => Credentials::Bearer(token.to_string()),
        None => Credentials::Anonymous,
    };

    let identity = match state.gate.authenticate(&credentials).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "unauthenticated request");
            return Err(e);
        }
    };
    tracing::debug!(trace_id = %trace_id, user = %identity.name, "authenticated");

    let ctx = RequestContext::new(trace_id.clone()).with_identity(identity.name);
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SharedSecretGate {
        SharedSecretGate::new("test-secret", 3600)
    }

    #[test]
    fn issued_token_verifies() {
        let gate = gate();
        let token = gate.issue("demo").unwrap();
        let claims = gate.verify(&token).unwrap();
        assert_eq!(claims.sub, "demo");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = SharedSecretGate::new("other-secret", 3600).issue("demo").unwrap();
        let err = gate().verify(&token).unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(ref m) if m.contains("signature")));
    }

    #[test]
    fn expired_token_is_rejected() {
        let gate = gate();
        let token = gate.issue_with_ttl("demo", Duration::hours(-2)).unwrap();
        let err = gate.verify(&token).unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(ref m) if m.contains("expired")));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = gate().verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn anonymous_is_rejected() {
        let err = gate().authenticate(&Credentials::Anonymous).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn bearer_maps_to_identity() {
        let gate = gate();
        let token = gate.issue("demo").unwrap();
        let id = gate.authenticate(&Credentials::Bearer(token)).await.unwrap();
        assert_eq!(id, Identity::user("demo"));
    }

    #[test]
    fn debug_hides_secret() {
        let dbg = format!("{:?}", gate());
        assert!(!dbg.contains("test-secret"));
        assert!(dbg.contains("******"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let req = axum::http::Request::builder()
            .header(AUTHORIZATION, "BEARER abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("abc"));

        let req = axum::http::Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);
    }
}
