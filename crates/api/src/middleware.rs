//! Per-request authorization.
//!
//! Every request passes through [`authorize_request`] exactly once. Public
//! paths skip token inspection; every other path needs a bearer access token
//! that both decodes and is still recorded as valid in the token store.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, error};

use gatekeeper_auth::{TokenCodec, TokenError, TokenKind, bearer_token};
use gatekeeper_infra::{AuthStore, PrincipalStore, StoreError, TokenStore};

use crate::app::errors::{internal_error, unauthorized};
use crate::context::PrincipalContext;

/// Path prefixes reachable without a token.
pub const PUBLIC_PATH_PREFIXES: &[&str] = &[
    "/auth/register",
    "/auth/refresh-token",
    "/auth/enable-user",
    "/auth/authenticate",
    "/auth/reset-password",
    "/auth/forgot-password",
    "/health",
];

/// Why a request was turned away. Only [`Rejection::status`] reaches the
/// client; the rest is for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingHeader,
    MalformedHeader,
    Token(TokenError),
    UnknownPrincipal,
    TokenNotValid,
    SubjectMismatch,
    Store(StoreError),
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::MissingHeader => "missing_header",
            Rejection::MalformedHeader => "malformed_header",
            Rejection::Token(e) => e.reason(),
            Rejection::UnknownPrincipal => "unknown_principal",
            Rejection::TokenNotValid => "revoked_or_unknown_token",
            Rejection::SubjectMismatch => "subject_mismatch",
            Rejection::Store(_) => "store",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(err: StoreError) -> Self {
        Rejection::Store(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Allow-listed path; no identity is attached.
    Public,
    /// A principal was already resolved earlier in this request.
    AlreadyAuthenticated,
    Authenticated(PrincipalContext),
}

pub struct RequestAuthorizer {
    codec: TokenCodec,
    store: Arc<dyn AuthStore>,
    public_prefixes: Vec<String>,
}

impl RequestAuthorizer {
    pub fn new(codec: TokenCodec, store: Arc<dyn AuthStore>) -> Self {
        Self {
            codec,
            store,
            public_prefixes: PUBLIC_PATH_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_public_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Decide whether a request may proceed and with which identity.
    ///
    /// Never writes to the stores.
    pub async fn authorize(
        &self,
        path: &str,
        authorization: Option<&HeaderValue>,
        resolved: Option<&PrincipalContext>,
    ) -> Result<Decision, Rejection> {
        if self.is_public(path) {
            return Ok(Decision::Public);
        }

        let header = authorization.ok_or(Rejection::MissingHeader)?;
        let token = header
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or(Rejection::MalformedHeader)?;

        let now = Utc::now();
        let parsed = self
            .codec
            .parse_kind(token, TokenKind::Access, now)
            .map_err(Rejection::Token)?;

        if resolved.is_some() {
            return Ok(Decision::AlreadyAuthenticated);
        }

        let principal = self
            .store
            .find_by_email(&parsed.subject)
            .await?
            .ok_or(Rejection::UnknownPrincipal)?;

        if !self.store.is_valid(token).await? {
            return Err(Rejection::TokenNotValid);
        }
        if !parsed.is_valid_for(&principal.email, now) {
            return Err(Rejection::SubjectMismatch);
        }

        Ok(Decision::Authenticated(PrincipalContext::new(
            principal.identity(),
            token,
        )))
    }
}

/// Axum middleware around [`RequestAuthorizer::authorize`].
pub async fn authorize_request(
    State(authorizer): State<Arc<RequestAuthorizer>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let header = req.headers().get(AUTHORIZATION).cloned();
    let resolved = req.extensions().get::<PrincipalContext>().cloned();

    match authorizer
        .authorize(&path, header.as_ref(), resolved.as_ref())
        .await
    {
        Ok(Decision::Public) | Ok(Decision::AlreadyAuthenticated) => next.run(req).await,
        Ok(Decision::Authenticated(ctx)) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(Rejection::Store(e)) => {
            error!(path = %path, error = %e, "token store unavailable during authorization");
            internal_error()
        }
        Err(rejection) => {
            debug!(path = %path, reason = rejection.reason(), "request rejected");
            unauthorized()
        }
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_auth::{NewPrincipal, Principal, Role, TokenTtls};
    use gatekeeper_infra::InMemoryAuthStore;

    use super::*;

    const SECRET: &str = "middleware-test-secret";

    async fn fixture() -> (RequestAuthorizer, Arc<InMemoryAuthStore>, Principal) {
        let store = Arc::new(InMemoryAuthStore::new());
        let principal = store
            .insert(NewPrincipal {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
                email: "grace@example.com".into(),
                password_hash: "hash".into(),
                role: Role::Doctor,
                enabled: true,
                account_non_locked: true,
            })
            .await
            .unwrap();
        let codec = TokenCodec::new(SECRET, TokenTtls::default());
        let authorizer = RequestAuthorizer::new(codec, store.clone());
        (authorizer, store, principal)
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    async fn issue(authorizer: &RequestAuthorizer, store: &InMemoryAuthStore, principal: &Principal) -> String {
        let token = authorizer.codec.mint_access(principal, Utc::now()).unwrap();
        store.rotate(principal.id, &token).await.unwrap();
        token
    }

    #[tokio::test]
    async fn public_paths_skip_token_inspection() {
        let (authorizer, _, _) = fixture().await;
        let garbage = HeaderValue::from_static("Bearer not-a-token");

        for path in ["/auth/register", "/auth/enable-user/abc", "/auth/reset-password/x", "/health"] {
            assert_eq!(
                authorizer.authorize(path, Some(&garbage), None).await,
                Ok(Decision::Public)
            );
        }
    }

    #[tokio::test]
    async fn allow_list_can_be_replaced() {
        let (authorizer, _, _) = fixture().await;
        let authorizer = authorizer.with_public_prefixes(["/status"]);

        assert!(authorizer.is_public("/status/live"));
        assert!(!authorizer.is_public("/auth/register"));
        assert_eq!(
            authorizer.authorize("/auth/register", None, None).await,
            Err(Rejection::MissingHeader)
        );
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_rejected() {
        let (authorizer, _, _) = fixture().await;

        assert_eq!(
            authorizer.authorize("/whoami", None, None).await,
            Err(Rejection::MissingHeader)
        );
        for raw in ["Basic abc", "bearer abc", "Bearer ", "Bearer    "] {
            let header = HeaderValue::from_static(raw);
            assert_eq!(
                authorizer.authorize("/whoami", Some(&header), None).await,
                Err(Rejection::MalformedHeader),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn valid_recorded_token_resolves_the_principal() {
        let (authorizer, store, principal) = fixture().await;
        let token = issue(&authorizer, &store, &principal).await;

        let decision = authorizer
            .authorize("/home/doctor", Some(&bearer(&token)), None)
            .await
            .unwrap();

        let Decision::Authenticated(ctx) = decision else {
            panic!("expected an authenticated decision, got {decision:?}");
        };
        assert_eq!(ctx.principal_id(), principal.id);
        assert_eq!(ctx.email(), "grace@example.com");
        assert_eq!(ctx.role(), Role::Doctor);
        assert_eq!(ctx.token(), token);
    }

    #[tokio::test]
    async fn signed_but_unrecorded_token_is_rejected() {
        let (authorizer, _, principal) = fixture().await;
        let token = authorizer.codec.mint_access(&principal, Utc::now()).unwrap();

        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&token)), None).await,
            Err(Rejection::TokenNotValid)
        );
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let (authorizer, store, principal) = fixture().await;
        let token = issue(&authorizer, &store, &principal).await;
        store.revoke(&token).await.unwrap();

        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&token)), None).await,
            Err(Rejection::TokenNotValid)
        );
    }

    #[tokio::test]
    async fn rotation_invalidates_the_previous_token() {
        let (authorizer, store, principal) = fixture().await;
        let first = issue(&authorizer, &store, &principal).await;
        let second = issue(&authorizer, &store, &principal).await;

        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&first)), None).await,
            Err(Rejection::TokenNotValid)
        );
        assert!(matches!(
            authorizer.authorize("/whoami", Some(&bearer(&second)), None).await,
            Ok(Decision::Authenticated(_))
        ));
    }

    #[tokio::test]
    async fn decode_failures_are_rejected_with_their_reason() {
        let (authorizer, store, principal) = fixture().await;

        let foreign = TokenCodec::new("another-secret", TokenTtls::default())
            .mint_access(&principal, Utc::now())
            .unwrap();
        let rejection = authorizer
            .authorize("/whoami", Some(&bearer(&foreign)), None)
            .await
            .unwrap_err();
        assert_eq!(rejection, Rejection::Token(TokenError::InvalidSignature));
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);

        let stale = authorizer
            .codec
            .mint_access(&principal, Utc::now() - chrono::Duration::days(2))
            .unwrap();
        store.rotate(principal.id, &stale).await.unwrap();
        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&stale)), None).await,
            Err(Rejection::Token(TokenError::Expired))
        );
    }

    #[tokio::test]
    async fn non_access_tokens_are_not_accepted_as_bearer() {
        let (authorizer, store, principal) = fixture().await;
        let activation = authorizer
            .codec
            .mint_activation(&principal.email, Utc::now())
            .unwrap();
        store.save(principal.id, &activation).await.unwrap();

        let rejection = authorizer
            .authorize("/whoami", Some(&bearer(&activation)), None)
            .await
            .unwrap_err();
        assert!(matches!(rejection, Rejection::Token(TokenError::WrongKind { .. })));
    }

    #[tokio::test]
    async fn deleted_principal_is_rejected() {
        let (authorizer, store, principal) = fixture().await;
        let token = issue(&authorizer, &store, &principal).await;
        store.delete(principal.id).await.unwrap();

        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&token)), None).await,
            Err(Rejection::UnknownPrincipal)
        );
    }

    #[tokio::test]
    async fn already_resolved_request_passes_through() {
        let (authorizer, store, principal) = fixture().await;
        let token = issue(&authorizer, &store, &principal).await;
        let ctx = PrincipalContext::new(principal.identity(), token.clone());

        // Revocation after resolution does not affect a re-entrant pass.
        store.revoke(&token).await.unwrap();
        assert_eq!(
            authorizer.authorize("/whoami", Some(&bearer(&token)), Some(&ctx)).await,
            Ok(Decision::AlreadyAuthenticated)
        );
    }
}
