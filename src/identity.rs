//! Identity: ID-token claims and temporary storage credentials.
//!
//! Sign-in happens in the identity provider's hosted UI; this crate only
//! receives the resulting ID token. The token is used twice:
//!
//! * as a bearer credential for the quota and first-sign-in APIs, and
//! * as a federated login for the identity pool, which trades it for
//!   short-lived storage credentials (`GetId` → `GetCredentialsForIdentity`).
//!
//! Claims are decoded without verifying the signature. Every service the
//! token is sent to verifies it; the client only needs `sub` and `email`.

use crate::config::ClientConfig;
use crate::error::RemediateError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cognitoidentity::error::DisplayErrorContext;
use aws_sdk_cognitoidentity::types::Credentials as PoolCredentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Claims the client reads from the ID token payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IdTokenClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub iss: Option<String>,
    pub exp: Option<i64>,
    #[serde(rename = "custom:first_sign_in")]
    pub first_sign_in: Option<String>,
}

/// A raw ID token together with its decoded claims.
#[derive(Clone)]
pub struct IdToken {
    raw: String,
    claims: IdTokenClaims,
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

impl IdToken {
    /// Decode the payload segment of a compact JWT.
    pub fn parse(raw: impl Into<String>) -> Result<Self, RemediateError> {
        let raw = raw.into().trim().to_string();
        let mut segments = raw.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => {
                return Err(RemediateError::InvalidToken(
                    "expected three dot-separated segments".into(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| RemediateError::InvalidToken(format!("payload is not base64url: {e}")))?;
        let claims: IdTokenClaims = serde_json::from_slice(&bytes)
            .map_err(|e| RemediateError::InvalidToken(format!("payload is not JSON: {e}")))?;

        Ok(Self { raw, claims })
    }

    /// The token as sent in `Authorization: Bearer …`.
    pub fn bearer(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> &IdTokenClaims {
        &self.claims
    }

    /// The user's stable identifier.
    pub fn sub(&self) -> Result<&str, RemediateError> {
        self.claims
            .sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RemediateError::MissingClaim {
                claim: "sub".into(),
            })
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    /// `true` until the user has submitted the onboarding profile.
    pub fn is_first_sign_in(&self) -> bool {
        self.claims.first_sign_in.as_deref() == Some("true")
    }

    /// Whether the token has expired at `now`. Tokens without `exp` never do.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims.exp.is_some_and(|exp| now.timestamp() >= exp)
    }
}

/// Temporary credentials for the object store.
#[derive(Clone)]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl StorageCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Static credentials from the standard `AWS_*` variables, if present.
    pub fn from_env() -> Option<Self> {
        let id = std::env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY")
            .ok()
            .filter(|v| !v.is_empty())?;
        let mut creds = Self::new(id, secret);
        creds.session_token = std::env::var("AWS_SESSION_TOKEN").ok().filter(|v| !v.is_empty());
        Some(creds)
    }
}

// ── Identity pool exchange ───────────────────────────────────────────────

/// Exchanges ID tokens for storage credentials through the identity pool.
#[derive(Debug, Clone)]
pub struct IdentityPoolClient {
    client: aws_sdk_cognitoidentity::Client,
    pool_id: String,
    login_provider: String,
}

impl IdentityPoolClient {
    /// Build a client from the configured pool id and authority.
    ///
    /// Both calls of the exchange are unauthenticated, so the SDK is loaded
    /// without a credentials provider.
    pub async fn new(config: &ClientConfig) -> Result<Self, RemediateError> {
        let pool_id = config.identity_pool_id.clone().ok_or_else(|| {
            RemediateError::InvalidConfig("identity pool id is not configured".into())
        })?;
        let authority = config.authority.as_deref().ok_or_else(|| {
            RemediateError::InvalidConfig("token authority is not configured".into())
        })?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .no_credentials()
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.http_timeout())
                    .build(),
            )
            .load()
            .await;

        Ok(Self {
            client: aws_sdk_cognitoidentity::Client::new(&sdk_config),
            pool_id,
            login_provider: login_provider_key(authority),
        })
    }

    /// Trade `token` for temporary storage credentials.
    pub async fn credentials_for(
        &self,
        token: &IdToken,
    ) -> Result<StorageCredentials, RemediateError> {
        let id = self
            .client
            .get_id()
            .identity_pool_id(&self.pool_id)
            .logins(&self.login_provider, token.bearer())
            .send()
            .await
            .map_err(|e| {
                RemediateError::CredentialsUnavailable(format!("GetId: {}", DisplayErrorContext(&e)))
            })?;
        let identity_id = id.identity_id().ok_or_else(|| {
            RemediateError::CredentialsUnavailable("GetId returned no identity id".into())
        })?;
        debug!("Resolved identity {}", identity_id);

        let out = self
            .client
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(&self.login_provider, token.bearer())
            .send()
            .await
            .map_err(|e| {
                RemediateError::CredentialsUnavailable(format!(
                    "GetCredentialsForIdentity: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        let creds = out.credentials().ok_or_else(|| {
            RemediateError::CredentialsUnavailable(
                "GetCredentialsForIdentity returned no credentials".into(),
            )
        })?;
        info!("Obtained temporary storage credentials");

        StorageCredentials::try_from(creds)
    }
}

impl TryFrom<&PoolCredentials> for StorageCredentials {
    type Error = RemediateError;

    fn try_from(c: &PoolCredentials) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            RemediateError::CredentialsUnavailable(format!("identity pool omitted {field}"))
        };
        Ok(Self {
            access_key_id: c.access_key_id().ok_or_else(|| missing("AccessKeyId"))?.to_string(),
            secret_access_key: c.secret_key().ok_or_else(|| missing("SecretKey"))?.to_string(),
            session_token: c.session_token().map(str::to_string),
            expiration: c
                .expiration()
                .and_then(|t| Utc.timestamp_opt(t.secs(), 0).single()),
        })
    }
}

/// The logins map is keyed by the issuer without a URL scheme.
fn login_provider_key(authority: &str) -> String {
    authority
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cognitoidentity::primitives::DateTime as SdkDateTime;
    use serde_json::json;

    fn token_with(payload: serde_json::Value) -> String {
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("eyJhbGciOiJSUzI1NiJ9.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn parse_claims() {
        let raw = token_with(json!({
            "sub": "abc-123",
            "email": "jane@example.com",
            "custom:first_sign_in": "true",
            "exp": 2_000_000_000i64
        }));
        let token = IdToken::parse(&raw).unwrap();
        assert_eq!(token.sub().unwrap(), "abc-123");
        assert_eq!(token.email(), Some("jane@example.com"));
        assert!(token.is_first_sign_in());
        assert_eq!(token.bearer(), raw);
        assert!(!token.is_expired_at(Utc.timestamp_opt(1_900_000_000, 0).unwrap()));
        assert!(token.is_expired_at(Utc.timestamp_opt(2_000_000_000, 0).unwrap()));
    }

    #[test]
    fn missing_sub_is_reported() {
        let token = IdToken::parse(token_with(json!({ "email": "x@y.z" }))).unwrap();
        assert!(matches!(
            token.sub(),
            Err(RemediateError::MissingClaim { .. })
        ));
        assert!(!token.is_first_sign_in());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(IdToken::parse("not-a-jwt").is_err());
        assert!(IdToken::parse("a.%%%.c").is_err());
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(IdToken::parse(not_json).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = StorageCredentials::new("AKIA", "very-secret").with_session_token("tok");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("AKIA"));
        assert!(!dbg.contains("very-secret"));
        assert!(!dbg.contains("tok\""));
    }

    #[test]
    fn pool_credentials_convert() {
        let pool = PoolCredentials::builder()
            .access_key_id("ASIA1")
            .secret_key("s3cr3t")
            .session_token("session")
            .expiration(SdkDateTime::from_secs(1_700_000_000))
            .build();
        let creds = StorageCredentials::try_from(&pool).unwrap();
        assert_eq!(creds.access_key_id, "ASIA1");
        assert_eq!(creds.secret_access_key, "s3cr3t");
        assert_eq!(creds.session_token.as_deref(), Some("session"));
        assert_eq!(creds.expiration.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn pool_credentials_without_secret_are_rejected() {
        let pool = PoolCredentials::builder().access_key_id("ASIA1").build();
        assert!(matches!(
            StorageCredentials::try_from(&pool),
            Err(RemediateError::CredentialsUnavailable(_))
        ));
    }

    #[test]
    fn login_key_strips_scheme() {
        assert_eq!(
            login_provider_key("https://cognito-idp.us-east-1.amazonaws.com/us-east-1_AbC/"),
            "cognito-idp.us-east-1.amazonaws.com/us-east-1_AbC"
        );
    }

    #[tokio::test]
    async fn client_requires_pool_and_authority() {
        let cfg = ClientConfig::default();
        assert!(IdentityPoolClient::new(&cfg).await.is_err());

        let cfg = ClientConfig::builder()
            .identity_pool_id("us-east-1:pool")
            .build()
            .unwrap();
        assert!(matches!(
            IdentityPoolClient::new(&cfg).await,
            Err(RemediateError::InvalidConfig(_))
        ));
    }
}
