use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::error::Error;
use crate::provider::ensure_success;

/// Read access to group listings.
pub const DIRECTORY_GROUP_SCOPE: &str =
    "https://www.googleapis.com/auth/admin.directory.group.readonly";
/// Read access to user records.
pub const DIRECTORY_USER_SCOPE: &str =
    "https://www.googleapis.com/auth/admin.directory.user.readonly";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);
/// Lifetime requested for the signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Domain-wide-delegation credential for directory queries.
///
/// Signs a JWT-bearer assertion as the service account, impersonating the
/// configured admin user, and trades it for a scoped access token. Refresh is
/// lazy, at point of use. Owned exclusively by the directory client; the end
/// user's own token never flows through here.
#[derive(Clone)]
pub struct ServiceCredential {
    client_email: String,
    signing_key: EncodingKey,
    impersonated_admin: String,
    scopes: Vec<String>,
    token_url: Url,
    http: reqwest::blocking::Client,
    state: TokenState,
}

#[derive(Clone, Default)]
struct TokenState {
    access_token: Option<String>,
    expires_at: Option<OffsetDateTime>,
}

impl TokenState {
    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at - EXPIRY_MARGIN,
            _ => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ServiceCredential {
    /// Builds a credential from the service account's client email, its RSA
    /// private key (PEM), and the admin user to impersonate.
    ///
    /// Default scopes cover reading groups and users.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is not a valid RSA PEM.
    pub fn new(
        client_email: impl Into<String>,
        private_key_pem: &str,
        impersonated_admin: impl Into<String>,
    ) -> Result<Self, Error> {
        let signing_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::Config(format!("invalid service account key: {e}")))?;

        Ok(Self {
            client_email: client_email.into(),
            signing_key,
            impersonated_admin: impersonated_admin.into(),
            scopes: vec![
                DIRECTORY_GROUP_SCOPE.to_string(),
                DIRECTORY_USER_SCOPE.to_string(),
            ],
            token_url: "https://oauth2.googleapis.com/token"
                .parse()
                .expect("valid default URL"),
            http: reqwest::blocking::Client::new(),
            state: TokenState::default(),
        })
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    #[must_use]
    pub fn impersonated_admin(&self) -> &str {
        &self.impersonated_admin
    }

    /// Whether the current access token is missing or within the refresh
    /// margin of its expiry.
    #[must_use]
    pub fn is_access_token_expired(&self) -> bool {
        self.state.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Signs a fresh assertion and trades it for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if signing fails, or [`Error::Provider`] /
    /// [`Error::Http`] if the token endpoint rejects the grant.
    pub fn refresh_token_with_assertion(&mut self) -> Result<(), Error> {
        let now = OffsetDateTime::now_utc();
        let claims = json!({
            "iss": self.client_email,
            "sub": self.impersonated_admin,
            "scope": self.scopes.join(" "),
            "aud": self.token_url.as_str(),
            "iat": now.unix_timestamp(),
            "exp": now.unix_timestamp() + ASSERTION_LIFETIME_SECS,
        });
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
                .map_err(|e| Error::Token(e.to_string()))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()?;
        let token: ServiceTokenResponse = ensure_success(response, "service token grant")?.json()?;

        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS as u64);
        self.state = TokenState {
            access_token: Some(token.access_token),
            expires_at: Some(now + Duration::seconds(lifetime as i64)),
        };
        tracing::debug!(
            client_email = %self.client_email,
            admin = %self.impersonated_admin,
            "service access token refreshed"
        );
        Ok(())
    }

    /// Credential with a placeholder signing key, for tests that never
    /// refresh.
    #[cfg(test)]
    pub(crate) fn fake(client_email: &str, impersonated_admin: &str) -> Self {
        Self {
            client_email: client_email.to_string(),
            signing_key: EncodingKey::from_secret(b"test-key"),
            impersonated_admin: impersonated_admin.to_string(),
            scopes: vec![DIRECTORY_GROUP_SCOPE.to_string()],
            token_url: "https://oauth2.googleapis.com/token".parse().unwrap(),
            http: reqwest::blocking::Client::new(),
            state: TokenState::default(),
        }
    }

    /// The bearer token for the next directory call, refreshing first if
    /// expired.
    pub(crate) fn bearer_token(&mut self) -> Result<String, Error> {
        if self.is_access_token_expired() {
            self.refresh_token_with_assertion()?;
        }
        self.state
            .access_token
            .clone()
            .ok_or_else(|| Error::Token("service token missing after refresh".into()))
    }
}
