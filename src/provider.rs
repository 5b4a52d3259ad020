use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::Error;
use crate::identity::AccessToken;

/// The identity-provider collaborator consumed by [`Authentication`].
///
/// [`GoogleProvider`] is the shipped implementation; tests substitute their
/// own. The client carries at most one end-user token at a time; service
/// credentials live elsewhere and never pass through here.
///
/// [`Authentication`]: crate::authn::Authentication
pub trait IdentityProvider {
    /// The URL to send an anonymous visitor to. Available in every state.
    fn create_auth_url(&self) -> String;

    /// Exchanges an authorization code for an access token and loads it as
    /// the current token.
    fn authenticate(&mut self, code: &str) -> Result<AccessToken, Error>;

    /// Loads a previously stored token as the current token.
    fn set_access_token(&mut self, token: AccessToken);

    /// The currently loaded token, if any.
    fn access_token(&self) -> Option<&AccessToken>;

    fn clear_access_token(&mut self);

    /// Verifies the current token's id-token and returns its claims.
    ///
    /// # Errors
    ///
    /// Fails when no token is loaded, the id-token is missing, or signature,
    /// expiry, issuer, or audience checks fail.
    fn verify_id_token(&self) -> Result<JsonValue, Error>;
}

/// OAuth2 configuration for [`GoogleProvider`].
///
/// Required fields are constructor parameters; endpoints default to Google's
/// and can be overridden for testing or non-Google deployments.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) jwks_url: Url,
    pub(crate) issuers: Vec<String>,
}

impl OAuthConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            scopes: vec!["email".into()],
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth"
                .parse()
                .expect("valid default URL"),
            token_url: "https://oauth2.googleapis.com/token"
                .parse()
                .expect("valid default URL"),
            jwks_url: "https://www.googleapis.com/oauth2/v3/certs"
                .parse()
                .expect("valid default URL"),
            issuers: vec![
                "https://accounts.google.com".into(),
                "accounts.google.com".into(),
            ],
        }
    }

    /// Override the OAuth2 scopes (default: `["email"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_jwks_url(mut self, url: Url) -> Self {
        self.jwks_url = url;
        self
    }

    /// Override the accepted id-token issuers.
    #[must_use]
    pub fn with_issuers(mut self, issuers: Vec<String>) -> Self {
        self.issuers = issuers;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Blocking OAuth2 client for Google sign-in.
pub struct GoogleProvider {
    config: OAuthConfig,
    http: reqwest::blocking::Client,
    token: Option<AccessToken>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    n: String,
    e: String,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::blocking::Client::new(),
            token: None,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        Self::new(config.oauth_config())
    }

    fn fetch_decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, Error> {
        let response = self.http.get(self.config.jwks_url.clone()).send()?;
        let jwks: JwkSet = ensure_success(response, "JWKS fetch")?.json()?;

        let jwk = jwks
            .keys
            .iter()
            .find(|k| match kid {
                Some(kid) => k.kid.as_deref() == Some(kid),
                None => true,
            })
            .ok_or_else(|| Error::Token("no matching key in provider JWKS".into()))?;

        DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| Error::Token(format!("invalid JWK: {e}")))
    }
}

impl IdentityProvider for GoogleProvider {
    fn create_auth_url(&self) -> String {
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scopes.join(" "));
        url.into()
    }

    fn authenticate(&mut self, code: &str) -> Result<AccessToken, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()?;

        let token: AccessToken = ensure_success(response, "token exchange")?.json()?;
        self.token = Some(token.clone());
        Ok(token)
    }

    fn set_access_token(&mut self, token: AccessToken) {
        self.token = Some(token);
    }

    fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    fn clear_access_token(&mut self) {
        self.token = None;
    }

    fn verify_id_token(&self) -> Result<JsonValue, Error> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| Error::Token("no access token loaded".into()))?;
        let id_token = token
            .id_token
            .as_deref()
            .ok_or_else(|| Error::Token("token response carried no id_token".into()))?;

        let header =
            jsonwebtoken::decode_header(id_token).map_err(|e| Error::Token(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(Error::Token("id_token is not RS256-signed".into()));
        }

        let key = self.fetch_decoding_key(header.kid.as_deref())?;

        let mut validation = Validation::new(Algorithm::RS256);
        let issuers: Vec<&str> = self.config.issuers.iter().map(String::as_str).collect();
        validation.set_issuer(&issuers);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.required_spec_claims = HashSet::from([
            "exp".to_string(),
            "iat".to_string(),
            "aud".to_string(),
            "iss".to_string(),
        ]);

        let data = jsonwebtoken::decode::<JsonValue>(id_token, &key, &validation)
            .map_err(|e| Error::Token(e.to_string()))?;
        Ok(data.claims)
    }
}

/// Checks HTTP response status; returns the response on success or an error
/// with details.
pub(crate) fn ensure_success(
    response: reqwest::blocking::Response,
    operation: &'static str,
) -> Result<reqwest::blocking::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = response.text().unwrap_or_default();
    Err(Error::Provider {
        operation,
        status: Some(status),
        detail,
    })
}
