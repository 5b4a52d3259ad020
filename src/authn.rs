use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::identity::{AccessToken, Identity};
use crate::provider::IdentityProvider;
use crate::service::ServiceCredential;
use crate::session::SessionStore;

/// Session key holding the end user's access token.
pub const USER_ACCESS_TOKEN_KEY: &str = "userAccessToken";
/// Session key reserved for application user settings.
pub const USER_SETTINGS_KEY: &str = "userSettings";

/// Authorization-callback parameters, passed in explicitly.
///
/// This crate never reads ambient request state; the host extracts `code`
/// and `error` from the redirect query string and hands them over.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// The login/logout lifecycle for one request.
///
/// Construction settles the session's state in one pass:
///
/// 1. A token already in the session is re-verified; failure clears it and
///    silently demotes the request to anonymous.
/// 2. Only if no valid token survived: an upstream `error` parameter is
///    terminal ([`Error::Login`]), and a `code` parameter is exchanged for a
///    fresh token, persisted under [`USER_ACCESS_TOKEN_KEY`].
///
/// A live session is therefore never invalidated by a stray `error`
/// parameter, and a replayed `code` is never exchanged twice.
pub struct Authentication<S, P> {
    session: S,
    provider: P,
    service: Option<ServiceCredential>,
}

impl<S: SessionStore, P: IdentityProvider> Authentication<S, P> {
    /// Builds the session state machine for this request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Login`] when the provider reported a failed login and
    /// no valid session exists, or the underlying exchange/session errors.
    pub fn new(session: S, provider: P, params: &CallbackParams) -> Result<Self, Error> {
        let mut auth = Self {
            session,
            provider,
            service: None,
        };
        auth.revalidate_stored_token()?;
        auth.check_for_login_attempt(params)?;
        Ok(auth)
    }

    /// Loads and re-verifies any stored token. Failure is recovered, not
    /// raised: the token is cleared and the request proceeds anonymously.
    fn revalidate_stored_token(&mut self) -> Result<(), Error> {
        let Some(value) = self.session.get(USER_ACCESS_TOKEN_KEY) else {
            return Ok(());
        };

        match serde_json::from_value::<AccessToken>(value) {
            Ok(token) => {
                self.provider.set_access_token(token);
                if let Err(e) = self.provider.verify_id_token() {
                    tracing::warn!(error = %e, "stored token failed re-verification, clearing session");
                    self.provider.clear_access_token();
                    self.session.delete(USER_ACCESS_TOKEN_KEY)?;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored token value is malformed, clearing session");
                self.session.delete(USER_ACCESS_TOKEN_KEY)?;
            }
        }
        Ok(())
    }

    fn check_for_login_attempt(&mut self, params: &CallbackParams) -> Result<(), Error> {
        if self.is_logged_in() {
            return Ok(());
        }

        if let Some(error) = &params.error {
            return Err(Error::Login(error.clone()));
        }

        let Some(code) = &params.code else {
            return Ok(());
        };

        let token = self.provider.authenticate(code)?;
        self.session
            .set(USER_ACCESS_TOKEN_KEY, serde_json::to_value(&token)?)?;
        tracing::info!("authorization code exchanged, session established");
        Ok(())
    }

    /// Whether a token is present in the session, post re-validation.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.get(USER_ACCESS_TOKEN_KEY).is_some()
    }

    /// The provider's login URL. Available in every state.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.provider.create_auth_url()
    }

    /// Removes the token from the session. No-op when already anonymous.
    pub fn logout(&mut self) -> Result<(), Error> {
        self.provider.clear_access_token();
        self.session.delete(USER_ACCESS_TOKEN_KEY)
    }

    /// The authenticated identity, derived from freshly verified claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoggedIn`] on an anonymous session; callers check
    /// [`is_logged_in`](Self::is_logged_in) first.
    pub fn user(&self) -> Result<Identity, Error> {
        if !self.is_logged_in() {
            return Err(Error::NotLoggedIn);
        }
        let claims = self.provider.verify_id_token()?;
        Ok(Identity::from_claims(claims))
    }

    /// Builds the scoped service credential for directory queries.
    ///
    /// Idempotent: calling again replaces the previous credential. The
    /// credential is independent of the end user's token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the private key is not a valid RSA PEM.
    pub fn set_service_account(
        &mut self,
        client_email: impl Into<String>,
        private_key_pem: &str,
        impersonated_admin: impl Into<String>,
    ) -> Result<(), Error> {
        self.service = Some(ServiceCredential::new(
            client_email,
            private_key_pem,
            impersonated_admin,
        )?);
        Ok(())
    }

    /// Installs a pre-built credential (custom scopes or endpoints).
    pub fn set_service_credential(&mut self, credential: ServiceCredential) {
        self.service = Some(credential);
    }

    #[must_use]
    pub fn service_credential(&self) -> Option<&ServiceCredential> {
        self.service.as_ref()
    }

    /// Application-defined settings stored alongside the token.
    #[must_use]
    pub fn user_settings(&self) -> Option<JsonValue> {
        self.session.get(USER_SETTINGS_KEY)
    }

    pub fn set_user_settings(&mut self, settings: JsonValue) -> Result<(), Error> {
        self.session.set(USER_SETTINGS_KEY, settings)
    }

    pub fn clear_user_settings(&mut self) -> Result<(), Error> {
        self.session.delete(USER_SETTINGS_KEY)
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    #[must_use]
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}
