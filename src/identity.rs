use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Provider-issued credential bundle from the token endpoint.
///
/// Opaque to this crate beyond the fields below; lifetime and refresh are the
/// provider's concern. Stored whole in the session under the access-token key
/// and overwritten on re-login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// An authenticated end user, derived from verified id-token claims.
///
/// Only constructible inside the crate, after verification: an `Identity` in
/// hand proves the claims it wraps were checked. Recomputed per request,
/// never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    email: Option<String>,
    claims: JsonValue,
}

impl Identity {
    pub(crate) fn from_claims(claims: JsonValue) -> Self {
        let email = claims
            .get("email")
            .and_then(JsonValue::as_str)
            .map(str::to_owned);
        Self { email, claims }
    }

    /// The email claim, when the provider included one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Looks up a raw claim by name.
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<&JsonValue> {
        self.claims.get(key)
    }

    /// The full verified claim set.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_extracted_from_claims() {
        let user = Identity::from_claims(json!({"email": "a@x.com", "sub": "123"}));
        assert_eq!(user.email(), Some("a@x.com"));
        assert_eq!(user.claim("sub"), Some(&json!("123")));
    }

    #[test]
    fn email_absent_is_none() {
        let user = Identity::from_claims(json!({"sub": "123"}));
        assert_eq!(user.email(), None);
    }

    #[test]
    fn non_string_email_is_none() {
        let user = Identity::from_claims(json!({"email": 42}));
        assert_eq!(user.email(), None);
    }

    #[test]
    fn access_token_serde_round_trip() {
        let token = AccessToken {
            access_token: "ya29.abc".into(),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
            refresh_token: None,
            id_token: Some("eyJ.x.y".into()),
        };
        let value = serde_json::to_value(&token).unwrap();
        let back: AccessToken = serde_json::from_value(value).unwrap();
        assert_eq!(back, token);
    }
}
