use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// One browser session's key/value record, round-tripped through the signed
/// cookie as a whole on every mutation.
pub type SessionRecord = serde_json::Map<String, JsonValue>;

/// Why a session token failed to decode.
///
/// All variants collapse to the same recovery at the session boundary: the
/// caller starts over with an empty record. This type never crosses the
/// public API.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty token")]
    Empty,
    #[error("token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Signs and verifies the cookie-borne session record.
///
/// The record is carried as the claim set of an HS256 JWT. A record may
/// include its own `exp` claim, in which case an expired token is rejected
/// like any other invalid one.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Session records are free-form maps: no claim is mandatory, and an
        // `aud` key is user data, not an audience to check.
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Serializes the full record into a signed token string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if signing fails. There is no recovery at
    /// this layer; a session `set` propagates it.
    pub fn encode(&self, record: &SessionRecord) -> Result<String, Error> {
        jsonwebtoken::encode(&Header::default(), record, &self.encoding_key)
            .map_err(|e| Error::Token(e.to_string()))
    }

    /// Verifies a token string and deserializes the record.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] on empty input, signature mismatch, a payload
    /// that is not a JSON object, or an expired `exp` claim.
    pub fn decode(&self, token: &str) -> Result<SessionRecord, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::Empty);
        }
        let data = jsonwebtoken::decode::<SessionRecord>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(entries: &[(&str, JsonValue)]) -> SessionRecord {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn round_trip_preserves_record() {
        let codec = TokenCodec::new("s3cret");
        let original = record(&[
            ("userAccessToken", json!({"access_token": "ya29.abc"})),
            ("userSettings", json!({"theme": "dark"})),
        ]);

        let token = codec.encode(&original).unwrap();
        let decoded = codec.decode(&token).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn empty_input_is_rejected() {
        let codec = TokenCodec::new("s3cret");
        assert!(matches!(codec.decode(""), Err(DecodeError::Empty)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let encoder = TokenCodec::new("secret-a");
        let decoder = TokenCodec::new("secret-b");
        let token = encoder.encode(&record(&[("k", json!("v"))])).unwrap();

        assert!(matches!(decoder.decode(&token), Err(DecodeError::Jwt(_))));
    }

    #[test]
    fn truncated_token_is_rejected() {
        let codec = TokenCodec::new("s3cret");
        let token = codec.encode(&record(&[("k", json!("v"))])).unwrap();
        let truncated = &token[..token.len() / 2];

        assert!(codec.decode(truncated).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = TokenCodec::new("s3cret");
        assert!(codec.decode("not.a.token").is_err());
    }

    #[test]
    fn expired_exp_claim_is_rejected() {
        let codec = TokenCodec::new("s3cret");
        let token = codec.encode(&record(&[("exp", json!(1000))])).unwrap();

        assert!(matches!(codec.decode(&token), Err(DecodeError::Jwt(_))));
    }

    #[test]
    fn future_exp_claim_passes() {
        let codec = TokenCodec::new("s3cret");
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 3600;
        let original = record(&[("exp", json!(exp)), ("k", json!("v"))]);

        let decoded = codec.decode(&codec.encode(&original).unwrap()).unwrap();
        assert_eq!(decoded.get("k"), Some(&json!("v")));
    }

    #[test]
    fn record_without_exp_passes() {
        let codec = TokenCodec::new("s3cret");
        let original = record(&[("k", json!("v"))]);

        assert_eq!(codec.decode(&codec.encode(&original).unwrap()).unwrap(), original);
    }
}
