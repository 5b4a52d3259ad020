use std::sync::{Arc, Mutex, PoisonError};

use cookie::Cookie;
use serde_json::Value as JsonValue;

use crate::codec::{SessionRecord, TokenCodec};
use crate::error::Error;

/// Key/value persistence for one browser/session principal.
///
/// The two implementations are independent backings for the same contract:
/// [`CookieSession`] round-trips the whole record through a signed cookie,
/// [`ServerSession`] proxies to a host-managed per-visitor record.
///
/// `get` returns `None` for a missing key, never an error. `delete` is a
/// no-op when the key is absent.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<JsonValue>;
    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), Error>;
    fn delete(&mut self, key: &str) -> Result<(), Error>;
}

/// Client-side session: the record lives in a signed cookie.
///
/// Construction decodes the inbound cookie value; a missing, malformed,
/// tampered, or expired cookie degrades to an empty record rather than
/// failing the request. Every mutation re-encodes the record and stages an
/// outbound replacement cookie for the host to transmit.
pub struct CookieSession {
    codec: TokenCodec,
    cookie_name: String,
    cookie_domain: Option<String>,
    values: SessionRecord,
    pending: Option<Cookie<'static>>,
}

impl CookieSession {
    /// `raw_cookie` is the inbound value of the named cookie, if the request
    /// carried one. It is passed in explicitly; this crate never reads
    /// ambient request state.
    #[must_use]
    pub fn new(
        cookie_name: impl Into<String>,
        secret: &str,
        cookie_domain: Option<String>,
        raw_cookie: Option<&str>,
    ) -> Self {
        let codec = TokenCodec::new(secret);
        let values = match raw_cookie {
            Some(raw) => codec.decode(raw).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "session cookie rejected, starting empty");
                SessionRecord::new()
            }),
            None => SessionRecord::new(),
        };

        Self {
            codec,
            cookie_name: cookie_name.into(),
            cookie_domain,
            values,
            pending: None,
        }
    }

    /// The outbound `Set-Cookie` staged by the last mutation, if any.
    #[must_use]
    pub fn pending_cookie(&self) -> Option<&Cookie<'static>> {
        self.pending.as_ref()
    }

    /// Takes the staged outbound cookie, leaving none pending.
    #[must_use]
    pub fn take_pending_cookie(&mut self) -> Option<Cookie<'static>> {
        self.pending.take()
    }

    /// Re-encodes the record and stages the replacement cookie.
    ///
    /// Session-cookie semantics: path `/`, optional domain, no max-age.
    fn stage_cookie(&mut self) -> Result<(), Error> {
        let token = self.codec.encode(&self.values)?;
        let mut builder = Cookie::build((self.cookie_name.clone(), token)).path("/");
        if let Some(domain) = &self.cookie_domain {
            builder = builder.domain(domain.clone());
        }
        self.pending = Some(builder.build());
        Ok(())
    }
}

impl SessionStore for CookieSession {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), Error> {
        self.values.insert(key.to_string(), value);
        self.stage_cookie()
    }

    fn delete(&mut self, key: &str) -> Result<(), Error> {
        if self.values.remove(key).is_some() {
            self.stage_cookie()?;
        }
        Ok(())
    }
}

/// Handle to a host-managed per-visitor record.
///
/// `None` means the session has not been started yet; [`ServerSession`]
/// initializes it exactly once, on first access.
pub type SharedSessionRecord = Arc<Mutex<Option<SessionRecord>>>;

/// Server-side session: get/set/delete proxy to the host's record.
#[derive(Clone, Default)]
pub struct ServerSession {
    handle: SharedSessionRecord,
}

impl ServerSession {
    /// A fresh, unshared record. Mostly useful in tests and CLI glue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to the record the host keeps for this visitor.
    #[must_use]
    pub fn attach(handle: SharedSessionRecord) -> Self {
        Self { handle }
    }

    /// Runs `f` against the started record, starting it first if needed.
    fn with_record<R>(&self, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        let mut guard = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(guard.get_or_insert_with(SessionRecord::new))
    }
}

impl SessionStore for ServerSession {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.with_record(|record| record.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: JsonValue) -> Result<(), Error> {
        self.with_record(|record| {
            record.insert(key.to_string(), value);
        });
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), Error> {
        self.with_record(|record| {
            record.remove(key);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_cookie_starts_empty() {
        let session = CookieSession::new("sid", "s3cret", None, None);
        assert_eq!(session.get("userAccessToken"), None);
        assert!(session.pending_cookie().is_none());
    }

    #[test]
    fn tampered_cookie_starts_empty() {
        let mut writer = CookieSession::new("sid", "s3cret", None, None);
        writer.set("k", json!("v")).unwrap();
        let raw = writer.pending_cookie().unwrap().value().to_string();
        let tampered = format!("{raw}x");

        let session = CookieSession::new("sid", "s3cret", None, Some(&tampered));
        assert_eq!(session.get("k"), None);
    }

    #[test]
    fn wrong_secret_cookie_starts_empty() {
        let mut writer = CookieSession::new("sid", "secret-a", None, None);
        writer.set("k", json!("v")).unwrap();
        let raw = writer.pending_cookie().unwrap().value().to_string();

        let session = CookieSession::new("sid", "secret-b", None, Some(&raw));
        assert_eq!(session.get("k"), None);
    }

    #[test]
    fn inbound_cookie_round_trips() {
        let mut writer = CookieSession::new("sid", "s3cret", None, None);
        writer.set("userAccessToken", json!({"access_token": "t"})).unwrap();
        let raw = writer.pending_cookie().unwrap().value().to_string();

        let session = CookieSession::new("sid", "s3cret", None, Some(&raw));
        assert_eq!(session.get("userAccessToken"), Some(json!({"access_token": "t"})));
    }

    #[test]
    fn set_stages_session_cookie() {
        let mut session =
            CookieSession::new("sid", "s3cret", Some("example.com".to_string()), None);
        session.set("k", json!("v")).unwrap();

        let cookie = session.pending_cookie().unwrap();
        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert!(cookie.max_age().is_none());

        let codec = TokenCodec::new("s3cret");
        let record = codec.decode(cookie.value()).unwrap();
        assert_eq!(record.get("k"), Some(&json!("v")));
    }

    #[test]
    fn delete_reemits_only_when_present() {
        let mut session = CookieSession::new("sid", "s3cret", None, None);
        session.delete("absent").unwrap();
        assert!(session.pending_cookie().is_none());

        session.set("k", json!("v")).unwrap();
        session.delete("k").unwrap();

        let codec = TokenCodec::new("s3cret");
        let record = codec
            .decode(session.pending_cookie().unwrap().value())
            .unwrap();
        assert!(record.is_empty());
        assert_eq!(session.get("k"), None);
    }

    #[test]
    fn last_write_wins() {
        let mut session = CookieSession::new("sid", "s3cret", None, None);
        session.set("k", json!("first")).unwrap();
        session.set("k", json!("second")).unwrap();
        assert_eq!(session.get("k"), Some(json!("second")));
    }

    #[test]
    fn server_session_get_set_delete() {
        let mut session = ServerSession::new();
        assert_eq!(session.get("k"), None);

        session.set("k", json!(1)).unwrap();
        assert_eq!(session.get("k"), Some(json!(1)));

        session.delete("k").unwrap();
        assert_eq!(session.get("k"), None);
        session.delete("k").unwrap();
    }

    #[test]
    fn server_session_shares_host_record() {
        let handle: SharedSessionRecord = Arc::default();

        let mut first = ServerSession::attach(handle.clone());
        first.set("k", json!("v")).unwrap();

        let second = ServerSession::attach(handle);
        assert_eq!(second.get("k"), Some(json!("v")));
    }
}
