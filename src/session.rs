//! Cookie-carried sessions.
//!
//! The whole session travels in `guestbook_session=<payload>.<tag>`: the
//! payload is base64url JSON and the tag an HMAC-SHA256 over it. Nothing is
//! kept in server memory. A cookie whose tag or age does not check out is
//! treated as if no session was sent.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponseParts, ResponseParts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    AppState,
    errors::{Error, Result},
};

pub const COOKIE_NAME: &str = "guestbook_session";

type HmacSha256 = Hmac<Sha256>;

/// Identity claims taken from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    pub subject: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Secrets of a login redirect that is still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub pkce_verifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Display name picked through `/{name}`.
    pub name: Option<String>,
    pub user: Option<SignedInUser>,
    pub pending_login: Option<PendingLogin>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: Uuid,
    issued: i64,
    data: SessionData,
}

/// The session attached to the current request.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    pub data: SessionData,
    cleared: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            data: SessionData::default(),
            cleared: false,
        }
    }
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.user.is_some()
    }

    /// Issues a new id, so a cookie seen before a privilege change can not
    /// be mistaken for the one issued after it.
    pub fn rotate_id(&mut self) {
        self.id = Uuid::new_v4();
    }

    pub fn clear(&mut self) {
        self.data = SessionData::default();
        self.cleared = true;
    }
}

#[derive(Clone)]
pub struct Sessions {
    key: HmacSha256,
    ttl: Duration,
}

impl Sessions {
    pub fn new(secret: &str, ttl: Duration) -> Result<Self> {
        let key = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            Error::InvalidConfig {
                key: "SESSION_SECRET",
                reason: e.to_string(),
            }
        })?;
        Ok(Self { key, ttl })
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.key.clone();
        mac.update(payload.as_bytes());
        mac
    }

    fn decode(&self, cookie: &str, now: DateTime<Utc>) -> Option<Envelope> {
        let (payload, tag) = cookie.split_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        // Constant-time comparison.
        self.mac(payload).verify_slice(&tag).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let envelope: Envelope = serde_json::from_slice(&json).ok()?;
        let issued = DateTime::from_timestamp(envelope.issued, 0)?;
        if now - issued > self.ttl {
            debug!(id = %envelope.id, "session expired");
            return None;
        }
        Some(envelope)
    }

    /// Resolves the session carried by the request's cookie, if any.
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let Some(envelope) = cookie_value(headers).and_then(|v| self.decode(v, Utc::now())) else {
            return Session::default();
        };
        trace!(id = %envelope.id, "session loaded");
        Session {
            id: envelope.id,
            data: envelope.data,
            cleared: false,
        }
    }

    /// Produces the cookie that carries `session` back to the browser.
    pub fn save(&self, session: Session) -> Result<SessionCookie> {
        self.save_at(session, Utc::now())
    }

    fn save_at(&self, session: Session, now: DateTime<Utc>) -> Result<SessionCookie> {
        if session.cleared && session.data == SessionData::default() {
            debug!(id = %session.id, "session cleared");
            let expired = format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
            return Ok(SessionCookie(HeaderValue::from_str(&expired)?));
        }

        let envelope = Envelope {
            id: session.id,
            issued: now.timestamp(),
            data: session.data,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&envelope)?);
        let tag = URL_SAFE_NO_PAD.encode(self.mac(&payload).finalize().into_bytes());

        let cookie = format!(
            "{COOKIE_NAME}={payload}.{tag}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.num_seconds()
        );
        Ok(SessionCookie(HeaderValue::from_str(&cookie)?))
    }
}

fn cookie_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value)
}

impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(state.sessions.load(&parts.headers))
    }
}

/// `Set-Cookie` header for the session, usable as a response part.
pub struct SessionCookie(HeaderValue);

impl IntoResponseParts for SessionCookie {
    type Error = Infallible;

    fn into_response_parts(
        self,
        mut res: ResponseParts,
    ) -> std::result::Result<ResponseParts, Self::Error> {
        res.headers_mut().append(SET_COOKIE, self.0);
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions(secret: &str) -> Sessions {
        Sessions::new(secret, Duration::hours(1)).unwrap()
    }

    fn headers_from(cookie: &SessionCookie) -> HeaderMap {
        let set_cookie = cookie.0.to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    fn named(name: &str) -> Session {
        let mut session = Session::default();
        session.data.name = Some(name.into());
        session
    }

    #[test]
    fn saved_session_round_trips_through_cookie() {
        let store = sessions("secret");
        let session = named("Grace");
        let id = session.id();
        let cookie = store.save(session).unwrap();

        let loaded = store.load(&headers_from(&cookie));
        assert_eq!(loaded.data.name.as_deref(), Some("Grace"));
        assert_eq!(loaded.id(), id);
        assert!(!loaded.is_authenticated());
    }

    #[test]
    fn any_instance_with_the_same_secret_reads_the_cookie() {
        let cookie = sessions("secret").save(named("Grace")).unwrap();
        let restarted = sessions("secret");
        assert_eq!(
            restarted.load(&headers_from(&cookie)).data.name.as_deref(),
            Some("Grace")
        );
    }

    #[test]
    fn tampered_or_foreign_cookie_is_ignored() {
        let store = sessions("secret");
        let cookie = store.save(named("Grace")).unwrap();

        assert_eq!(sessions("other-secret").load(&headers_from(&cookie)).data.name, None);

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Envelope {
                id: Uuid::new_v4(),
                issued: Utc::now().timestamp(),
                data: SessionData {
                    user: Some(SignedInUser {
                        subject: "admin".into(),
                        name: None,
                        email: None,
                    }),
                    ..SessionData::default()
                },
            })
            .unwrap(),
        );
        let genuine = cookie.0.to_str().unwrap();
        let tag = genuine.split(';').next().unwrap().rsplit('.').next().unwrap();
        let mut headers = HeaderMap::new();
        let forged = format!("{COOKIE_NAME}={forged_payload}.{tag}");
        headers.insert(COOKIE, HeaderValue::from_str(&forged).unwrap());
        assert!(!store.load(&headers).is_authenticated());
    }

    #[test]
    fn expired_session_is_dropped() {
        let store = sessions("secret");
        let cookie = store
            .save_at(named("Grace"), Utc::now() - Duration::hours(2))
            .unwrap();
        assert_eq!(store.load(&headers_from(&cookie)).data.name, None);
    }

    #[test]
    fn clearing_expires_cookie() {
        let store = sessions("secret");
        let mut session = named("Grace");
        session.clear();
        let cleared = store.save(session).unwrap();
        assert!(cleared.0.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn rotation_issues_a_new_id() {
        let mut session = Session::default();
        let before = session.id();
        session.rotate_id();
        assert_ne!(session.id(), before);
    }
}
