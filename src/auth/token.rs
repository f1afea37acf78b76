use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::time::{Duration, SystemTime};

/// Claims extracted from an ID token payload for display purposes.
///
/// Decoded without signature verification: the token comes straight from the
/// token endpoint over TLS and is only used to greet the user, never to make
/// an authorization decision.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub nonce: Option<String>,
}

impl Claims {
    /// Decode the payload segment of an ID token.
    ///
    /// Accepts both base64url (what JWTs actually use) and standard base64
    /// with padding, for providers that pad their payload segments.
    pub fn decode(id_token: &str) -> Result<Self> {
        let mut segments = id_token.split('.');
        let payload = match (segments.next(), segments.next()) {
            (Some(_), Some(payload)) => payload,
            _ => {
                return Err(Error::MalformedToken(
                    "expected at least two dot-separated segments".to_string(),
                ));
            }
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| STANDARD.decode(payload))
            .map_err(|e| Error::MalformedToken(format!("payload is not valid base64: {e}")))?;

        serde_json::from_slice(&decoded)
            .map_err(|e| Error::MalformedToken(format!("payload is not valid json: {e}")))
    }
}

/// Authenticated credential bundle for one login.
///
/// Immutable; owned by the top-level orchestration for the session lifetime
/// and discarded on logout or expiry.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<SystemTime>,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<Duration>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
            refresh_token,
            expires_at: expires_in.map(|d| SystemTime::now() + d),
        }
    }

    /// Recompute the claims view over the ID token.
    pub fn claims(&self) -> Result<Claims> {
        Claims::decode(&self.id_token)
    }

    /// Name to greet the user with; falls back to the email.
    pub fn display_name(&self) -> Result<String> {
        let claims = self.claims()?;
        claims
            .nickname
            .or(claims.email)
            .ok_or_else(|| Error::MalformedToken("token carries no nickname or email".to_string()))
    }

    /// Whether the access token has expired. A session without an expiry
    /// timestamp is treated as non-expiring.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => SystemTime::now() >= expires_at,
            None => false,
        }
    }
}

// Keep tokens out of debug output.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn encode_token(payload: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode("signature")
        )
    }

    mod decode {
        use super::*;

        #[test]
        fn valid_token_yields_claims() {
            let token =
                encode_token(r#"{"nickname":"jane","email":"jane@example.com","nonce":"n-1"}"#);

            let claims = Claims::decode(&token).unwrap();

            assert_eq!(claims.nickname.as_deref(), Some("jane"));
            assert_eq!(claims.email.as_deref(), Some("jane@example.com"));
            assert_eq!(claims.nonce.as_deref(), Some("n-1"));
        }

        #[test]
        fn missing_fields_default_to_none() {
            let token = encode_token(r#"{"sub":"user-1"}"#);

            let claims = Claims::decode(&token).unwrap();

            assert!(claims.nickname.is_none());
            assert!(claims.email.is_none());
            assert!(claims.nonce.is_none());
        }

        #[test]
        fn standard_base64_payload_is_accepted() {
            let payload = STANDARD.encode(r#"{"nickname":"jane"}"#);
            let token = format!("header.{payload}.sig");

            let claims = Claims::decode(&token).unwrap();

            assert_eq!(claims.nickname.as_deref(), Some("jane"));
        }

        #[test]
        fn single_segment_fails() {
            let err = Claims::decode("no-dots-here").unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)));
        }

        #[test]
        fn empty_input_fails() {
            let err = Claims::decode("").unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)));
        }

        #[test]
        fn invalid_base64_payload_fails() {
            let err = Claims::decode("header.!!notbase64!!.sig").unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)));
        }

        #[test]
        fn non_json_payload_fails() {
            let payload = URL_SAFE_NO_PAD.encode("not json at all");
            let err = Claims::decode(&format!("header.{payload}.sig")).unwrap_err();
            assert!(matches!(err, Error::MalformedToken(_)));
        }
    }

    mod session {
        use super::*;

        #[test]
        fn display_name_prefers_nickname() {
            let token =
                encode_token(r#"{"nickname":"jane","email":"jane@example.com"}"#);
            let session = Session::new("access", token, None, None);

            assert_eq!(session.display_name().unwrap(), "jane");
        }

        #[test]
        fn display_name_falls_back_to_email() {
            let token = encode_token(r#"{"email":"jane@example.com"}"#);
            let session = Session::new("access", token, None, None);

            assert_eq!(session.display_name().unwrap(), "jane@example.com");
        }

        #[test]
        fn session_without_expiry_never_expires() {
            let session = Session::new("access", "a.b.c", None, None);
            assert!(!session.is_expired());
        }

        #[test]
        fn session_with_past_expiry_is_expired() {
            let session = Session::new("access", "a.b.c", None, Some(Duration::ZERO));
            assert!(session.is_expired());
        }

        #[test]
        fn session_with_future_expiry_is_live() {
            let session =
                Session::new("access", "a.b.c", None, Some(Duration::from_secs(3600)));
            assert!(!session.is_expired());
        }

        #[test]
        fn debug_output_redacts_tokens() {
            let session = Session::new("secret-access", "secret-id", None, None);
            let debug = format!("{session:?}");

            assert!(!debug.contains("secret-access"));
            assert!(!debug.contains("secret-id"));
        }
    }
}
