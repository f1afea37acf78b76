use std::fmt;
use uuid::Uuid;

/// Stable per-install device identifier.
///
/// One strategy behind one type: the canonical identity is a random UUID
/// generated at startup; a push-registration token can be used instead when
/// the integration wants the device keyed by its push identity. The two are
/// not interchangeable mid-session.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Random identity, generated once per install/process.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identity derived from a platform push-registration token.
    pub fn from_push_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identities_are_unique() {
        assert_ne!(DeviceIdentity::random(), DeviceIdentity::random());
    }

    #[test]
    fn push_token_identity_is_stable() {
        let id = DeviceIdentity::from_push_token("fcm-token-123");
        assert_eq!(id.as_str(), "fcm-token-123");
        assert_eq!(id.to_string(), "fcm-token-123");
    }
}
