//! Session-scoped service construction.
//!
//! Service handles are rebuilt on every authorization change. The bundle is
//! an explicit owned object created from a [`Session`]; the
//! [`ServiceRegistry`] offers a "get the current service" access pattern for
//! the binary, but it is an owned value too, not hidden process state.

use crate::{
    auth::Session,
    campaign_client::CampaignClient,
    error::{Error, Result},
    wifi_service_client::WifiConnectClient,
};
use std::sync::{Arc, Mutex};

/// Service handles bound to one session's access token.
///
/// Creating a bundle for a new session replaces the previous handles; the
/// re-creation on every authorization change is intentional.
#[derive(Clone)]
pub struct SessionServices {
    pub wifi: Arc<WifiConnectClient>,
    pub campaign: Arc<CampaignClient>,
}

impl SessionServices {
    pub fn create(session: &Session) -> Result<Self> {
        Ok(Self {
            wifi: Arc::new(WifiConnectClient::new(&session.access_token)?),
            campaign: Arc::new(CampaignClient::new(&session.access_token)?),
        })
    }
}

/// Holder for the current session's services.
///
/// Reading while no session exists fails with
/// [`Error::ServiceNotInitialized`] — that is a sequencing bug in the caller.
#[derive(Default)]
pub struct ServiceRegistry {
    current: Mutex<Option<SessionServices>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the services for a new session, replacing any previous ones.
    pub fn initialize(&self, services: SessionServices) {
        *self.current.lock().unwrap() = Some(services);
    }

    /// Drop the current session's services on logout.
    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }

    pub fn wifi(&self) -> Result<Arc<WifiConnectClient>> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.wifi.clone())
            .ok_or(Error::ServiceNotInitialized)
    }

    pub fn campaign(&self) -> Result<Arc<CampaignClient>> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.campaign.clone())
            .ok_or(Error::ServiceNotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_fails_fast() {
        let registry = ServiceRegistry::new();

        assert!(matches!(
            registry.wifi().unwrap_err(),
            Error::ServiceNotInitialized
        ));
        assert!(matches!(
            registry.campaign().unwrap_err(),
            Error::ServiceNotInitialized
        ));
    }

    #[test]
    fn initialized_registry_hands_out_services() {
        let session = Session::new("access-token", "a.b.c", None, None);
        let registry = ServiceRegistry::new();
        registry.initialize(SessionServices::create(&session).unwrap());

        assert!(registry.wifi().is_ok());
        assert!(registry.campaign().is_ok());
    }

    #[test]
    fn new_session_replaces_prior_handles() {
        let registry = ServiceRegistry::new();

        let first = Session::new("first-token", "a.b.c", None, None);
        registry.initialize(SessionServices::create(&first).unwrap());
        let first_wifi = registry.wifi().unwrap();

        let second = Session::new("second-token", "a.b.c", None, None);
        registry.initialize(SessionServices::create(&second).unwrap());
        let second_wifi = registry.wifi().unwrap();

        assert!(!Arc::ptr_eq(&first_wifi, &second_wifi));
    }

    #[test]
    fn cleared_registry_fails_again() {
        let session = Session::new("access-token", "a.b.c", None, None);
        let registry = ServiceRegistry::new();
        registry.initialize(SessionServices::create(&session).unwrap());

        registry.clear();

        assert!(matches!(
            registry.wifi().unwrap_err(),
            Error::ServiceNotInitialized
        ));
    }
}
