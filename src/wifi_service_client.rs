#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::{
    config::AppConfig,
    device::DeviceIdentity,
    error::{Error, Result},
    http_client::{bearer_client, handle_http_response},
};
use log::info;
#[cfg(feature = "mock")]
use mockall::automock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt::Debug;
use tokio::sync::broadcast;
use trait_variant::make;

/// Error codes returned in WiFi service error bodies.
#[derive(Clone, Copy, Debug, Default, Deserialize_repr, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum ServiceErrorCode {
    #[default]
    Unknown = 0,
    /// The user denied the system permission prompt for WiFi control.
    UserRejected = 1,
    NetworkUnavailable = 2,
    InvalidConfiguration = 3,
}

#[derive(Debug, Deserialize, Serialize)]
struct ServiceErrorBody {
    code: ServiceErrorCode,
    #[serde(default)]
    message: String,
}

/// Current legal terms as served by the WiFi backend.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LegalTerms {
    pub version: String,
    #[serde(rename = "legalTerms")]
    pub text: String,
}

/// Out-of-band notification that the user denied the WiFi-control permission,
/// e.g. in a system dialog raised outside an explicit connect call.
#[derive(Clone, Debug)]
pub struct PermissionRejection {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ConfiguredResponse {
    configured: bool,
}

#[derive(Debug, Deserialize)]
struct AcceptedResponse {
    accepted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest<'a> {
    device_id: &'a str,
    locale_profile: &'a str,
}

#[derive(Debug, Serialize)]
struct AcceptTermsRequest<'a> {
    version: &'a str,
}

/// Operations of the external WiFi provisioning service.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait WifiService {
    async fn is_wifi_configured(&self) -> Result<bool>;
    async fn legal_terms_accepted(&self) -> Result<bool>;
    async fn latest_legal_terms(&self) -> Result<LegalTerms>;
    async fn accept_legal_terms(&self, version: &str) -> Result<()>;
    async fn connect_to_wifi(&self, device_id: &DeviceIdentity, locale_profile: &str)
    -> Result<()>;
    async fn delete_wifi_configuration(&self, device_id: &DeviceIdentity) -> Result<()>;
    /// Subscribe to out-of-band permission rejections. Unregistration is
    /// dropping the receiver.
    fn subscribe_permission_rejections(&self) -> broadcast::Receiver<PermissionRejection>;
}

/// HTTP client for the WiFi backend, bound to one session's access token.
#[derive(Debug)]
pub struct WifiConnectClient {
    client: Client,
    endpoint: String,
    permission_events: broadcast::Sender<PermissionRejection>,
}

impl WifiConnectClient {
    // API endpoint constants
    const CONFIGURED_ENDPOINT: &str = "/v1/wifi/configured";
    const LATEST_TERMS_ENDPOINT: &str = "/v1/legal-terms/latest";
    const TERMS_ACCEPTED_ENDPOINT: &str = "/v1/legal-terms/accepted";
    const ACCEPT_TERMS_ENDPOINT: &str = "/v1/legal-terms/accept";
    const CONNECT_ENDPOINT: &str = "/v1/wifi/connections";
    const CONFIGURATION_ENDPOINT: &str = "/v1/wifi/configurations";

    const PERMISSION_EVENT_CAPACITY: usize = 16;

    /// Bind a new client to an access token using the configured endpoint.
    pub fn new(access_token: &str) -> Result<Self> {
        Ok(Self::with_endpoint(
            bearer_client(access_token)?,
            &AppConfig::get().wifi.endpoint,
        ))
    }

    fn with_endpoint(client: Client, endpoint: &str) -> Self {
        let (permission_events, _) = broadcast::channel(Self::PERMISSION_EVENT_CAPACITY);
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            permission_events,
        }
    }

    /// Inject an out-of-band permission rejection.
    ///
    /// Called by platform glue when the user denies the system permission
    /// prompt outside an explicit connect call. Dropped silently when no
    /// listener is registered.
    pub fn emit_permission_rejection(&self, message: impl Into<String>) {
        let _ = self.permission_events.send(PermissionRejection {
            message: message.into(),
        });
    }

    /// Number of currently registered permission-rejection listeners.
    pub fn permission_listener_count(&self) -> usize {
        self.permission_events.receiver_count()
    }

    fn build_url(&self, path: &str) -> String {
        let normalized_path = path.trim_start_matches('/');
        format!("{}/{normalized_path}", self.endpoint)
    }

    async fn get(&self, path: &str, operation: &'static str) -> Result<String> {
        let url = self.build_url(path);
        info!("GET {url}");

        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        map_service_error(handle_http_response(res, operation).await)
    }

    async fn post_json(
        &self,
        path: &str,
        operation: &'static str,
        body: impl Debug + Serialize,
    ) -> Result<String> {
        let url = self.build_url(path);
        info!("POST {url} with body: {body:?}");

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        map_service_error(handle_http_response(res, operation).await)
    }

    async fn delete(&self, path: &str, operation: &'static str) -> Result<String> {
        let url = self.build_url(path);
        info!("DELETE {url}");

        let res = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;

        map_service_error(handle_http_response(res, operation).await)
    }
}

/// Promote service error bodies carrying `UserRejected` to the dedicated
/// [`Error::PermissionRejected`] variant.
fn map_service_error(result: Result<String>) -> Result<String> {
    match result {
        Err(Error::ExternalService {
            operation,
            status,
            detail,
        }) => {
            if let Ok(body) = serde_json::from_str::<ServiceErrorBody>(&detail)
                && body.code == ServiceErrorCode::UserRejected
            {
                return Err(Error::PermissionRejected);
            }
            Err(Error::ExternalService {
                operation,
                status,
                detail,
            })
        }
        other => other,
    }
}

impl WifiService for WifiConnectClient {
    async fn is_wifi_configured(&self) -> Result<bool> {
        let body = self
            .get(Self::CONFIGURED_ENDPOINT, "fetch wifi configuration state")
            .await?;
        let response: ConfiguredResponse = serde_json::from_str(&body).map_err(|e| {
            Error::service("fetch wifi configuration state", 200, e.to_string())
        })?;
        Ok(response.configured)
    }

    async fn legal_terms_accepted(&self) -> Result<bool> {
        let body = self
            .get(Self::TERMS_ACCEPTED_ENDPOINT, "fetch legal terms acceptance")
            .await?;
        let response: AcceptedResponse = serde_json::from_str(&body)
            .map_err(|e| Error::service("fetch legal terms acceptance", 200, e.to_string()))?;
        Ok(response.accepted)
    }

    async fn latest_legal_terms(&self) -> Result<LegalTerms> {
        let body = self
            .get(Self::LATEST_TERMS_ENDPOINT, "fetch latest legal terms")
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::service("fetch latest legal terms", 200, e.to_string()))
    }

    async fn accept_legal_terms(&self, version: &str) -> Result<()> {
        self.post_json(
            Self::ACCEPT_TERMS_ENDPOINT,
            "accept legal terms",
            AcceptTermsRequest { version },
        )
        .await?;
        Ok(())
    }

    async fn connect_to_wifi(
        &self,
        device_id: &DeviceIdentity,
        locale_profile: &str,
    ) -> Result<()> {
        self.post_json(
            Self::CONNECT_ENDPOINT,
            "connect to wifi",
            ConnectRequest {
                device_id: device_id.as_str(),
                locale_profile,
            },
        )
        .await?;
        Ok(())
    }

    async fn delete_wifi_configuration(&self, device_id: &DeviceIdentity) -> Result<()> {
        self.delete(
            &format!("{}/{}", Self::CONFIGURATION_ENDPOINT, device_id),
            "delete wifi configuration",
        )
        .await?;
        Ok(())
    }

    fn subscribe_permission_rejections(&self) -> broadcast::Receiver<PermissionRejection> {
        self.permission_events.subscribe()
    }
}
