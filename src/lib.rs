//! Client-side engine for the ABL WiFi connectivity service.
//!
//! Covers the full session flow of the companion app: OAuth2 login with
//! PKCE, session-scoped service clients, the legal-terms-gated WiFi
//! configuration orchestrator with its reconciliation poll, and campaign
//! interception from push and pull sources.

pub mod auth;
pub mod campaign;
pub mod campaign_client;
pub mod config;
pub mod device;
pub mod error;
pub mod http_client;
pub mod orchestrator;
pub mod push;
pub mod session;
pub mod wifi_service_client;

pub use auth::{AuthorizationBroker, AuthorizationFlow, Claims, RedirectResponse, Session};
pub use campaign::{CampaignInterceptor, DisplayOwner};
pub use campaign_client::{Campaign, CampaignClient, CampaignService};
pub use config::AppConfig;
pub use device::DeviceIdentity;
pub use error::{Error, Result};
pub use orchestrator::{
    ConnectionDisplay, ConnectionTarget, GateState, LogAlerts, PermissionListenerGuard,
    UserAlerts, WifiOrchestrator,
};
pub use session::{ServiceRegistry, SessionServices};
pub use wifi_service_client::{
    LegalTerms, PermissionRejection, WifiConnectClient, WifiService,
};
