use anyhow::{Context, Result};
use std::{env, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
///
/// Everything is static per build with environment-variable overrides; there
/// is no dynamic multi-tenant support.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// OAuth2/OIDC authorization configuration
    pub auth: AuthConfig,

    /// WiFi provisioning backend configuration
    pub wifi: WifiApiConfig,

    /// Campaign manager backend configuration
    pub campaign: CampaignApiConfig,

    /// Orchestrator tuning
    pub orchestrator: OrchestratorConfig,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub issuer: String,
    pub client_id: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub audience: String,
}

#[derive(Clone, Debug)]
pub struct WifiApiConfig {
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct CampaignApiConfig {
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Interval between configuration-state reconciliation polls
    pub poll_interval: Duration,

    /// Locale profile passed to the WiFi backend on connect
    pub locale_profile: String,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// On first call, loads and validates all configuration from environment
    /// variables. Subsequent calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. The client cannot operate
    /// without valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    fn load_internal() -> Result<Self> {
        Ok(Self {
            auth: AuthConfig::load()?,
            wifi: WifiApiConfig::load(),
            campaign: CampaignApiConfig::load(),
            orchestrator: OrchestratorConfig::load()?,
        })
    }
}

impl AuthConfig {
    fn load() -> Result<Self> {
        let issuer = env::var("AUTH_ISSUER")
            .unwrap_or_else(|_| "https://auth.wifi.connectivity.abl-solutions.io".to_string());
        let client_id =
            env::var("AUTH_CLIENT_ID").unwrap_or_else(|_| "wifi-connect-client".to_string());
        let redirect_url = env::var("AUTH_REDIRECT_URL")
            .unwrap_or_else(|_| "com.example.abl.wificonnectivity.login:/callback".to_string());
        let audience = env::var("AUTH_AUDIENCE").unwrap_or_else(|_| {
            "https://api.wifi.connectivity.abl-solutions.io \
             https://api.wifi-connect.campaign-manager.ads.abl-solutions.io"
                .to_string()
        });

        anyhow::ensure!(
            issuer.starts_with("https://") || issuer.starts_with("http://"),
            "failed to parse AUTH_ISSUER: not an http(s) url"
        );

        Ok(Self {
            issuer: issuer.trim_end_matches('/').to_string(),
            client_id,
            redirect_url,
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            audience,
        })
    }
}

impl WifiApiConfig {
    fn load() -> Self {
        let endpoint = env::var("WIFI_API_ENDPOINT")
            .unwrap_or_else(|_| "https://dev.api.wifi.connectivity.abl-solutions.io".to_string());

        Self { endpoint }
    }
}

impl CampaignApiConfig {
    fn load() -> Self {
        let endpoint = env::var("CAMPAIGN_API_ENDPOINT").unwrap_or_else(|_| {
            "https://dev.api.wifi-connect.campaign-manager.ads.abl-solutions.io".to_string()
        });

        Self { endpoint }
    }
}

impl OrchestratorConfig {
    fn load() -> Result<Self> {
        let poll_interval_secs = env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u64>()
            .context("failed to parse POLL_INTERVAL_SECS: invalid format")?;

        let locale_profile = env::var("LOCALE_PROFILE").unwrap_or_else(|_| "de-DE".to_string());

        Ok(Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            locale_profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_with_defaults() {
        let config = AppConfig::get();

        assert!(config.auth.issuer.starts_with("https://"));
        assert!(!config.auth.issuer.ends_with('/'));
        assert_eq!(config.auth.scopes, vec!["openid", "profile", "email"]);
        assert!(!config.wifi.endpoint.is_empty());
        assert!(!config.campaign.endpoint.is_empty());
        assert_eq!(config.orchestrator.poll_interval, Duration::from_secs(3));
        assert_eq!(config.orchestrator.locale_profile, "de-DE");
    }
}
