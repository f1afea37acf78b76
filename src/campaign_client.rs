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
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use trait_variant::make;

/// Marketing campaign offered to a device.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Whether the campaign must be watched before the user may continue.
    pub required: bool,
    pub campaign_url: Option<String>,
}

/// Operations of the external campaign manager.
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait CampaignService {
    /// Next campaign for the device, or `None` when the backend has nothing
    /// to show.
    async fn next_campaign(&self, device_id: &DeviceIdentity) -> Result<Option<Campaign>>;
}

/// HTTP client for the campaign manager, bound to one session's access
/// token. Lifecycle independent of the WiFi client.
#[derive(Debug)]
pub struct CampaignClient {
    client: Client,
    endpoint: String,
}

impl CampaignClient {
    const NEXT_CAMPAIGN_ENDPOINT: &str = "/v1/campaigns/next";

    /// Bind a new client to an access token using the configured endpoint.
    pub fn new(access_token: &str) -> Result<Self> {
        Ok(Self::with_endpoint(
            bearer_client(access_token)?,
            &AppConfig::get().campaign.endpoint,
        ))
    }

    fn with_endpoint(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl CampaignService for CampaignClient {
    async fn next_campaign(&self, device_id: &DeviceIdentity) -> Result<Option<Campaign>> {
        let url = format!("{}{}", self.endpoint, Self::NEXT_CAMPAIGN_ENDPOINT);
        info!("GET {url} for device {device_id}");

        let res = self
            .client
            .get(&url)
            .query(&[("deviceId", device_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::transport("fetch next campaign", e))?;

        if res.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = handle_http_response(res, "fetch next campaign").await?;
        let campaign: Campaign = serde_json::from_str(&body)
            .map_err(|e| Error::service("fetch next campaign", 200, e.to_string()))?;

        Ok(Some(campaign))
    }
}
