//! Campaign interception.
//!
//! A campaign can arrive from two independent sources: an inbound push
//! message whose body carries the campaign URL, or an explicit fetch from the
//! campaign manager. While a campaign with a URL is active it owns the
//! display; the normal WiFi UI comes back once the viewer navigates to a
//! target carrying the completion marker, or the campaign is cleared.

use crate::{campaign_client::Campaign, campaign_client::CampaignService, device::DeviceIdentity};
use crate::push::PushMessage;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Query parameter a campaign page appends to signal completion.
pub const COMPLETION_MARKER: &str = "campaign-completed=true";

/// Who currently owns the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayOwner {
    Orchestrator,
    Campaign,
}

#[derive(Default)]
pub struct CampaignInterceptor {
    active: Mutex<Option<Campaign>>,
}

impl CampaignInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active campaign, if any.
    pub fn active(&self) -> Option<Campaign> {
        self.active.lock().unwrap().clone()
    }

    /// A campaign with a present URL takes exclusive display ownership.
    pub fn display_owner(&self) -> DisplayOwner {
        match self.active.lock().unwrap().as_ref() {
            Some(campaign) if campaign.campaign_url.is_some() => DisplayOwner::Campaign,
            _ => DisplayOwner::Orchestrator,
        }
    }

    /// Push-triggered source: an inbound notification body is taken as the
    /// campaign URL, unconditionally non-required.
    pub fn intercept_push(&self, campaign_url: impl Into<String>) {
        let campaign = Campaign {
            required: false,
            campaign_url: Some(campaign_url.into()),
        };
        info!("campaign intercepted from push: {campaign:?}");
        *self.active.lock().unwrap() = Some(campaign);
    }

    /// Pull-triggered source: ask the campaign manager for the next campaign.
    ///
    /// Failures are logged and swallowed; they must never block login or the
    /// WiFi connection flow.
    pub async fn fetch_next<Service>(&self, service: &Service, device_id: &DeviceIdentity)
    where
        Service: CampaignService,
    {
        match service.next_campaign(device_id).await {
            Ok(Some(campaign)) => {
                info!("campaign fetched: {campaign:?}");
                *self.active.lock().unwrap() = Some(campaign);
            }
            Ok(None) => {
                debug!("no campaign pending for device {device_id}");
            }
            Err(e) => {
                warn!("failed to fetch next campaign, ignoring: {e}");
            }
        }
    }

    /// Inspect a viewer navigation target; a completion marker clears the
    /// active campaign and returns display ownership.
    ///
    /// Returns `true` when the campaign was completed by this navigation.
    pub fn on_navigation(&self, target: &str) -> bool {
        if !navigation_completes(target) {
            return false;
        }

        info!("campaign completed via navigation to {target}");
        self.clear();
        true
    }

    pub fn clear(&self) {
        *self.active.lock().unwrap() = None;
    }

    /// Consume foreground push messages, turning URL-carrying bodies into
    /// active campaigns. Runs until cancelled or the inbox closes.
    pub fn spawn_push_listener(
        self: Arc<Self>,
        mut inbox: mpsc::Receiver<PushMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = inbox.recv() => {
                        let Some(message) = message else { break };
                        match message.body {
                            Some(body) if body.starts_with("http") => self.intercept_push(body),
                            _ => debug!("push message without campaign url ignored"),
                        }
                    }
                }
            }
        })
    }
}

/// Marker detection: prefer proper URL query parsing, fall back to a raw
/// substring match for fragment-style navigations the viewer reports.
fn navigation_completes(target: &str) -> bool {
    if let Ok(url) = url::Url::parse(target) {
        let completed_in_query = url
            .query_pairs()
            .any(|(key, value)| key == "campaign-completed" && value == "true");
        if completed_in_query {
            return true;
        }
    }

    target.contains(COMPLETION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    mod push_source {
        use super::*;

        #[test]
        fn push_sets_non_required_campaign_and_takes_display() {
            let interceptor = CampaignInterceptor::new();
            assert_eq!(interceptor.display_owner(), DisplayOwner::Orchestrator);

            interceptor.intercept_push("https://campaign.example/123");

            let campaign = interceptor.active().unwrap();
            assert!(!campaign.required);
            assert_eq!(
                campaign.campaign_url.as_deref(),
                Some("https://campaign.example/123")
            );
            assert_eq!(interceptor.display_owner(), DisplayOwner::Campaign);
        }

        #[tokio::test]
        async fn push_listener_intercepts_url_bodies() {
            let interceptor = Arc::new(CampaignInterceptor::new());
            let (tx, rx) = crate::push::channel();
            let cancel = CancellationToken::new();
            let handle = interceptor.clone().spawn_push_listener(rx, cancel.clone());

            tx.send(PushMessage {
                body: Some("https://campaign.example/123".to_string()),
            })
            .await
            .unwrap();
            drop(tx);
            handle.await.unwrap();

            assert_eq!(interceptor.display_owner(), DisplayOwner::Campaign);
            assert_eq!(
                interceptor.active().unwrap().campaign_url.as_deref(),
                Some("https://campaign.example/123")
            );
        }

        #[tokio::test]
        async fn push_listener_ignores_non_url_bodies() {
            let interceptor = Arc::new(CampaignInterceptor::new());
            let (tx, rx) = crate::push::channel();
            let handle = interceptor
                .clone()
                .spawn_push_listener(rx, CancellationToken::new());

            tx.send(PushMessage {
                body: Some("hello there".to_string()),
            })
            .await
            .unwrap();
            tx.send(PushMessage { body: None }).await.unwrap();
            drop(tx);
            handle.await.unwrap();

            assert!(interceptor.active().is_none());
        }
    }

    mod pull_source {
        use super::*;
        use crate::campaign_client::Campaign;

        struct StaticCampaignService {
            response: Option<Campaign>,
        }

        impl CampaignService for StaticCampaignService {
            async fn next_campaign(
                &self,
                _device_id: &DeviceIdentity,
            ) -> crate::error::Result<Option<Campaign>> {
                Ok(self.response.clone())
            }
        }

        struct FailingCampaignService;

        impl CampaignService for FailingCampaignService {
            async fn next_campaign(
                &self,
                _device_id: &DeviceIdentity,
            ) -> crate::error::Result<Option<Campaign>> {
                Err(Error::service("fetch next campaign", 500, "boom"))
            }
        }

        #[tokio::test]
        async fn fetched_campaign_keeps_its_required_flag() {
            let interceptor = CampaignInterceptor::new();
            let service = StaticCampaignService {
                response: Some(Campaign {
                    required: true,
                    campaign_url: Some("https://campaign.example/9".to_string()),
                }),
            };

            interceptor
                .fetch_next(&service, &DeviceIdentity::random())
                .await;

            let campaign = interceptor.active().unwrap();
            assert!(campaign.required);
            assert_eq!(interceptor.display_owner(), DisplayOwner::Campaign);
        }

        #[tokio::test]
        async fn no_pending_campaign_leaves_display_alone() {
            let interceptor = CampaignInterceptor::new();
            let service = StaticCampaignService { response: None };

            interceptor
                .fetch_next(&service, &DeviceIdentity::random())
                .await;

            assert!(interceptor.active().is_none());
            assert_eq!(interceptor.display_owner(), DisplayOwner::Orchestrator);
        }

        #[tokio::test]
        async fn fetch_failure_is_swallowed() {
            let interceptor = CampaignInterceptor::new();

            interceptor
                .fetch_next(&FailingCampaignService, &DeviceIdentity::random())
                .await;

            assert!(interceptor.active().is_none());
            assert_eq!(interceptor.display_owner(), DisplayOwner::Orchestrator);
        }

        #[tokio::test]
        async fn campaign_without_url_does_not_take_display() {
            let interceptor = CampaignInterceptor::new();
            let service = StaticCampaignService {
                response: Some(Campaign {
                    required: false,
                    campaign_url: None,
                }),
            };

            interceptor
                .fetch_next(&service, &DeviceIdentity::random())
                .await;

            assert!(interceptor.active().is_some());
            assert_eq!(interceptor.display_owner(), DisplayOwner::Orchestrator);
        }
    }

    mod completion {
        use super::*;

        fn with_active_campaign() -> CampaignInterceptor {
            let interceptor = CampaignInterceptor::new();
            interceptor.intercept_push("https://campaign.example/123");
            interceptor
        }

        #[test]
        fn marker_in_query_completes() {
            let interceptor = with_active_campaign();

            let completed = interceptor
                .on_navigation("https://campaign.example/done?campaign-completed=true");

            assert!(completed);
            assert!(interceptor.active().is_none());
            assert_eq!(interceptor.display_owner(), DisplayOwner::Orchestrator);
        }

        #[test]
        fn marker_among_other_parameters_completes() {
            let interceptor = with_active_campaign();

            assert!(interceptor.on_navigation(
                "https://campaign.example/done?utm_source=push&campaign-completed=true&x=1"
            ));
        }

        #[test]
        fn marker_in_fragment_style_target_completes() {
            let interceptor = with_active_campaign();

            assert!(interceptor.on_navigation("app://viewer#campaign-completed=true"));
        }

        #[test]
        fn unrelated_navigation_keeps_campaign_active() {
            let interceptor = with_active_campaign();

            let completed = interceptor.on_navigation("https://campaign.example/page2");

            assert!(!completed);
            assert_eq!(interceptor.display_owner(), DisplayOwner::Campaign);
        }

        #[test]
        fn marker_with_wrong_value_does_not_complete() {
            let interceptor = with_active_campaign();

            assert!(
                !interceptor.on_navigation("https://campaign.example/?campaign-completed=false")
            );
            assert_eq!(interceptor.display_owner(), DisplayOwner::Campaign);
        }
    }
}
