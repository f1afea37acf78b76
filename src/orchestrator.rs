//! WiFi configuration orchestration.
//!
//! The central state machine of the client: legal-terms gating, optimistic
//! connect/disconnect sequencing, periodic reconciliation of the displayed
//! configuration state against the backend's ground truth, and out-of-band
//! permission-rejection handling.
//!
//! Displayed connection state is deliberately tri-state: an explicit
//! `Pending` makes the optimistic window observable instead of hiding it
//! inside a boolean flip.

use crate::{
    device::DeviceIdentity,
    error::{Error, Result},
    wifi_service_client::{LegalTerms, WifiService},
};
use log::{debug, info, warn};
#[cfg(feature = "mock")]
use mockall::automock;
use std::{
    fmt::Display,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const PERMISSION_ALERT_TITLE: &str = "Permission Required";
const PERMISSION_ALERT_MESSAGE: &str = "You need to grant permission to change WiFi \
     configurations for this app. Go to Settings > Apps & notifications > Special access > \
     Wi-Fi control and enable \"Allow app to control Wi-Fi\".";

/// Sink for user-facing alerts; the embedding UI decides how to render them.
#[cfg_attr(feature = "mock", automock)]
pub trait UserAlerts: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// Alert sink for headless use: alerts go to the log.
#[derive(Default)]
pub struct LogAlerts;

impl UserAlerts for LogAlerts {
    fn alert(&self, title: &str, message: &str) {
        warn!("{title}: {message}");
    }
}

/// Where the session is in the legal-terms flow.
#[derive(Clone, Debug, PartialEq)]
pub enum GateState {
    /// No session.
    LoggedOut,
    /// Session exists, acceptance state not yet known. The connect toggle
    /// must stay unreachable here.
    AwaitingLegalTerms,
    /// Terms fetched but not accepted; still gated.
    LegalTermsPending(LegalTerms),
    /// Gate satisfied, connect/disconnect available.
    Ready,
}

impl Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            GateState::LoggedOut => "LoggedOut",
            GateState::AwaitingLegalTerms => "AwaitingLegalTerms",
            GateState::LegalTermsPending(_) => "LegalTermsPending",
            GateState::Ready => "Ready",
        };
        write!(f, "{state}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionTarget {
    Connected,
    Disconnected,
}

/// Connection state as shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionDisplay {
    Disconnected,
    /// An operation is in flight; the display already shows its target.
    Pending { target: ConnectionTarget },
    Connected,
}

impl Display for ConnectionDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionDisplay::Disconnected => write!(f, "disconnected"),
            ConnectionDisplay::Pending { target } => write!(f, "pending ({target:?})"),
            ConnectionDisplay::Connected => write!(f, "connected"),
        }
    }
}

struct OrchestratorState {
    gate: GateState,
    connection: ConnectionDisplay,
}

/// Suppresses the reconciliation poll for as long as it is held.
///
/// Dropping restores the poll unconditionally, also on error paths.
struct OperationGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> OperationGuard<'a> {
    fn hold(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// RAII registration of the out-of-band permission-rejection listener.
///
/// Dropping (or [`join`](Self::join)ing) cancels the listener task, which
/// drops its event receiver — one unregistration per registration, also when
/// teardown happens mid-flow.
pub struct PermissionListenerGuard {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PermissionListenerGuard {
    /// Cancel the listener and wait for it to finish.
    pub async fn join(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            debug!("permission listener task ended abnormally: {e}");
        }
    }
}

impl Drop for PermissionListenerGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct WifiOrchestrator<Wifi, Alerts>
where
    Wifi: WifiService,
    Alerts: UserAlerts,
{
    wifi: Arc<Wifi>,
    alerts: Arc<Alerts>,
    device_id: DeviceIdentity,
    locale_profile: String,
    state: Arc<Mutex<OrchestratorState>>,
    operation_in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl<Wifi, Alerts> Clone for WifiOrchestrator<Wifi, Alerts>
where
    Wifi: WifiService,
    Alerts: UserAlerts,
{
    fn clone(&self) -> Self {
        Self {
            wifi: self.wifi.clone(),
            alerts: self.alerts.clone(),
            device_id: self.device_id.clone(),
            locale_profile: self.locale_profile.clone(),
            state: self.state.clone(),
            operation_in_flight: self.operation_in_flight.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<Wifi, Alerts> WifiOrchestrator<Wifi, Alerts>
where
    Wifi: WifiService + Send + Sync + 'static,
    Alerts: UserAlerts + 'static,
{
    pub fn new(
        wifi: Arc<Wifi>,
        alerts: Arc<Alerts>,
        device_id: DeviceIdentity,
        locale_profile: impl Into<String>,
    ) -> Self {
        Self {
            wifi,
            alerts,
            device_id,
            locale_profile: locale_profile.into(),
            state: Arc::new(Mutex::new(OrchestratorState {
                gate: GateState::LoggedOut,
                connection: ConnectionDisplay::Disconnected,
            })),
            operation_in_flight: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn gate(&self) -> GateState {
        self.state.lock().unwrap().gate.clone()
    }

    pub fn connection(&self) -> ConnectionDisplay {
        self.state.lock().unwrap().connection
    }

    pub fn legal_terms(&self) -> Option<LegalTerms> {
        match &self.state.lock().unwrap().gate {
            GateState::LegalTermsPending(terms) => Some(terms.clone()),
            _ => None,
        }
    }

    /// Bring the orchestrator up for a fresh session.
    ///
    /// Fetches acceptance state and the latest terms concurrently (order
    /// independent), then the initial configuration state. On failure the
    /// gate stays at `AwaitingLegalTerms` and the error surfaces.
    pub async fn start(&self) -> Result<()> {
        self.set_gate(GateState::AwaitingLegalTerms);

        let (accepted, terms) = tokio::join!(
            self.wifi.legal_terms_accepted(),
            self.wifi.latest_legal_terms(),
        );
        let accepted = accepted?;
        let terms = terms?;

        if accepted {
            self.set_gate(GateState::Ready);
        } else {
            info!("legal terms {} pending acceptance", terms.version);
            self.set_gate(GateState::LegalTermsPending(terms));
        }

        // Initial display state; a failure here is tolerable, the
        // reconciliation poll will correct it.
        match self.wifi.is_wifi_configured().await {
            Ok(configured) => self.set_connection(connection_from(configured)),
            Err(e) => debug!("initial configuration fetch failed: {e}"),
        }

        Ok(())
    }

    /// Accept the pending legal terms; `LegalTermsPending → Ready` on
    /// success, unchanged state on failure.
    pub async fn accept_legal_terms(&self, version: &str) -> Result<()> {
        match self.gate() {
            GateState::LegalTermsPending(_) => {}
            GateState::Ready => return Ok(()),
            _ => return Err(Error::LegalTermsNotAccepted),
        }

        self.wifi.accept_legal_terms(version).await?;

        info!("legal terms {version} accepted");
        self.set_gate(GateState::Ready);
        Ok(())
    }

    /// Connect the device, optimistically showing the target state while the
    /// call is in flight. The reconciliation poll is suppressed for the
    /// duration and resumed unconditionally.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_ready()?;
        let _guard = OperationGuard::hold(&self.operation_in_flight);

        self.apply_connection(ConnectionDisplay::Pending {
            target: ConnectionTarget::Connected,
        });

        match self
            .wifi
            .connect_to_wifi(&self.device_id, &self.locale_profile)
            .await
        {
            Ok(()) => {
                info!("wifi connected for device {}", self.device_id);
                self.apply_connection(ConnectionDisplay::Connected);
                Ok(())
            }
            Err(Error::PermissionRejected) => {
                self.apply_connection(ConnectionDisplay::Disconnected);
                if !self.cancel.is_cancelled() {
                    self.alerts
                        .alert(PERMISSION_ALERT_TITLE, PERMISSION_ALERT_MESSAGE);
                }
                Err(Error::PermissionRejected)
            }
            Err(e) => {
                self.apply_connection(ConnectionDisplay::Disconnected);
                Err(e)
            }
        }
    }

    /// Disconnect the device. A failed delete keeps the optimistic
    /// disconnected display; the next reconciliation poll corrects the
    /// drift (see DESIGN.md).
    pub async fn disconnect(&self) -> Result<()> {
        self.ensure_ready()?;
        let _guard = OperationGuard::hold(&self.operation_in_flight);

        self.apply_connection(ConnectionDisplay::Pending {
            target: ConnectionTarget::Disconnected,
        });

        let result = self.wifi.delete_wifi_configuration(&self.device_id).await;
        if let Err(e) = &result {
            warn!("disconnect failed, display stays disconnected until reconciled: {e}");
        }
        self.apply_connection(ConnectionDisplay::Disconnected);

        result
    }

    /// One reconciliation step: overwrite the displayed state with the
    /// backend's ground truth, unless an operation is in flight.
    pub async fn reconcile_once(&self) -> Result<()> {
        if matches!(self.gate(), GateState::LoggedOut) {
            return Ok(());
        }
        if self.operation_in_flight.load(Ordering::SeqCst) {
            return Ok(());
        }

        let configured = self.wifi.is_wifi_configured().await?;

        // Re-check: an operation may have started while the fetch was out.
        if !self.operation_in_flight.load(Ordering::SeqCst) {
            self.set_connection(connection_from(configured));
        }

        Ok(())
    }

    /// Spawn the periodic reconciliation task, tied to this orchestrator's
    /// lifetime: [`shutdown`](Self::shutdown) cancels it.
    pub fn spawn_reconciler(&self, poll_interval: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval fires immediately; skip that first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = orchestrator.cancel.cancelled() => {
                        debug!("reconciliation poll cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = orchestrator.reconcile_once().await {
                            debug!("reconciliation failed: {e}");
                        }
                    }
                }
            }
        })
    }

    /// Register for out-of-band permission rejections; every event raises
    /// the instructional alert. The returned guard unregisters on drop and
    /// is additionally cancelled by [`shutdown`](Self::shutdown).
    pub fn spawn_permission_listener(&self) -> PermissionListenerGuard {
        let mut events = self.wifi.subscribe_permission_rejections();
        let alerts = self.alerts.clone();
        let cancel = self.cancel.child_token();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(rejection) => {
                            warn!(
                                "wifi permission rejected out-of-band: {}",
                                rejection.message
                            );
                            alerts.alert(PERMISSION_ALERT_TITLE, PERMISSION_ALERT_MESSAGE);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!("permission listener lagged, missed {missed} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        PermissionListenerGuard { cancel, handle }
    }

    /// Tear the orchestrator down: cancel the reconciler and any listeners,
    /// drop back to `LoggedOut`. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock().unwrap();
        state.gate = GateState::LoggedOut;
        state.connection = ConnectionDisplay::Disconnected;
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.gate() {
            GateState::Ready => Ok(()),
            _ => Err(Error::LegalTermsNotAccepted),
        }
    }

    fn set_gate(&self, gate: GateState) {
        debug!("gate state -> {gate}");
        self.state.lock().unwrap().gate = gate;
    }

    fn set_connection(&self, connection: ConnectionDisplay) {
        self.state.lock().unwrap().connection = connection;
    }

    /// Write the display unless the session ended while the call was out.
    ///
    /// `shutdown` flips the gate to `LoggedOut` under the same lock, so a
    /// stale connect/disconnect result can never overwrite post-logout
    /// state.
    fn apply_connection(&self, connection: ConnectionDisplay) {
        let mut state = self.state.lock().unwrap();
        if matches!(state.gate, GateState::LoggedOut) || self.cancel.is_cancelled() {
            debug!("session ended mid-operation, discarding result {connection}");
            return;
        }
        state.connection = connection;
    }
}

fn connection_from(configured: bool) -> ConnectionDisplay {
    if configured {
        ConnectionDisplay::Connected
    } else {
        ConnectionDisplay::Disconnected
    }
}
