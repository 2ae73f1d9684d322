//! Data-refresh coordinator for Landau
//!
//! This module contains the core state machine that owns the vendor cloud
//! session, polls the customer-data and CAN-data endpoints, accounts for
//! API calls per day, throttles CAN polling overnight, and publishes the
//! latest snapshot to host-platform consumers.
//!
//! All operations run on a single task: the run loop serializes scheduled
//! refreshes, forced refreshes, and command sends, so the session state,
//! counters, and timestamps are only ever mutated from one place.

use crate::api::CloudClient;
use crate::config::Config;
use crate::error::{LandauError, Result};
use crate::logging::get_logger;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

/// A scheduled full update younger than this keeps CAN polling throttled
/// during the night window
const FULL_UPDATE_FRESH_HOURS: i64 = 4;

/// Minimum spacing between reauthentication prompts to the host
const REAUTH_SUPPRESS_HOURS: i64 = 6;

/// Vendor data from the latest successful refresh cycle.
///
/// Replaced wholesale each cycle; consumers hold a read-only reference to
/// the latest snapshot through the watch channel.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    /// Customer payload (account, vehicles, last position)
    pub customer_data: Value,

    /// CAN bus payload, possibly empty when throttled or degraded
    pub can_bus_data: Value,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            customer_data: Value::Null,
            can_bus_data: empty_can(),
        }
    }
}

impl TelemetrySnapshot {
    /// First vehicle in the customer payload (single-vehicle accounts)
    pub fn vehicle(&self) -> Option<&Value> {
        self.customer_data.get("vehicles").and_then(|v| v.get(0))
    }

    /// Whether the latest cycle produced any CAN content
    pub fn has_can_data(&self) -> bool {
        self.can_bus_data
            .as_object()
            .is_some_and(|o| !o.is_empty())
    }
}

fn empty_can() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Per-day API call accounting, reset once when the local date advances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyCounters {
    date: Option<NaiveDate>,

    /// Customer-data calls attempted today
    pub calls_total: u64,

    /// Customer-data calls failed today
    pub calls_failed: u64,

    /// CAN-data calls attempted today
    pub can_calls_total: u64,

    /// CAN-data calls failed today
    pub can_calls_failed: u64,
}

impl DailyCounters {
    /// Reset all counters when `today` differs from the stored date.
    /// Returns true when a rollover happened.
    pub fn rollover_if_needed(&mut self, today: NaiveDate) -> bool {
        if self.date == Some(today) {
            return false;
        }
        *self = Self {
            date: Some(today),
            ..Self::default()
        };
        true
    }

    /// Local date the counters currently account for
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

/// Wraparound night-window test on a local hour, e.g. 20→8 spans midnight
pub fn night_window_contains(hour: u32, night_start: u8, night_end: u8) -> bool {
    hour >= u32::from(night_start) || hour < u32::from(night_end)
}

/// Pull the asset identifier from the first vehicle of a customer payload.
/// An absent or empty vehicle list yields `None`.
fn extract_asset_id(customer_data: &Value) -> Option<String> {
    let asset = customer_data.get("vehicles")?.get(0)?.get("asset")?;
    match asset {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How a refresh cycle was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshKind {
    /// Periodic trigger; night throttling applies and only customer data
    /// retries on 401
    Scheduled,

    /// User-triggered; CAN is always attempted and also retries on 401
    Forced,
}

/// Commands accepted by the coordinator from host bindings
#[derive(Debug, Clone)]
pub enum CoordinatorCommand {
    /// Immediate refresh that bypasses the night throttle
    ForceRefresh,

    /// Post a CAN command and refresh afterwards
    SendCanCommand { endpoint: u32, payload: Vec<u8> },
}

/// Refresh coordinator for the vendor telematics cloud
pub struct RefreshCoordinator {
    /// Configuration
    config: Config,

    /// Timezone for the night window and counter rollover
    tz: Tz,

    /// Vendor cloud client
    client: CloudClient,

    /// Vendor-side customer identifier from the last login
    customer_id: Option<String>,

    /// Bearer token; cleared and re-acquired on authentication failure
    bearer_token: Option<String>,

    /// Asset identifier extracted from the first vehicle
    asset_id: Option<String>,

    /// Per-day call accounting
    counters: DailyCounters,

    /// Set after any successful customer-data fetch
    last_full_update: Option<DateTime<Utc>>,

    /// Set only after a CAN fetch that yields a non-empty payload
    last_can_update: Option<DateTime<Utc>>,

    /// Reauth prompt throttle state
    last_reauth_prompt: Option<DateTime<Utc>>,
    reauth_prompts: u64,

    /// Latest snapshot published to consumers
    snapshot_tx: watch::Sender<Arc<TelemetrySnapshot>>,

    /// Need-credentials signal to the host (prompt count)
    reauth_tx: watch::Sender<u64>,

    /// Command receiver for host bindings
    commands_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Logger with context
    logger: crate::logging::StructuredLogger,
}

impl RefreshCoordinator {
    /// Create a new coordinator instance
    pub fn new(
        config: Config,
        commands_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
    ) -> Result<Self> {
        config.validate()?;
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| LandauError::config(format!("Invalid timezone: {}", config.timezone)))?;
        let client = CloudClient::new(&config.api)?;

        let (snapshot_tx, _) = watch::channel(Arc::new(TelemetrySnapshot::default()));
        let (reauth_tx, _) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            tz,
            client,
            customer_id: None,
            bearer_token: None,
            asset_id: None,
            counters: DailyCounters::default(),
            last_full_update: None,
            last_can_update: None,
            last_reauth_prompt: None,
            reauth_prompts: 0,
            snapshot_tx,
            reauth_tx,
            commands_rx,
            shutdown_tx,
            shutdown_rx,
            logger: get_logger("coordinator"),
        })
    }

    /// Run the coordinator loop: periodic refreshes plus host commands
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting telematics refresh loop");

        let mut poll_interval = interval(self.config.update_interval());

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        self.logger.error(&format!("Refresh cycle failed: {}", e));
                        // Keep polling; the next cycle re-derives everything
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Request shutdown of the run loop
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send(()).ok();
    }

    /// Sender that requests shutdown of the run loop from another task
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    async fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::ForceRefresh => {
                if let Err(e) = self.force_refresh().await {
                    self.logger.error(&format!("Forced refresh failed: {}", e));
                }
            }
            CoordinatorCommand::SendCanCommand { endpoint, payload } => {
                self.send_can_command(endpoint, &payload).await;
            }
        }
    }

    /// Scheduled refresh cycle at the current instant
    pub async fn refresh(&mut self) -> Result<Arc<TelemetrySnapshot>> {
        self.refresh_at(Utc::now()).await
    }

    /// Forced (user-triggered) refresh at the current instant
    pub async fn force_refresh(&mut self) -> Result<Arc<TelemetrySnapshot>> {
        self.force_refresh_at(Utc::now()).await
    }

    /// Scheduled refresh cycle pinned to `now`. The cycle start instant is
    /// taken once so counter rollover, throttling, and timestamps are all
    /// computed against the same moment.
    pub async fn refresh_at(&mut self, now: DateTime<Utc>) -> Result<Arc<TelemetrySnapshot>> {
        self.run_cycle(now, RefreshKind::Scheduled).await
    }

    /// Forced refresh cycle pinned to `now`
    pub async fn force_refresh_at(&mut self, now: DateTime<Utc>) -> Result<Arc<TelemetrySnapshot>> {
        self.run_cycle(now, RefreshKind::Forced).await
    }

    async fn run_cycle(
        &mut self,
        now: DateTime<Utc>,
        kind: RefreshKind,
    ) -> Result<Arc<TelemetrySnapshot>> {
        let local = now.with_timezone(&self.tz);

        if self.counters.rollover_if_needed(local.date_naive()) {
            self.logger.debug(&format!(
                "API counters reset for new day: {}",
                local.date_naive()
            ));
        }

        let throttle_can = kind == RefreshKind::Scheduled && self.should_throttle_can(now, local.hour());
        if throttle_can {
            self.logger
                .debug("Night time: throttling CAN bus fetch; customer data still refreshes");
        }

        if self.bearer_token.is_none() {
            self.login().await?;
        }

        let policy = RetryPolicy::unauthorized_once();
        for attempt in policy.attempts() {
            self.counters.calls_total += 1;
            let customer_data = match self.fetch_customer_data().await {
                Ok(data) => data,
                Err(err) if policy.should_retry(attempt, &err) => {
                    self.logger
                        .info("401 Unauthorized. Attempting silent re-login and retry once");
                    self.bearer_token = None;
                    if let Err(login_err) = self.login().await {
                        self.logger
                            .warn(&format!("Silent re-login failed: {}", login_err));
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    self.counters.calls_failed += 1;
                    if err.is_unauthorized() {
                        // Second consecutive 401; give up for this cycle
                        break;
                    }
                    return Err(err);
                }
            };

            self.asset_id = extract_asset_id(&customer_data);

            let can_bus_data = match self.asset_id.clone() {
                Some(asset_id) if !throttle_can => self.fetch_can_data(&asset_id, now, kind).await,
                _ => empty_can(),
            };

            self.last_full_update = Some(now);

            let snapshot = Arc::new(TelemetrySnapshot {
                customer_data,
                can_bus_data,
            });
            self.snapshot_tx.send_replace(Arc::clone(&snapshot));
            return Ok(snapshot);
        }

        // No attempts left: ask the host for fresh credentials
        self.maybe_prompt_reauth(now);
        Err(LandauError::auth("Authentication failed after retry"))
    }

    /// Log in and store the session credentials
    async fn login(&mut self) -> Result<()> {
        let session = self
            .client
            .login(&self.config.api.email, &self.config.api.password)
            .await?;
        self.customer_id = Some(session.customer_id);
        self.bearer_token = Some(session.token);
        Ok(())
    }

    async fn fetch_customer_data(&self) -> Result<Value> {
        let token = self
            .bearer_token
            .clone()
            .ok_or_else(|| LandauError::auth("No bearer token for customer data fetch"))?;
        let customer_id = self
            .customer_id
            .clone()
            .ok_or_else(|| LandauError::auth("No customer id for customer data fetch"))?;
        self.client.customer_data(&token, &customer_id).await
    }

    /// Fetch CAN data, degrading to an empty payload on any failure.
    ///
    /// A forced refresh additionally retries once on 401 with a silent
    /// re-login; every attempt is counted.
    async fn fetch_can_data(&mut self, asset_id: &str, now: DateTime<Utc>, kind: RefreshKind) -> Value {
        let timeout = self.config.can_bus_timeout();
        let policy = match kind {
            RefreshKind::Forced => RetryPolicy::unauthorized_once(),
            RefreshKind::Scheduled => RetryPolicy::new(1, |_| false),
        };

        for attempt in policy.attempts() {
            let Some(token) = self.bearer_token.clone() else {
                break;
            };
            self.counters.can_calls_total += 1;
            match self.client.can_data(&token, asset_id, timeout).await {
                Ok(data) => {
                    if data.as_object().is_some_and(|o| !o.is_empty()) {
                        self.last_can_update = Some(now);
                    }
                    return data;
                }
                Err(err) => {
                    self.counters.can_calls_failed += 1;
                    if policy.should_retry(attempt, &err) {
                        self.logger
                            .info("CAN fetch unauthorized; attempting silent re-login and retry once");
                        self.bearer_token = None;
                        if let Err(login_err) = self.login().await {
                            self.logger
                                .warn(&format!("Silent re-login failed: {}", login_err));
                            break;
                        }
                        continue;
                    }
                    self.logger.warn(&format!("CAN fetch error: {}", err));
                    break;
                }
            }
        }

        empty_can()
    }

    /// Post a CAN command and trigger a normal refresh so downstream state
    /// reflects the side effect. A missing token or asset id makes this a
    /// no-op beyond an error log.
    pub async fn send_can_command(&mut self, endpoint: u32, payload: &[u8]) {
        self.send_can_command_at(endpoint, payload, Utc::now()).await;
    }

    /// Send a CAN command with the follow-up refresh pinned to `now`
    pub async fn send_can_command_at(&mut self, endpoint: u32, payload: &[u8], now: DateTime<Utc>) {
        let (Some(token), Some(asset_id)) = (self.bearer_token.clone(), self.asset_id.clone())
        else {
            self.logger
                .error("Auth token or asset ID not available for sending CAN command");
            return;
        };

        if let Err(err) = self
            .client
            .send_command(&token, &asset_id, endpoint, payload)
            .await
        {
            self.logger
                .error(&format!("Error sending CAN command: {}", err));
        }

        if let Err(err) = self.refresh_at(now).await {
            self.logger
                .warn(&format!("Refresh after CAN command failed: {}", err));
        }
    }

    fn should_throttle_can(&self, now: DateTime<Utc>, local_hour: u32) -> bool {
        if !night_window_contains(
            local_hour,
            self.config.polling.night_start_hour,
            self.config.polling.night_end_hour,
        ) {
            return false;
        }
        match self.last_full_update {
            Some(last) => now - last < Duration::hours(FULL_UPDATE_FRESH_HOURS),
            None => false,
        }
    }

    /// Surface a need-credentials signal, at most once per suppression window
    fn maybe_prompt_reauth(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_reauth_prompt {
            if now - last <= Duration::hours(REAUTH_SUPPRESS_HOURS) {
                self.logger
                    .debug("Reauth already initiated recently; suppressing prompt");
                return;
            }
        }
        self.last_reauth_prompt = Some(now);
        self.reauth_prompts += 1;
        let _ = self.reauth_tx.send(self.reauth_prompts);
        self.logger
            .info("Credentials rejected; prompting host for reauthentication");
    }

    // ----- Read surface for host bindings -----

    /// Daily call counters
    pub fn counters(&self) -> &DailyCounters {
        &self.counters
    }

    /// Timestamp of the last successful customer-data fetch
    pub fn last_full_update(&self) -> Option<DateTime<Utc>> {
        self.last_full_update
    }

    /// Timestamp of the last non-empty CAN payload
    pub fn last_can_update(&self) -> Option<DateTime<Utc>> {
        self.last_can_update
    }

    /// Whether a bearer token is currently held
    pub fn has_token(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Asset identifier of the tracked vehicle, once known
    pub fn asset_id(&self) -> Option<&str> {
        self.asset_id.as_deref()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to the need-credentials signal
    pub fn subscribe_reauth(&self) -> watch::Receiver<u64> {
        self.reauth_tx.subscribe()
    }

    /// Number of reauthentication prompts surfaced so far
    pub fn reauth_prompts(&self) -> u64 {
        self.reauth_prompts
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counters_rollover_on_new_date_only() {
        let mut counters = DailyCounters::default();
        let day1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        assert!(counters.rollover_if_needed(day1));
        counters.calls_total = 7;
        counters.can_calls_failed = 2;

        // Same day: nothing moves
        assert!(!counters.rollover_if_needed(day1));
        assert_eq!(counters.calls_total, 7);

        // New day: everything resets exactly once
        assert!(counters.rollover_if_needed(day2));
        assert_eq!(counters.calls_total, 0);
        assert_eq!(counters.calls_failed, 0);
        assert_eq!(counters.can_calls_total, 0);
        assert_eq!(counters.can_calls_failed, 0);
        assert_eq!(counters.date(), Some(day2));
    }

    #[test]
    fn night_window_wraps_midnight() {
        // 20 -> 8 spans midnight
        assert!(night_window_contains(20, 20, 8));
        assert!(night_window_contains(23, 20, 8));
        assert!(night_window_contains(0, 20, 8));
        assert!(night_window_contains(7, 20, 8));
        assert!(!night_window_contains(8, 20, 8));
        assert!(!night_window_contains(12, 20, 8));
        assert!(!night_window_contains(19, 20, 8));
    }

    #[test]
    fn night_window_degenerate_same_hours() {
        // start == end covers every hour
        assert!(night_window_contains(0, 6, 6));
        assert!(night_window_contains(12, 6, 6));
    }

    #[test]
    fn asset_id_from_first_vehicle() {
        let data = json!({"vehicles": [{"asset": "A-42"}, {"asset": "B-7"}]});
        assert_eq!(extract_asset_id(&data), Some("A-42".to_string()));

        let data = json!({"vehicles": [{"asset": 42}]});
        assert_eq!(extract_asset_id(&data), Some("42".to_string()));
    }

    #[test]
    fn asset_id_missing_cases() {
        assert_eq!(extract_asset_id(&json!({})), None);
        assert_eq!(extract_asset_id(&json!({"vehicles": []})), None);
        assert_eq!(extract_asset_id(&json!({"vehicles": [{}]})), None);
        assert_eq!(extract_asset_id(&json!({"vehicles": [{"asset": ""}]})), None);
        assert_eq!(
            extract_asset_id(&json!({"vehicles": [{"asset": null}]})),
            None
        );
    }

    #[test]
    fn default_snapshot_is_empty() {
        let snapshot = TelemetrySnapshot::default();
        assert!(snapshot.vehicle().is_none());
        assert!(!snapshot.has_can_data());
    }

    #[test]
    fn snapshot_vehicle_and_can_presence() {
        let snapshot = TelemetrySnapshot {
            customer_data: json!({"vehicles": [{"chassisNumber": "CH123"}]}),
            can_bus_data: json!({"levels3": {"batteryAmp": 1.5}}),
        };
        assert!(snapshot.vehicle().is_some());
        assert!(snapshot.has_can_data());
    }
}
