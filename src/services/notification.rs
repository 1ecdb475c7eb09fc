//! notification.rs
//!
//! Best-effort delivery of booking events to members.
//!
//! 1.  **NotificationDispatcher** fans a notification out to every channel at
//!     once and reports per-channel results. `dispatch` runs it in the
//!     background: the booking outcome never waits for it and never fails
//!     because of it.
//! 2.  **WebhookChannel** posts the event to an external messaging service,
//!     signed with a SHA-256 token and guarded by a `CircuitBreaker`.
//! 3.  **LogChannel** writes the event to the trace log.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, NotificationConfig};
use crate::models::{Booking, BookingStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    BookingConfirmed,
    BookingCancelled,
    WaitlistPromoted,
    ClassCancelled,
    AttendanceFlagged,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub event: NotificationEvent,
    pub booking_id: i64,
    pub member_id: i64,
    pub schedule_id: i64,
    pub status: BookingStatus,
    pub occurred_at: NaiveDateTime,
}

impl Notification {
    pub fn for_booking(event: NotificationEvent, booking: &Booking, occurred_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            booking_id: booking.id,
            member_id: booking.member_id,
            schedule_id: booking.schedule_id,
            status: booking.status,
            occurred_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("circuit breaker is open - notification gateway temporarily unavailable")]
    CircuitOpen,
    #[error("notification gateway error: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("notification gateway rejected event with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub delivered: bool,
    pub error: Option<String>,
}

/// `success` is true when at least one channel delivered.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub success: bool,
    pub detail: Vec<ChannelOutcome>,
}

#[derive(Default)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Builds the production channel set from config.
    pub fn from_config(config: &NotificationConfig, breaker: &CircuitBreakerConfig) -> Self {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
        if let Some(url) = &config.webhook_url {
            match WebhookChannel::new(url.clone(), config.webhook_secret.clone(), config.timeout_seconds, breaker) {
                Ok(channel) => channels.push(Arc::new(channel)),
                Err(e) => error!("Webhook channel disabled: {}", e),
            }
        }
        Self::new(channels)
    }

    pub async fn notify(&self, notification: &Notification) -> DispatchReport {
        let sends = self.channels.iter().map(|channel| async move {
            let result = channel.send(notification).await;
            ChannelOutcome {
                channel: channel.name().to_string(),
                delivered: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        let detail = futures::future::join_all(sends).await;

        DispatchReport {
            success: detail.iter().any(|o| o.delivered),
            detail,
        }
    }

    /// Fire-and-forget: spawns delivery and only logs the outcome.
    pub fn dispatch(self: &Arc<Self>, notification: Notification) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let report = dispatcher.notify(&notification).await;
            for failed in report.detail.iter().filter(|o| !o.delivered) {
                warn!(
                    "Notification {:?} for booking {} failed on {}: {}",
                    notification.event,
                    notification.booking_id,
                    failed.channel,
                    failed.error.as_deref().unwrap_or("unknown error")
                );
            }
        });
    }
}

/// Пишет событие в лог
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, n: &Notification) -> Result<(), NotificationError> {
        info!(
            "📨 {:?}: booking={} member={} schedule={} status={}",
            n.event,
            n.booking_id,
            n.member_id,
            n.schedule_id,
            n.status.as_str()
        );
        Ok(())
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Too many consecutive failures; calls are refused until the timeout elapses.
    Open,
    /// Timeout elapsed; one trial call decides between Closed and Open.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<(CircuitState, Option<Instant>)>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: Mutex::new((CircuitState::Closed, None)),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            timeout_duration: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn can_execute(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match guard.0 {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = guard.1.map_or(true, |opened| opened.elapsed() >= self.timeout_duration);
                if elapsed {
                    guard.0 = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                }
                elapsed
            }
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.0 == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        *guard = (CircuitState::Closed, None);
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match guard.0 {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *guard = (CircuitState::Open, Some(Instant::now()));
                error!("Circuit breaker OPENED - {} failures reached threshold {}", failures, self.failure_threshold);
            }
            CircuitState::HalfOpen => {
                *guard = (CircuitState::Open, Some(Instant::now()));
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).0
    }
}

/// Posts notifications as JSON to an external messaging service.
pub struct WebhookChannel {
    url: String,
    secret: String,
    http_client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
}

impl WebhookChannel {
    pub fn new(url: String, secret: String, timeout_seconds: u64, breaker: &CircuitBreakerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url,
            secret,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()?,
            circuit_breaker: CircuitBreaker::new(breaker.failure_threshold, breaker.timeout_seconds),
        })
    }

    /// Token the receiver recomputes to authenticate the request.
    fn generate_token(&self, body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update(self.secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        if !self.circuit_breaker.can_execute() {
            return Err(NotificationError::CircuitOpen);
        }

        let body = serde_json::to_string(notification).unwrap_or_default();
        let token = self.generate_token(&body);

        let result = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Notification-Token", token)
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.circuit_breaker.record_success();
                Ok(())
            }
            Ok(resp) => {
                self.circuit_breaker.record_failure();
                Err(NotificationError::Rejected(resp.status().as_u16()))
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(NotificationError::Gateway(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_at_threshold() {
        let breaker = CircuitBreaker::new(2, 60);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn breaker_half_opens_after_timeout_and_recovers() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(breaker.can_execute());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[test]
    fn failed_trial_reopens() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
    }
}
