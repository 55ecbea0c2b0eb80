//! Security alerting for the request inspection service.
//!
//! This module converts tracker transitions into operator notifications
//! without flooding anyone: alerts sharing a throttle key are suppressed
//! for a cool-down window. Delivery failures are logged and swallowed;
//! alerting never affects the triggering request.

use crate::models::AlertConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors that can occur during alert delivery
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Delivery rejected: {0}")]
    DeliveryRejected(String),
}

/// Severity attached to critical security events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

/// Outbound security notifications
#[derive(Debug, Clone)]
pub enum SecurityAlert {
    /// An IP crossed the violation threshold and was blocked
    IpBlocked {
        ip: String,
        rule: String,
        path: String,
    },
    /// Unusually high volume of malicious requests across clients
    HighVolumeAttack {
        attack_count: u64,
        unique_ips: u64,
        top_paths: Vec<String>,
    },
    /// A critical security event needing immediate attention
    CriticalEvent {
        event_type: String,
        details: String,
        severity: Severity,
    },
}

impl SecurityAlert {
    /// Throttle key: alerts sharing a key are rate limited together
    pub fn throttle_key(&self) -> String {
        match self {
            SecurityAlert::IpBlocked { ip, .. } => format!("ip_blocked:{}", ip),
            SecurityAlert::HighVolumeAttack { .. } => "high_volume_attack".to_string(),
            SecurityAlert::CriticalEvent { event_type, .. } => format!("critical:{}", event_type),
        }
    }

    fn subject(&self) -> String {
        match self {
            SecurityAlert::IpBlocked { ip, .. } => format!("[SECURITY ALERT] IP blocked: {}", ip),
            SecurityAlert::HighVolumeAttack { attack_count, .. } => {
                format!("[SECURITY WARNING] High volume attack - {} requests", attack_count)
            }
            SecurityAlert::CriticalEvent {
                event_type,
                severity,
                ..
            } => format!("[{}] Security event: {}", severity.as_str(), event_type),
        }
    }

    fn body(&self, id: Uuid, now: DateTime<Utc>) -> String {
        let timestamp = now.format("%Y-%m-%d %H:%M:%S UTC");
        match self {
            SecurityAlert::IpBlocked { ip, rule, path } => format!(
                "Security alert {id}\n\n\
                 An IP address has been automatically blocked due to suspicious activity.\n\n\
                 IP address:   {ip}\n\
                 Matched rule: {rule}\n\
                 Last path:    {path}\n\
                 Blocked at:   {timestamp}\n\n\
                 The IP is unblocked automatically after the block duration unless further \
                 violations occur. Consider a permanent block if attacks persist."
            ),
            SecurityAlert::HighVolumeAttack {
                attack_count,
                unique_ips,
                top_paths,
            } => format!(
                "Security alert {id}\n\n\
                 The service is seeing an unusually high volume of malicious requests.\n\n\
                 Total attacks: {attack_count}\n\
                 Unique IPs:    {unique_ips}\n\
                 Top paths:     {}\n\
                 Detected at:   {timestamp}\n\n\
                 Review the logs for additional context and consider stricter rate limits.",
                top_paths.join(", ")
            ),
            SecurityAlert::CriticalEvent {
                event_type,
                details,
                severity,
            } => format!(
                "Security alert {id}\n\n\
                 Severity:   {}\n\
                 Event type: {event_type}\n\
                 Time:       {timestamp}\n\n\
                 Details:\n{details}\n\n\
                 Please investigate this event immediately.",
                severity.as_str()
            ),
        }
    }
}

/// Transport for outbound notifications. Implementations must bound
/// their own I/O with a timeout; the dispatcher never waits on them
/// while holding the throttle lock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), AlertError>;
}

/// Email-API transport (JSON POST with bearer auth)
pub struct EmailApiTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
}

impl EmailApiTransport {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
        }
    }
}

#[async_trait]
impl NotificationTransport for EmailApiTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(30))
            .json(&serde_json::json!({
                "from": self.from_email,
                "to": [recipient],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AlertError::DeliveryRejected(format!(
                "email API returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Transport used when alerting is disabled
pub struct NoopTransport;

#[async_trait]
impl NotificationTransport for NoopTransport {
    async fn send(&self, _recipient: &str, subject: &str, _body: &str) -> Result<(), AlertError> {
        debug!("alerting disabled, dropping notification: {}", subject);
        Ok(())
    }
}

/// Throttled notification dispatcher.
///
/// The throttle decision is made and recorded inside the lock before
/// the send starts, so two concurrent dispatches of the same key
/// produce at most one send.
pub struct AlertDispatcher {
    transport: Arc<dyn NotificationTransport>,
    recipient: String,
    cooldown: Duration,
    sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertDispatcher {
    /// Create a new dispatcher over a notification transport
    pub fn new(transport: Arc<dyn NotificationTransport>, config: &AlertConfig) -> Self {
        Self {
            transport,
            recipient: config.alert_email.clone(),
            cooldown: Duration::minutes(config.cooldown_minutes),
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch an alert unless one with the same throttle key went out
    /// within the cool-down window. Returns whether a send happened.
    pub async fn dispatch(&self, alert: SecurityAlert) -> bool {
        self.dispatch_at(alert, Utc::now()).await
    }

    pub(crate) async fn dispatch_at(&self, alert: SecurityAlert, now: DateTime<Utc>) -> bool {
        let key = alert.throttle_key();

        {
            let mut sent = self.sent.lock().await;
            if let Some(last) = sent.get(&key) {
                if now - *last < self.cooldown {
                    info!("alert throttled: {}", key);
                    counter!("security_alerts_throttled_total", 1);
                    return false;
                }
            }
            // Recorded before the send completes, so a concurrent
            // dispatch of the same key is already throttled.
            sent.insert(key.clone(), now);
        }

        let id = Uuid::new_v4();
        let subject = alert.subject();
        let body = alert.body(id, now);

        match self.transport.send(&self.recipient, &subject, &body).await {
            Ok(()) => {
                info!("security alert {} sent: {}", id, key);
                counter!("security_alerts_sent_total", 1);
                true
            }
            Err(e) => {
                error!("failed to deliver security alert {}: {}", key, e);
                false
            }
        }
    }

    /// Housekeeping: drop throttle entries older than twice the
    /// cool-down window.
    pub async fn prune(&self) {
        self.prune_at(Utc::now()).await;
    }

    pub(crate) async fn prune_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.cooldown * 2;
        let mut sent = self.sent.lock().await;
        sent.retain(|_, last| *last > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_alert(ip: &str) -> SecurityAlert {
        SecurityAlert::IpBlocked {
            ip: ip.to_string(),
            rule: "wp-admin".to_string(),
            path: "/wp-admin".to_string(),
        }
    }

    fn dispatcher(transport: MockNotificationTransport) -> AlertDispatcher {
        AlertDispatcher::new(Arc::new(transport), &AlertConfig::default())
    }

    #[test]
    fn test_throttle_keys() {
        assert_eq!(blocked_alert("203.0.113.5").throttle_key(), "ip_blocked:203.0.113.5");
        assert_eq!(
            SecurityAlert::HighVolumeAttack {
                attack_count: 100,
                unique_ips: 12,
                top_paths: vec![],
            }
            .throttle_key(),
            "high_volume_attack"
        );
        assert_eq!(
            SecurityAlert::CriticalEvent {
                event_type: "token_leak".to_string(),
                details: String::new(),
                severity: Severity::High,
            }
            .throttle_key(),
            "critical:token_leak"
        );
    }

    #[tokio::test]
    async fn test_repeat_alert_within_cooldown_is_suppressed() {
        let mut transport = MockNotificationTransport::new();
        transport.expect_send().times(1).returning(|_, _, _| Ok(()));
        let dispatcher = dispatcher(transport);
        let now = Utc::now();

        assert!(dispatcher.dispatch_at(blocked_alert("203.0.113.5"), now).await);
        assert!(
            !dispatcher
                .dispatch_at(blocked_alert("203.0.113.5"), now + Duration::minutes(30))
                .await
        );
    }

    #[tokio::test]
    async fn test_alert_is_sent_again_after_cooldown() {
        let mut transport = MockNotificationTransport::new();
        transport.expect_send().times(2).returning(|_, _, _| Ok(()));
        let dispatcher = dispatcher(transport);
        let now = Utc::now();

        assert!(dispatcher.dispatch_at(blocked_alert("203.0.113.5"), now).await);
        assert!(
            dispatcher
                .dispatch_at(blocked_alert("203.0.113.5"), now + Duration::minutes(61))
                .await
        );
    }

    #[tokio::test]
    async fn test_distinct_keys_are_throttled_independently() {
        let mut transport = MockNotificationTransport::new();
        transport.expect_send().times(2).returning(|_, _, _| Ok(()));
        let dispatcher = dispatcher(transport);
        let now = Utc::now();

        assert!(dispatcher.dispatch_at(blocked_alert("203.0.113.5"), now).await);
        assert!(dispatcher.dispatch_at(blocked_alert("203.0.113.6"), now).await);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed_and_still_throttles() {
        let mut transport = MockNotificationTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _, _| Err(AlertError::DeliveryRejected("boom".to_string())));
        let dispatcher = dispatcher(transport);
        let now = Utc::now();

        assert!(!dispatcher.dispatch_at(blocked_alert("203.0.113.5"), now).await);
        // The failed attempt recorded its timestamp optimistically.
        assert!(
            !dispatcher
                .dispatch_at(blocked_alert("203.0.113.5"), now + Duration::minutes(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_prune_drops_entries_older_than_twice_the_cooldown() {
        let mut transport = MockNotificationTransport::new();
        transport.expect_send().times(2).returning(|_, _, _| Ok(()));
        let dispatcher = dispatcher(transport);
        let now = Utc::now();

        dispatcher.dispatch_at(blocked_alert("203.0.113.5"), now).await;
        dispatcher.prune_at(now + Duration::minutes(121)).await;

        assert!(dispatcher.sent.lock().await.is_empty());
        // And the key fires again once pruned.
        assert!(
            dispatcher
                .dispatch_at(blocked_alert("203.0.113.5"), now + Duration::minutes(122))
                .await
        );
    }
}
