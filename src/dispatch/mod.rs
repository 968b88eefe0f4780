//! Notification dispatch.
//!
//! A [`Dispatcher`] owns a named set of [`Provider`]s and an ordered list of
//! middleware. Every send runs the middleware chain once, then tries the
//! provider up to `max_retries` times with linear backoff. Failures come back
//! as a [`DeliveryResult`], never as an error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, ProviderError};

mod devices;
mod envelope;
mod providers;

pub use devices::{notify_devices, DeviceBroadcastSummary, TokenDelivery};
pub use envelope::{
    alert_envelope, maintenance_envelope, stamp_sent_at, stringify_data, Envelope, ReminderData,
    Target, NOTIFICATION_TYPES,
};
pub use providers::{Delivery, FcmProvider, Provider, WebhookProvider};

// ---

/// Envelope transform applied before every send.
pub type Middleware = Box<dyn Fn(Envelope) -> Envelope + Send + Sync>;

/// Dispatcher settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Global toggle; when off nothing is sent.
    pub enabled: bool,
    /// Attempts per send, including the first.
    pub max_retries: u32,
    /// Backoff base; attempt `n` is followed by a wait of `retry_delay * n`.
    pub retry_delay: Duration,
    /// Provider used by [`Dispatcher::send`].
    pub default_provider: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            default_provider: "default".to_string(),
        }
    }
}

/// Why a delivery did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Disabled,
    UnknownProvider,
    Exhausted,
}

/// Outcome of one send through one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub provider: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub attempts: u32,
}

impl DeliveryResult {
    fn failed(provider: &str, reason: FailureReason, error: String, attempts: u32) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            message_id: None,
            error: Some(error),
            reason: Some(reason),
            attempts,
        }
    }
}

pub struct Dispatcher {
    config: DispatchConfig,
    providers: Vec<(String, Arc<dyn Provider>)>,
    middleware: Vec<Middleware>,
}

impl Dispatcher {
    // ---
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Register `provider` under `name`, replacing any provider of that name.
    pub fn register_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Result<(), DispatchError> {
        // ---
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DispatchError::InvalidProviderName);
        }
        if let Some(slot) = self.providers.iter_mut().find(|(n, _)| *n == name) {
            warn!(provider = %name, "Replacing already registered provider");
            slot.1 = provider;
        } else {
            info!(provider = %name, "Registered notification provider");
            self.providers.push((name, provider));
        }
        Ok(())
    }

    /// Append a middleware; they run in registration order.
    pub fn use_middleware<F>(&mut self, middleware: F)
    where
        F: Fn(Envelope) -> Envelope + Send + Sync + 'static,
    {
        self.middleware.push(Box::new(middleware));
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.iter().any(|(n, _)| n == name)
    }

    /// Send through the default provider.
    pub async fn send(&self, envelope: Envelope) -> DeliveryResult {
        self.send_via(envelope, &self.config.default_provider).await
    }

    /// Send through the named provider.
    pub async fn send_via(&self, envelope: Envelope, provider_name: &str) -> DeliveryResult {
        // ---
        if !self.is_enabled() {
            debug!(provider = %provider_name, "Dispatch disabled, not sending");
            return DeliveryResult::failed(
                provider_name,
                FailureReason::Disabled,
                "notifications are disabled".to_string(),
                0,
            );
        }

        let Some((_, provider)) = self.providers.iter().find(|(n, _)| n == provider_name) else {
            error!(provider = %provider_name, "No such notification provider");
            return DeliveryResult::failed(
                provider_name,
                FailureReason::UnknownProvider,
                format!("provider '{provider_name}' is not registered"),
                0,
            );
        };

        let envelope = self.prepare(envelope);
        self.deliver_with_retry(provider_name, provider.as_ref(), &envelope)
            .await
    }

    /// Send the same envelope through every provider independently.
    ///
    /// Returns one entry per provider, in registration order.
    pub async fn broadcast(&self, envelope: Envelope) -> Vec<DeliveryResult> {
        // ---
        if !self.is_enabled() {
            return self
                .providers
                .iter()
                .map(|(name, _)| {
                    DeliveryResult::failed(
                        name,
                        FailureReason::Disabled,
                        "notifications are disabled".to_string(),
                        0,
                    )
                })
                .collect();
        }

        let envelope = &self.prepare(envelope);
        let sends = self
            .providers
            .iter()
            .map(|(name, provider)| self.deliver_with_retry(name, provider.as_ref(), envelope));
        let results = join_all(sends).await;

        let delivered = results.iter().filter(|r| r.success).count();
        info!(
            providers = results.len(),
            delivered, "Broadcast through all providers finished"
        );
        results
    }

    fn prepare(&self, envelope: Envelope) -> Envelope {
        self.middleware.iter().fold(envelope, |env, m| m(env))
    }

    async fn deliver_with_retry(
        &self,
        name: &str,
        provider: &dyn Provider,
        envelope: &Envelope,
    ) -> DeliveryResult {
        // ---
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            // A panicking provider counts as a failed attempt.
            let outcome = AssertUnwindSafe(provider.send(envelope))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(ProviderError::Transport("provider panicked".into())));

            match outcome {
                Ok(delivery) => {
                    info!(provider = %name, attempt, "Notification delivered");
                    return DeliveryResult {
                        provider: name.to_string(),
                        success: true,
                        message_id: delivery.message_id,
                        error: None,
                        reason: None,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let wait = self.config.retry_delay * attempt;
                        warn!(
                            provider = %name,
                            attempt,
                            max_attempts,
                            "Delivery failed, retrying in {:?}: {}",
                            wait,
                            e
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        error!(
            provider = %name,
            attempts = max_attempts,
            "Delivery failed after all retries: {}",
            last_error
        );
        DeliveryResult::failed(name, FailureReason::Exhausted, last_error, max_attempts)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider shared by unit tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    pub struct ScriptedProvider {
        pub calls: AtomicU32,
        script: Mutex<VecDeque<bool>>,
        fallback: bool,
        pub seen: Mutex<Vec<Envelope>>,
    }

    impl ScriptedProvider {
        /// Plays `script` (true = success) then answers `fallback` forever.
        pub fn new(script: &[bool], fallback: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.iter().copied().collect()),
                fallback,
                seen: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn send(&self, envelope: &Envelope) -> Result<Delivery, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(envelope.clone());
            let ok = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
            if ok {
                Ok(Delivery {
                    message_id: Some(format!("msg-{n}")),
                })
            } else {
                Err(ProviderError::Transport(format!("attempt {n} failed")))
            }
        }
    }

    pub struct PanickingProvider;

    #[async_trait::async_trait]
    impl Provider for PanickingProvider {
        async fn send(&self, _envelope: &Envelope) -> Result<Delivery, ProviderError> {
            panic!("gateway client blew up");
        }
    }

    pub fn fast_config() -> DispatchConfig {
        DispatchConfig {
            retry_delay: Duration::from_millis(1),
            ..DispatchConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::testing::*;
    use super::*;

    fn envelope() -> Envelope {
        Envelope::to_token("tok", "pH High", "pH is 9.20")
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        // ---
        let provider = ScriptedProvider::new(&[false, false, true], false);
        let mut dispatcher = Dispatcher::new(fast_config());
        dispatcher
            .register_provider("default", provider.clone())
            .unwrap();

        let result = dispatcher.send(envelope()).await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.message_id.as_deref(), Some("msg-3"));
        assert_eq!(provider.calls(), 3);

        // every attempt carried the same envelope
        let seen = provider.seen.lock().unwrap();
        assert!(seen.iter().all(|e| *e == seen[0]));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        // ---
        let provider = ScriptedProvider::new(&[], false);
        let mut dispatcher = Dispatcher::new(fast_config());
        dispatcher
            .register_provider("default", provider.clone())
            .unwrap();

        let result = dispatcher.send(envelope()).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.reason, Some(FailureReason::Exhausted));
        assert_eq!(result.error.as_deref(), Some("transport error: attempt 3 failed"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        // ---
        let provider = ScriptedProvider::new(&[], true);
        let mut dispatcher = Dispatcher::new(fast_config());
        dispatcher
            .register_provider("default", provider.clone())
            .unwrap();

        let result = dispatcher.send(envelope()).await;
        assert!(result.success);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_never_contacts_provider() {
        // ---
        let provider = ScriptedProvider::new(&[], true);
        let mut dispatcher = Dispatcher::new(DispatchConfig {
            enabled: false,
            ..fast_config()
        });
        assert!(!dispatcher.is_enabled());
        dispatcher
            .register_provider("default", provider.clone())
            .unwrap();

        let result = dispatcher.send(envelope()).await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::Disabled));

        let all = dispatcher.broadcast(envelope()).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reason, Some(FailureReason::Disabled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        // ---
        let dispatcher = Dispatcher::new(fast_config());
        let result = dispatcher.send_via(envelope(), "pager").await;
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::UnknownProvider));
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn test_middleware_runs_in_order_once() {
        // ---
        let provider = ScriptedProvider::new(&[false], true);
        let mut dispatcher = Dispatcher::new(fast_config());
        dispatcher
            .register_provider("default", provider.clone())
            .unwrap();
        dispatcher.use_middleware(|e| e.with_data("trail", "a"));
        dispatcher.use_middleware(|mut e| {
            let trail = format!("{}b", e.data["trail"].as_str().unwrap_or_default());
            e.data.insert("trail".into(), trail.into());
            e.title = e.title.to_uppercase();
            e
        });

        let result = dispatcher.send(envelope()).await;
        assert!(result.success);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].data["trail"], "ab");
        assert_eq!(seen[1].title, "PH HIGH");
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures() {
        // ---
        let good_a = ScriptedProvider::new(&[], true);
        let bad = ScriptedProvider::new(&[], false);
        let good_b = ScriptedProvider::new(&[], true);

        let mut dispatcher = Dispatcher::new(fast_config());
        dispatcher.register_provider("fcm", good_a.clone()).unwrap();
        dispatcher.register_provider("pager", bad.clone()).unwrap();
        dispatcher.register_provider("webhook", good_b.clone()).unwrap();

        let results = dispatcher.broadcast(Envelope::broadcast("t", "b")).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.provider.as_str()).collect::<Vec<_>>(),
            vec!["fcm", "pager", "webhook"]
        );
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].attempts, 3);
        assert!(results[2].success);
        assert_eq!(good_a.calls(), 1);
        assert_eq!(good_b.calls(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_survives_panicking_provider() {
        // ---
        let good = ScriptedProvider::new(&[], true);
        let mut dispatcher = Dispatcher::new(DispatchConfig {
            max_retries: 1,
            ..fast_config()
        });
        dispatcher.register_provider("fcm", good.clone()).unwrap();
        dispatcher
            .register_provider("broken", Arc::new(PanickingProvider))
            .unwrap();

        let results = dispatcher.broadcast(Envelope::broadcast("t", "b")).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error.as_deref(), Some("transport error: provider panicked"));
    }

    #[test]
    fn test_register_provider_rules() {
        // ---
        let mut dispatcher = Dispatcher::new(fast_config());
        assert_eq!(
            dispatcher.register_provider(" ", ScriptedProvider::new(&[], true)),
            Err(DispatchError::InvalidProviderName)
        );

        dispatcher
            .register_provider("fcm", ScriptedProvider::new(&[], true))
            .unwrap();
        dispatcher
            .register_provider("fcm", ScriptedProvider::new(&[], false))
            .unwrap();
        assert_eq!(dispatcher.provider_names(), vec!["fcm"]);
        assert!(dispatcher.has_provider("fcm"));
    }
}
