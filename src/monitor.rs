//! Periodic sensor monitor.
//!
//! On every tick the monitor fetches the latest sensor documents, classifies
//! them and pushes a notification to every registered device for each
//! parameter in breach. The host owns the [`Monitor`] value; dropping it or
//! calling [`Monitor::stop`] cancels the timer. Notifications already handed
//! off keep running to completion.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::classify_document;
use crate::dispatch::{alert_envelope, notify_devices, Dispatcher};
use crate::models::{Alert, Severity};
use crate::thresholds::ThresholdTable;
use crate::tokens::TokenStore;

// ---

/// Where sensor documents come from.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Up to `limit` of the most recent documents.
    async fn latest(&self, limit: u32) -> Result<Vec<Value>>;
}

/// Reads documents from an HTTP endpoint returning either a JSON array or
/// `{"results": [...]}`.
pub struct HttpSensorSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSensorSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

/// Document list out of either response shape.
fn documents_from(response: Value) -> Result<Vec<Value>> {
    // ---
    match response {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(anyhow!("response missing 'results' array")),
        },
        other => Err(anyhow!("unexpected sensor response: {}", other)),
    }
}

#[async_trait]
impl SensorSource for HttpSensorSource {
    async fn latest(&self, limit: u32) -> Result<Vec<Value>> {
        // ---
        debug!("Fetching latest {} sensor documents from {}", limit, self.url);
        let response: Value = self
            .client
            .get(&self.url)
            .query(&[("limit", limit)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        documents_from(response)
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub document_limit: u32,
    /// Push `warning` alerts as well as breaches.
    pub notify_warnings: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            document_limit: 1,
            notify_warnings: false,
        }
    }
}

struct MonitorContext {
    config: MonitorConfig,
    source: Arc<dyn SensorSource>,
    thresholds: Arc<ThresholdTable>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn TokenStore>,
}

impl MonitorContext {
    /// Fetch and classify; one alert per parameter worth notifying.
    async fn poll(&self) -> Result<Vec<Alert>> {
        // ---
        let documents = self.source.latest(self.config.document_limit).await?;

        // Most severe alert per parameter across the fetched documents.
        let mut selected: BTreeMap<String, Alert> = BTreeMap::new();
        for document in &documents {
            for alert in classify_document(document, &self.thresholds) {
                if !self.worth_notifying(&alert) {
                    continue;
                }
                match selected.get(&alert.parameter) {
                    Some(current) if current.severity >= alert.severity => {}
                    _ => {
                        selected.insert(alert.parameter.clone(), alert);
                    }
                }
            }
        }

        debug!(
            documents = documents.len(),
            alerts = selected.len(),
            "Sensor poll classified"
        );
        Ok(selected.into_values().collect())
    }

    /// Breaches always; warnings only when configured.
    fn worth_notifying(&self, alert: &Alert) -> bool {
        alert.is_breach() || (self.config.notify_warnings && alert.severity == Severity::Warning)
    }

    async fn notify(&self, alert: Alert) {
        // ---
        info!(parameter = %alert.parameter, severity = %alert.severity, "{}", alert.message);
        let envelope = alert_envelope(&alert);
        notify_devices(self.store.as_ref(), &self.dispatcher, &envelope).await;
    }
}

/// Owned handle to one monitor loop.
pub struct Monitor {
    context: Arc<MonitorContext>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    // ---
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn SensorSource>,
        thresholds: Arc<ThresholdTable>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            context: Arc::new(MonitorContext {
                config,
                source,
                thresholds,
                dispatcher,
                store,
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the timer. Returns `false` if this monitor is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        // ---
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Monitor already running, start ignored");
            return false;
        }

        let context = Arc::clone(&self.context);
        info!(
            interval_secs = context.config.interval.as_secs_f64(),
            "Starting sensor monitor"
        );
        *task = Some(tokio::spawn(run(context)));
        true
    }

    /// Cancel the timer. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        // ---
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        match task.take() {
            Some(handle) => {
                handle.abort();
                info!("Sensor monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Run one fetch and classify pass without sending anything.
    pub async fn poll_once(&self) -> Result<Vec<Alert>> {
        self.context.poll().await
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(context: Arc<MonitorContext>) {
    // ---
    let mut ticker = tokio::time::interval(context.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match context.poll().await {
            Ok(alerts) => {
                for alert in alerts {
                    let context = Arc::clone(&context);
                    // detached: stopping the monitor does not cancel delivery
                    tokio::spawn(async move { context.notify(alert).await });
                }
            }
            Err(e) => warn!("Sensor poll failed, retrying next tick: {:#}", e),
        }
    }
}
