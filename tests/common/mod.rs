//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use aquawatch_relay::dispatch::{Delivery, DispatchConfig, Envelope, Provider};
use aquawatch_relay::error::ProviderError;

/// Provider that records every envelope and answers from a script.
pub struct RecordingProvider {
    calls: AtomicU32,
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    pub sent: Mutex<Vec<Envelope>>,
}

impl RecordingProvider {
    pub fn always(ok: bool) -> Arc<Self> {
        Self::scripted(&[], ok)
    }

    pub fn scripted(script: &[bool], fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn send(&self, envelope: &Envelope) -> Result<Delivery, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(envelope.clone());
        let ok = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        if ok {
            Ok(Delivery {
                message_id: Some(format!("projects/test/messages/{n}")),
            })
        } else {
            Err(ProviderError::Rejected("Unavailable".to_string()))
        }
    }
}

/// Dispatcher settings with `fcm` as default provider and millisecond backoff.
pub fn test_dispatch_config() -> DispatchConfig {
    DispatchConfig {
        enabled: true,
        max_retries: 3,
        retry_delay: Duration::from_millis(1),
        default_provider: "fcm".to_string(),
    }
}
