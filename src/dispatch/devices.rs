//! Fan-out of one notification to every registered device.

use serde::Serialize;
use tracing::{info, warn};

use super::{Dispatcher, Envelope};
use crate::tokens::TokenStore;

// ---

/// Per-token outcome inside a device broadcast.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDelivery {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBroadcastSummary {
    pub total_recipients: usize,
    pub successful_sends: usize,
    pub failed_sends: usize,
    pub results: Vec<TokenDelivery>,
}

/// Send `envelope` to each token in the store, one dispatcher send per token.
///
/// A failing token is recorded and the loop moves on; the batch is never
/// retried as a whole.
pub async fn notify_devices(
    store: &dyn TokenStore,
    dispatcher: &Dispatcher,
    envelope: &Envelope,
) -> DeviceBroadcastSummary {
    // ---
    let records = store.list().await;
    let mut summary = DeviceBroadcastSummary {
        total_recipients: records.len(),
        ..Default::default()
    };

    for record in records {
        let result = dispatcher.send(envelope.retarget(&record.token)).await;
        if result.success {
            summary.successful_sends += 1;
        } else {
            summary.failed_sends += 1;
            warn!(token = %record.token, "Device notification failed: {:?}", result.error);
        }
        summary.results.push(TokenDelivery {
            token: record.token,
            success: result.success,
            message_id: result.message_id,
            error: result.error,
        });
    }

    info!(
        total = summary.total_recipients,
        ok = summary.successful_sends,
        failed = summary.failed_sends,
        "Device broadcast finished"
    );
    summary
}
