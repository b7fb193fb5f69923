use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

pub const RECORD_TIMEOUT: Duration = Duration::from_secs(3);

/// Write-only sink noting when a remote message id was sent.
#[async_trait]
pub trait SentRecorder: Send + Sync {
    async fn record_sent(&self, remote_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Fires the write on its own task. Errors and timeouts are logged at debug
/// level and otherwise dropped.
pub fn record_sent_detached(
    recorder: Option<&Arc<dyn SentRecorder>>,
    remote_id: &str,
    at: DateTime<Utc>,
) {
    let Some(recorder) = recorder.cloned() else {
        return;
    };
    let remote_id = remote_id.to_string();
    tokio::spawn(async move {
        match tokio::time::timeout(RECORD_TIMEOUT, recorder.record_sent(&remote_id, at)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(remote_id, error = %err, "sent recorder write failed"),
            Err(_) => debug!(remote_id, "sent recorder write timed out"),
        }
    });
}
