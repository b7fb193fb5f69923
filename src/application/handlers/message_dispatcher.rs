use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    application::services::{
        delivery::DeliveryClient,
        recorder::{SentRecorder, record_sent_detached},
    },
    domain::{models::Message, repositories::MessageRepository, value_objects::CharLimit},
};

pub const CHAR_LIMIT_REASON: &str = "content exceeds character limit";
pub const ABANDONED_REASON: &str = "abandoned in processing";

/// Longest a message can legitimately stay in `processing`: one full cycle
/// plus one webhook request. Shorter sweep windows would fail messages that
/// are still being delivered.
pub const MIN_STALE_AFTER: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub batch_size: u32,
    pub char_limit: CharLimit,
    /// Hard bound on one whole cycle, claim through last status update.
    pub cycle_timeout: Duration,
    /// When set, `processing` rows untouched for this long are failed at the
    /// start of each cycle. Never shorter than [`MIN_STALE_AFTER`].
    pub stale_after: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            char_limit: CharLimit(160),
            cycle_timeout: Duration::from_secs(25),
            stale_after: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub reconciled: usize,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Delivered or rejected, but the status update did not land.
    pub abandoned: usize,
    pub timed_out: bool,
}

enum Outcome {
    Sent,
    Failed,
    Abandoned,
}

/// Runs dispatch cycles: claim a batch, deliver each message in order,
/// record the terminal status.
pub struct MessageDispatcher {
    repo: Arc<dyn MessageRepository>,
    client: Arc<dyn DeliveryClient>,
    recorder: Option<Arc<dyn SentRecorder>>,
    config: DispatchConfig,
}

impl MessageDispatcher {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        client: Arc<dyn DeliveryClient>,
        recorder: Option<Arc<dyn SentRecorder>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            repo,
            client,
            recorder,
            config,
        }
    }

    /// Runs one cycle under the cycle timeout. Never fails: every error is
    /// logged and reflected in the report.
    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let timed_out =
            tokio::time::timeout(self.config.cycle_timeout, self.dispatch_cycle(&mut report))
                .await
                .is_err();
        if timed_out {
            report.timed_out = true;
            warn!(
                timeout_seconds = self.config.cycle_timeout.as_secs(),
                claimed = report.claimed,
                sent = report.sent,
                failed = report.failed,
                "dispatch cycle timed out"
            );
        }
        report
    }

    async fn dispatch_cycle(&self, report: &mut CycleReport) {
        if let Some(stale_after) = self.config.stale_after {
            report.reconciled = self.reconcile_stale(stale_after).await;
        }

        let messages = match self.repo.claim_pending(self.config.batch_size).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "claim error");
                return;
            }
        };
        if messages.is_empty() {
            debug!("no pending messages");
            return;
        }
        report.claimed = messages.len();

        for message in &messages {
            match self.dispatch_one(message).await {
                Outcome::Sent => report.sent += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Abandoned => report.abandoned += 1,
            }
        }

        info!(
            claimed = report.claimed,
            sent = report.sent,
            failed = report.failed,
            abandoned = report.abandoned,
            "dispatch cycle finished"
        );
    }

    async fn dispatch_one(&self, message: &Message) -> Outcome {
        if self.config.char_limit.is_exceeded_by(&message.content) {
            return self.fail(message, CHAR_LIMIT_REASON).await;
        }

        let receipt = match self.client.deliver(message).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    message_id = message.id,
                    status = ?err.status(),
                    error = %err,
                    body = err.body().unwrap_or_default(),
                    "send failed"
                );
                return self.fail(message, &err.failure_reason()).await;
            }
        };

        let sent_at = Utc::now();
        match self
            .repo
            .mark_sent(message.id, &receipt.remote_id, sent_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    message_id = message.id,
                    remote_id = %receipt.remote_id,
                    "delivered, but message is no longer processing; sent status not recorded"
                );
                return Outcome::Abandoned;
            }
            Err(err) => {
                warn!(
                    message_id = message.id,
                    remote_id = %receipt.remote_id,
                    error = %err,
                    "mark sent error, message left in processing"
                );
                return Outcome::Abandoned;
            }
        }

        record_sent_detached(self.recorder.as_ref(), &receipt.remote_id, sent_at);
        info!(
            message_id = message.id,
            remote_id = %receipt.remote_id,
            status = receipt.status,
            "sent"
        );
        debug!(message_id = message.id, body = %receipt.body, "webhook response");
        Outcome::Sent
    }

    async fn fail(&self, message: &Message, reason: &str) -> Outcome {
        match self.repo.mark_failed(message.id, reason).await {
            Ok(true) => Outcome::Failed,
            Ok(false) => {
                warn!(
                    message_id = message.id,
                    reason,
                    "message is no longer processing, failure not recorded"
                );
                Outcome::Abandoned
            }
            Err(err) => {
                warn!(
                    message_id = message.id,
                    error = %err,
                    "mark failed error, message left in processing"
                );
                Outcome::Abandoned
            }
        }
    }

    async fn reconcile_stale(&self, stale_after: Duration) -> usize {
        let Some(older_than) = chrono::Duration::from_std(stale_after.max(MIN_STALE_AFTER))
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return 0;
        };

        match self
            .repo
            .fail_stale_processing(older_than, ABANDONED_REASON)
            .await
        {
            Ok(ids) => {
                if !ids.is_empty() {
                    warn!(count = ids.len(), ?ids, "failed messages abandoned in processing");
                }
                ids.len()
            }
            Err(err) => {
                warn!(error = %err, "stale processing sweep error");
                0
            }
        }
    }
}
