//! Dispatch cycle behaviour against the in-memory store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use chrono::Utc;
use common::{
    FailingRecorder, FlakyRepository, RECIPIENT, RecordingRecorder, StubDelivery, eventually,
    seed_pending, status_of,
};
use message_dispatch::{
    application::{
        handlers::message_dispatcher::{
            ABANDONED_REASON, CHAR_LIMIT_REASON, CycleReport, DispatchConfig, MIN_STALE_AFTER,
            MessageDispatcher,
        },
        services::recorder::SentRecorder,
    },
    domain::{
        models::{Message, MessageStatus},
        repositories::MessageRepository,
        value_objects::CharLimit,
    },
    infrastructure::{
        messaging::{WebhookClient, WebhookConfig},
        repositories::InMemoryMessageRepository,
    },
};
use serde_json::json;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

fn config(batch_size: u32) -> DispatchConfig {
    DispatchConfig {
        batch_size,
        char_limit: CharLimit(160),
        ..DispatchConfig::default()
    }
}

#[tokio::test]
async fn idle_cycle_touches_nothing() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let done = repo
        .create(RECIPIENT, "already out", MessageStatus::Processing)
        .await
        .unwrap();
    repo.mark_sent(done.id, "remote-x", Utc::now()).await.unwrap();
    let before = repo.get(done.id).await.unwrap().unwrap();
    let client = Arc::new(StubDelivery::accepting());

    let dispatcher = MessageDispatcher::new(repo.clone(), client.clone(), None, config(10));
    let report = dispatcher.run_once().await;

    assert_eq!(report, CycleReport::default());
    assert!(client.calls().is_empty());
    let after = repo.get(done.id).await.unwrap().unwrap();
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn delivers_one_batch_oldest_first() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["one", "two", "three"]).await;
    let client = Arc::new(StubDelivery::accepting());

    let dispatcher = MessageDispatcher::new(repo.clone(), client.clone(), None, config(2));
    let report = dispatcher.run_once().await;

    assert_eq!(report.claimed, 2);
    assert_eq!(report.sent, 2);
    assert_eq!(client.calls(), ids[..2].to_vec());

    let first = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(first.status, MessageStatus::Sent);
    assert_eq!(first.remote_message_id, Some(format!("remote-{}", ids[0])));
    assert!(first.sent_at.is_some());
    assert!(first.last_error.is_none());
    assert_eq!(status_of(&*repo, ids[2]).await, MessageStatus::Pending);

    let report = dispatcher.run_once().await;
    assert_eq!(report.sent, 1);
    assert_eq!(status_of(&*repo, ids[2]).await, MessageStatus::Sent);
}

#[tokio::test]
async fn over_limit_content_fails_without_delivery() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let long = "x".repeat(161);
    let ids = seed_pending(&*repo, &[long.as_str(), "short"]).await;
    let client = Arc::new(StubDelivery::accepting());

    let dispatcher = MessageDispatcher::new(repo.clone(), client.clone(), None, config(10));
    let report = dispatcher.run_once().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(client.calls(), vec![ids[1]]);
    let failed = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some(CHAR_LIMIT_REASON));
}

#[tokio::test]
async fn rejected_delivery_records_response_body() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["hello"]).await;
    let client = Arc::new(StubDelivery::rejecting(400, " invalid recipient \n"));

    let dispatcher = MessageDispatcher::new(repo.clone(), client, None, config(10));
    let report = dispatcher.run_once().await;

    assert_eq!(report.failed, 1);
    let message = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.last_error.as_deref(), Some("invalid recipient"));
    assert!(message.remote_message_id.is_none());
}

#[tokio::test]
async fn rejection_without_body_records_error_text() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["hello"]).await;
    let client = Arc::new(StubDelivery::rejecting(503, ""));

    MessageDispatcher::new(repo.clone(), client, None, config(10))
        .run_once()
        .await;

    let message = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(message.last_error.as_deref(), Some("unexpected status: 503"));
}

#[tokio::test]
async fn webhook_acceptance_marks_message_sent() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/webhook"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"message": "Accepted", "messageId": "abc123"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["Insider - Project"]).await;
    let client = WebhookClient::new(WebhookConfig::new(format!("{}/webhook", server.uri()), None))
        .unwrap();

    MessageDispatcher::new(repo.clone(), client, None, config(10))
        .run_once()
        .await;

    let message = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    assert_eq!(message.remote_message_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn webhook_server_error_marks_message_failed() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["Insider - Project"]).await;
    let client = WebhookClient::new(WebhookConfig::new(format!("{}/webhook", server.uri()), None))
        .unwrap();

    MessageDispatcher::new(repo.clone(), client, None, config(10))
        .run_once()
        .await;

    let message = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    assert!(message.last_error.unwrap().contains("internal error"));
}

#[tokio::test]
async fn claim_failure_ends_cycle_quietly() {
    let repo = Arc::new(FlakyRepository::default());
    seed_pending(&*repo, &["hello"]).await;
    repo.fail_claims.store(true, Ordering::SeqCst);
    let client = Arc::new(StubDelivery::accepting());

    let report = MessageDispatcher::new(repo.clone(), client.clone(), None, config(10))
        .run_once()
        .await;

    assert_eq!(report, CycleReport::default());
    assert!(client.calls().is_empty());

    repo.fail_claims.store(false, Ordering::SeqCst);
    let report = MessageDispatcher::new(repo.clone(), client.clone(), None, config(10))
        .run_once()
        .await;
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn failed_status_update_leaves_message_processing() {
    let repo = Arc::new(FlakyRepository::default());
    let ids = seed_pending(&*repo, &["hello"]).await;
    repo.fail_mark_sent.store(true, Ordering::SeqCst);
    let recorder = Arc::new(RecordingRecorder::default());

    let report = MessageDispatcher::new(
        repo.clone(),
        Arc::new(StubDelivery::accepting()),
        Some(recorder.clone() as Arc<dyn SentRecorder>),
        config(10),
    )
    .run_once()
    .await;

    assert_eq!(report.abandoned, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(status_of(&*repo, ids[0]).await, MessageStatus::Processing);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorder.records().is_empty());
}

#[tokio::test]
async fn recorder_sees_each_remote_id() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["a", "b"]).await;
    let recorder = Arc::new(RecordingRecorder::default());

    MessageDispatcher::new(
        repo.clone(),
        Arc::new(StubDelivery::accepting()),
        Some(recorder.clone() as Arc<dyn SentRecorder>),
        config(10),
    )
    .run_once()
    .await;

    let seen = &*recorder;
    assert!(eventually(|| async move { seen.records().len() == 2 }).await);
    let mut records = recorder.records();
    records.sort();
    assert_eq!(
        records,
        vec![format!("remote-{}", ids[0]), format!("remote-{}", ids[1])]
    );
}

#[tokio::test]
async fn recorder_failure_does_not_affect_status() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["a"]).await;

    let report = MessageDispatcher::new(
        repo.clone(),
        Arc::new(StubDelivery::accepting()),
        Some(Arc::new(FailingRecorder) as Arc<dyn SentRecorder>),
        config(10),
    )
    .run_once()
    .await;

    assert_eq!(report.sent, 1);
    assert_eq!(status_of(&*repo, ids[0]).await, MessageStatus::Sent);
}

#[tokio::test]
async fn slow_cycle_is_cut_off_by_timeout() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["a", "b"]).await;
    let client = Arc::new(StubDelivery::accepting().delayed(Duration::from_millis(200)));
    let config = DispatchConfig {
        cycle_timeout: Duration::from_millis(50),
        ..config(10)
    };

    let report = MessageDispatcher::new(repo.clone(), client.clone(), None, config)
        .run_once()
        .await;

    assert!(report.timed_out);
    assert_eq!(report.claimed, 2);
    assert_eq!(report.sent, 0);
    assert_eq!(client.calls(), vec![ids[0]]);
    assert_eq!(status_of(&*repo, ids[1]).await, MessageStatus::Processing);
}

#[tokio::test]
async fn stale_processing_is_failed_when_sweep_enabled() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let now = Utc::now();
    repo.insert(Message {
        id: 1,
        recipient: RECIPIENT.to_string(),
        content: "stuck".to_string(),
        status: MessageStatus::Processing,
        created_at: now - chrono::Duration::hours(1),
        updated_at: now - chrono::Duration::hours(1),
        sent_at: None,
        remote_message_id: None,
        last_error: None,
    })
    .await;
    let config = DispatchConfig {
        stale_after: Some(Duration::from_secs(600)),
        ..config(10)
    };

    let report = MessageDispatcher::new(repo.clone(), Arc::new(StubDelivery::accepting()), None, config)
        .run_once()
        .await;

    assert_eq!(report.reconciled, 1);
    let message = repo.get(1).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.last_error.as_deref(), Some(ABANDONED_REASON));
}

#[tokio::test]
async fn stale_processing_is_kept_when_sweep_disabled() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let stuck = repo
        .create(RECIPIENT, "stuck", MessageStatus::Processing)
        .await
        .unwrap();

    let report = MessageDispatcher::new(repo.clone(), Arc::new(StubDelivery::accepting()), None, config(10))
        .run_once()
        .await;

    assert_eq!(report.reconciled, 0);
    assert_eq!(status_of(&*repo, stuck.id).await, MessageStatus::Processing);
}

#[tokio::test]
async fn message_finished_elsewhere_during_delivery_is_not_overwritten() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let ids = seed_pending(&*repo, &["hello"]).await;
    let client = Arc::new(StubDelivery::accepting().delayed(Duration::from_millis(150)));
    let recorder = Arc::new(RecordingRecorder::default());
    let dispatcher = Arc::new(MessageDispatcher::new(
        repo.clone(),
        client.clone(),
        Some(recorder.clone() as Arc<dyn SentRecorder>),
        config(10),
    ));

    let cycle = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.run_once().await }
    });
    let stub = &*client;
    assert!(eventually(|| async move { !stub.calls().is_empty() }).await);
    assert!(repo.mark_failed(ids[0], "cancelled by operator").await.unwrap());

    let report = cycle.await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.abandoned, 1);
    let message = repo.get(ids[0]).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.last_error.as_deref(), Some("cancelled by operator"));
    assert_eq!(message.remote_message_id, None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorder.records().is_empty());
}

#[tokio::test]
async fn sweep_window_is_never_shorter_than_a_delivery() {
    let repo = Arc::new(InMemoryMessageRepository::new());
    let now = Utc::now();
    for (id, age) in [(1, chrono::Duration::seconds(30)), (2, chrono::Duration::hours(1))] {
        repo.insert(Message {
            id,
            recipient: RECIPIENT.to_string(),
            content: "in flight".to_string(),
            status: MessageStatus::Processing,
            created_at: now - age,
            updated_at: now - age,
            sent_at: None,
            remote_message_id: None,
            last_error: None,
        })
        .await;
    }
    let config = DispatchConfig {
        stale_after: Some(Duration::from_secs(1)),
        ..config(10)
    };
    assert!(Duration::from_secs(30) < MIN_STALE_AFTER);

    let report = MessageDispatcher::new(repo.clone(), Arc::new(StubDelivery::accepting()), None, config)
        .run_once()
        .await;

    assert_eq!(report.reconciled, 1);
    assert_eq!(status_of(&*repo, 1).await, MessageStatus::Processing);
    assert_eq!(status_of(&*repo, 2).await, MessageStatus::Failed);
}
