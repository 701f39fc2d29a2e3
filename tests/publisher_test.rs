//! Publish/retry lifecycle against a scripted in-process broker

mod common;

use common::*;
use eol_integrator::config::{Config, ConnectionFailurePolicy};
use eol_integrator::credentials::InMemoryCredentialStore;
use eol_integrator::publisher::{
    AttemptOutcome, ConfirmingPublisher, PublisherError, RetryRegistry, RetrySupervisor,
};
use std::sync::Arc;
use tokio::time::Instant;

const EXCHANGE: &str = "mdm_scraper_integrator_exchange_tp";
const ROUTING_KEY: &str = "mdm.scraper.software.integrator";

/// Registry, a publisher for first attempts and a supervisor sharing both
fn build_parts(
    broker: &Arc<ScriptedBroker>,
    sink: &Arc<CollectingSink>,
    config: &Config,
) -> (Arc<RetryRegistry>, ConfirmingPublisher, RetrySupervisor) {
    let registry = Arc::new(RetryRegistry::new());
    let connector = Arc::new(ScriptedConnector {
        broker: broker.clone(),
    });

    let publisher = ConfirmingPublisher::new(
        connector.clone(),
        test_credentials(),
        registry.clone(),
        &config.publisher,
    );
    let supervisor = RetrySupervisor::new(
        ConfirmingPublisher::new(connector, test_credentials(), registry.clone(), &config.publisher),
        sink.clone(),
        &config.publisher,
    );

    (registry, publisher, supervisor)
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_counts_follow_each_attempt() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, publisher, supervisor) = build_parts(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload-a", &[Step::Nack, Step::Nack, Step::Nack, Step::Ack]);

    let outcome = publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload-a", "req-a", false)
        .await
        .unwrap();
    assert_eq!(outcome, AttemptOutcome::Rejected);
    assert_eq!(registry.retry_count("req-a"), Some(0));

    supervisor.sweep().await.unwrap();
    assert_eq!(registry.retry_count("req-a"), Some(1));

    supervisor.sweep().await.unwrap();
    assert_eq!(registry.retry_count("req-a"), Some(2));

    let report = supervisor.sweep().await.unwrap();
    assert_eq!(report.retried, vec!["req-a".to_string()]);
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(report.delivered[0].retry_count, 3);
    assert!(report.escalated.is_empty());
    assert!(registry.is_empty());
    assert!(!registry.is_marked_for_removal("req-a"));

    assert_eq!(broker.attempts().len(), 4);
    assert!(sink.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_a_through_publish_messages() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload-a", &[Step::Nack, Step::Nack, Step::Nack, Step::Ack]);

    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"payload-a".to_vec()], "req-a")
        .await
        .unwrap();

    assert_eq!(report.initial_outcomes, vec![AttemptOutcome::Rejected]);
    assert_eq!(report.sweeps, 3);
    assert!(report.is_fully_delivered());
    assert!(supervisor.registry().is_empty());
    assert_eq!(broker.attempts().len(), 4);
    assert!(sink.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_b_escalates_on_schedule() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(2, 1));
    broker.script(b"payload-b", &[Step::Nack; 10]);

    let start = Instant::now();
    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"payload-b".to_vec()], "req-b")
        .await
        .unwrap();

    let offsets: Vec<_> = broker.attempts().iter().map(|a| a.at - start).collect();
    assert_eq!(offsets, vec![secs(0), secs(1), secs(2)]);
    assert_eq!(Instant::now() - start, secs(3));

    assert_eq!(report.sweeps, 3);
    assert_eq!(report.escalated.len(), 1);
    assert_eq!(report.escalated[0].request_id, "req-b");
    assert_eq!(report.escalated[0].retry_count, 2);
    assert_eq!(sink.escalated_ids(), vec!["req-b".to_string()]);
    assert!(supervisor.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_always_rejected_gets_max_retries_plus_one_attempts() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload", &[Step::Nack; 10]);

    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"payload".to_vec()], "req-1")
        .await
        .unwrap();

    assert_eq!(broker.attempts().len(), 6);
    assert_eq!(report.escalated.len(), 1);
    assert_eq!(sink.batches().len(), 1);
    assert!(!report.is_fully_delivered());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_independent_counts() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, publisher, supervisor) = build_parts(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload-x", &[Step::Nack, Step::Nack, Step::Ack]);
    broker.script(b"payload-y", &[Step::Nack, Step::Ack]);

    publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload-x", "req-x", false)
        .await
        .unwrap();
    publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload-y", "req-y", false)
        .await
        .unwrap();
    assert_eq!(registry.len(), 2);

    let first = supervisor.sweep().await.unwrap();
    assert_eq!(first.retried.len(), 2);
    assert_eq!(first.delivered.len(), 1);
    assert_eq!(first.delivered[0].request_id, "req-y");
    assert_eq!(registry.retry_count("req-x"), Some(1));
    assert_eq!(registry.retry_count("req-y"), None);

    let second = supervisor.sweep().await.unwrap();
    assert_eq!(second.retried, vec!["req-x".to_string()]);
    assert!(registry.is_empty());
    assert_eq!(broker.attempts_for(b"payload-x").len(), 3);
    assert_eq!(broker.attempts_for(b"payload-y").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_count_never_decreases() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, publisher, supervisor) = build_parts(&broker, &sink, &test_config(4, 5));
    broker.script(b"payload", &[Step::Nack, Step::Nack, Step::Silent, Step::Nack, Step::Nack]);

    publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload", "req-1", false)
        .await
        .unwrap();

    let mut previous = registry.retry_count("req-1").unwrap();
    for _ in 0..4 {
        supervisor.sweep().await.unwrap();
        let current = registry.retry_count("req-1").unwrap();
        assert_eq!(current, previous + 1);
        previous = current;
    }

    let report = supervisor.sweep().await.unwrap();
    assert!(report.retried.is_empty());
    assert_eq!(report.escalated[0].retry_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_marked_record_is_not_retried_before_flush() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, _publisher, supervisor) = build_parts(&broker, &sink, &test_config(5, 5));

    registry.add("req-1", b"payload", EXCHANGE, ROUTING_KEY, "Scraper-Service", 1);
    registry.mark_for_removal("req-1");

    let report = supervisor.sweep().await.unwrap();

    assert!(report.retried.is_empty());
    assert_eq!(report.delivered.len(), 1);
    assert!(broker.attempts().is_empty());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_counts_as_rejection() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, publisher, _supervisor) = build_parts(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload", &[Step::Silent]);

    let start = Instant::now();
    let outcome = publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload", "req-1", false)
        .await
        .unwrap();

    assert_eq!(outcome, AttemptOutcome::TimedOut);
    assert_eq!(Instant::now() - start, secs(2));
    assert_eq!(registry.retry_count("req-1"), Some(0));
    assert_eq!(broker.closed(), 1);
}

#[tokio::test]
async fn test_missing_credentials_fail_before_connecting() {
    let broker = ScriptedBroker::new();
    let config = test_config(5, 5);
    let publisher = ConfirmingPublisher::new(
        Arc::new(ScriptedConnector {
            broker: broker.clone(),
        }),
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(RetryRegistry::new()),
        &config.publisher,
    );

    let result = publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload", "req-1", false)
        .await;

    assert!(matches!(result, Err(PublisherError::Configuration(_))));
    assert_eq!(broker.opened(), 0);
    assert!(publisher.registry().is_empty());
}

#[tokio::test]
async fn test_transport_error_is_returned_to_caller() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, publisher, _supervisor) = build_parts(&broker, &sink, &test_config(5, 5));
    broker.script(b"payload", &[Step::PublishError]);

    let result = publisher
        .publish(EXCHANGE, ROUTING_KEY, b"payload", "req-1", false)
        .await;

    assert!(matches!(result, Err(PublisherError::PublishFailed(_))));
    assert!(registry.is_empty());
    assert_eq!(broker.opened(), 1);
    assert_eq!(broker.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_is_abandoned_by_default() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(5, 5));
    broker.refuse_connections(1);

    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"payload".to_vec()], "req-1")
        .await
        .unwrap();

    assert_eq!(report.initial_outcomes, vec![AttemptOutcome::Unreachable]);
    assert_eq!(report.sweeps, 0);
    assert!(broker.attempts().is_empty());
    assert!(sink.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_retried_when_configured() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let config = with_policy(test_config(5, 5), ConnectionFailurePolicy::Retry);
    let supervisor = build_supervisor(&broker, &sink, &config);
    broker.refuse_connections(1);

    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"payload".to_vec()], "req-1")
        .await
        .unwrap();

    assert_eq!(report.initial_outcomes, vec![AttemptOutcome::Unreachable]);
    assert_eq!(report.sweeps, 1);
    assert!(report.is_fully_delivered());
    assert_eq!(broker.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_opened_connection_is_closed() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(3, 1));
    broker.script(b"one", &[Step::Nack, Step::Silent, Step::Ack]);
    broker.script(b"two", &[Step::Nack; 10]);

    supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"one".to_vec()], "req-one")
        .await
        .unwrap();
    supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"two".to_vec()], "req-two")
        .await
        .unwrap();

    assert!(broker.opened() > 0);
    assert_eq!(broker.opened(), broker.closed());
    assert_eq!(sink.escalated_ids(), vec!["req-two".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_publish_messages_shares_one_request_id() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let supervisor = build_supervisor(&broker, &sink, &test_config(5, 1));
    broker.script(b"first", &[Step::Nack]);

    let report = supervisor
        .publish_messages(
            EXCHANGE,
            ROUTING_KEY,
            &[b"first".to_vec(), b"second".to_vec()],
            "req-batch",
        )
        .await
        .unwrap();

    assert_eq!(
        report.initial_outcomes,
        vec![AttemptOutcome::Rejected, AttemptOutcome::Acked]
    );
    assert!(report.is_fully_delivered());
    assert!(supervisor.registry().is_empty());
    assert_eq!(broker.attempts_for(b"first").len(), 2);
}

#[tokio::test]
async fn test_failed_retry_still_flushes_and_escalates() {
    let broker = ScriptedBroker::new();
    let sink = CollectingSink::new();
    let (registry, _publisher, supervisor) = build_parts(&broker, &sink, &test_config(5, 0));
    broker.script(b"fail", &[Step::PublishError]);

    registry.add("req-1-ack", b"ack", EXCHANGE, ROUTING_KEY, "svc", 0);
    registry.add("req-2-fail", b"fail", EXCHANGE, ROUTING_KEY, "svc", 0);
    registry.add("req-3-spent", b"spent", EXCHANGE, ROUTING_KEY, "svc", 5);

    let result = supervisor.sweep().await;

    assert!(matches!(result, Err(PublisherError::PublishFailed(_))));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.retry_count("req-2-fail"), Some(1));
    assert_eq!(registry.pending_removals(), 0);
    assert_eq!(sink.escalated_ids(), vec!["req-3-spent".to_string()]);
    assert!(broker.attempts_for(b"spent").is_empty());

    // Nothing stale leaks into the next delivery's report
    let report = supervisor
        .publish_messages(EXCHANGE, ROUTING_KEY, &[b"new".to_vec()], "req-new")
        .await
        .unwrap();

    assert!(report.is_fully_delivered());
    assert!(registry.is_empty());
    assert_eq!(sink.escalated_ids(), vec!["req-3-spent".to_string()]);
}
