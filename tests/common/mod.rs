//! Common test utilities for publisher testing
//!
//! Provides a scripted in-process broker and a collecting escalation sink so
//! the publish/retry lifecycle can be exercised without RabbitMQ.

#![allow(dead_code)]

use async_trait::async_trait;
use eol_integrator::config::{Config, ConnectionFailurePolicy};
use eol_integrator::credentials::{InMemoryCredentialStore, RabbitCredentials};
use eol_integrator::escalation::UndeliverableSink;
use eol_integrator::publisher::{
    BrokerConnector, BrokerSession, Confirmation, ConfirmingPublisher, MessageRecord,
    PendingConfirmation, PublisherError, PublisherResult, RetryRegistry, RetrySupervisor,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Broker reaction to one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ack,
    Nack,
    /// basic.publish itself fails
    PublishError,
    /// Broker never sends a confirmation frame
    Silent,
}

/// One publish seen by the broker
#[derive(Debug, Clone)]
pub struct Attempt {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub at: Instant,
    pub step: Step,
}

/// Broker whose answers are scripted per payload; unscripted payloads are acked
#[derive(Default)]
pub struct ScriptedBroker {
    scripts: Mutex<HashMap<Vec<u8>, VecDeque<Step>>>,
    refuse_next_connections: AtomicUsize,
    attempts: Mutex<Vec<Attempt>>,
    logins: Mutex<Vec<RabbitCredentials>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue broker reactions for `payload`
    pub fn script(&self, payload: &[u8], steps: &[Step]) {
        self.scripts
            .lock()
            .entry(payload.to_vec())
            .or_default()
            .extend(steps.iter().copied());
    }

    /// Reject the next `count` connection attempts
    pub fn refuse_connections(&self, count: usize) {
        self.refuse_next_connections.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }

    pub fn attempts_for(&self, payload: &[u8]) -> Vec<Attempt> {
        self.attempts
            .lock()
            .iter()
            .filter(|attempt| attempt.payload == payload)
            .cloned()
            .collect()
    }

    /// Credentials presented on each successful connect
    pub fn logins(&self) -> Vec<RabbitCredentials> {
        self.logins.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_step(&self, payload: &[u8]) -> Step {
        self.scripts
            .lock()
            .get_mut(payload)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Ack)
    }
}

/// Connector handing out sessions on a shared scripted broker
#[derive(Clone)]
pub struct ScriptedConnector {
    pub broker: Arc<ScriptedBroker>,
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    async fn connect(&self, credentials: &RabbitCredentials) -> PublisherResult<Box<dyn BrokerSession>> {
        let refused = self
            .broker
            .refuse_next_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(PublisherError::ConnectionFailed("connection refused".to_string()));
        }

        self.broker.opened.fetch_add(1, Ordering::SeqCst);
        self.broker.logins.lock().push(credentials.clone());
        Ok(Box::new(ScriptedSession {
            broker: self.broker.clone(),
        }))
    }
}

struct ScriptedSession {
    broker: Arc<ScriptedBroker>,
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn open_confirm_channel(&mut self) -> PublisherResult<()> {
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> PublisherResult<PendingConfirmation> {
        let step = self.broker.next_step(payload);
        self.broker.attempts.lock().push(Attempt {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
            at: Instant::now(),
            step,
        });

        match step {
            Step::Ack => Ok(Box::pin(async { Ok(Confirmation::Ack) })),
            Step::Nack => Ok(Box::pin(async { Ok(Confirmation::Nack) })),
            Step::Silent => Ok(Box::pin(futures::future::pending())),
            Step::PublishError => Err(PublisherError::PublishFailed("socket closed".to_string())),
        }
    }

    async fn close(&mut self) -> PublisherResult<()> {
        self.broker.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink recording every escalated batch
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<MessageRecord>>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<MessageRecord>> {
        self.batches.lock().clone()
    }

    pub fn escalated_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|record| record.request_id.clone())
            .collect()
    }
}

#[async_trait]
impl UndeliverableSink for CollectingSink {
    async fn escalate(&self, records: Vec<MessageRecord>) -> PublisherResult<()> {
        self.batches.lock().push(records);
        Ok(())
    }
}

/// Config with the given retry budget and interval
pub fn test_config(max_retries: u32, retry_interval_secs: u64) -> Config {
    let mut config = Config::default();
    config.publisher.max_retries = max_retries;
    config.publisher.retry_interval_secs = retry_interval_secs;
    config.publisher.confirm_timeout_secs = 2;
    config
}

pub fn test_credentials() -> Arc<InMemoryCredentialStore> {
    Arc::new(InMemoryCredentialStore::with_rabbit("localhost", 5672, "guest", "guest"))
}

/// Supervisor over a scripted broker with a collecting sink
pub fn build_supervisor(
    broker: &Arc<ScriptedBroker>,
    sink: &Arc<CollectingSink>,
    config: &Config,
) -> RetrySupervisor {
    let registry = Arc::new(RetryRegistry::new());
    let publisher = ConfirmingPublisher::new(
        Arc::new(ScriptedConnector {
            broker: broker.clone(),
        }),
        test_credentials(),
        registry,
        &config.publisher,
    );
    RetrySupervisor::new(publisher, sink.clone(), &config.publisher)
}

pub fn with_policy(mut config: Config, policy: ConnectionFailurePolicy) -> Config {
    config.publisher.connection_failure_policy = policy;
    config
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
