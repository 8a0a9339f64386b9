use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use transport_bus::{Bus, BusMessage};

use crate::config::ServiceConfig;
use crate::correlation::{
    ClientGuid, CorrelationKey, CorrelationLedger, Outcome, RequestHandle, SequenceGenerator,
};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::{ServiceError, ServiceResult};
use crate::names::{
    derive_service_topics, LogicalName, NamingConvention, ServiceTopicPair, WireTopicName,
};

/// Calls one service over its request/reply topic pair.
///
/// Needs a tokio runtime: construction spawns the task that feeds replies into
/// the ledger.
pub struct ServiceClient<B: Bus + 'static, Req, Res> {
    bus: Arc<B>,
    service: LogicalName,
    topics: ServiceTopicPair,
    guid: ClientGuid,
    sequence: SequenceGenerator,
    ledger: CorrelationLedger<Res>,
    request_timeout: Duration,
    pump: JoinHandle<()>,
    _request: PhantomData<fn(Req)>,
}

impl<B, Req, Res> ServiceClient<B, Req, Res>
where
    B: Bus + 'static,
    Req: Serialize,
    Res: DeserializeOwned + Send + 'static,
{
    pub fn new(bus: Arc<B>, service: LogicalName, config: &ServiceConfig) -> ServiceResult<Self> {
        let topics = service_topics(&service, config.naming)?;
        let guid = ClientGuid::random();
        let ledger = CorrelationLedger::new();
        // Subscribe before the first request can go out.
        let replies = bus.subscribe(topics.reply.as_str());
        let pump = spawn_reply_pump(replies, ledger.clone(), topics.reply.clone());
        debug!(
            target = "rpc.client",
            service = %service,
            client = %guid,
            request_topic = %topics.request,
            reply_topic = %topics.reply,
            "service client ready"
        );
        Ok(Self {
            bus,
            service,
            topics,
            guid,
            sequence: SequenceGenerator::new(),
            ledger,
            request_timeout: config.request_timeout,
            pump,
            _request: PhantomData,
        })
    }

    /// Registers the request, then publishes it. The handle is the only way to
    /// observe the outcome.
    pub fn send_request(&self, request: &Req) -> ServiceResult<RequestHandle<Res>> {
        let key = CorrelationKey::new(self.guid, self.sequence.issue());
        let handle = self.ledger.register(key)?;
        let bytes = Envelope::request(key, request).encode()?;
        let reached = self.bus.publish(self.topics.request.as_str(), bytes)?;
        if reached == 0 {
            debug!(
                target = "rpc.client",
                service = %self.service,
                %key,
                "no server subscribed to request topic"
            );
        }
        Ok(handle)
    }

    /// Sends `request` and waits up to the configured timeout for its reply.
    pub async fn call(&self, request: &Req) -> ServiceResult<Outcome<Res>> {
        let handle = self.send_request(request)?;
        let key = handle.key();
        let outcome = handle.outcome_within(self.request_timeout).await;
        if let Outcome::TimedOut { .. } = outcome {
            warn!(
                target = "rpc.client",
                service = %self.service,
                %key,
                timeout = ?self.request_timeout,
                "service call timed out"
            );
        }
        Ok(outcome)
    }

    pub fn service(&self) -> &LogicalName {
        &self.service
    }

    pub fn topics(&self) -> &ServiceTopicPair {
        &self.topics
    }

    pub fn guid(&self) -> ClientGuid {
        self.guid
    }

    pub fn pending_requests(&self) -> usize {
        self.ledger.len()
    }
}

impl<B: Bus + 'static, Req, Res> Drop for ServiceClient<B, Req, Res> {
    fn drop(&mut self) {
        self.pump.abort();
        let cancelled = self.ledger.shutdown();
        if cancelled > 0 {
            debug!(
                target = "rpc.client",
                service = %self.service,
                cancelled,
                "cancelled pending requests on shutdown"
            );
        }
    }
}

/// Derives the pair for an entity being created, flagging names that already
/// carry a mangling token.
pub(crate) fn service_topics(
    service: &LogicalName,
    naming: NamingConvention,
) -> ServiceResult<ServiceTopicPair> {
    if let Some(affix) = service.reserved_affix() {
        warn!(
            target = "rpc.naming",
            service = %service,
            affix,
            "service name contains a reserved token; wire names may collide"
        );
    }
    derive_service_topics(service, naming).map_err(|source| ServiceError::Derivation {
        name: service.to_string(),
        source,
    })
}

fn spawn_reply_pump<Res>(
    mut replies: broadcast::Receiver<BusMessage>,
    ledger: CorrelationLedger<Res>,
    topic: WireTopicName,
) -> JoinHandle<()>
where
    Res: DeserializeOwned + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match replies.recv().await {
                Ok(msg) => match Envelope::<Res>::decode(&msg.payload) {
                    Ok(envelope) if envelope.kind == EnvelopeKind::Reply => {
                        // Replies for other clients land here too; the ledger drops them.
                        ledger.resolve(envelope.header, envelope.payload);
                    }
                    Ok(_) => {
                        debug!(target = "rpc.client", topic = %topic, "ignoring non-reply envelope");
                    }
                    Err(err) => {
                        warn!(
                            target = "rpc.client",
                            topic = %topic,
                            error = %err,
                            "failed to decode reply envelope"
                        );
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target = "rpc.client", topic = %topic, skipped, "reply subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
