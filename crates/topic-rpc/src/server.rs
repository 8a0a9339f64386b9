use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use transport_bus::Bus;

use crate::client::service_topics;
use crate::config::ServiceConfig;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::ServiceResult;
use crate::names::{LogicalName, ServiceTopicPair};

/// Answers requests arriving on a service's request topic.
///
/// Each reply is published on the shared reply topic with the request's
/// correlation header; every client subscribed there sees it.
pub struct ServiceServer {
    service: LogicalName,
    topics: ServiceTopicPair,
    worker: JoinHandle<()>,
}

impl ServiceServer {
    pub fn spawn<B, Req, Res, F>(
        bus: Arc<B>,
        service: LogicalName,
        config: &ServiceConfig,
        handler: F,
    ) -> ServiceResult<Self>
    where
        B: Bus + 'static,
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(Req) -> Res + Send + Sync + 'static,
    {
        let topics = service_topics(&service, config.naming)?;
        let mut requests = bus.subscribe(topics.request.as_str());
        let request_topic = topics.request.clone();
        let reply_topic = topics.reply.clone();

        let worker = tokio::spawn(async move {
            loop {
                let msg = match requests.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            target = "rpc.server",
                            topic = %request_topic,
                            skipped,
                            "request subscriber lagged"
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let envelope = match Envelope::<Req>::decode(&msg.payload) {
                    Ok(envelope) if envelope.kind == EnvelopeKind::Request => envelope,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(
                            target = "rpc.server",
                            topic = %request_topic,
                            error = %err,
                            "failed to decode request envelope"
                        );
                        continue;
                    }
                };

                let key = envelope.header;
                let response = handler(envelope.payload);
                let published = Envelope::reply(key, &response)
                    .encode()
                    .map_err(|err| err.to_string())
                    .and_then(|bytes| {
                        bus.publish(reply_topic.as_str(), bytes)
                            .map_err(|err| err.to_string())
                    });
                match published {
                    Ok(reached) => debug!(
                        target = "rpc.server",
                        %key,
                        reached,
                        topic = %reply_topic,
                        "published reply"
                    ),
                    Err(err) => warn!(
                        target = "rpc.server",
                        %key,
                        error = %err,
                        topic = %reply_topic,
                        "failed to publish reply"
                    ),
                }
            }
        });

        debug!(
            target = "rpc.server",
            service = %service,
            request_topic = %topics.request,
            reply_topic = %topics.reply,
            "service server ready"
        );
        Ok(Self {
            service,
            topics,
            worker,
        })
    }

    pub fn service(&self) -> &LogicalName {
        &self.service
    }

    pub fn topics(&self) -> &ServiceTopicPair {
        &self.topics
    }
}

impl Drop for ServiceServer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
