use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::warn;
use transport_bus::{Bus, BusMessage};

use crate::error::{ServiceError, ServiceResult};
use crate::names::{mangle_topic, LogicalName, NamingConvention, WireTopicName};

/// A plain graph topic bound to its wire name.
pub struct Topic<B: Bus> {
    bus: Arc<B>,
    name: LogicalName,
    wire: WireTopicName,
}

impl<B: Bus> Topic<B> {
    pub fn new(bus: Arc<B>, name: LogicalName, naming: NamingConvention) -> ServiceResult<Self> {
        if let Some(affix) = name.reserved_affix() {
            warn!(
                target = "rpc.naming",
                topic = %name,
                affix,
                "topic name contains a reserved token; wire names may collide"
            );
        }
        let wire = mangle_topic(&name, naming).map_err(|source| ServiceError::Derivation {
            name: name.to_string(),
            source,
        })?;
        Ok(Self { bus, name, wire })
    }

    pub fn name(&self) -> &LogicalName {
        &self.name
    }

    pub fn wire_name(&self) -> &WireTopicName {
        &self.wire
    }

    pub fn publish(&self, payload: Bytes) -> ServiceResult<usize> {
        Ok(self.bus.publish(self.wire.as_str(), payload)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.bus.subscribe(self.wire.as_str())
    }
}
