//! Request/reply services over a topic-only pub/sub transport.
//!
//! [`names`] turns graph names into the wire topic strings every participant
//! must agree on, splitting each service into a request topic and a reply
//! topic. [`correlation`] pairs replies seen on the shared reply topic with the
//! calls that produced them. [`ServiceClient`], [`ServiceServer`] and [`Topic`]
//! wire both onto a [`transport_bus::Bus`].

pub mod client;
pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod names;
pub mod server;
pub mod telemetry;
pub mod topic;

pub use client::ServiceClient;
pub use config::ServiceConfig;
pub use correlation::{CorrelationKey, CorrelationLedger, Outcome, RequestHandle};
pub use error::{ServiceError, ServiceResult};
pub use names::{
    derive_service_topics, mangle_topic, LogicalName, NamingConvention, ServiceTopicPair,
    WireTopicName,
};
pub use server::ServiceServer;
pub use topic::Topic;
