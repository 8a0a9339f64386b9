//! Correlation header carried alongside every service payload.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Request,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub header: CorrelationKey,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn request(header: CorrelationKey, payload: T) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            header,
            payload,
        }
    }

    pub fn reply(header: CorrelationKey, payload: T) -> Self {
        Self {
            kind: EnvelopeKind::Reply,
            header,
            payload,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
