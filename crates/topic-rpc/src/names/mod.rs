//! Graph-name to wire-topic mapping.
//!
//! Every process that wants to talk to another must derive byte-identical topic
//! strings from the same graph name, with nothing but these constants to agree
//! on. They are protocol literals: changing one is a wire break and requires a
//! bump of [`NAMING_PROTOCOL_VERSION`].

use std::fmt;

use thiserror::Error;

mod mangle;
mod service;

pub use mangle::{
    demangle_topic, mangle_topic, mangle_topic_with, ros_prefix_if_exists,
    strip_ros_prefix_if_exists,
};
pub use service::{
    demangle_service, derive_service_topics, derive_service_topics_with, ServiceRole,
    ServiceTopicPair,
};

pub const NAMING_PROTOCOL_VERSION: u32 = 1;

pub const ROS_TOPIC_PREFIX: &str = "rt";
pub const ROS_SERVICE_REQUESTER_PREFIX: &str = "rq";
pub const ROS_SERVICE_RESPONSE_PREFIX: &str = "rr";
pub const ROS_PREFIXES: [&str; 3] = [
    ROS_TOPIC_PREFIX,
    ROS_SERVICE_REQUESTER_PREFIX,
    ROS_SERVICE_RESPONSE_PREFIX,
];

pub const SERVICE_REQUEST_SUFFIX: &str = "Request";
pub const SERVICE_REPLY_SUFFIX: &str = "Reply";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("graph name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Which wire string a buffer was being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicPurpose {
    Topic,
    Request,
    Reply,
}

impl fmt::Display for TopicPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TopicPurpose::Topic => "topic",
            TopicPurpose::Request => "request topic",
            TopicPurpose::Reply => "response topic",
        };
        f.write_str(label)
    }
}

/// A topic buffer could not be built. Resource exhaustion, not a logic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("could not allocate {requested} bytes for {purpose} string")]
pub struct AllocationError {
    pub purpose: TopicPurpose,
    pub requested: usize,
}

/// A non-empty topic or service name as the user supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalName(String);

impl LogicalName {
    pub fn new(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NamingError::EmptyName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reports a mangling token the name already carries.
    ///
    /// Such names are accepted, but their wire strings may collide with the
    /// derivation of a different name (`/fooRequest` as a plain topic versus
    /// `/foo` as a service with the convention suppressed).
    pub fn reserved_affix(&self) -> Option<&'static str> {
        ros_prefix_if_exists(&self.0).or_else(|| {
            [SERVICE_REQUEST_SUFFIX, SERVICE_REPLY_SUFFIX]
                .into_iter()
                .find(|suffix| self.0.ends_with(suffix))
        })
    }
}

impl TryFrom<&str> for LogicalName {
    type Error = NamingError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for LogicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The exact string given to the transport. Owns its buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireTopicName(String);

impl WireTopicName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for WireTopicName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireTopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for WireTopicName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WireTopicName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Whether the graph namespace prefixes are applied. Fixed per node or client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingConvention {
    pub avoid_ros_namespace_conventions: bool,
}

impl NamingConvention {
    pub const ROS: Self = Self {
        avoid_ros_namespace_conventions: false,
    };
    pub const SUPPRESSED: Self = Self {
        avoid_ros_namespace_conventions: true,
    };

    pub fn applies_prefixes(self) -> bool {
        !self.avoid_ros_namespace_conventions
    }
}

/// String-building capability the mangler allocates through.
pub trait TopicAllocator {
    /// Concatenates `parts` into one freshly owned buffer.
    fn build(
        &self,
        purpose: TopicPurpose,
        parts: &[&str],
    ) -> Result<WireTopicName, AllocationError>;
}

/// Heap builder that reports exhaustion instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl TopicAllocator for HeapAllocator {
    fn build(
        &self,
        purpose: TopicPurpose,
        parts: &[&str],
    ) -> Result<WireTopicName, AllocationError> {
        let requested = parts
            .iter()
            .try_fold(0usize, |total, part| total.checked_add(part.len()))
            .ok_or(AllocationError {
                purpose,
                requested: usize::MAX,
            })?;
        let mut buf = String::new();
        buf.try_reserve_exact(requested)
            .map_err(|_| AllocationError { purpose, requested })?;
        for part in parts {
            buf.push_str(part);
        }
        Ok(WireTopicName(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn empty_names_are_rejected() {
        assert_eq!(LogicalName::new(""), Err(NamingError::EmptyName));
        assert!(LogicalName::try_from("/chatter").is_ok());
    }

    #[test_timeout::timeout]
    fn reserved_affixes_are_reported() {
        let plain = LogicalName::new("/add_two_ints").unwrap();
        assert_eq!(plain.reserved_affix(), None);

        let prefixed = LogicalName::new("rq/add_two_ints").unwrap();
        assert_eq!(prefixed.reserved_affix(), Some(ROS_SERVICE_REQUESTER_PREFIX));

        let suffixed = LogicalName::new("/add_two_intsReply").unwrap();
        assert_eq!(suffixed.reserved_affix(), Some(SERVICE_REPLY_SUFFIX));
    }

    #[test_timeout::timeout]
    fn heap_allocator_concatenates_exactly() {
        let wire = HeapAllocator
            .build(TopicPurpose::Request, &["rq", "/a", "Request"])
            .unwrap();
        assert_eq!(wire, "rq/aRequest");
        assert_eq!(wire.as_str().len(), "rq/aRequest".len());
    }

    #[test_timeout::timeout]
    fn allocation_error_names_the_buffer() {
        let err = AllocationError {
            purpose: TopicPurpose::Reply,
            requested: 12,
        };
        assert_eq!(
            err.to_string(),
            "could not allocate 12 bytes for response topic string"
        );
    }

    #[test_timeout::timeout]
    fn prefix_constants_are_distinct() {
        assert_ne!(ROS_SERVICE_REQUESTER_PREFIX, ROS_SERVICE_RESPONSE_PREFIX);
        assert_ne!(SERVICE_REQUEST_SUFFIX, SERVICE_REPLY_SUFFIX);
        assert_eq!(NamingConvention::default(), NamingConvention::ROS);
        assert!(!NamingConvention::SUPPRESSED.applies_prefixes());
    }
}
