use super::{
    AllocationError, HeapAllocator, LogicalName, NamingConvention, TopicAllocator, TopicPurpose,
    WireTopicName, ROS_SERVICE_REQUESTER_PREFIX, ROS_SERVICE_RESPONSE_PREFIX,
    SERVICE_REPLY_SUFFIX, SERVICE_REQUEST_SUFFIX,
};

/// The two topics one logical service is split into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTopicPair {
    pub request: WireTopicName,
    pub reply: WireTopicName,
}

impl ServiceTopicPair {
    pub fn into_parts(self) -> (WireTopicName, WireTopicName) {
        (self.request, self.reply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Request,
    Reply,
}

/// `<rq><name>Request` and `<rr><name>Reply`; both prefixes are empty when the
/// convention is suppressed, leaving the suffixes to keep the pair apart.
pub fn derive_service_topics(
    name: &LogicalName,
    convention: NamingConvention,
) -> Result<ServiceTopicPair, AllocationError> {
    derive_service_topics_with(&HeapAllocator, name, convention)
}

/// Either both names come back or neither does.
pub fn derive_service_topics_with<A: TopicAllocator + ?Sized>(
    allocator: &A,
    name: &LogicalName,
    convention: NamingConvention,
) -> Result<ServiceTopicPair, AllocationError> {
    let (request_prefix, response_prefix) = if convention.applies_prefixes() {
        (ROS_SERVICE_REQUESTER_PREFIX, ROS_SERVICE_RESPONSE_PREFIX)
    } else {
        ("", "")
    };

    let request = allocator.build(
        TopicPurpose::Request,
        &[request_prefix, name.as_str(), SERVICE_REQUEST_SUFFIX],
    )?;
    // `request` is dropped on the early return if this one fails.
    let reply = allocator.build(
        TopicPurpose::Reply,
        &[response_prefix, name.as_str(), SERVICE_REPLY_SUFFIX],
    )?;

    Ok(ServiceTopicPair { request, reply })
}

/// Service name and role behind an `rq/...Request` or `rr/...Reply` topic.
pub fn demangle_service(wire: &str) -> Option<(&str, ServiceRole)> {
    let (rest, role, suffix) = if let Some(rest) = wire.strip_prefix(ROS_SERVICE_REQUESTER_PREFIX)
    {
        (rest, ServiceRole::Request, SERVICE_REQUEST_SUFFIX)
    } else if let Some(rest) = wire.strip_prefix(ROS_SERVICE_RESPONSE_PREFIX) {
        (rest, ServiceRole::Reply, SERVICE_REPLY_SUFFIX)
    } else {
        return None;
    };
    if !rest.starts_with('/') {
        return None;
    }
    rest.strip_suffix(suffix).map(|service| (service, role))
}
