use super::{
    AllocationError, HeapAllocator, LogicalName, NamingConvention, TopicAllocator, TopicPurpose,
    WireTopicName, ROS_PREFIXES, ROS_TOPIC_PREFIX,
};

/// Wire name for a plain topic: `rt<name>` under the convention, `<name>` otherwise.
pub fn mangle_topic(
    name: &LogicalName,
    convention: NamingConvention,
) -> Result<WireTopicName, AllocationError> {
    mangle_topic_with(&HeapAllocator, name, convention)
}

pub fn mangle_topic_with<A: TopicAllocator + ?Sized>(
    allocator: &A,
    name: &LogicalName,
    convention: NamingConvention,
) -> Result<WireTopicName, AllocationError> {
    let prefix = if convention.applies_prefixes() {
        ROS_TOPIC_PREFIX
    } else {
        ""
    };
    allocator.build(TopicPurpose::Topic, &[prefix, name.as_str()])
}

/// The namespace prefix of a wire name, recognised only when followed by `/`.
pub fn ros_prefix_if_exists(wire: &str) -> Option<&'static str> {
    ROS_PREFIXES.into_iter().find(|prefix| {
        wire.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

pub fn strip_ros_prefix_if_exists(wire: &str) -> &str {
    match ros_prefix_if_exists(wire) {
        Some(prefix) => &wire[prefix.len()..],
        None => wire,
    }
}

/// Graph name behind an `rt/` topic; `None` for anything else.
pub fn demangle_topic(wire: &str) -> Option<&str> {
    match ros_prefix_if_exists(wire) {
        Some(ROS_TOPIC_PREFIX) => Some(&wire[ROS_TOPIC_PREFIX.len()..]),
        _ => None,
    }
}
