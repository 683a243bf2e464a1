//! Records and poll classification.

/// A record read from a topic partition.
///
/// Identity is positional: `(topic, partition, offset)`. The payload is
/// opaque bytes with no required schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Message payload
    pub payload: Vec<u8>,

    /// Message key (optional)
    pub key: Option<Vec<u8>>,

    /// Topic name
    pub topic: String,

    /// Partition number
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Message timestamp (milliseconds since epoch)
    pub timestamp: i64,
}

impl Record {
    /// Build a record carrying only a payload, positioned at offset 0.
    pub fn from_payload(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            key: None,
            topic: topic.into(),
            partition: 0,
            offset: 0,
            timestamp: 0,
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A record arrived.
    Record(Record),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The consumer caught up with the end of a partition.
    PartitionEnd {
        /// Partition that was drained
        partition: i32,
    },
    /// The broker client reported an error for this cycle.
    Error(String),
}

impl PollOutcome {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PollOutcome::Record(_) => "record",
            PollOutcome::Timeout => "timeout",
            PollOutcome::PartitionEnd { .. } => "partition_end",
            PollOutcome::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_str_lossy() {
        let record = Record::from_payload("tweets", vec![b'h', b'i', 0xff]);
        assert_eq!(record.payload_str(), "hi\u{fffd}");
        assert!(record.key.is_none());
    }

    #[test]
    fn test_poll_outcome_kind() {
        assert_eq!(PollOutcome::Timeout.kind(), "timeout");
        assert_eq!(PollOutcome::PartitionEnd { partition: 2 }.kind(), "partition_end");
        assert_eq!(PollOutcome::Error("boom".into()).kind(), "error");
        assert_eq!(
            PollOutcome::Record(Record::from_payload("t", "x")).kind(),
            "record"
        );
    }
}
