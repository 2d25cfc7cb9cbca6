//! Observable lifecycle events
//!
//! Events are explicit and typed. Each maps to a fixed name and a fixed
//! log level.

use std::fmt;

/// Observable events in strata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Catalog
    /// Dataset enumerated and headers read
    DatasetOpened,
    /// Column statistics computed for one partition
    StatsComputed,

    // Execution
    /// Query execution begins
    QueryStarted,
    /// Query execution finished successfully
    QueryCompleted,
    /// Query observed a cancellation request
    QueryCancelled,
    /// Corrupt partition skipped under the skip policy
    PartitionSkipped,
    /// Partition skipped because its statistics exclude the filter
    PartitionPruned,

    // Bridge
    /// Plan (or part of it) handed to the secondary engine
    BridgeDelegated,

    // Materialization
    /// In-memory result cut at its row limit
    ResultTruncated,
    /// Durable intermediate written
    DurableWritten,
}

/// Log level of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::DatasetOpened => "DATASET_OPENED",
            Event::StatsComputed => "STATS_COMPUTED",
            Event::QueryStarted => "QUERY_STARTED",
            Event::QueryCompleted => "QUERY_COMPLETED",
            Event::QueryCancelled => "QUERY_CANCELLED",
            Event::PartitionSkipped => "PARTITION_SKIPPED",
            Event::PartitionPruned => "PARTITION_PRUNED",
            Event::BridgeDelegated => "BRIDGE_DELEGATED",
            Event::ResultTruncated => "RESULT_TRUNCATED",
            Event::DurableWritten => "DURABLE_WRITTEN",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            Event::PartitionSkipped | Event::QueryCancelled => EventLevel::Warn,
            Event::StatsComputed | Event::PartitionPruned => EventLevel::Debug,
            Event::DatasetOpened
            | Event::QueryStarted
            | Event::QueryCompleted
            | Event::BridgeDelegated
            | Event::ResultTruncated
            | Event::DurableWritten => EventLevel::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_are_warnings() {
        assert_eq!(Event::PartitionSkipped.level(), EventLevel::Warn);
        assert_eq!(Event::QueryCompleted.level(), EventLevel::Info);
        assert_eq!(Event::PartitionPruned.to_string(), "PARTITION_PRUNED");
    }
}
