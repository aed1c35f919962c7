use serde::{Deserialize, Serialize};

/// Version of an event stream: the count of events stored for it.
///
/// Version 0 means the stream does not exist yet; the first event brings the
/// stream to version 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamVersion(i64);

impl StreamVersion {
    /// The version of a stream that does not exist yet.
    pub const BEGINNING: StreamVersion = StreamVersion(0);

    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StreamVersion {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Position in the global event log: the total order across all streams.
///
/// Position 0 means "before anything"; the first event ever stored has
/// position 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalPosition(i64);

impl GlobalPosition {
    /// The position before any event.
    pub const BEGINNING: GlobalPosition = GlobalPosition(0);

    /// Creates a position from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the next position.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw position value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GlobalPosition {
    fn from(value: i64) -> Self {
        Self(value)
    }
}
