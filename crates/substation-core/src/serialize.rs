//! Binary snapshots of a [`PowerState`].
//!
//! Encoded with `bitcode` behind a small versioned header. The height
//! grouping is not stored; a restored state regroups on its first tick.

use serde::{Deserialize, Serialize};

use crate::state::PowerState;

/// Magic number identifying a power state snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x5057_5201;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
        }
    }
}

impl SnapshotHeader {
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    header: SnapshotHeader,
    state: &'a PowerState,
}

#[derive(Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    state: PowerState,
}

impl PowerState {
    /// Serialize the state to a binary blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = SnapshotRef {
            header: SnapshotHeader::default(),
            state: self,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Restore a state from a blob produced by [`serialize`](Self::serialize).
    ///
    /// The header is validated before the state is returned; a mismatch is
    /// an error, never a panic.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: Snapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot.state)
    }
}
