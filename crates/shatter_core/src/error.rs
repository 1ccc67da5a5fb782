//! # Fracture Error Types
//!
//! Errors surfaced to the application. Invalid chunk references inside the
//! propagation algorithm are expected and never reach this type; they are
//! skipped where they occur.

use thiserror::Error;

use crate::actor::ActorId;
use crate::manager::StructureId;

/// Errors that can occur in the fracture engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FractureError {
    /// The actor already belongs to a structure.
    #[error("actor {0:?} is already registered")]
    ActorAlreadyRegistered(ActorId),

    /// Actors may only be registered before any debris exists.
    #[error("registration is locked: {dynamic_chunks} dynamic chunks, {pending_removals} pending structure removals")]
    RegistrationLocked {
        /// Chunks currently tracked by the global FIFO.
        dynamic_chunks: usize,
        /// Structures waiting on the kill list.
        pending_removals: usize,
    },

    /// A structure was requested for an empty actor list.
    #[error("cannot build a structure without actors")]
    EmptyStructure,

    /// Structure id not known to the manager.
    #[error("unknown structure: {0:?}")]
    UnknownStructure(StructureId),

    /// Actor id not known to the manager.
    #[error("unknown actor: {0:?}")]
    UnknownActor(ActorId),

    /// Chunk index past the end of a structure's chunk array.
    #[error("chunk {index} out of range (structure has {len} chunks)")]
    ChunkOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of chunks.
        len: usize,
    },

    /// Fragment asset with a malformed chunk tree.
    #[error("invalid fragment asset: {0}")]
    InvalidAsset(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The support-route bookkeeping no longer matches the overlap graph.
    #[error("route invariant broken at chunk {chunk}: {reason}")]
    RouteInvariant {
        /// First chunk found in violation.
        chunk: usize,
        /// What was inconsistent.
        reason: String,
    },
}

/// Result type for fracture operations.
pub type FractureResult<T> = Result<T, FractureError>;
