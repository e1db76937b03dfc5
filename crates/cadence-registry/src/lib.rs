//! # cadence-registry
//!
//! Feed membership for the epoch orchestrator.
//!
//! The registry is pure bookkeeping: it never calls a feed. The orchestrator
//! validates a mutation here, performs the feed-side calls, and only then
//! commits the mutation, so a collaborator fault leaves the registry as it
//! was.
//!
//! ## Modules
//!
//! - [`registry`]: Registration order, activation and replacement
//! - [`composite`]: Multi-feed asset composition rules
//!
//! ## Invariants
//!
//! | Rule | Error |
//! |---|---|
//! | a feed is registered at most once | [`RegistryError::AlreadyRegistered`] |
//! | governance parameters exist before the first add | [`RegistryError::GovernanceNotInitialized`] |
//! | members of an active composite stay registered and active | [`RegistryError::MemberOfActiveComposite`] |
//! | an active composite only references active feeds | [`RegistryError::MemberInactive`] |
//! | composite references are acyclic | [`RegistryError::CompositeCycle`] |
//! | a composite keeps at least one member | [`RegistryError::LastCompositeMember`] |

pub mod composite;
pub mod registry;

pub use registry::{AssetRegistry, FeedEntry};

use cadence_types::FeedId;

/// Error types for registry mutations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Governance parameters were never set, so a new feed cannot be configured.
    #[error("governance parameters not initialized")]
    GovernanceNotInitialized,

    /// The feed is already registered.
    #[error("feed {0} already registered")]
    AlreadyRegistered(FeedId),

    /// The feed is not registered.
    #[error("feed {0} not found")]
    NotFound(FeedId),

    /// A replacement feed reports a different symbol than the feed it replaces.
    #[error("symbol mismatch: expected {expected}, got {actual}")]
    SymbolMismatch { expected: String, actual: String },

    /// A composite lists itself as a member.
    #[error("feed {0} cannot be a member of its own composite")]
    SelfReference(FeedId),

    /// A composite was set with no members.
    #[error("composite for feed {0} must not be empty")]
    EmptyComposite(FeedId),

    /// A composite lists the same member twice.
    #[error("composite for feed {feed} lists member {member} twice")]
    DuplicateMember { feed: FeedId, member: FeedId },

    /// A composite references a feed that is not registered.
    #[error("composite member {member} of feed {feed} is not registered")]
    MemberNotRegistered { feed: FeedId, member: FeedId },

    /// An active composite references an inactive feed.
    #[error("composite member {member} of feed {feed} is not active")]
    MemberInactive { feed: FeedId, member: FeedId },

    /// Setting the composite would close a reference cycle.
    #[error("composite for feed {feed} forms a cycle through {via}")]
    CompositeCycle {
        /// The feed whose composite was being set.
        feed: FeedId,
        /// The member whose references lead back to `feed`.
        via: FeedId,
    },

    /// The feed is referenced by an active composite and cannot leave it.
    #[error("feed {feed} is a member of active composite {composite}")]
    MemberOfActiveComposite { feed: FeedId, composite: FeedId },

    /// Removing the feed would leave a composite without members.
    #[error("feed {feed} is the last member of composite {composite}")]
    LastCompositeMember { feed: FeedId, composite: FeedId },

    /// The same feed appears twice in one bulk request.
    #[error("feed {0} appears more than once in the batch")]
    DuplicateInBatch(FeedId),
}

/// Convenience result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
