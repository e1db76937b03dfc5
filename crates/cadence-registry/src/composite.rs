//! Multi-feed asset composition rules.
//!
//! A composite feed prices a basket of other registered feeds. The member
//! graph must stay acyclic; an active composite may only reference active
//! members.

use std::collections::HashSet;

use cadence_types::FeedId;

use crate::registry::AssetRegistry;
use crate::{RegistryError, Result};

/// Check that `members` may become the composite list of `feed`.
///
/// # Errors
///
/// - [`RegistryError::NotFound`] if `feed` is not registered
/// - [`RegistryError::EmptyComposite`] for an empty list
/// - [`RegistryError::SelfReference`] if `feed` lists itself
/// - [`RegistryError::DuplicateMember`] if a member is listed twice
/// - [`RegistryError::MemberNotRegistered`] for an unknown member
/// - [`RegistryError::MemberInactive`] if `feed` is active and a member is not
/// - [`RegistryError::CompositeCycle`] if a member already reaches `feed`
pub fn validate(registry: &AssetRegistry, feed: FeedId, members: &[FeedId]) -> Result<()> {
    let owner = registry.get(feed).ok_or(RegistryError::NotFound(feed))?;
    if members.is_empty() {
        return Err(RegistryError::EmptyComposite(feed));
    }

    let mut seen = HashSet::with_capacity(members.len());
    for &member in members {
        if member == feed {
            return Err(RegistryError::SelfReference(feed));
        }
        if !seen.insert(member) {
            return Err(RegistryError::DuplicateMember { feed, member });
        }
        let entry = registry
            .get(member)
            .ok_or(RegistryError::MemberNotRegistered { feed, member })?;
        if owner.active && !entry.active {
            return Err(RegistryError::MemberInactive { feed, member });
        }
        if reaches(registry, member, feed) {
            return Err(RegistryError::CompositeCycle { feed, via: member });
        }
    }
    Ok(())
}

/// Whether following composite references from `from` leads to `target`.
pub fn reaches(registry: &AssetRegistry, from: FeedId, target: FeedId) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(entry) = registry.get(current) {
            stack.extend(entry.composite.iter().copied());
        }
    }
    false
}

/// The first active composite (in registration order) listing `member`.
pub fn active_composite_containing(registry: &AssetRegistry, member: FeedId) -> Option<FeedId> {
    registry
        .entries()
        .iter()
        .find(|e| e.active && e.feed != member && e.composite.contains(&member))
        .map(|e| e.feed)
}

/// Every composite (active or not) listing `member`.
pub fn composites_containing(registry: &AssetRegistry, member: FeedId) -> Vec<FeedId> {
    registry
        .entries()
        .iter()
        .filter(|e| e.composite.contains(&member))
        .map(|e| e.feed)
        .collect()
}
