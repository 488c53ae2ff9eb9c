//! Cluster-shared session directory: `username → {session_id}`.
//!
//! The sole source of truth for "who is online where". Every process
//! records its sessions here and resolves recipients through it.
//! Eventually consistent — a reader may briefly see a session a crashed
//! peer never cleaned up; delivery to an unknown local session is a no-op,
//! so stale entries are harmless.

use std::sync::Arc;

use super::substrate::{Substrate, SubstrateError};

pub struct SessionDirectory {
    substrate: Arc<dyn Substrate>,
}

impl SessionDirectory {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        SessionDirectory { substrate }
    }

    /// Record a session for a user; creates the set if absent.
    pub async fn add(&self, user: &str, session_id: &str) -> Result<(), SubstrateError> {
        self.substrate.set_add(user, session_id).await
    }

    /// Remove a session for a user.
    pub async fn remove(&self, user: &str, session_id: &str) -> Result<(), SubstrateError> {
        self.substrate.set_remove(user, session_id).await
    }

    /// All session ids currently recorded for a user, anywhere in the
    /// fleet. Empty for an unknown user.
    pub async fn members(&self, user: &str) -> Result<Vec<String>, SubstrateError> {
        self.substrate.set_members(user).await
    }

    /// True iff the user has at least one recorded session. A lookup
    /// failure reads as offline.
    pub async fn is_online(&self, user: &str) -> bool {
        self.members(user).await.map(|m| !m.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::substrate::MemorySubstrate;

    #[tokio::test]
    async fn add_then_members() {
        let directory = SessionDirectory::new(MemorySubstrate::shared());
        directory.add("john", "s1").await.unwrap();
        directory.add("john", "s2").await.unwrap();

        let mut members = directory.members("john").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn unknown_user_has_no_members() {
        let directory = SessionDirectory::new(MemorySubstrate::shared());
        assert!(directory.members("ghost").await.unwrap().is_empty());
        assert!(!directory.is_online("ghost").await);
    }

    #[tokio::test]
    async fn online_until_last_session_removed() {
        let directory = SessionDirectory::new(MemorySubstrate::shared());
        directory.add("john", "s1").await.unwrap();
        directory.add("john", "s2").await.unwrap();

        directory.remove("john", "s1").await.unwrap();
        assert!(directory.is_online("john").await);

        directory.remove("john", "s2").await.unwrap();
        assert!(!directory.is_online("john").await);
    }

    #[tokio::test]
    async fn directory_is_shared_across_engines() {
        let substrate = MemorySubstrate::shared();
        let p1 = SessionDirectory::new(substrate.clone());
        let p2 = SessionDirectory::new(substrate);

        p1.add("john", "s1").await.unwrap();
        assert!(p2.is_online("john").await);
        assert_eq!(p2.members("john").await.unwrap(), vec!["s1"]);
    }
}
