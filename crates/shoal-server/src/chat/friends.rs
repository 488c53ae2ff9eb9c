//! Read-only friend-list lookup.
//!
//! The relay only ever asks one question: "who are this user's friends?"
//! Keeping that behind a capability lets tests substitute a custom graph
//! and lets production back it with a real store.

use std::collections::HashMap;

pub trait FriendResolver: Send + Sync {
    /// The user's friend usernames. The list never includes the user.
    fn friends_of(&self, user: &str) -> Vec<String>;
}

/// Static in-memory graph.
pub struct StaticFriends {
    graph: HashMap<String, Vec<String>>,
}

impl StaticFriends {
    /// The demo graph: john ↔ alice, john ↔ bob.
    pub fn demo() -> Self {
        Self::from_pairs(&[("john", "alice"), ("john", "bob")])
    }

    /// Build a symmetric graph from friendship pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        for (a, b) in pairs {
            graph.entry((*a).to_owned()).or_default().push((*b).to_owned());
            graph.entry((*b).to_owned()).or_default().push((*a).to_owned());
        }
        StaticFriends { graph }
    }
}

impl FriendResolver for StaticFriends {
    fn friends_of(&self, user: &str) -> Vec<String> {
        self.graph.get(user).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_graph_is_symmetric() {
        let friends = StaticFriends::demo();
        assert_eq!(friends.friends_of("john"), vec!["alice", "bob"]);
        assert_eq!(friends.friends_of("alice"), vec!["john"]);
        assert_eq!(friends.friends_of("bob"), vec!["john"]);
    }

    #[test]
    fn stranger_has_no_friends() {
        let friends = StaticFriends::demo();
        assert!(friends.friends_of("mallory").is_empty());
    }

    #[test]
    fn friend_lists_never_include_self() {
        let friends = StaticFriends::from_pairs(&[("a", "b"), ("b", "c")]);
        for user in ["a", "b", "c"] {
            assert!(!friends.friends_of(user).contains(&user.to_owned()));
        }
    }
}
