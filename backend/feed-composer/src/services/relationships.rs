use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{FeedError, FeedResult};
use crate::models::{Relationship, RelationshipStatus};
use crate::repository::ContentRepository;

/// Friends and following of one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialGraph {
    /// Accepted edges in either direction, collapsed to the other endpoint
    pub friends: BTreeSet<String>,
    /// One-way edges initiated by the user
    pub following: BTreeSet<String>,
}

impl SocialGraph {
    /// Derive the graph for `username` from the edges touching it
    pub fn derive(username: &str, edges: &[Relationship]) -> Self {
        let mut graph = SocialGraph::default();

        for edge in edges {
            match edge.status {
                RelationshipStatus::Accepted => {
                    let other = if edge.initiator == username {
                        &edge.target
                    } else if edge.target == username {
                        &edge.initiator
                    } else {
                        continue;
                    };
                    if other != username {
                        graph.friends.insert(other.clone());
                    }
                }
                RelationshipStatus::OneWay if edge.initiator == username => {
                    if edge.target != username {
                        graph.following.insert(edge.target.clone());
                    }
                }
                _ => {}
            }
        }

        graph
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty() && self.following.is_empty()
    }
}

/// Resolves friends/following for a user.
///
/// Failures are fatal for the request: an empty graph would silently turn the
/// personalized slots into discovery.
#[derive(Clone)]
pub struct RelationshipResolver {
    repo: Arc<dyn ContentRepository>,
}

impl RelationshipResolver {
    pub fn new(repo: Arc<dyn ContentRepository>) -> Self {
        Self { repo }
    }

    pub async fn resolve(&self, username: &str) -> FeedResult<SocialGraph> {
        let edges = self.repo.fetch_relationships(username).await.map_err(|e| {
            error!(user_id = %username, error = %e, "relationship resolution failed");
            FeedError::UpstreamUnavailable(format!("relationships: {}", e))
        })?;

        let graph = SocialGraph::derive(username, &edges);
        debug!(
            user_id = %username,
            edges = edges.len(),
            friends = graph.friends.len(),
            following = graph.following.len(),
            "Resolved social graph"
        );
        Ok(graph)
    }
}
