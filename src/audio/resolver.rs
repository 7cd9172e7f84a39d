use async_trait::async_trait;
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::{
        supervisor::NodePool,
        track::{search_identifier, LoadResult, TrackResolver},
    },
    error::{NodeError, ResolveError},
};

/// Resuelve búsquedas contra cualquier nodo conectado
pub struct NodeResolver {
    pool: Arc<NodePool>,
}

impl NodeResolver {
    pub fn new(pool: Arc<NodePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackResolver for NodeResolver {
    async fn resolve(
        &self,
        query: &str,
        requester: Option<UserId>,
    ) -> Result<LoadResult, ResolveError> {
        let node = self.pool.pick()?;
        let identifier = search_identifier(query);
        debug!("🔍 Cargando '{}' en nodo {}", identifier, node.name());

        let mut result = match node.load_tracks(&identifier).await {
            Ok(result) => result,
            Err(NodeError::LoadFailed(message)) => {
                warn!("❌ Carga fallida para '{}': {}", query, message);
                return Err(ResolveError::LoadFailed(message));
            }
            Err(e) => return Err(e.into()),
        };

        for track in &mut result.tracks {
            track.requester = requester;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::supervisor::NodeSupervisor,
        testing::{track, FakeNode, NodeCall},
    };
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn pool(node: Arc<FakeNode>, connected: bool) -> Arc<NodePool> {
        let (events, _) = broadcast::channel(8);
        let supervisor = NodeSupervisor::new(node, Duration::from_secs(1), events);
        if connected {
            supervisor.mark_connected();
        }
        Arc::new(NodePool::new(vec![supervisor]))
    }

    #[tokio::test]
    async fn test_resolve_searches_and_tags_requester() {
        let node = FakeNode::new("main");
        node.set_library(vec![track("a", 1_000), track("b", 1_000)]);
        let resolver = NodeResolver::new(pool(node.clone(), true));

        let result = resolver.resolve("algo", Some(UserId::new(3))).await.unwrap();

        assert_eq!(result.tracks.len(), 2);
        assert!(result
            .tracks
            .iter()
            .all(|t| t.requester == Some(UserId::new(3))));
        assert_eq!(node.calls(), vec![NodeCall::Load("ytsearch:algo".into())]);
    }

    #[tokio::test]
    async fn test_resolve_without_nodes_fails() {
        let resolver = NodeResolver::new(pool(FakeNode::new("main"), false));
        assert!(matches!(
            resolver.resolve("algo", None).await,
            Err(ResolveError::Node(NodeError::NoNodeAvailable))
        ));
    }
}
