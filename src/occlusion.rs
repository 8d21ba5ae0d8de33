//! Visibility (occlusion) query tracking.
//!
//! One query per scene node, keyed by node id. Queries age by one every
//! frame they go without being run; a query that has not run for a long
//! stretch is assumed abandoned by the scene and reclaimed automatically.

use std::sync::Arc;

use crate::backend::{BufferSource, CommandSubmitter, QueryHandle, ResourceFactory};
use crate::error::DriverError;
use crate::resources::MeshBuffer;

/// Frames a query may go unrun before it is reclaimed.
pub const STALE_QUERY_FRAMES: u32 = 1000;

/// Identifier of a scene node, opaque to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneNodeId(pub u64);

/// The minimal view of a scene node needed for visibility testing.
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Stable node id.
    pub id: SceneNodeId,
    /// Proxy geometry drawn during the query, usually a bounding shape.
    pub geometry: Option<Arc<MeshBuffer>>,
}

#[derive(Debug)]
struct VisibilityQuery {
    node: SceneNodeId,
    geometry: Arc<MeshBuffer>,
    handle: QueryHandle,
    last_result: u32,
    age: u32,
}

/// Tracks one visibility query per scene node.
pub struct VisibilityQueryTracker {
    factory: Arc<dyn ResourceFactory>,
    submitter: Arc<dyn CommandSubmitter>,
    queries: Vec<VisibilityQuery>,
}

impl VisibilityQueryTracker {
    /// Create an empty tracker.
    pub fn new(factory: Arc<dyn ResourceFactory>, submitter: Arc<dyn CommandSubmitter>) -> Self {
        Self {
            factory,
            submitter,
            queries: Vec::new(),
        }
    }

    fn position(&self, node: SceneNodeId) -> Option<usize> {
        self.queries.iter().position(|query| query.node == node)
    }

    /// Register a node for visibility testing. A node without proxy geometry
    /// is ignored. Re-registering swaps the proxy geometry in place and
    /// keeps the existing query.
    pub fn track(&mut self, node: &SceneNode) -> Result<(), DriverError> {
        let Some(geometry) = node.geometry.clone() else {
            log::debug!("node {:?} has no proxy geometry, not tracking", node.id);
            return Ok(());
        };
        if let Some(index) = self.position(node.id) {
            self.queries[index].geometry = geometry;
            return Ok(());
        }
        let handle = self.factory.create_query()?;
        self.queries.push(VisibilityQuery {
            node: node.id,
            geometry,
            handle,
            // Unknown results count as visible until proven otherwise.
            last_result: u32::MAX,
            age: 0,
        });
        Ok(())
    }

    /// Stop tracking a node. Safe to call for untracked nodes.
    pub fn untrack(&mut self, node: SceneNodeId) {
        if let Some(index) = self.position(node) {
            let query = self.queries.remove(index);
            self.factory.destroy_query(query.handle);
        }
    }

    /// Stop tracking everything.
    pub fn untrack_all(&mut self) {
        for query in self.queries.drain(..) {
            self.factory.destroy_query(query.handle);
        }
    }

    /// Run the query for one node by drawing its proxy geometry.
    /// `visible_hint` decides whether the proxy actually writes to the
    /// framebuffer.
    pub fn run_query(&mut self, node: SceneNodeId, visible_hint: bool) {
        let Some(index) = self.position(node) else {
            return;
        };
        let query = &mut self.queries[index];
        query.age = 0;
        let vertices = query.geometry.vertices();
        let indices = query.geometry.indices();
        self.submitter.begin_query(query.handle, visible_hint);
        self.submitter.draw(
            BufferSource::Raw(&vertices),
            query.geometry.vertex_count(),
            BufferSource::Raw(&indices),
            query.geometry.index_count() / 3,
        );
        self.submitter.end_query(query.handle);
    }

    /// Run every tracked query.
    pub fn run_all(&mut self, visible_hint: bool) {
        let nodes: Vec<SceneNodeId> = self.queries.iter().map(|query| query.node).collect();
        for node in nodes {
            self.run_query(node, visible_hint);
        }
    }

    /// Latest known pixel count for a node, `None` when the node is not
    /// tracked. Without a finished result the conservative `u32::MAX` is
    /// returned.
    pub fn poll_result(&mut self, node: SceneNodeId, blocking: bool) -> Option<u32> {
        let index = self.position(node)?;
        let query = &mut self.queries[index];
        if let Some(result) = self.submitter.query_result(query.handle, blocking) {
            query.last_result = result;
        }
        Some(query.last_result)
    }

    /// Per-frame maintenance: collect finished results, age every query and
    /// reclaim the ones that have gone unrun past the stale threshold.
    pub fn update_all(&mut self, blocking: bool) {
        let mut stale = Vec::new();
        for query in &mut self.queries {
            if let Some(result) = self.submitter.query_result(query.handle, blocking) {
                query.last_result = result;
            }
            query.age += 1;
            if query.age > STALE_QUERY_FRAMES {
                stale.push(query.node);
            }
        }
        for node in stale {
            log::debug!("reclaiming stale visibility query for node {node:?}");
            self.untrack(node);
        }
    }

    /// Whether a node is currently tracked.
    pub fn tracked(&self, node: SceneNodeId) -> bool {
        self.position(node).is_some()
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether no nodes are tracked.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl std::fmt::Debug for VisibilityQueryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityQueryTracker")
            .field("queries", &self.queries.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(VisibilityQueryTracker: Send, Sync);
