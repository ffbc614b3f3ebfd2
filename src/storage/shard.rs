use super::types::{Placement, ServerNode};

use dashmap::DashMap;
use tokio::sync::RwLock;

/// Decides which node owns each file that is not stored locally.
///
/// New PUTs are spread round-robin over the registered nodes in registration
/// order, with "self" taking the slot after the last node. A name keeps its
/// owner for the lifetime of the registry; nothing is ever rebalanced.
pub struct ShardRegistry {
    owners: DashMap<String, ServerNode>,
    rotation: RwLock<Rotation>,
}

#[derive(Default)]
struct Rotation {
    nodes: Vec<ServerNode>,
    /// Always in `0..=nodes.len()`; `nodes.len()` means "self".
    cursor: usize,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
            rotation: RwLock::new(Rotation::default()),
        }
    }

    /// Adds a node to the rotation and pins the files it already holds to it.
    ///
    /// A node that registers again keeps its original slot; only its file list is merged.
    pub async fn register_node<I>(&self, node: ServerNode, owned_files: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut rotation = self.rotation.write().await;

        let mut pinned = 0;
        for name in owned_files {
            self.owners.insert(name, node.clone());
            pinned += 1;
        }

        if rotation.nodes.contains(&node) {
            tracing::info!("Node {} re-registered with {} file(s)", node, pinned);
        } else {
            rotation.nodes.push(node.clone());
            tracing::info!(
                "Registered node {} with {} file(s); {} node(s) in rotation",
                node,
                pinned,
                rotation.nodes.len()
            );
        }
    }

    /// Takes the next slot in the rotation for a new file.
    ///
    /// Advances the cursor on every call once at least one node is registered,
    /// and pins `name` to the chosen node on the redirect branch.
    pub async fn assign_owner_for_put(&self, name: &str) -> Placement {
        let mut rotation = self.rotation.write().await;
        let slots = rotation.nodes.len() + 1;
        if slots == 1 {
            return Placement::Local;
        }

        let slot = rotation.cursor;
        rotation.cursor = (slot + 1) % slots;

        if slot == rotation.nodes.len() {
            tracing::debug!("Assigned {} to self (slot {})", name, slot);
            return Placement::Local;
        }

        let node = rotation.nodes[slot].clone();
        self.owners.insert(name.to_string(), node.clone());
        tracing::debug!("Assigned {} to {} (slot {})", name, node, slot);
        Placement::Redirect(node)
    }

    /// Full PUT routing: local files stay local, pinned names keep their owner,
    /// and only genuinely new names consume a rotation slot.
    pub async fn route_put(&self, name: &str, stored_locally: bool) -> Placement {
        if stored_locally {
            return Placement::Local;
        }
        if let Some(node) = self.owner_of(name) {
            return Placement::Redirect(node);
        }
        self.assign_owner_for_put(name).await
    }

    pub fn owner_of(&self, name: &str) -> Option<ServerNode> {
        self.owners.get(name).map(|entry| entry.value().clone())
    }

    /// Every name pinned to a remote node, sorted.
    pub fn owned_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.owners.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn nodes(&self) -> Vec<ServerNode> {
        self.rotation.read().await.nodes.clone()
    }

    pub async fn cursor(&self) -> usize {
        self.rotation.read().await.cursor
    }
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}
