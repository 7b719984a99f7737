//! Debug-only allocation registry (spec.md §3.4/§4.5): a parent→children
//! tree of live allocations keyed by user pointer, used for visualization
//! and for reparenting children across a `reallocate` move.
//!
//! Grounded on `allocator/manager.rs`'s id/entry bookkeeping, simplified to
//! a single-owner `hashbrown` map since spec.md §5 rules out concurrent
//! access to one allocator instance.

use hashbrown::{HashMap, HashSet};

use crate::tlsf::Pointer;

/// A type id the caller assigns to describe what schema owns an
/// allocation. Opaque to the registry itself.
pub type OwnerTypeId = u32;

/// One live allocation's place in the ownership tree.
#[derive(Debug, Clone)]
pub struct AllocationNode {
    pub ptr: Pointer,
    pub owner_type_id: OwnerTypeId,
    pub parent_ptr: Option<Pointer>,
    pub children: HashSet<Pointer>,
}

/// Parent→children tree of every live allocation, keyed by user pointer.
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    nodes: HashMap<Pointer, AllocationNode>,
    roots: HashSet<Pointer>,
}

impl AllocationRegistry {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), roots: HashSet::new() }
    }

    /// Registers `ptr` under `parent` (or as a root). If `ptr` already has a
    /// node, it is unregistered first — its children are transparently
    /// reparented — supporting "steal" semantics when a view re-owns memory.
    pub fn register(&mut self, ptr: Pointer, owner_type_id: OwnerTypeId, parent: Option<Pointer>) {
        if self.nodes.contains_key(&ptr) {
            self.unregister(ptr);
        }
        if let Some(parent_ptr) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_ptr) {
                parent_node.children.insert(ptr);
            }
        } else {
            self.roots.insert(ptr);
        }
        self.nodes.insert(
            ptr,
            AllocationNode { ptr, owner_type_id, parent_ptr: parent, children: HashSet::new() },
        );
    }

    /// Removes `ptr`'s node. Every child is reparented to `ptr`'s own
    /// parent (or promoted to a root if `ptr` was a root).
    pub fn unregister(&mut self, ptr: Pointer) {
        let Some(node) = self.nodes.remove(&ptr) else { return };
        match node.parent_ptr {
            Some(parent_ptr) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent_ptr) {
                    parent_node.children.remove(&ptr);
                }
            }
            None => {
                self.roots.remove(&ptr);
            }
        }
        for child in node.children {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.parent_ptr = node.parent_ptr;
            }
            match node.parent_ptr {
                Some(parent_ptr) => {
                    if let Some(parent_node) = self.nodes.get_mut(&parent_ptr) {
                        parent_node.children.insert(child);
                    }
                }
                None => {
                    self.roots.insert(child);
                }
            }
        }
    }

    pub fn get_node(&self, ptr: Pointer) -> Option<&AllocationNode> {
        self.nodes.get(&ptr)
    }

    /// Every node with no parent.
    pub fn get_root_pointers(&self) -> Vec<Pointer> {
        self.roots.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        #[cfg(feature = "logging")]
        tracing::debug!(live_nodes = self.nodes.len(), "registry: cleared");
        self.nodes.clear();
        self.roots.clear();
    }

    /// Moves `old_ptr`'s children to `new_ptr` (which must already have a
    /// node), rewriting each child's `parent_ptr`. Used by `reallocate`'s
    /// move path, before the old pointer is freed.
    pub(crate) fn reparent_children(&mut self, old_ptr: Pointer, new_ptr: Pointer) {
        let Some(old_node) = self.nodes.get_mut(&old_ptr) else { return };
        let moved: Vec<Pointer> = old_node.children.drain().collect();
        for child in &moved {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent_ptr = Some(new_ptr);
            }
        }
        if let Some(new_node) = self.nodes.get_mut(&new_ptr) {
            new_node.children.extend(moved);
        }
    }
}
