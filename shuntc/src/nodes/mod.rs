//!
//! Injection Node Registry
//!
//! Tracks, per instruction, which redirect engine currently holds the right
//! to rewrite it. A node is created lazily the first time an engine claims
//! its instruction and keeps following that instruction when a rewrite
//! swaps it for the handler call.
//!
//! Node status is an explicit state machine:
//!
//!   Unclaimed -> Claimed(claim) -> Replaced(claim)
//!
//! `Claimed` may be overwritten wholesale by a later claim. `Replaced` is
//! terminal: no further claim or replacement is accepted.
//!

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::insn::InsnId;
use crate::redirect::EngineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// The ownership record an engine writes into a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub owner: EngineId,
    pub priority: i32,
    pub is_final: bool,
    pub name: String,
    pub handler_desc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Unclaimed,
    Claimed(Claim),
    Replaced(Claim),
}

#[derive(Debug, Clone)]
pub struct InjectionNode {
    pub id: NodeId,
    pub original: InsnId,
    pub current: InsnId,
    pub state: NodeState,
}

impl InjectionNode {
    pub fn claim(&self) -> Option<&Claim> {
        match &self.state {
            NodeState::Unclaimed => None,
            NodeState::Claimed(claim) | NodeState::Replaced(claim) => Some(claim),
        }
    }

    pub fn owner(&self) -> Option<EngineId> {
        self.claim().map(|c| c.owner)
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self.state, NodeState::Replaced(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("unknown injection node {0}")]
    UnknownNode(NodeId),

    #[error("injection node {0} was already replaced")]
    AlreadyReplaced(NodeId),

    #[error("injection node {node} is not owned by engine {engine}")]
    NotOwner { node: NodeId, engine: EngineId },
}

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<InjectionNode>,
    by_insn: HashMap<InsnId, NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds the node for `insn`, by original or current instruction.
    pub fn get(&self, insn: InsnId) -> Option<NodeId> {
        self.by_insn.get(&insn).copied()
    }

    pub fn get_or_create(&mut self, insn: InsnId) -> NodeId {
        if let Some(id) = self.get(insn) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(InjectionNode {
            id,
            original: insn,
            current: insn,
            state: NodeState::Unclaimed,
        });
        self.by_insn.insert(insn, id);
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&InjectionNode, NodeError> {
        self.nodes.get(id.0 as usize).ok_or(NodeError::UnknownNode(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InjectionNode> {
        self.nodes.iter()
    }

    /// Writes `claim` over whatever claim the node held.
    pub fn claim(&mut self, id: NodeId, claim: Claim) -> Result<(), NodeError> {
        let node = self.node_mut(id)?;
        if node.is_replaced() {
            return Err(NodeError::AlreadyReplaced(id));
        }
        node.state = NodeState::Claimed(claim);
        Ok(())
    }

    /// The write-once transition taken after `owner` rewrote the node's
    /// instruction; `current` is the instruction that now stands in for it.
    pub fn mark_replaced(
        &mut self,
        id: NodeId,
        owner: EngineId,
        current: InsnId,
    ) -> Result<(), NodeError> {
        let node = self.node_mut(id)?;
        let claim = match &node.state {
            NodeState::Replaced(_) => return Err(NodeError::AlreadyReplaced(id)),
            NodeState::Claimed(claim) if claim.owner == owner => claim.clone(),
            _ => return Err(NodeError::NotOwner { node: id, engine: owner }),
        };
        node.state = NodeState::Replaced(claim);
        node.current = current;
        self.by_insn.insert(current, id);
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut InjectionNode, NodeError> {
        self.nodes.get_mut(id.0 as usize).ok_or(NodeError::UnknownNode(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(owner: u32, priority: i32, is_final: bool) -> Claim {
        Claim {
            owner: EngineId(owner),
            priority,
            is_final,
            name: format!("engine{}", owner),
            handler_desc: "()V".to_string(),
        }
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut registry = NodeRegistry::new();
        let a = registry.get_or_create(InsnId(4));
        registry.claim(a, claim(1, 10, false)).unwrap();

        let again = registry.get_or_create(InsnId(4));
        assert_eq!(a, again);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.node(a).unwrap().claim(), Some(&claim(1, 10, false)));

        let b = registry.get_or_create(InsnId(5));
        assert_ne!(a, b);
        assert_eq!(registry.node(b).unwrap().state, NodeState::Unclaimed);
    }

    #[test]
    fn test_claim_overwrites_wholesale() {
        let mut registry = NodeRegistry::new();
        let id = registry.get_or_create(InsnId(0));
        registry.claim(id, claim(1, 5, true)).unwrap();
        registry.claim(id, claim(2, 7, false)).unwrap();
        assert_eq!(registry.node(id).unwrap().claim(), Some(&claim(2, 7, false)));
    }

    #[test]
    fn test_replaced_is_terminal() {
        let mut registry = NodeRegistry::new();
        let id = registry.get_or_create(InsnId(0));
        registry.claim(id, claim(1, 5, false)).unwrap();
        registry.mark_replaced(id, EngineId(1), InsnId(9)).unwrap();

        let node = registry.node(id).unwrap();
        assert!(node.is_replaced());
        assert_eq!(node.original, InsnId(0));
        assert_eq!(node.current, InsnId(9));
        assert_eq!(registry.get(InsnId(9)), Some(id));

        assert_eq!(
            registry.claim(id, claim(2, 50, false)),
            Err(NodeError::AlreadyReplaced(id))
        );
        assert_eq!(
            registry.mark_replaced(id, EngineId(1), InsnId(10)),
            Err(NodeError::AlreadyReplaced(id))
        );
    }

    #[test]
    fn test_only_owner_may_replace() {
        let mut registry = NodeRegistry::new();
        let id = registry.get_or_create(InsnId(0));
        assert!(matches!(
            registry.mark_replaced(id, EngineId(1), InsnId(3)),
            Err(NodeError::NotOwner { .. })
        ));
        registry.claim(id, claim(1, 5, false)).unwrap();
        assert!(matches!(
            registry.mark_replaced(id, EngineId(2), InsnId(3)),
            Err(NodeError::NotOwner { .. })
        ));
    }
}
