///
/// Redirect Engine
///
/// One engine per handler routine. An engine redirects call-site and
/// field-access instructions to its handler in two phases:
///
/// - claim: take ownership of an instruction's injection node, arbitrating
///   against any other engine that already holds it
/// - apply: for each node still owned, splice a call to the handler in
///   place of the instruction
///
/// Arbitration rules:
/// - a node held by a final claim cannot be claimed by any other engine;
///   finality is checked before priority, so even a lower-priority
///   contender fails with `FinalityViolation` instead of being skipped
///   (injectors that compare priority first would only warn here)
/// - otherwise a strictly higher priority takes the node over, and a lower
///   or equal priority is skipped with a conflict warning
/// - an engine that lost a node between claim and apply skips it at apply
///   time with a conflict warning
///
/// Strategies:
/// - invoke: call-site redirection (store operands, call handler)
/// - field: getter and setter redirection for static and instance fields
///

mod descriptor;
mod error;
mod field;
mod invoke;

use std::fmt;

use serde::Serialize;

pub use descriptor::{natural_getter_signature, natural_invoke_signature, natural_setter_signature};
pub use error::{HandlerRole, RedirectError, RedirectResult};

use crate::diagnostic::{Conflict, ConflictPhase, DiagnosticSink};
use crate::insn::{Insn, InsnId, InvokeKind, MethodInsn};
use crate::nodes::{Claim, NodeId};
use crate::routine::Routine;
use crate::types::Signature;

pub const DEFAULT_PRIORITY: i32 = 1000;

/// Identity of an engine. Nodes store it to recognise their owner; it
/// carries no ownership of the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EngineId(pub u32);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine{}", self.0)
    }
}

/// The routine calls are redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub owner: String,
    pub name: String,
    pub signature: Signature,
    pub is_static: bool,
    pub is_private: bool,
}

impl Handler {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, signature: Signature) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            signature,
            is_static: false,
            is_private: false,
        }
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// The instruction that calls this handler.
    pub fn call_insn(&self) -> Insn {
        let kind = if self.is_static {
            InvokeKind::Static
        } else if self.is_private {
            InvokeKind::Special
        } else {
            InvokeKind::Virtual
        };
        Insn::Invoke(MethodInsn::new(
            kind,
            self.owner.as_str(),
            self.name.as_str(),
            self.signature.clone(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct RedirectSpec {
    pub name: String,
    pub handler: Handler,
    pub priority: i32,
    pub is_final: bool,
}

impl RedirectSpec {
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            handler,
            priority: DEFAULT_PRIORITY,
            is_final: false,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn final_(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Overrode { previous: String },
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Replaced { call: InsnId },
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RedirectEngine {
    id: EngineId,
    name: String,
    handler: Handler,
    priority: i32,
    is_final: bool,
    owned: Vec<NodeId>,
}

impl RedirectEngine {
    pub fn new(id: EngineId, spec: RedirectSpec) -> Self {
        Self {
            id,
            name: spec.name,
            handler: spec.handler,
            priority: spec.priority,
            is_final: spec.is_final,
            owned: Vec::new(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Nodes this engine has claimed. Some may since have been taken over
    /// by a higher-priority engine.
    pub fn owned_nodes(&self) -> &[NodeId] {
        &self.owned
    }

    fn claim_record(&self) -> Claim {
        Claim {
            owner: self.id,
            priority: self.priority,
            is_final: self.is_final,
            name: self.name.clone(),
            handler_desc: self.handler.signature.to_string(),
        }
    }

    pub fn claim(
        &mut self,
        routine: &mut Routine,
        insn: InsnId,
        sink: &mut dyn DiagnosticSink,
    ) -> RedirectResult<ClaimOutcome> {
        routine.insn(insn)?;
        let node_id = routine.nodes.get_or_create(insn);
        let node = routine.nodes.node(node_id)?;

        let mut outcome = ClaimOutcome::Claimed;
        if let Some(held) = node.claim().filter(|c| c.owner != self.id) {
            if held.is_final {
                return Err(RedirectError::FinalityViolation {
                    engine: self.name.clone(),
                    priority: self.priority,
                    holder: held.name.clone(),
                    holder_priority: held.priority,
                });
            }
            if self.priority <= held.priority {
                sink.conflict(&Conflict {
                    phase: ConflictPhase::Claim,
                    engine: self.name.clone(),
                    priority: self.priority,
                    holder: held.name.clone(),
                    holder_priority: held.priority,
                });
                return Ok(ClaimOutcome::Skipped);
            }
            outcome = ClaimOutcome::Overrode {
                previous: held.name.clone(),
            };
        }

        routine.nodes.claim(node_id, self.claim_record())?;
        if !self.owned.contains(&node_id) {
            self.owned.push(node_id);
        }

        tracing::debug!(
            engine = %self.name,
            priority = self.priority,
            node = %node_id,
            insn = %insn,
            "claimed redirect target"
        );
        Ok(outcome)
    }

    pub fn apply(
        &self,
        routine: &mut Routine,
        node_id: NodeId,
        sink: &mut dyn DiagnosticSink,
    ) -> RedirectResult<ApplyOutcome> {
        let node = routine.nodes.node(node_id)?;

        match node.claim() {
            Some(claim) if claim.owner == self.id => {}
            held => {
                let (holder, holder_priority) = held
                    .map(|c| (c.name.clone(), c.priority))
                    .unwrap_or_else(|| ("<unclaimed>".to_string(), 0));
                sink.conflict(&Conflict {
                    phase: ConflictPhase::Apply,
                    engine: self.name.clone(),
                    priority: self.priority,
                    holder,
                    holder_priority,
                });
                return Ok(ApplyOutcome::Skipped);
            }
        }

        if node.is_replaced() {
            return Err(RedirectError::AlreadyReplaced {
                engine: self.name.clone(),
                node: node_id,
            });
        }

        if !self.handler.is_static && routine.is_static {
            return Err(RedirectError::InstanceHandlerInStaticRoutine {
                engine: self.name.clone(),
                routine: routine.to_string(),
            });
        }

        let target = node.current;
        let call = match routine.insn(target)?.clone() {
            Insn::Invoke(method) => invoke::redirect_invoke(self, routine, target, &method)?,
            Insn::Field(field) => field::redirect_field(self, routine, target, &field)?,
            other => {
                return Err(RedirectError::UnsupportedTarget {
                    engine: self.name.clone(),
                    insn: other.to_string(),
                    routine: routine.to_string(),
                })
            }
        };

        routine.nodes.mark_replaced(node_id, self.id, call)?;

        tracing::debug!(
            engine = %self.name,
            node = %node_id,
            call = %call,
            max_stack = routine.max_stack(),
            max_locals = routine.max_locals(),
            "redirected target"
        );
        Ok(ApplyOutcome::Replaced { call })
    }

    /// Loads the handler receiver (if any) and the values in `slots`, then
    /// calls the handler. Values are typed by the handler's parameters.
    fn invoke_handler_with_args(&self, insns: &mut Vec<Insn>, slots: &[u16]) {
        if !self.handler.is_static {
            insns.push(Insn::this());
        }
        for (ty, &slot) in self.handler.signature.params.iter().zip(slots) {
            insns.extend(Insn::load(ty, slot));
        }
        insns.push(self.handler.call_insn());
    }
}
