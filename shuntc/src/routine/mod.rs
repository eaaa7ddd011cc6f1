//!
//! Routine Context
//!
//! One compiled routine under transformation: its instruction list, its
//! declared operand-stack and local-slot budgets, the ambient arguments a
//! redirect handler may have forwarded to it, and the injection nodes that
//! track claims on its instructions.
//!
//! All mutation goes through slot allocation, budget extension and atomic
//! instruction replacement. Routines share no state with one another.
//!
//! Both budgets are 16-bit. Any growth past 65535 is a `BudgetOverflow`
//! error rather than a wrap.
//!

use std::fmt;

use thiserror::Error;

use crate::insn::{Insn, InsnId, InsnList};
use crate::nodes::NodeRegistry;
use crate::types::{Signature, ValueType};

/// A routine argument that a handler may receive by appending it to its
/// natural parameters. The value already lives in `slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientArg {
    pub ty: ValueType,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutineError {
    #[error("instruction {0} is not part of the routine")]
    MissingInsn(InsnId),

    #[error("cannot replace instruction {0} with an empty sequence")]
    EmptyReplacement(InsnId),

    #[error("{budget} of {current} cannot grow by {requested}, the limit is 65535")]
    BudgetOverflow {
        budget: Budget,
        current: u16,
        requested: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Stack,
    Locals,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Stack => write!(f, "max_stack"),
            Budget::Locals => write!(f, "max_locals"),
        }
    }
}

fn grow(budget: Budget, current: u16, by: u32) -> Result<u16, RoutineError> {
    u32::from(current)
        .checked_add(by)
        .and_then(|total| u16::try_from(total).ok())
        .ok_or(RoutineError::BudgetOverflow {
            budget,
            current,
            requested: by,
        })
}

#[derive(Debug, Clone)]
pub struct Routine {
    pub owner: String,
    pub name: String,
    pub signature: Signature,
    pub is_static: bool,
    insns: InsnList,
    max_stack: u16,
    max_locals: u16,
    ambient: Vec<AmbientArg>,
    pub nodes: NodeRegistry,
}

impl Routine {
    /// The local budget starts at whichever is larger: the argument area,
    /// or the slots the code already loads from and stores to.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        signature: Signature,
        is_static: bool,
        code: impl IntoIterator<Item = Insn>,
    ) -> Result<Self, RoutineError> {
        let mut next_slot: u32 = if is_static { 0 } else { 1 };
        let mut ambient = Vec::with_capacity(signature.params.len());
        for ty in &signature.params {
            ambient.push(AmbientArg {
                ty: ty.clone(),
                slot: grow(Budget::Locals, 0, next_slot)?,
            });
            next_slot += u32::from(ty.size());
        }

        let insns = InsnList::from_insns(code);
        let used = insns
            .iter()
            .filter_map(|(_, insn)| match insn {
                Insn::Load(kind, slot) | Insn::Store(kind, slot) => {
                    Some(u32::from(*slot) + u32::from(kind.size()))
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let max_locals = grow(Budget::Locals, 0, next_slot.max(used))?;

        Ok(Self {
            owner: owner.into(),
            name: name.into(),
            signature,
            is_static,
            insns,
            max_stack: 0,
            max_locals,
            ambient,
            nodes: NodeRegistry::new(),
        })
    }

    pub fn with_max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Raises the local budget to at least `max_locals`; never shrinks
    /// below the argument area or the slots the code uses.
    pub fn with_max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = self.max_locals.max(max_locals);
        self
    }

    pub fn insns(&self) -> &InsnList {
        &self.insns
    }

    pub fn insn(&self, id: InsnId) -> Result<&Insn, RoutineError> {
        self.insns.get(id).ok_or(RoutineError::MissingInsn(id))
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn ambient_args(&self) -> &[AmbientArg] {
        &self.ambient
    }

    pub fn ambient_types(&self) -> impl Iterator<Item = ValueType> + '_ {
        self.ambient.iter().map(|a| a.ty.clone())
    }

    pub fn ambient_size(&self) -> u16 {
        self.ambient.iter().map(|a| a.ty.size()).sum()
    }

    /// Reserves `size` fresh slots above the current high-water mark and
    /// returns the first one. Slots handed out here stay reserved for the
    /// rest of the routine, so values parked in them may overlap freely.
    pub fn allocate_locals(&mut self, size: u16) -> Result<u16, RoutineError> {
        let slot = self.max_locals;
        self.max_locals = grow(Budget::Locals, self.max_locals, u32::from(size))?;
        Ok(slot)
    }

    pub fn extend_locals(&mut self, n: u16) -> Result<(), RoutineError> {
        self.max_locals = grow(Budget::Locals, self.max_locals, u32::from(n))?;
        Ok(())
    }

    pub fn extend_stack(&mut self, n: u16) -> Result<(), RoutineError> {
        self.max_stack = grow(Budget::Stack, self.max_stack, u32::from(n))?;
        Ok(())
    }

    /// Swaps `old` for `seq` atomically and returns the id of the last
    /// instruction of `seq`.
    pub fn replace_insn(&mut self, old: InsnId, seq: Vec<Insn>) -> Result<InsnId, RoutineError> {
        if seq.is_empty() {
            return Err(RoutineError::EmptyReplacement(old));
        }
        self.insns.replace(old, seq).ok_or(RoutineError::MissingInsn(old))
    }

    /// Instructions matching `pred`, in order.
    pub fn find(&self, mut pred: impl FnMut(&Insn) -> bool) -> Vec<InsnId> {
        self.insns
            .iter()
            .filter(|(_, insn)| pred(insn))
            .map(|(id, _)| id)
            .collect()
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.signature)
    }
}
