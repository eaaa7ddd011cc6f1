//!
//! Instruction Model
//!
//! The instructions a routine body is made of, and the ordered list that
//! holds them. Only the instruction families the redirect engine reads or
//! synthesizes are modelled precisely; everything prints as one assembler
//! line that `asm::assemble` reads back.
//!
//! Every instruction placed in an `InsnList` receives an `InsnId` that stays
//! valid for as long as the instruction is present and is never handed out
//! again after the instruction is spliced away.
//!

use std::fmt;

use serde::Serialize;

use crate::types::{Signature, ValueType, VarKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InsnId(pub u32);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            InvokeKind::Virtual => "invokevirtual",
            InvokeKind::Special => "invokespecial",
            InvokeKind::Static => "invokestatic",
            InvokeKind::Interface => "invokeinterface",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<InvokeKind> {
        match s {
            "invokevirtual" => Some(InvokeKind::Virtual),
            "invokespecial" => Some(InvokeKind::Special),
            "invokestatic" => Some(InvokeKind::Static),
            "invokeinterface" => Some(InvokeKind::Interface),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

impl FieldOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            FieldOp::GetStatic => "getstatic",
            FieldOp::PutStatic => "putstatic",
            FieldOp::GetField => "getfield",
            FieldOp::PutField => "putfield",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<FieldOp> {
        match s {
            "getstatic" => Some(FieldOp::GetStatic),
            "putstatic" => Some(FieldOp::PutStatic),
            "getfield" => Some(FieldOp::GetField),
            "putfield" => Some(FieldOp::PutField),
            _ => None,
        }
    }

    pub fn is_static(self) -> bool {
        matches!(self, FieldOp::GetStatic | FieldOp::PutStatic)
    }

    pub fn is_read(self) -> bool {
        matches!(self, FieldOp::GetStatic | FieldOp::GetField)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInsn {
    pub kind: InvokeKind,
    pub owner: String,
    pub name: String,
    pub signature: Signature,
}

impl MethodInsn {
    pub fn new(
        kind: InvokeKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        signature: Signature,
    ) -> Self {
        Self {
            kind,
            owner: owner.into(),
            name: name.into(),
            signature,
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == InvokeKind::Static
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInsn {
    pub op: FieldOp,
    pub owner: String,
    pub name: String,
    pub ty: ValueType,
}

impl FieldInsn {
    pub fn new(op: FieldOp, owner: impl Into<String>, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            op,
            owner: owner.into(),
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Insn {
    Invoke(MethodInsn),
    Field(FieldInsn),
    Load(VarKind, u16),
    Store(VarKind, u16),
    IConst(i32),
    Swap,
    Dup,
    Pop,
    Pop2,
    Nop,
    Return(Option<VarKind>),
}

impl Insn {
    pub fn load(ty: &ValueType, slot: u16) -> Option<Insn> {
        ty.var_kind().map(|kind| Insn::Load(kind, slot))
    }

    pub fn store(ty: &ValueType, slot: u16) -> Option<Insn> {
        ty.var_kind().map(|kind| Insn::Store(kind, slot))
    }

    pub fn this() -> Insn {
        Insn::Load(VarKind::Ref, 0)
    }

    pub fn mnemonic(&self) -> String {
        match self {
            Insn::Invoke(m) => m.kind.mnemonic().to_string(),
            Insn::Field(f) => f.op.mnemonic().to_string(),
            Insn::Load(kind, _) => format!("{}load", kind.prefix()),
            Insn::Store(kind, _) => format!("{}store", kind.prefix()),
            Insn::IConst(_) => "iconst".to_string(),
            Insn::Swap => "swap".to_string(),
            Insn::Dup => "dup".to_string(),
            Insn::Pop => "pop".to_string(),
            Insn::Pop2 => "pop2".to_string(),
            Insn::Nop => "nop".to_string(),
            Insn::Return(None) => "return".to_string(),
            Insn::Return(Some(kind)) => format!("{}return", kind.prefix()),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Invoke(m) => write!(
                f,
                "{} {}.{}{}",
                m.kind.mnemonic(),
                m.owner,
                m.name,
                m.signature
            ),
            Insn::Field(fi) => write!(f, "{} {}.{}:{}", fi.op.mnemonic(), fi.owner, fi.name, fi.ty),
            Insn::Load(_, slot) | Insn::Store(_, slot) => write!(f, "{} {}", self.mnemonic(), slot),
            Insn::IConst(v) => write!(f, "iconst {}", v),
            _ => write!(f, "{}", self.mnemonic()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InsnList {
    entries: Vec<(InsnId, Insn)>,
    next_id: u32,
}

impl InsnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_insns(insns: impl IntoIterator<Item = Insn>) -> Self {
        let mut list = Self::new();
        for insn in insns {
            list.push(insn);
        }
        list
    }

    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.fresh_id();
        self.entries.push((id, insn));
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, insn)| insn)
    }

    pub fn position(&self, id: InsnId) -> Option<usize> {
        self.entries.iter().position(|(i, _)| *i == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsnId, &Insn)> {
        self.entries.iter().map(|(id, insn)| (*id, insn))
    }

    pub fn ids(&self) -> impl Iterator<Item = InsnId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Replaces `old` with `seq` in place. Returns the id given to the last
    /// instruction of `seq`, or `None` if `old` is absent or `seq` is empty.
    pub fn replace(&mut self, old: InsnId, seq: Vec<Insn>) -> Option<InsnId> {
        if seq.is_empty() {
            return None;
        }
        let pos = self.position(old)?;
        let mut inserted = Vec::with_capacity(seq.len());
        for insn in seq {
            let id = self.fresh_id();
            inserted.push((id, insn));
        }
        let last = inserted.last().map(|(id, _)| *id);
        self.entries.splice(pos..=pos, inserted);
        last
    }

    fn fresh_id(&mut self) -> InsnId {
        let id = InsnId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl fmt::Display for InsnList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, insn) in &self.entries {
            writeln!(f, "{}", insn)?;
        }
        Ok(())
    }
}
