//!
//! Value Types and Method Descriptors
//!
//! This module defines the value types that flow through a compiled routine
//! and the method signatures built from them. Both print as, and parse from,
//! JVM-style descriptors:
//!
//! - `I`, `J`, `Z`, `Lcom/example/Foo;`, `[I` for value types
//! - `(ILjava/lang/String;)Z` for method signatures
//!
//! Sizes follow the stack machine's slot model: long and double occupy two
//! slots, void occupies none, everything else occupies one.
//!

use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::take_till1;
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Reference to an instance of the named class (internal form, `a/b/C`)
    Object(String),
    Array(Box<ValueType>),
}

/// The local-slot family an instruction uses to move a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

impl VarKind {
    pub fn prefix(self) -> char {
        match self {
            VarKind::Int => 'i',
            VarKind::Long => 'l',
            VarKind::Float => 'f',
            VarKind::Double => 'd',
            VarKind::Ref => 'a',
        }
    }

    pub fn from_prefix(c: char) -> Option<VarKind> {
        match c {
            'i' => Some(VarKind::Int),
            'l' => Some(VarKind::Long),
            'f' => Some(VarKind::Float),
            'd' => Some(VarKind::Double),
            'a' => Some(VarKind::Ref),
            _ => None,
        }
    }

    pub fn size(self) -> u16 {
        match self {
            VarKind::Long | VarKind::Double => 2,
            _ => 1,
        }
    }
}

impl ValueType {
    pub fn object(internal_name: impl Into<String>) -> Self {
        ValueType::Object(internal_name.into())
    }

    pub fn size(&self) -> u16 {
        match self {
            ValueType::Void => 0,
            ValueType::Long | ValueType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.size() == 2
    }

    pub fn var_kind(&self) -> Option<VarKind> {
        match self {
            ValueType::Void => None,
            ValueType::Boolean
            | ValueType::Byte
            | ValueType::Char
            | ValueType::Short
            | ValueType::Int => Some(VarKind::Int),
            ValueType::Long => Some(VarKind::Long),
            ValueType::Float => Some(VarKind::Float),
            ValueType::Double => Some(VarKind::Double),
            ValueType::Object(_) | ValueType::Array(_) => Some(VarKind::Ref),
        }
    }

    pub fn parse(descriptor: &str) -> Result<ValueType, DescriptorError> {
        match all_consuming(return_type)(descriptor) {
            Ok((_, ty)) => Ok(ty),
            Err(_) => Err(DescriptorError::InvalidType(descriptor.to_string())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "V"),
            ValueType::Boolean => write!(f, "Z"),
            ValueType::Byte => write!(f, "B"),
            ValueType::Char => write!(f, "C"),
            ValueType::Short => write!(f, "S"),
            ValueType::Int => write!(f, "I"),
            ValueType::Long => write!(f, "J"),
            ValueType::Float => write!(f, "F"),
            ValueType::Double => write!(f, "D"),
            ValueType::Object(name) => write!(f, "L{};", name),
            ValueType::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl Signature {
    pub fn new(params: Vec<ValueType>, ret: ValueType) -> Self {
        Self { params, ret }
    }

    pub fn parse(descriptor: &str) -> Result<Signature, DescriptorError> {
        match all_consuming(signature)(descriptor) {
            Ok((_, sig)) => Ok(sig),
            Err(_) => Err(DescriptorError::InvalidSignature(descriptor.to_string())),
        }
    }

    /// Total slot footprint of the parameters.
    pub fn args_size(&self) -> u16 {
        args_size(&self.params)
    }

    /// Same return type, with `extra` appended after the existing parameters.
    pub fn with_trailing(&self, extra: impl IntoIterator<Item = ValueType>) -> Signature {
        let mut params = self.params.clone();
        params.extend(extra);
        Signature::new(params, self.ret.clone())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, "){}", self.ret)
    }
}

/// Saturates at `u16::MAX`; callers growing a budget by it report the
/// overflow.
pub fn args_size(types: &[ValueType]) -> u16 {
    types
        .iter()
        .fold(0u16, |total, ty| total.saturating_add(ty.size()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("invalid type descriptor '{0}'")]
    InvalidType(String),

    #[error("invalid method descriptor '{0}'")]
    InvalidSignature(String),
}

pub(crate) fn field_type(input: &str) -> IResult<&str, ValueType> {
    alt((
        value(ValueType::Boolean, char('Z')),
        value(ValueType::Byte, char('B')),
        value(ValueType::Char, char('C')),
        value(ValueType::Short, char('S')),
        value(ValueType::Int, char('I')),
        value(ValueType::Long, char('J')),
        value(ValueType::Float, char('F')),
        value(ValueType::Double, char('D')),
        map(
            delimited(char('L'), take_till1(|c: char| c == ';'), char(';')),
            |name: &str| ValueType::Object(name.to_string()),
        ),
        map(preceded(char('['), field_type), |elem| {
            ValueType::Array(Box::new(elem))
        }),
    ))(input)
}

pub(crate) fn return_type(input: &str) -> IResult<&str, ValueType> {
    alt((value(ValueType::Void, char('V')), field_type))(input)
}

pub(crate) fn signature(input: &str) -> IResult<&str, Signature> {
    map(
        pair(delimited(char('('), many0(field_type), char(')')), return_type),
        |(params, ret)| Signature::new(params, ret),
    )(input)
}
