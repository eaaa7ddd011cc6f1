///
/// Assembler Module - nom-based Instruction Text Parsing
///
/// Reads routine bodies written one instruction per line, in the same form
/// `Insn` prints itself:
///
///   aload 1
///   iconst 2
///   invokevirtual com/example/World.bar(II)Z
///   getfield com/example/World.ticks:J
///
/// Blank lines and `//` comments are ignored. Every malformed line produces
/// an AsmError carrying the byte span of that line; assembly continues with
/// the next line so all problems are reported together.
///

use nom::bytes::complete::take_till1;
use nom::character::complete::{alphanumeric1, char, digit1, space0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::sequence::{pair, terminated, tuple};
use nom::IResult;
use thiserror::Error;

use crate::insn::{FieldInsn, FieldOp, Insn, InvokeKind, MethodInsn};
use crate::source::Span;
use crate::types::{field_type, signature, Signature, VarKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AsmError {
    pub message: String,
    pub span: Span,
}

impl AsmError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

pub struct AsmResult {
    pub insns: Vec<Insn>,
    pub errors: Vec<AsmError>,
}

/// `Owner.name(descriptor)`, the way handler methods are named in plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub signature: Signature,
}

impl MethodRef {
    pub fn parse(text: &str) -> Result<MethodRef, AsmError> {
        let trimmed = text.trim();
        all_consuming(method_ref)(trimmed)
            .map(|(_, r)| r)
            .map_err(|_| {
                AsmError::new(
                    format!("malformed method reference '{}'", trimmed),
                    Span::new(0, text.len() as u32),
                )
            })
    }
}

pub fn assemble(text: &str) -> AsmResult {
    let mut insns = Vec::new();
    let mut errors = Vec::new();
    let mut offset = 0usize;

    for raw in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw.len();

        let content = strip_comment(raw.trim_end_matches(|c| c == '\n' || c == '\r'));
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }

        let start = line_start + (content.len() - content.trim_start().len());
        let span = Span::new(start as u32, (start + trimmed.len()) as u32);

        match parse_line(trimmed) {
            Ok(insn) => insns.push(insn),
            Err(message) => errors.push(AsmError::new(message, span)),
        }
    }

    AsmResult { insns, errors }
}

/// Parses a single instruction line.
pub fn parse_insn(line: &str) -> Result<Insn, AsmError> {
    let trimmed = line.trim();
    parse_line(trimmed).map_err(|message| AsmError::new(message, Span::new(0, line.len() as u32)))
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_line(line: &str) -> Result<Insn, String> {
    let (rest, mnemonic) = alphanumeric1::<_, nom::error::Error<&str>>(line)
        .map_err(|_| format!("expected an instruction, found '{}'", line))?;

    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(format!("expected an instruction, found '{}'", line));
    }
    let operand = rest.trim();

    if let Some(kind) = InvokeKind::from_mnemonic(mnemonic) {
        return operand_of(mnemonic, operand, method_ref)
            .map(|r| Insn::Invoke(MethodInsn::new(kind, r.owner, r.name, r.signature)));
    }

    if let Some(op) = FieldOp::from_mnemonic(mnemonic) {
        return operand_of(mnemonic, operand, field_ref)
            .map(|(owner, name, ty)| Insn::Field(FieldInsn::new(op, owner, name, ty)));
    }

    match mnemonic {
        "iconst" => return operand_of(mnemonic, operand, int_literal).map(Insn::IConst),
        "swap" => return no_operand(mnemonic, operand, Insn::Swap),
        "dup" => return no_operand(mnemonic, operand, Insn::Dup),
        "pop" => return no_operand(mnemonic, operand, Insn::Pop),
        "pop2" => return no_operand(mnemonic, operand, Insn::Pop2),
        "nop" => return no_operand(mnemonic, operand, Insn::Nop),
        "return" => return no_operand(mnemonic, operand, Insn::Return(None)),
        _ => {}
    }

    let mut chars = mnemonic.chars();
    let kind = chars.next().and_then(VarKind::from_prefix);
    match (kind, chars.as_str()) {
        (Some(kind), "load") => operand_of(mnemonic, operand, slot).map(|s| Insn::Load(kind, s)),
        (Some(kind), "store") => operand_of(mnemonic, operand, slot).map(|s| Insn::Store(kind, s)),
        (Some(kind), "return") => no_operand(mnemonic, operand, Insn::Return(Some(kind))),
        _ => Err(format!("unknown mnemonic '{}'", mnemonic)),
    }
}

fn operand_of<'a, T, P>(mnemonic: &str, operand: &'a str, parser: P) -> Result<T, String>
where
    P: FnMut(&'a str) -> IResult<&'a str, T>,
{
    if operand.is_empty() {
        return Err(format!("missing operand for '{}'", mnemonic));
    }
    all_consuming(terminated(parser, space0))(operand)
        .map(|(_, value)| value)
        .map_err(|_| format!("malformed operand for '{}': '{}'", mnemonic, operand))
}

fn no_operand(mnemonic: &str, operand: &str, insn: Insn) -> Result<Insn, String> {
    if operand.is_empty() {
        Ok(insn)
    } else {
        Err(format!("'{}' takes no operand", mnemonic))
    }
}

fn owner_name(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c == '.' || c.is_whitespace())(input)
}

fn member_name(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c == '(' || c == ':' || c.is_whitespace())(input)
}

pub(crate) fn method_ref(input: &str) -> IResult<&str, MethodRef> {
    map(
        tuple((owner_name, char('.'), member_name, signature)),
        |(owner, _, name, signature)| MethodRef {
            owner: owner.to_string(),
            name: name.to_string(),
            signature,
        },
    )(input)
}

fn field_ref(input: &str) -> IResult<&str, (String, String, crate::types::ValueType)> {
    map(
        tuple((owner_name, char('.'), member_name, char(':'), field_type)),
        |(owner, _, name, _, ty)| (owner.to_string(), name.to_string(), ty),
    )(input)
}

fn slot(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn int_literal(input: &str) -> IResult<&str, i32> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i32>()
    })(input)
}
