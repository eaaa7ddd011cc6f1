///
/// # Rewrite Plans
///
/// A plan describes one routine and the redirects to apply to it. Plans are
/// TOML files (or JSON, chosen by a `.json` extension) and are what the
/// `shunt` CLI consumes.
///
/// ## Example plan
///
/// ```toml
/// [routine]
/// owner = "com/example/Foo"
/// name = "tick"
/// descriptor = "(Lcom/example/World;)V"
/// max_stack = 3
/// code = """
/// aload 1
/// iconst 1
/// iconst 2
/// invokevirtual com/example/World.bar(II)Z
/// pop
/// return
/// """
///
/// [redirect.barProxy]
/// handler = "com/example/Hooks.barProxy(Lcom/example/World;II)Z"
/// static = true
/// priority = 1100
/// target = "invokevirtual com/example/World.bar(II)Z"
/// ```
///
/// ## Budgets
///
/// When `max_locals` is left out, the local budget covers the argument area
/// and every slot the code loads from or stores to, so parked values never
/// land on a live local.
///
/// ## Ordering
///
/// Redirects are kept in an IndexMap so that the order they are declared in
/// the file is the order they claim in. Each redirect's `target` is an
/// assembler line; every identical instruction in the routine is targeted
/// unless `ordinal` picks one of them (zero-based).
///

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asm::{assemble, parse_insn, AsmError, MethodRef};
use crate::pass::RedirectPass;
use crate::redirect::{Handler, RedirectSpec, DEFAULT_PRIORITY};
use crate::routine::{Routine, RoutineError};
use crate::source::SourceFile;
use crate::types::{DescriptorError, Signature};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Plan {
    pub routine: RoutineDecl,
    #[serde(default, rename = "redirect")]
    pub redirects: IndexMap<String, RedirectDecl>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutineDecl {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub max_stack: u16,
    #[serde(default)]
    pub max_locals: Option<u16>,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectDecl {
    pub handler: String,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default, rename = "private")]
    pub is_private: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    pub target: String,
    #[serde(default)]
    pub ordinal: Option<usize>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid descriptor for routine {routine}: {error}")]
    Descriptor {
        routine: String,
        error: DescriptorError,
    },

    #[error("{0}")]
    Routine(#[from] RoutineError),

    #[error("routine code has {} assembler error(s)", .errors.len())]
    Assembly {
        code: SourceFile,
        errors: Vec<AsmError>,
    },

    #[error("redirect '{redirect}': invalid {what}: {message}")]
    InvalidReference {
        redirect: String,
        what: &'static str,
        message: String,
    },

    #[error("redirect '{redirect}': target '{target}' matches no instruction")]
    NoTargetMatch { redirect: String, target: String },

    #[error(
        "redirect '{redirect}': ordinal {ordinal} is out of range, target '{target}' \
         matches {matches} instruction(s)"
    )]
    OrdinalOutOfRange {
        redirect: String,
        target: String,
        ordinal: usize,
        matches: usize,
    },
}

/// A plan turned into something runnable.
pub struct PlannedRoutine {
    pub routine: Routine,
    pub pass: RedirectPass,
    pub code: SourceFile,
}

impl Plan {
    pub fn from_toml(text: &str) -> Result<Plan, PlanError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Plan, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Plan, PlanError> {
        let text = std::fs::read_to_string(path)?;
        if is_json(path) {
            Plan::from_json(&text)
        } else {
            Plan::from_toml(&text)
        }
    }

    pub fn build(&self) -> Result<PlannedRoutine, PlanError> {
        let decl = &self.routine;
        let routine_name = format!("{}.{}", decl.owner, decl.name);
        let signature = Signature::parse(&decl.descriptor).map_err(|error| PlanError::Descriptor {
            routine: routine_name.clone(),
            error,
        })?;

        let code = SourceFile::new(routine_name, decl.code.clone());
        let assembled = assemble(&code.source);
        if !assembled.errors.is_empty() {
            return Err(PlanError::Assembly {
                code,
                errors: assembled.errors,
            });
        }

        let mut routine = Routine::new(
            decl.owner.as_str(),
            decl.name.as_str(),
            signature,
            decl.is_static,
            assembled.insns,
        )?
        .with_max_stack(decl.max_stack);
        if let Some(max_locals) = decl.max_locals {
            routine = routine.with_max_locals(max_locals);
        }

        let mut pass = RedirectPass::new();
        for (name, redirect) in &self.redirects {
            let (spec, targets) = redirect.resolve(name, &routine)?;
            pass.register(spec, targets);
        }

        Ok(PlannedRoutine { routine, pass, code })
    }
}

impl RedirectDecl {
    fn resolve(&self, name: &str, routine: &Routine) -> Result<(RedirectSpec, Vec<crate::insn::InsnId>), PlanError> {
        let invalid = |what: &'static str, err: AsmError| PlanError::InvalidReference {
            redirect: name.to_string(),
            what,
            message: err.message,
        };

        let handler_ref = MethodRef::parse(&self.handler).map_err(|e| invalid("handler", e))?;
        let target = parse_insn(&self.target).map_err(|e| invalid("target", e))?;

        let matches = routine.find(|insn| *insn == target);
        if matches.is_empty() {
            return Err(PlanError::NoTargetMatch {
                redirect: name.to_string(),
                target: self.target.clone(),
            });
        }
        let targets = match self.ordinal {
            Some(ordinal) => match matches.get(ordinal) {
                Some(&id) => vec![id],
                None => {
                    return Err(PlanError::OrdinalOutOfRange {
                        redirect: name.to_string(),
                        target: self.target.clone(),
                        ordinal,
                        matches: matches.len(),
                    })
                }
            },
            None => matches,
        };

        let mut handler = Handler::new(handler_ref.owner, handler_ref.name, handler_ref.signature);
        handler.is_static = self.is_static;
        handler.is_private = self.is_private;

        let spec = RedirectSpec::new(name, handler)
            .priority(self.priority)
            .final_(self.is_final);
        Ok((spec, targets))
    }
}

pub fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

pub fn is_plan_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "toml" || e == "json")
        .unwrap_or(false)
}
