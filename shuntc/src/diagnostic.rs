//!
//! Diagnostic Module - Conflict Sinks and Rich Error Reporting
//!
//! The redirect engine reports through a DiagnosticSink:
//!
//! - conflict(): a claim or apply that was skipped because another redirect
//!   holds the instruction (non-fatal)
//! - fatal(): an error that aborts the routine
//!
//! TracingSink forwards both to `tracing`; CollectingSink keeps them in
//! memory. For terminal output, DiagnosticReporter renders assembler and
//! redirect errors with miette, showing the offending code line when there
//! is one.
//!

use std::fmt;

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceSpan};
use serde::Serialize;
use thiserror::Error;

use crate::asm::AsmError;
use crate::redirect::RedirectError;
use crate::source::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPhase {
    Claim,
    Apply,
}

impl fmt::Display for ConflictPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPhase::Claim => write!(f, "claim"),
            ConflictPhase::Apply => write!(f, "apply"),
        }
    }
}

/// A redirect that lost an instruction to another redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub phase: ConflictPhase,
    pub engine: String,
    pub priority: i32,
    pub holder: String,
    pub holder_priority: i32,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "redirect conflict. Skipping {} with priority {}, already redirected by {} with priority {}",
            self.engine, self.priority, self.holder, self.holder_priority
        )
    }
}

pub trait DiagnosticSink {
    fn conflict(&mut self, conflict: &Conflict);

    fn fatal(&mut self, error: &RedirectError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn conflict(&mut self, conflict: &Conflict) {
        tracing::warn!(
            phase = %conflict.phase,
            engine = %conflict.engine,
            priority = conflict.priority,
            holder = %conflict.holder,
            holder_priority = conflict.holder_priority,
            "{}",
            conflict
        );
    }

    fn fatal(&mut self, error: &RedirectError) {
        tracing::error!(engine = error.engine().unwrap_or("-"), "{}", error);
    }
}

#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub conflicts: Vec<Conflict>,
    pub fatals: Vec<RedirectError>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticSink for CollectingSink {
    fn conflict(&mut self, conflict: &Conflict) {
        self.conflicts.push(conflict.clone());
    }

    fn fatal(&mut self, error: &RedirectError) {
        self.fatals.push(error.clone());
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ShuntDiagnostic {
    message: String,
    src: Option<NamedSource<String>>,
    span: Option<SourceSpan>,
    label: String,
    help_text: Option<String>,
}

impl Diagnostic for ShuntDiagnostic {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.src.as_ref().map(|s| s as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            Some(self.label.clone()),
            span,
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }
}

impl ShuntDiagnostic {
    pub fn from_asm_error(err: &AsmError, source: &SourceFile) -> Self {
        let span = err.span;
        let (line, col) = source.line_col(span.start);

        Self {
            message: format!("assembler error at {}:{}", line, col),
            src: Some(NamedSource::new(&source.name, source.source.clone())),
            span: Some((span.start as usize, span.len() as usize).into()),
            label: err.message.clone(),
            help_text: None,
        }
    }

    pub fn from_redirect_error(err: &RedirectError) -> Self {
        let help = match err {
            RedirectError::FinalityViolation { holder, .. } => Some(format!(
                "{} is final; remove one of the two redirects or drop its final flag",
                holder
            )),
            RedirectError::SignatureMismatch { expected, .. } => {
                Some(format!("declare the handler as {}", expected))
            }
            RedirectError::UnsupportedTarget { .. } => {
                Some("redirects can only target invoke and field instructions".to_string())
            }
            RedirectError::InstanceHandlerInStaticRoutine { .. } => {
                Some("make the handler static".to_string())
            }
            _ => None,
        };

        Self {
            message: err.to_string(),
            src: None,
            span: None,
            label: String::new(),
            help_text: help,
        }
    }
}

pub struct DiagnosticReporter<'a> {
    source: &'a SourceFile,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Self { source }
    }

    pub fn report_asm_errors(&self, errors: &[AsmError]) {
        for err in errors {
            let report = Report::new(ShuntDiagnostic::from_asm_error(err, self.source));
            eprintln!("{:?}", report);
        }
    }

    pub fn report_redirect_error(err: &RedirectError) {
        let report = Report::new(ShuntDiagnostic::from_redirect_error(err));
        eprintln!("{:?}", report);
    }
}
