///
/// shuntc - Instruction-Stream Redirection
///
/// Rewrites call sites and field accesses inside a routine's instruction
/// list so that they go through handler methods instead. Several redirect
/// engines may target the same instruction; ownership is arbitrated by
/// priority and finality before any rewrite happens.
///
/// - types: value types and method descriptors
/// - source: spans and source files for diagnostics
/// - insn: instructions and the stable-id instruction list
/// - asm: line-based text assembler for instruction lists
/// - routine: the routine being rewritten (locals, stack, ambient args)
/// - nodes: injection nodes and their ownership state
/// - redirect: redirect engines (claim and apply)
/// - pass: claim-then-apply orchestration with rollback
/// - plan: TOML/JSON rewrite plans
/// - diagnostic: conflict sinks and miette rendering
///
/// Entry points:
/// - `Plan::load` + `Plan::build`: read a plan from disk
/// - `RedirectPass::run`: rewrite one routine
///

pub mod asm;
pub mod diagnostic;
pub mod insn;
pub mod nodes;
pub mod pass;
pub mod plan;
pub mod redirect;
pub mod routine;
pub mod source;
pub mod types;

pub use asm::assemble;
pub use diagnostic::{CollectingSink, DiagnosticReporter, DiagnosticSink, TracingSink};
pub use pass::{PassReport, RedirectPass};
pub use plan::{Plan, PlanError};
pub use redirect::{Handler, RedirectEngine, RedirectError, RedirectSpec, DEFAULT_PRIORITY};
pub use routine::Routine;
pub use source::SourceFile;
pub use types::{Signature, ValueType};
