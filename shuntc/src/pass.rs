///
/// Redirect Pass - Claim/Apply Orchestration for One Routine
///
/// Engines are registered in declaration order together with the
/// instructions they target. Running the pass:
///
/// 1. claims every target for every engine, in declaration order
/// 2. applies every engine to the nodes it claimed, in the same order
///
/// Both phases run on a working copy of the routine. The copy replaces the
/// routine only when every claim and apply succeeded, so a fatal error
/// leaves the routine exactly as it was.
///

use serde::Serialize;

use crate::diagnostic::DiagnosticSink;
use crate::insn::InsnId;
use crate::nodes::NodeId;
use crate::redirect::{ApplyOutcome, EngineId, RedirectEngine, RedirectError, RedirectSpec};
use crate::routine::Routine;

#[derive(Debug, Clone, Serialize)]
pub struct AppliedRedirect {
    pub engine: String,
    pub node: NodeId,
    pub call: InsnId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub applied: Vec<AppliedRedirect>,
    /// Engines whose node was taken over before apply, by name.
    pub skipped: Vec<String>,
    pub max_stack: u16,
    pub max_locals: u16,
}

struct Registered {
    engine: RedirectEngine,
    targets: Vec<InsnId>,
}

#[derive(Default)]
pub struct RedirectPass {
    engines: Vec<Registered>,
}

impl RedirectPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: RedirectSpec, targets: Vec<InsnId>) -> EngineId {
        let id = EngineId(self.engines.len() as u32);
        self.engines.push(Registered {
            engine: RedirectEngine::new(id, spec),
            targets,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn run(
        mut self,
        routine: &mut Routine,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<PassReport, RedirectError> {
        let mut work = routine.clone();

        match self.run_phases(&mut work, sink) {
            Ok(mut report) => {
                report.max_stack = work.max_stack();
                report.max_locals = work.max_locals();
                *routine = work;
                Ok(report)
            }
            Err(err) => {
                sink.fatal(&err);
                Err(err)
            }
        }
    }

    fn run_phases(
        &mut self,
        work: &mut Routine,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<PassReport, RedirectError> {
        for registered in &mut self.engines {
            for &target in &registered.targets {
                registered.engine.claim(work, target, sink)?;
            }
        }

        let mut report = PassReport::default();
        for registered in &self.engines {
            let engine = &registered.engine;
            for &node in engine.owned_nodes() {
                match engine.apply(work, node, sink)? {
                    ApplyOutcome::Replaced { call } => report.applied.push(AppliedRedirect {
                        engine: engine.name().to_string(),
                        node,
                        call,
                    }),
                    ApplyOutcome::Skipped => report.skipped.push(engine.name().to_string()),
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::diagnostic::CollectingSink;
    use crate::insn::Insn;
    use crate::redirect::Handler;
    use crate::types::Signature;

    fn routine(code: &str) -> Routine {
        let result = assemble(code);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        Routine::new("foo/Caller", "run", Signature::parse("()V").unwrap(), false, result.insns)
            .unwrap()
            .with_max_stack(3)
    }

    fn handler(name: &str, desc: &str) -> Handler {
        Handler::new("hooks/Hooks", name, Signature::parse(desc).unwrap())
    }

    #[test]
    fn test_fatal_error_rolls_back_routine() {
        let mut r = routine(
            "getstatic foo/Foo.a:I\n\
             getstatic foo/Foo.b:I\n\
             return\n",
        );
        let before = r.insns().to_string();
        let ids: Vec<_> = r.insns().ids().collect();

        let mut pass = RedirectPass::new();
        pass.register(RedirectSpec::new("good", handler("a", "()I")), vec![ids[0]]);
        pass.register(RedirectSpec::new("bad", handler("b", "()J")), vec![ids[1]]);

        let mut sink = CollectingSink::new();
        let err = pass.run(&mut r, &mut sink).unwrap_err();
        assert!(matches!(err, RedirectError::SignatureMismatch { .. }));
        assert_eq!(sink.fatals, vec![err]);
        assert_eq!(r.insns().to_string(), before);
        assert!(r.nodes.is_empty());
        assert_eq!(r.max_stack(), 3);
    }

    #[test]
    fn test_report_lists_applied_and_skipped() {
        let mut r = routine("getstatic foo/Foo.a:I\nreturn\n");
        let target = r.insns().ids().next().unwrap();

        let mut pass = RedirectPass::new();
        pass.register(RedirectSpec::new("low", handler("low", "()I")).priority(5), vec![target]);
        pass.register(RedirectSpec::new("high", handler("high", "()I")).priority(10), vec![target]);
        assert_eq!(pass.len(), 2);

        let mut sink = CollectingSink::new();
        let report = pass.run(&mut r, &mut sink).unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].engine, "high");
        assert_eq!(report.skipped, vec!["low".to_string()]);
        assert_eq!(report.max_stack, 4);
        assert_eq!(
            r.insn(report.applied[0].call).unwrap(),
            &Insn::Invoke(crate::insn::MethodInsn::new(
                crate::insn::InvokeKind::Virtual,
                "hooks/Hooks",
                "high",
                Signature::parse("()I").unwrap()
            ))
        );
    }
}
