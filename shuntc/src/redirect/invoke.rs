//!
//! Call-site redirection.
//!
//! The operands of the original call (receiver first for instance calls)
//! are popped into fresh locals, then reloaded as the handler's arguments.
//! For the instance call `foo/Foo.bar(II)Z` with an instance handler:
//!
//! ```text
//! istore 5        // second argument
//! istore 4        // first argument
//! astore 3        // receiver
//! aload 0         // handler receiver
//! aload 3
//! iload 4
//! iload 5
//! invokevirtual hooks/Hooks.onBar(Lfoo/Foo;II)Z
//! ```
//!

use smallvec::SmallVec;

use crate::insn::{Insn, InsnId, MethodInsn};
use crate::routine::{Routine, RoutineError};
use crate::types::{args_size, ValueType};

use super::descriptor::{check_signature, natural_invoke_signature};
use super::error::{HandlerRole, RedirectResult};
use super::RedirectEngine;

pub(super) fn redirect_invoke(
    engine: &RedirectEngine,
    routine: &mut Routine,
    target: InsnId,
    call: &MethodInsn,
) -> RedirectResult<InsnId> {
    let natural = natural_invoke_signature(call);
    let forward = check_signature(
        &engine.name,
        HandlerRole::Invoke,
        &engine.handler.signature,
        &natural,
        routine.ambient_types(),
    )?;

    let stack_vars = &natural.params;
    let extra_locals = args_size(stack_vars).saturating_add(1);
    // one slot for the handler receiver
    let mut extra_stack: u16 = 1;

    let mut insns = Vec::with_capacity(stack_vars.len() * 2 + 2);
    let mut arg_map = store_args(routine, stack_vars, &mut insns)?;
    if forward {
        extra_stack = extra_stack.saturating_add(routine.ambient_size());
        arg_map.extend(routine.ambient_args().iter().map(|a| a.slot));
    }
    engine.invoke_handler_with_args(&mut insns, &arg_map);

    routine.extend_locals(extra_locals)?;
    routine.extend_stack(extra_stack)?;
    Ok(routine.replace_insn(target, insns)?)
}

/// Pops `types` (last one on top of the stack) into freshly allocated
/// locals and returns the slot of each, in parameter order.
fn store_args(
    routine: &mut Routine,
    types: &[ValueType],
    insns: &mut Vec<Insn>,
) -> Result<SmallVec<[u16; 8]>, RoutineError> {
    let slots = types
        .iter()
        .map(|ty| routine.allocate_locals(ty.size()))
        .collect::<Result<SmallVec<[u16; 8]>, _>>()?;
    for (ty, &slot) in types.iter().zip(slots.iter()).rev() {
        insns.extend(Insn::store(ty, slot));
    }
    Ok(slots)
}
