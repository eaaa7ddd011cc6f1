//!
//! Field-access redirection.
//!
//! Reads become calls to a getter handler and writes become calls to a
//! setter handler. The field's staticness decides the natural signature;
//! the handler's own staticness decides whether its receiver has to be
//! pushed (and moved underneath the operands already on the stack).
//!
//! Setter, instance handler, instance field:
//!
//! ```text
//! istore 4        // park the value being written
//! aload 0         // handler receiver
//! swap            // ... under the field owner
//! iload 4         // value back on top
//! invokevirtual hooks/Hooks.setX(Lfoo/Foo;I)V
//! ```
//!

use crate::insn::{FieldInsn, Insn, InsnId};
use crate::routine::Routine;

use super::descriptor::{check_signature, natural_getter_signature, natural_setter_signature};
use super::error::{HandlerRole, RedirectResult};
use super::RedirectEngine;

pub(super) fn redirect_field(
    engine: &RedirectEngine,
    routine: &mut Routine,
    target: InsnId,
    field: &FieldInsn,
) -> RedirectResult<InsnId> {
    let insns = if field.op.is_read() {
        get_field(engine, routine, field)?
    } else {
        put_field(engine, routine, field)?
    };
    Ok(routine.replace_insn(target, insns)?)
}

fn get_field(engine: &RedirectEngine, routine: &mut Routine, field: &FieldInsn) -> RedirectResult<Vec<Insn>> {
    let static_field = field.op.is_static();
    let natural = natural_getter_signature(field);
    let forward = check_signature(
        &engine.name,
        HandlerRole::Getter,
        &engine.handler.signature,
        &natural,
        routine.ambient_types(),
    )?;

    let mut insns = Vec::new();
    if !engine.handler.is_static {
        insns.push(Insn::this());
        if !static_field {
            insns.push(Insn::Swap);
        }
        routine.extend_stack(1)?;
    }

    if forward {
        push_ambient(routine, &mut insns)?;
    }

    insns.push(engine.handler.call_insn());
    Ok(insns)
}

fn put_field(engine: &RedirectEngine, routine: &mut Routine, field: &FieldInsn) -> RedirectResult<Vec<Insn>> {
    let static_field = field.op.is_static();
    let natural = natural_setter_signature(field);
    let forward = check_signature(
        &engine.name,
        HandlerRole::Setter,
        &engine.handler.signature,
        &natural,
        routine.ambient_types(),
    )?;

    let mut insns = Vec::new();
    if !engine.handler.is_static {
        if static_field && !field.ty.is_wide() {
            insns.push(Insn::this());
            insns.push(Insn::Swap);
        } else {
            // swap cannot move a value under a two-slot value, nor reach
            // past the field owner, so the value waits in a local
            let park = routine.allocate_locals(field.ty.size())?;
            insns.extend(Insn::store(&field.ty, park));
            insns.push(Insn::this());
            if !static_field {
                insns.push(Insn::Swap);
            }
            insns.extend(Insn::load(&field.ty, park));
        }
        routine.extend_stack(1)?;
    }

    if forward {
        push_ambient(routine, &mut insns)?;
    }

    insns.push(engine.handler.call_insn());
    Ok(insns)
}

fn push_ambient(routine: &mut Routine, insns: &mut Vec<Insn>) -> RedirectResult<()> {
    for arg in routine.ambient_args() {
        insns.extend(Insn::load(&arg.ty, arg.slot));
    }
    routine.extend_stack(routine.ambient_size())?;
    Ok(())
}
