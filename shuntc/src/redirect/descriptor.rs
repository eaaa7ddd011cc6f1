//!
//! Handler descriptor negotiation.
//!
//! A handler is accepted when its signature equals the natural signature
//! derived from the target instruction, or that signature with every ambient
//! argument of the routine appended after the natural parameters. The second
//! form turns on ambient-argument forwarding.
//!

use crate::insn::{FieldInsn, MethodInsn};
use crate::types::{Signature, ValueType};

use super::error::{HandlerRole, RedirectError, RedirectResult};

/// Receiver (for instance calls) followed by the call's own arguments.
pub fn natural_invoke_signature(call: &MethodInsn) -> Signature {
    let mut params = Vec::with_capacity(call.signature.params.len() + 1);
    if !call.is_static() {
        params.push(ValueType::object(call.owner.as_str()));
    }
    params.extend(call.signature.params.iter().cloned());
    Signature::new(params, call.signature.ret.clone())
}

pub fn natural_getter_signature(field: &FieldInsn) -> Signature {
    let params = if field.op.is_static() {
        Vec::new()
    } else {
        vec![ValueType::object(field.owner.as_str())]
    };
    Signature::new(params, field.ty.clone())
}

pub fn natural_setter_signature(field: &FieldInsn) -> Signature {
    let mut params = Vec::with_capacity(2);
    if !field.op.is_static() {
        params.push(ValueType::object(field.owner.as_str()));
    }
    params.push(field.ty.clone());
    Signature::new(params, ValueType::Void)
}

/// Returns whether ambient arguments must be forwarded to the handler.
pub(super) fn check_signature(
    engine: &str,
    role: HandlerRole,
    found: &Signature,
    natural: &Signature,
    ambient: impl IntoIterator<Item = ValueType>,
) -> RedirectResult<bool> {
    if found == natural {
        return Ok(false);
    }

    let extended = natural.with_trailing(ambient);
    if *found == extended {
        return Ok(true);
    }

    Err(RedirectError::SignatureMismatch {
        engine: engine.to_string(),
        role,
        expected: natural.clone(),
        extended,
        found: found.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{FieldOp, InvokeKind};

    fn sig(desc: &str) -> Signature {
        Signature::parse(desc).unwrap()
    }

    #[test]
    fn test_natural_invoke_signature() {
        let virt = MethodInsn::new(InvokeKind::Virtual, "foo/O", "bar", sig("(II)Z"));
        assert_eq!(natural_invoke_signature(&virt), sig("(Lfoo/O;II)Z"));

        let stat = MethodInsn::new(InvokeKind::Static, "foo/O", "bar", sig("(II)Z"));
        assert_eq!(natural_invoke_signature(&stat), sig("(II)Z"));
    }

    #[test]
    fn test_natural_field_signatures() {
        let stat = FieldInsn::new(FieldOp::GetStatic, "foo/O", "x", ValueType::Long);
        let inst = FieldInsn::new(FieldOp::PutField, "foo/O", "x", ValueType::Long);
        assert_eq!(natural_getter_signature(&stat), sig("()J"));
        assert_eq!(natural_getter_signature(&inst), sig("(Lfoo/O;)J"));
        assert_eq!(natural_setter_signature(&stat), sig("(J)V"));
        assert_eq!(natural_setter_signature(&inst), sig("(Lfoo/O;J)V"));
    }

    #[test]
    fn test_check_signature_forms() {
        let natural = sig("(Lfoo/O;II)Z");
        let ambient = || [ValueType::object("t/T1"), ValueType::object("t/T2")];

        assert_eq!(
            check_signature("h", HandlerRole::Invoke, &natural, &natural, ambient()),
            Ok(false)
        );
        assert_eq!(
            check_signature(
                "h",
                HandlerRole::Invoke,
                &sig("(Lfoo/O;IILt/T1;Lt/T2;)Z"),
                &natural,
                ambient()
            ),
            Ok(true)
        );

        // a prefix of the ambient arguments is not accepted
        let err = check_signature(
            "h",
            HandlerRole::Invoke,
            &sig("(Lfoo/O;IILt/T1;)Z"),
            &natural,
            ambient(),
        )
        .unwrap_err();
        match err {
            RedirectError::SignatureMismatch { expected, extended, found, .. } => {
                assert_eq!(expected, natural);
                assert_eq!(extended, sig("(Lfoo/O;IILt/T1;Lt/T2;)Z"));
                assert_eq!(found, sig("(Lfoo/O;IILt/T1;)Z"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_return_type_must_match() {
        let natural = sig("()J");
        assert!(check_signature("h", HandlerRole::Getter, &sig("()I"), &natural, Vec::new()).is_err());
    }
}
