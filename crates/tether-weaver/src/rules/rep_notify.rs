//! Rule: rep-notify (E4007)
//!
//! A change-notification method must take no parameters or a single
//! parameter of the member's value type.

use crate::diagnostic::{codes, Diagnostic};
use crate::model::MemberBinding;
use crate::rules::{MemberRule, RuleContext, RuleMeta};

pub struct RepNotify;

static META: RuleMeta = RuleMeta {
    name: "rep-notify",
    codes: &[codes::INVALID_REP_NOTIFY],
    description: "Require change-notification methods to exist with a compatible shape",
};

impl MemberRule for RepNotify {
    fn meta(&self) -> &RuleMeta {
        &META
    }

    fn check_member(&self, member: &MemberBinding, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let notify = match member.rep_notify.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return vec![],
        };
        let compatible = ctx.owner.methods.iter().any(|m| {
            m.name == notify
                && !m.is_static()
                && match m.params.as_slice() {
                    [] => true,
                    [param] => param.ty == member.ty,
                    _ => false,
                }
        });
        if compatible {
            return vec![];
        }
        vec![Diagnostic::error(format!(
            "notification method '{}' for '{}' not found or has an incompatible signature",
            notify, member.name
        ))
        .with_code(codes::INVALID_REP_NOTIFY)
        .at_symbol(ctx.symbol(&member.name))
        .with_location(member.location.clone())
        .with_note(format!(
            "expected no parameters or a single '{}' parameter",
            member.ty
        ))]
    }
}
