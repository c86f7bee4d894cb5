//! Rule: private-access (E4002)
//!
//! A private member cannot be visible to the editor or to native scripting
//! unless it opts in with `AllowPrivateAccess`.

use crate::diagnostic::{codes, Diagnostic};
use crate::flags::PropertyFlags;
use crate::model::MemberBinding;
use crate::rules::{MemberRule, RuleContext, RuleMeta};
use tether_bytecode::Access;

pub struct PrivateAccess;

static META: RuleMeta = RuleMeta {
    name: "private-access",
    codes: &[codes::PRIVATE_EXPOSURE],
    description: "Disallow exposing private members without an explicit override",
};

impl MemberRule for PrivateAccess {
    fn meta(&self) -> &RuleMeta {
        &META
    }

    fn check_member(&self, member: &MemberBinding, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let visible = member
            .flags
            .intersects(PropertyFlags::EDITOR_VISIBLE | PropertyFlags::SCRIPT_VISIBLE);
        if member.access != Access::Private || !visible || member.allow_private_access {
            return vec![];
        }
        vec![Diagnostic::error(format!(
            "private member '{}' is marked externally visible",
            member.name
        ))
        .with_code(codes::PRIVATE_EXPOSURE)
        .at_symbol(ctx.symbol(&member.name))
        .with_location(member.location.clone())
        .with_help("make the member public or set AllowPrivateAccess = true")]
    }
}
