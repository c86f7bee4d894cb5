//! Rule: category-label (E4003, E4004)
//!
//! Editor- or script-visible members and callable functions need a category
//! label, and a category label needs one of those purposes.

use crate::diagnostic::{codes, Diagnostic};
use crate::flags::{FunctionFlags, PropertyFlags};
use crate::model::{FunctionBinding, MemberBinding};
use crate::rules::{MemberRule, RuleContext, RuleMeta};
use tether_bytecode::SourceLocation;

pub struct CategoryLabel;

static META: RuleMeta = RuleMeta {
    name: "category-label",
    codes: &[codes::MISSING_CATEGORY, codes::UNUSED_CATEGORY],
    description: "Require a category label exactly when a member is visible or callable",
};

fn check(
    name: &str,
    visible: bool,
    label: Option<&str>,
    location: Option<&SourceLocation>,
    ctx: &RuleContext<'_>,
) -> Vec<Diagnostic> {
    let has_label = label.is_some_and(|l| !l.is_empty());
    let diagnostic = match (visible, has_label) {
        (true, false) => Diagnostic::error(format!(
            "'{}' is visible to the editor or scripting but declares no category",
            name
        ))
        .with_code(codes::MISSING_CATEGORY),
        (false, true) => Diagnostic::error(format!(
            "'{}' declares a category but is neither visible nor callable",
            name
        ))
        .with_code(codes::UNUSED_CATEGORY),
        _ => return vec![],
    };
    vec![diagnostic
        .at_symbol(ctx.symbol(name))
        .with_location(location.cloned())]
}

impl MemberRule for CategoryLabel {
    fn meta(&self) -> &RuleMeta {
        &META
    }

    fn check_member(&self, member: &MemberBinding, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let visible = member
            .flags
            .intersects(PropertyFlags::EDITOR_VISIBLE | PropertyFlags::SCRIPT_VISIBLE);
        check(
            &member.name,
            visible,
            member.category_label.as_deref(),
            member.location.as_ref(),
            ctx,
        )
    }

    fn check_function(
        &self,
        function: &FunctionBinding,
        ctx: &RuleContext<'_>,
    ) -> Vec<Diagnostic> {
        check(
            &function.name,
            function.flags.contains(FunctionFlags::CALLABLE),
            function.category_label.as_deref(),
            function.location.as_ref(),
            ctx,
        )
    }
}
