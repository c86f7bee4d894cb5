//! Rule: replication-condition (E4005, E4006)
//!
//! Replicated members must declare a replication condition. A custom
//! condition must name a parameterless method on the same type returning
//! bool.

use crate::diagnostic::{codes, Diagnostic};
use crate::flags::{PropertyFlags, ReplicationCondition};
use crate::model::MemberBinding;
use crate::rules::{MemberRule, RuleContext, RuleMeta};
use tether_bytecode::TypeSig;

pub struct ReplicationRequirements;

static META: RuleMeta = RuleMeta {
    name: "replication-condition",
    codes: &[
        codes::MISSING_REPLICATION_CONDITION,
        codes::INVALID_CUSTOM_CONDITION,
    ],
    description: "Require a valid replication condition on replicated members",
};

impl MemberRule for ReplicationRequirements {
    fn meta(&self) -> &RuleMeta {
        &META
    }

    fn check_member(&self, member: &MemberBinding, ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        if !member.flags.contains(PropertyFlags::REPLICATED) {
            return vec![];
        }
        let symbol = ctx.symbol(&member.name);

        let condition = match (member.replication, member.invalid_replication) {
            (Some(condition), _) => condition,
            (None, Some(raw)) => {
                return vec![Diagnostic::error(format!(
                    "'{}' has an unknown replication condition value {}",
                    member.name, raw
                ))
                .with_code(codes::MISSING_REPLICATION_CONDITION)
                .at_symbol(symbol)
                .with_location(member.location.clone())]
            }
            (None, None) => {
                return vec![Diagnostic::error(format!(
                    "replicated member '{}' declares no replication condition",
                    member.name
                ))
                .with_code(codes::MISSING_REPLICATION_CONDITION)
                .at_symbol(symbol)
                .with_location(member.location.clone())
                .with_help("set Condition on the property annotation")]
            }
        };

        if condition != ReplicationCondition::Custom {
            return vec![];
        }
        let method = member.custom_condition.as_deref().unwrap_or("");
        if method.is_empty() {
            return vec![Diagnostic::error(format!(
                "'{}' uses a custom replication condition but names no condition method",
                member.name
            ))
            .with_code(codes::INVALID_CUSTOM_CONDITION)
            .at_symbol(symbol)
            .with_location(member.location.clone())];
        }
        if ctx.has_method(method, &[], &TypeSig::Bool) {
            return vec![];
        }
        vec![Diagnostic::error(format!(
            "custom replication condition method '{}' not found on '{}'",
            method, ctx.owner_symbol
        ))
        .with_code(codes::INVALID_CUSTOM_CONDITION)
        .at_symbol(symbol)
        .with_location(member.location.clone())
        .with_note("the condition method must take no parameters and return bool")]
    }
}
