//! Member consistency rules
//!
//! Each rule implements [`MemberRule`], provides static metadata and checks
//! extracted member or function bindings against the owning type. Rules never
//! stop extraction; their findings are accumulated with everything else.

pub mod category_label;
pub mod private_access;
pub mod rep_notify;
pub mod replication;

use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::model::{FunctionBinding, MemberBinding};
use tether_bytecode::{TypeDef, TypeSig};

/// Static metadata for a rule
pub struct RuleMeta {
    /// Rule name, e.g. "replication-condition"
    pub name: &'static str,
    /// Codes this rule can report
    pub codes: &'static [ErrorCode],
    pub description: &'static str,
}

/// Context passed to each rule
pub struct RuleContext<'a> {
    /// Type declaring the member
    pub owner: &'a TypeDef,
    /// Dotted owner name used in diagnostic symbols
    pub owner_symbol: &'a str,
}

impl RuleContext<'_> {
    /// Symbol of a member of the owner, e.g. `Game.Pawn::Health`
    pub fn symbol(&self, member: &str) -> String {
        format!("{}::{}", self.owner_symbol, member)
    }

    /// Check whether the owner declares a method with the given shape
    pub fn has_method(&self, name: &str, params: &[TypeSig], ret: &TypeSig) -> bool {
        self.owner.methods.iter().any(|m| {
            m.name == name
                && &m.return_type == ret
                && m.params.len() == params.len()
                && m.params.iter().zip(params).all(|(p, ty)| &p.ty == ty)
        })
    }
}

/// Trait every member rule implements
///
/// Default implementations report nothing, so rules only override what
/// they check.
pub trait MemberRule: Send + Sync {
    fn meta(&self) -> &RuleMeta;

    /// Check an exposed property or field
    fn check_member(&self, _member: &MemberBinding, _ctx: &RuleContext<'_>) -> Vec<Diagnostic> {
        vec![]
    }

    /// Check an exposed function
    fn check_function(
        &self,
        _function: &FunctionBinding,
        _ctx: &RuleContext<'_>,
    ) -> Vec<Diagnostic> {
        vec![]
    }
}

/// All member rules, in reporting order
pub fn all_rules() -> Vec<Box<dyn MemberRule>> {
    vec![
        Box::new(private_access::PrivateAccess),
        Box::new(category_label::CategoryLabel),
        Box::new(replication::ReplicationRequirements),
        Box::new(rep_notify::RepNotify),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_names_unique() {
        let rules = all_rules();
        let names: HashSet<_> = rules.iter().map(|r| r.meta().name).collect();
        assert_eq!(names.len(), rules.len());
        assert!(rules.iter().all(|r| !r.meta().codes.is_empty()));
    }
}
