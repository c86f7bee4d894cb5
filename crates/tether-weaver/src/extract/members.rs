//! Member bindings: classification, flag folding and rule checks

use super::{member_symbol, Extractor};
use crate::classify::MemberShape;
use crate::flags::{fold_property_flags, ReplicationCondition};
use crate::model::{FunctionBinding, MemberBinding, MemberOrigin};
use crate::names::attrs;
use crate::rules::RuleContext;
use tether_bytecode::{Access, AttrValue, Attribute, SourceLocation, TypeDef, TypeSig};

/// Declared shape of a member before classification
pub(super) struct MemberDecl<'d> {
    pub name: &'d str,
    pub ty: &'d TypeSig,
    pub access: Access,
    pub attributes: &'d [Attribute],
    pub origin: MemberOrigin,
    pub location: Option<SourceLocation>,
}

fn string_arg(attr: Option<&Attribute>, name: &str) -> Option<String> {
    attr.and_then(|a| a.named_arg(name))
        .and_then(AttrValue::as_str)
        .map(str::to_string)
}

impl<'c, 'a> Extractor<'c, 'a> {
    /// Classify a member and fold its annotations into a binding
    ///
    /// Classification failures are reported and yield `None`.
    pub(super) fn extract_member(
        &mut self,
        owner: &TypeDef,
        decl: MemberDecl<'_>,
    ) -> Option<MemberBinding> {
        let names = &self.ctx.names;
        let attr = names.find(decl.attributes, attrs::NATIVE_PROPERTY);
        let shape = MemberShape::from_attribute(attr);

        let category = match self.classifier.classify(decl.ty.strip_by_ref(), shape) {
            Ok(category) => category,
            Err(err) => {
                let diagnostic = err
                    .into_diagnostic()
                    .at_symbol(member_symbol(owner, decl.name))
                    .with_location(decl.location.clone().or_else(|| owner.source.clone()));
                self.report(diagnostic);
                return None;
            }
        };

        let hash_override = self.classifier.hash_override(&owner.type_name(), &category);
        let mut member = MemberBinding::new(decl.name, decl.ty.clone(), category, decl.origin);
        member.hash_override = hash_override;
        member.access = decl.access;
        member.flags = fold_property_flags(names, decl.attributes);
        member.location = decl.location.or_else(|| owner.source.clone());
        if let Some(native) = string_arg(attr, attrs::ARG_NAME).filter(|n| !n.is_empty()) {
            member.native_name = native;
        }
        member.category_label = string_arg(attr, attrs::ARG_CATEGORY);
        member.rep_notify = string_arg(attr, attrs::ARG_REPLICATED_USING);
        member.custom_condition = string_arg(attr, attrs::ARG_CUSTOM_CONDITION);
        member.allow_private_access = attr
            .and_then(|a| a.named_arg(attrs::ARG_ALLOW_PRIVATE_ACCESS))
            .and_then(AttrValue::as_bool)
            .unwrap_or(false);
        if let Some(raw) = attr
            .and_then(|a| a.named_arg(attrs::ARG_CONDITION))
            .and_then(AttrValue::as_int)
        {
            match ReplicationCondition::from_i64(raw) {
                Some(condition) => member.replication = Some(condition),
                None => member.invalid_replication = Some(raw),
            }
        }
        Some(member)
    }

    /// Run every member rule against an extracted member
    pub(super) fn check_member_rules(&mut self, owner: &TypeDef, member: &MemberBinding) {
        let owner_symbol = owner.full_name();
        let ctx = RuleContext {
            owner,
            owner_symbol: &owner_symbol,
        };
        let found: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check_member(member, &ctx))
            .collect();
        self.diagnostics.extend(found);
    }

    /// Run every member rule against an extracted function
    pub(super) fn check_function_rules(&mut self, owner: &TypeDef, function: &FunctionBinding) {
        let owner_symbol = owner.full_name();
        let ctx = RuleContext {
            owner,
            owner_symbol: &owner_symbol,
        };
        let found: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check_function(function, &ctx))
            .collect();
        self.diagnostics.extend(found);
    }
}
