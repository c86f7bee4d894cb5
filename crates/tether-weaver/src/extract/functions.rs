//! Exposed function extraction

use super::members::MemberDecl;
use super::{member_symbol, Extractor};
use crate::category::BindingCategory;
use crate::diagnostic::{codes, Diagnostic};
use crate::flags::{fold_function_flags, FunctionFlags, PropertyFlags};
use crate::model::{FunctionBinding, MemberBinding, MemberOrigin};
use crate::names::{self, attrs};
use tether_bytecode::{Access, AttrValue, MethodDef, TypeDef, TypeSig};

impl<'c, 'a> Extractor<'c, 'a> {
    pub(super) fn extract_function(
        &mut self,
        def: &TypeDef,
        method_index: usize,
        method: &MethodDef,
    ) -> Option<FunctionBinding> {
        let ctx = self.ctx;
        let attr = ctx.names.find(&method.attributes, attrs::NATIVE_FUNCTION)?;
        let symbol = member_symbol(def, &method.name);
        let location = method.source.clone().or_else(|| def.source.clone());
        let errors_before = self.diagnostics.error_count();
        let flags = fold_function_flags(attr, method.is_static());

        if method.body.is_none() || method.is_abstract() {
            self.report(
                Diagnostic::error(format!("exposed function '{}' has no body", method.name))
                    .with_code(codes::FUNCTION_WITHOUT_BODY)
                    .at_symbol(symbol.clone())
                    .with_location(location.clone()),
            );
        }

        if flags.contains(FunctionFlags::STATIC) && flags.contains(FunctionFlags::NATIVE_EVENT) {
            self.report(
                Diagnostic::error(format!(
                    "static function '{}' cannot be overridable from native code",
                    method.name
                ))
                .with_code(codes::INVALID_FUNCTION_FLAGS)
                .at_symbol(symbol.clone())
                .with_location(location.clone()),
            );
        }

        let generated_methods = [names::implementation(&method.name), names::invoker(&method.name)];
        let generated_fields = [
            names::function_slot(&method.name),
            names::params_size_slot(&method.name),
        ];
        let conflict = generated_methods
            .iter()
            .find(|n| def.find_method(n).is_some())
            .or_else(|| generated_fields.iter().find(|n| def.find_field(n).is_some()));
        if let Some(conflict) = conflict {
            self.report(
                Diagnostic::error(format!(
                    "'{}' conflicts with a member generated for exposed function '{}'",
                    conflict, method.name
                ))
                .with_code(codes::GENERATED_NAME_CONFLICT)
                .at_symbol(symbol.clone())
                .with_location(location.clone()),
            );
        }

        if flags.contains(FunctionFlags::WITH_VALIDATION) {
            let validate = names::validate(&method.name);
            let found = def.methods.iter().any(|m| {
                m.name == validate
                    && m.return_type == TypeSig::Bool
                    && m.is_static() == method.is_static()
                    && m.params.len() == method.params.len()
                    && m.params.iter().zip(&method.params).all(|(a, b)| a.ty == b.ty)
            });
            if !found {
                self.report(
                    Diagnostic::error(format!(
                        "validation method '{}' not found for '{}'",
                        validate, method.name
                    ))
                    .with_code(codes::MISSING_VALIDATE_METHOD)
                    .at_symbol(symbol.clone())
                    .with_location(location.clone())
                    .with_note("it must take the same parameters and return bool"),
                );
            }
        }

        let mut params = Vec::new();
        for (index, param) in method.params.iter().enumerate() {
            let decl = MemberDecl {
                name: &param.name,
                ty: &param.ty,
                access: Access::Public,
                attributes: &param.attributes,
                origin: MemberOrigin::Param(index),
                location: location.clone(),
            };
            let Some(mut binding) = self.extract_member(def, decl) else {
                continue;
            };
            binding.flags.insert(PropertyFlags::PARAM);
            if param.is_out() {
                binding.flags.insert(PropertyFlags::OUT_PARAM);
            } else if param.ty.is_by_ref() {
                binding.flags.insert(PropertyFlags::REFERENCE_PARAM);
            }
            if !self.check_parameter_category(&binding, &symbol) {
                continue;
            }
            params.push(binding);
        }

        let mut return_value = None;
        if !method.return_type.is_void() {
            let decl = MemberDecl {
                name: names::RETURN_VALUE,
                ty: &method.return_type,
                access: Access::Public,
                attributes: &[],
                origin: MemberOrigin::Return,
                location: location.clone(),
            };
            if let Some(mut binding) = self.extract_member(def, decl) {
                binding.flags.insert(PropertyFlags::PARAM | PropertyFlags::RETURN_PARAM);
                if self.check_parameter_category(&binding, &symbol) {
                    return_value = Some(binding);
                }
            }
        }

        if self.diagnostics.error_count() > errors_before {
            return None;
        }

        let native_name = attr
            .named_arg(attrs::ARG_NAME)
            .and_then(AttrValue::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(&method.name)
            .to_string();
        let function = FunctionBinding {
            name: method.name.clone(),
            native_name,
            method_index,
            flags,
            access: method.access,
            category_label: attr
                .named_arg(attrs::ARG_CATEGORY)
                .and_then(AttrValue::as_str)
                .map(str::to_string),
            params,
            return_value,
            location,
        };
        self.check_function_rules(def, &function);
        Some(function)
    }

    /// Fixed arrays cannot cross a function boundary
    fn check_parameter_category(&mut self, binding: &MemberBinding, function_symbol: &str) -> bool {
        if !matches!(binding.category, BindingCategory::FixedArray { .. }) {
            return true;
        }
        self.report(
            Diagnostic::error(format!(
                "fixed array '{}' cannot be passed to or returned from an exposed function",
                binding.name
            ))
            .with_code(codes::FIXED_ARRAY_PARAMETER)
            .at_symbol(function_symbol.to_string())
            .with_location(binding.location.clone()),
        );
        false
    }
}
