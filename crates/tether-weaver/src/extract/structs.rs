//! Struct extraction

use super::members::MemberDecl;
use super::{member_symbol, Extractor};
use crate::category::StructRepr;
use crate::diagnostic::{codes, Diagnostic};
use crate::model::{MemberOrigin, StructBinding};
use crate::names::{self, attrs};
use tether_bytecode::{TypeDef, TypeSig};

impl<'c, 'a> Extractor<'c, 'a> {
    pub(super) fn extract_struct(&mut self, index: usize, def: &TypeDef) -> Option<StructBinding> {
        let ctx = self.ctx;
        let errors_before = self.diagnostics.error_count();

        if ctx.names.has(&def.attributes, attrs::BLITTABLE) {
            self.report(
                Diagnostic::error(format!(
                    "struct '{}' declares Blittable, which is computed by the weaver",
                    def.full_name()
                ))
                .with_code(codes::STRUCT_DECLARES_BLITTABLE)
                .at_symbol(def.full_name())
                .with_location(def.source.clone())
                .with_help("remove the Blittable annotation"),
            );
        }

        for property in &def.properties {
            if ctx.names.has(&property.attributes, attrs::NATIVE_PROPERTY) {
                self.report(
                    Diagnostic::error(format!(
                        "struct property '{}' is exposed; structs must expose plain fields",
                        property.name
                    ))
                    .with_code(codes::STRUCT_ACCESSOR_MEMBER)
                    .at_symbol(member_symbol(def, &property.name))
                    .with_location(property.source.clone().or_else(|| def.source.clone())),
                );
            }
        }

        self.check_stray_functions(def);

        let mut members = Vec::new();
        for (field_index, field) in def.fields.iter().enumerate() {
            if !ctx.names.has(&field.attributes, attrs::NATIVE_PROPERTY) {
                continue;
            }
            if field.is_static() {
                self.report_static_member(def, &field.name, field.source.clone());
                continue;
            }
            let decl = MemberDecl {
                name: &field.name,
                ty: &field.ty,
                access: field.access,
                attributes: &field.attributes,
                origin: MemberOrigin::Field(field_index),
                location: field.source.clone(),
            };
            if let Some(member) = self.extract_member(def, decl) {
                self.check_member_rules(def, &member);
                members.push(member);
            }
        }

        let blittable = self.classifier.struct_repr(def) == Some(StructRepr::Blittable);
        if !blittable {
            self.check_marshal_members(def);
        }

        if self.diagnostics.error_count() > errors_before {
            return None;
        }
        Some(StructBinding {
            name: def.type_name(),
            native_name: ctx.names.native_type_name(def, attrs::NATIVE_STRUCT),
            type_index: index,
            members,
            blittable,
            location: def.source.clone(),
        })
    }

    /// Generated marshaling members must not already exist
    fn check_marshal_members(&mut self, def: &TypeDef) {
        let conflicts = def.methods.iter().filter(|m| {
            let native_ctor = m.is_constructor()
                && m.params.len() == 1
                && m.params[0].ty == TypeSig::IntPtr;
            native_ctor || m.name == names::TO_NATIVE
        });
        let found: Vec<_> = conflicts
            .map(|m| {
                Diagnostic::error(format!(
                    "struct '{}' already declares '{}', which the weaver generates",
                    def.full_name(),
                    m.name
                ))
                .with_code(codes::STRUCT_MARSHAL_CONFLICT)
                .at_symbol(member_symbol(def, &m.name))
                .with_location(m.source.clone().or_else(|| def.source.clone()))
            })
            .collect();
        self.diagnostics.extend(found);
    }

    pub(super) fn report_static_member(
        &mut self,
        def: &TypeDef,
        member: &str,
        location: Option<tether_bytecode::SourceLocation>,
    ) {
        self.report(
            Diagnostic::error(format!("static member '{}' cannot be exposed", member))
                .with_code(codes::STATIC_MEMBER)
                .at_symbol(member_symbol(def, member))
                .with_location(location.or_else(|| def.source.clone())),
        );
    }
}
