//! Class extraction

use super::members::MemberDecl;
use super::{member_symbol, Extractor};
use crate::diagnostic::{codes, Diagnostic};
use crate::model::{ClassBinding, MemberOrigin};
use crate::names::attrs;
use tether_bytecode::{TypeDef, TypeSig};

/// Instance constructors grouped by shape
#[derive(Debug, Default)]
struct ConstructorShapes {
    construction: Vec<usize>,
    rehydration: Vec<usize>,
    unsupported: Vec<usize>,
}

impl ConstructorShapes {
    fn of(def: &TypeDef) -> Self {
        let mut shapes = Self::default();
        for (index, ctor) in def.constructors() {
            match ctor.params.as_slice() {
                [] => shapes.construction.push(index),
                [param] if param.ty == TypeSig::IntPtr => shapes.rehydration.push(index),
                _ => shapes.unsupported.push(index),
            }
        }
        shapes
    }
}

impl<'c, 'a> Extractor<'c, 'a> {
    pub(super) fn extract_class(&mut self, index: usize, def: &TypeDef) -> Option<ClassBinding> {
        let ctx = self.ctx;
        let resolver = *self.classifier.resolver();
        let name = def.type_name();

        if !resolver.derives_from_root(&name) {
            self.report(
                Diagnostic::error(format!(
                    "class '{}' is annotated but does not derive from '{}'",
                    name,
                    ctx.names.native_root()
                ))
                .with_code(codes::NOT_NATIVE_DERIVED)
                .at_symbol(name.full_name())
                .with_location(def.source.clone()),
            );
            return None;
        }

        let errors_before = self.diagnostics.error_count();
        let shapes = ConstructorShapes::of(def);
        if !def.is_abstract() {
            self.check_constructors(def, &shapes);
        }

        let mut members = Vec::new();
        for (property_index, property) in def.properties.iter().enumerate() {
            if !ctx.names.has(&property.attributes, attrs::NATIVE_PROPERTY) {
                continue;
            }
            let location = property.source.clone();
            let getter = property
                .getter
                .and_then(|g| def.methods.get(g as usize));
            let Some(getter) = getter else {
                self.report(
                    Diagnostic::error(format!(
                        "exposed property '{}' has no getter",
                        property.name
                    ))
                    .with_code(codes::PROPERTY_WITHOUT_GETTER)
                    .at_symbol(member_symbol(def, &property.name))
                    .with_location(location.or_else(|| def.source.clone())),
                );
                continue;
            };
            if getter.is_static() {
                self.report_static_member(def, &property.name, location);
                continue;
            }
            let decl = MemberDecl {
                name: &property.name,
                ty: &property.ty,
                access: getter.access,
                attributes: &property.attributes,
                origin: MemberOrigin::Property(property_index),
                location: location.or_else(|| getter.source.clone()),
            };
            if let Some(member) = self.extract_member(def, decl) {
                self.check_member_rules(def, &member);
                members.push(member);
            }
        }

        for field in &def.fields {
            if ctx.names.has(&field.attributes, attrs::NATIVE_PROPERTY) {
                self.report(
                    Diagnostic::error(format!(
                        "class field '{}' is exposed; classes must expose properties",
                        field.name
                    ))
                    .with_code(codes::EXPOSED_CLASS_FIELD)
                    .at_symbol(member_symbol(def, &field.name))
                    .with_location(field.source.clone().or_else(|| def.source.clone()))
                    .with_help("turn the field into an auto-property"),
                );
            }
        }

        let mut functions = Vec::new();
        for (method_index, method) in def.methods.iter().enumerate() {
            if let Some(function) = self.extract_function(def, method_index, method) {
                functions.push(function);
            }
        }

        if self.diagnostics.error_count() > errors_before {
            return None;
        }
        Some(ClassBinding {
            name,
            native_name: ctx.names.native_type_name(def, attrs::NATIVE_CLASS),
            type_index: index,
            base: resolver.base_of(&def.type_name()),
            is_abstract: def.is_abstract(),
            construction_ctor: single(&shapes.construction),
            rehydration_ctor: single(&shapes.rehydration),
            members,
            functions,
            location: def.source.clone(),
        })
    }

    /// Reports the first constructor problem of a concrete class
    fn check_constructors(&mut self, def: &TypeDef, shapes: &ConstructorShapes) {
        let symbol = def.full_name();
        let ctor_location = |index: usize| {
            def.methods
                .get(index)
                .and_then(|m| m.source.clone())
                .or_else(|| def.source.clone())
        };

        let diagnostic = match (shapes.rehydration.as_slice(), shapes.construction.as_slice()) {
            ([], _) => Diagnostic::error(format!(
                "rehydration constructor not found on '{}'",
                symbol
            ))
            .with_code(codes::MISSING_REHYDRATION_CTOR)
            .with_location(def.source.clone())
            .with_help("add a constructor taking a single native pointer (nint)"),
            ([_, second, ..], _) => Diagnostic::error(format!(
                "'{}' declares more than one rehydration constructor",
                symbol
            ))
            .with_code(codes::DUPLICATE_CTOR)
            .with_location(ctor_location(*second)),
            ([_], []) => Diagnostic::error(format!(
                "construction constructor not found on '{}'",
                symbol
            ))
            .with_code(codes::MISSING_CONSTRUCTION_CTOR)
            .with_location(def.source.clone())
            .with_help("add a parameterless constructor"),
            ([_], [_, second, ..]) => Diagnostic::error(format!(
                "'{}' declares more than one construction constructor",
                symbol
            ))
            .with_code(codes::DUPLICATE_CTOR)
            .with_location(ctor_location(*second)),
            ([_], [_]) => match shapes.unsupported.first() {
                Some(&index) => Diagnostic::error(format!(
                    "'{}' declares a constructor with an unsupported signature",
                    symbol
                ))
                .with_code(codes::UNSUPPORTED_CTOR)
                .with_location(ctor_location(index))
                .with_note("only a parameterless and a native-pointer constructor are allowed"),
                None => return,
            },
        };
        self.report(diagnostic.at_symbol(symbol));
    }
}

fn single(indices: &[usize]) -> Option<usize> {
    match indices {
        [index] => Some(*index),
        _ => None,
    }
}
