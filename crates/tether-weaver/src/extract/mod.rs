//! Metadata extraction
//!
//! Walks a decoded module, finds annotated types and builds the binding
//! model. Every validation failure is accumulated; extraction never stops at
//! the first problem so a single run reports everything wrong with a module.

mod classes;
mod enums;
mod functions;
mod members;
mod structs;

use crate::classify::Classifier;
use crate::context::ProcessingContext;
use crate::diagnostic::{codes, Diagnostic, Diagnostics};
use crate::manifest::NativeKindOfType;
use crate::model::{AnnotatedType, ModuleBindings};
use crate::names::attrs;
use crate::rules::{all_rules, MemberRule};
use tether_bytecode::{Module, TypeDef, TypeKind};
use tracing::debug;

/// Result of extracting one module
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub bindings: ModuleBindings,
    pub diagnostics: Diagnostics,
}

/// Builds the binding model of one module
pub struct Extractor<'c, 'a> {
    ctx: &'a ProcessingContext,
    module: &'a Module,
    classifier: &'c Classifier<'a>,
    rules: Vec<Box<dyn MemberRule>>,
    diagnostics: Diagnostics,
}

impl<'c, 'a> Extractor<'c, 'a> {
    pub fn new(ctx: &'a ProcessingContext, module: &'a Module, classifier: &'c Classifier<'a>) -> Self {
        Self {
            ctx,
            module,
            classifier,
            rules: all_rules(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Extract every annotated type
    pub fn run(mut self) -> Extraction {
        let mut bindings = ModuleBindings::default();
        let module = self.module;

        for (index, def) in module.types.iter().enumerate() {
            if self.ctx.is_wrapper_only(&def.name) {
                debug!(ty = %def.full_name(), "skipping wrapper-only type");
                continue;
            }
            if let Some(annotated) = self.extract_type(index, def) {
                debug!(
                    ty = %def.full_name(),
                    kind = annotated.kind_label(),
                    "extracted annotated type"
                );
                self.check_collision(&annotated, def);
                bindings.types.push(annotated);
            }
        }

        Extraction {
            bindings,
            diagnostics: self.diagnostics,
        }
    }

    fn extract_type(&mut self, index: usize, def: &'a TypeDef) -> Option<AnnotatedType> {
        let names = &self.ctx.names;
        match def.kind {
            TypeKind::Enum if names.has(&def.attributes, attrs::NATIVE_ENUM) => {
                self.extract_enum(index, def).map(AnnotatedType::Enum)
            }
            TypeKind::Struct if names.has(&def.attributes, attrs::NATIVE_STRUCT) => {
                self.extract_struct(index, def).map(AnnotatedType::Struct)
            }
            TypeKind::Class if names.has(&def.attributes, attrs::NATIVE_CLASS) => {
                self.extract_class(index, def).map(AnnotatedType::Class)
            }
            _ => {
                self.check_stray_functions(def);
                None
            }
        }
    }

    /// Exposed functions are only supported on annotated classes
    fn check_stray_functions(&mut self, def: &TypeDef) {
        for method in &def.methods {
            if self.ctx.names.has(&method.attributes, attrs::NATIVE_FUNCTION) {
                self.report(
                    Diagnostic::error(format!(
                        "function '{}' is exposed but '{}' is not an annotated class",
                        method.name,
                        def.full_name()
                    ))
                    .with_code(codes::FUNCTION_OUTSIDE_CLASS)
                    .at_symbol(member_symbol(def, &method.name))
                    .with_location(method.source.clone().or_else(|| def.source.clone())),
                );
            }
        }
    }

    fn check_collision(&mut self, annotated: &AnnotatedType, def: &TypeDef) {
        let kind = match annotated {
            AnnotatedType::Class(_) => NativeKindOfType::Class,
            AnnotatedType::Struct(_) => NativeKindOfType::Struct,
            AnnotatedType::Enum(_) => NativeKindOfType::Enum,
        };
        if self.ctx.manifest.contains(kind, annotated.native_name()) {
            self.report(
                Diagnostic::error(format!(
                    "native {} name '{}' is already used by an existing native type",
                    annotated.kind_label(),
                    annotated.native_name()
                ))
                .with_code(codes::NATIVE_NAME_COLLISION)
                .at_symbol(def.full_name())
                .with_location(def.source.clone())
                .with_help("rename the type or set Name on its annotation"),
            );
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Symbol of a member, e.g. `Game.Pawn::Health`
pub(crate) fn member_symbol(owner: &TypeDef, member: &str) -> String {
    format!("{}::{}", owner.full_name(), member)
}

/// Extract the binding model of one module
pub fn extract<'a>(
    ctx: &'a ProcessingContext,
    module: &'a Module,
    classifier: &Classifier<'a>,
) -> Extraction {
    Extractor::new(ctx, module, classifier).run()
}
