//! Per-module pipeline
//!
//! extract -> order -> hash + rewrite -> report. Validation problems end the
//! run for the module with [`WeaveOutcome::Rejected`]; engine defects surface
//! as [`WeaveError`].

use crate::classify::Classifier;
use crate::context::ProcessingContext;
use crate::diagnostic::Diagnostics;
use crate::error::{WeaveError, WeaveResult};
use crate::extract::extract;
use crate::hash::StructuralHasher;
use crate::model::{AnnotatedType, ModuleBindings};
use crate::order::{order_classes, order_structs, ProcessingLedger};
use crate::package::{TypeReport, WeaveReport};
use crate::rewrite::Rewriter;
use rustc_hash::FxHashMap;
use tether_bytecode::module::flags;
use tether_bytecode::{Module, TypeName};
use tracing::{debug, info};

/// A successfully rewritten module
#[derive(Debug)]
pub struct WovenModule {
    pub module: Module,
    pub report: WeaveReport,
    /// Warnings collected along the way
    pub diagnostics: Diagnostics,
}

/// Result of weaving one module
#[derive(Debug)]
pub enum WeaveOutcome {
    /// Nothing annotated, or the module was already woven
    NoBindings,
    Rewritten(WovenModule),
    /// Validation failed; no output may be produced
    Rejected(Diagnostics),
}

/// Runs the weaving pipeline over modules, one at a time
pub struct Weaver<'a> {
    ctx: &'a ProcessingContext,
}

impl<'a> Weaver<'a> {
    pub fn new(ctx: &'a ProcessingContext) -> Self {
        Self { ctx }
    }

    pub fn weave(&self, module: &Module) -> WeaveResult<WeaveOutcome> {
        let name = module.metadata.name.as_str();
        if module.is_woven() {
            info!(module = name, "module already woven, skipping");
            return Ok(WeaveOutcome::NoBindings);
        }

        let classifier = Classifier::new(self.ctx, module);
        let extraction = extract(self.ctx, module, &classifier);
        if extraction.diagnostics.has_errors() {
            info!(
                module = name,
                errors = extraction.diagnostics.error_count(),
                "module rejected during extraction"
            );
            return Ok(WeaveOutcome::Rejected(extraction.diagnostics));
        }
        let bindings = extraction.bindings;
        let mut diagnostics = extraction.diagnostics;
        if bindings.is_empty() {
            info!(module = name, "no bindings found");
            return Ok(WeaveOutcome::NoBindings);
        }

        let structs = order_structs(&bindings)?;
        let classes = order_classes(&bindings)?;
        debug!(
            module = name,
            structs = structs.len(),
            classes = classes.len(),
            "dependency order computed"
        );

        let mut ledger = ProcessingLedger::new();
        let mut hasher = StructuralHasher::new();
        let mut rewriter = Rewriter::new(self.ctx, module, &bindings)?;

        for ty in &structs {
            ledger.mark(ty)?;
            let binding = bindings
                .find_struct(ty)
                .ok_or_else(|| missing_binding(ty))?;
            let hash = hasher.hash_struct(binding, &bindings)?;
            debug!(ty = %ty, %hash, blittable = binding.blittable, "rewriting struct");
            rewriter.rewrite_struct(binding)?;
        }
        for ty in &classes {
            ledger.mark(ty)?;
            let binding = bindings.find_class(ty).ok_or_else(|| missing_binding(ty))?;
            let hashes = hasher.hash_class(binding, module, &bindings)?;
            debug!(ty = %ty, hash = %hashes.own, "rewriting class");
            rewriter.rewrite_class(binding)?;
        }
        let mut enum_hashes = FxHashMap::default();
        for binding in bindings.enums() {
            ledger.mark(&binding.name)?;
            enum_hashes.insert(binding.name.clone(), hasher.hash_enum(binding)?);
        }

        let output = rewriter.finish();
        diagnostics.extend(output.diagnostics.into_vec());
        if diagnostics.has_errors() {
            info!(
                module = name,
                errors = diagnostics.error_count(),
                "module rejected during rewriting"
            );
            return Ok(WeaveOutcome::Rejected(diagnostics));
        }

        let mut woven = output.module;
        woven.flags |= flags::WOVEN;
        let report = build_report(name, &bindings, &hasher, &enum_hashes)?;
        info!(module = name, types = report.types.len(), "module woven");
        Ok(WeaveOutcome::Rewritten(WovenModule {
            module: woven,
            report,
            diagnostics,
        }))
    }
}

fn missing_binding(ty: &TypeName) -> WeaveError {
    WeaveError::Inconsistent(format!("ordered type '{}' has no binding", ty))
}

fn build_report(
    module: &str,
    bindings: &ModuleBindings,
    hasher: &StructuralHasher,
    enum_hashes: &FxHashMap<TypeName, String>,
) -> WeaveResult<WeaveReport> {
    let mut types = Vec::with_capacity(bindings.len());
    for annotated in &bindings.types {
        let missing = || WeaveError::MissingDependencyHash {
            dependent: module.to_string(),
            dependency: annotated.name().full_name(),
        };
        let report = match annotated {
            AnnotatedType::Class(class) => {
                let hashes = hasher.class_hashes(&class.name).ok_or_else(missing)?;
                TypeReport::class(class, hashes)
            }
            AnnotatedType::Struct(binding) => {
                let hash = hasher.struct_hash(&binding.name).ok_or_else(missing)?;
                TypeReport::structure(binding, hash)
            }
            AnnotatedType::Enum(binding) => {
                let hash = enum_hashes.get(&binding.name).ok_or_else(missing)?;
                TypeReport::enumeration(binding, hash)
            }
        };
        types.push(report);
    }
    Ok(WeaveReport {
        module: module.to_string(),
        types,
    })
}
