//! Tether weaver
//!
//! Post-compile rewriting of managed modules so that annotated types are
//! backed by native memory:
//! - **Extraction**: annotated types become a typed binding model (`extract`)
//! - **Classification**: each exposed value gets a binding category (`classify`)
//! - **Ordering and hashing**: embedded structs and base classes first (`order`, `hash`)
//! - **Rewriting**: accessors, constructors and functions are regenerated (`rewrite`, `codegen`)
//! - **Packaging**: woven modules and sidecar reports are written out (`package`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_weaver::{ProcessingContext, WeaveOutcome, Weaver};
//!
//! let ctx = ProcessingContext::with_defaults();
//! match Weaver::new(&ctx).weave(&module)? {
//!     WeaveOutcome::Rewritten(woven) => packager.write(path, &woven)?,
//!     WeaveOutcome::Rejected(diagnostics) => report(&diagnostics),
//!     WeaveOutcome::NoBindings => {}
//! }
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Binding model
// ============================================================================

pub mod category;
pub mod classify;
pub mod extract;
pub mod flags;
pub mod model;
pub mod names;
pub mod resolve;
pub mod rules;

// ============================================================================
// Processing
// ============================================================================

pub mod codegen;
pub mod hash;
pub mod order;
pub mod rewrite;
pub mod runtime;
pub mod weaver;

// ============================================================================
// Environment and reporting
// ============================================================================

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod manifest;
pub mod package;

pub use category::{BindingCategory, StructRepr};
pub use classify::Classifier;
pub use config::{ConfigError, WeaverConfig};
pub use context::ProcessingContext;
pub use diagnostic::{codes, Diagnostic, Diagnostics, ErrorCode, Severity};
pub use error::{WeaveError, WeaveResult};
pub use extract::{extract, Extraction};
pub use hash::{ClassHashSet, StructuralHasher};
pub use manifest::{ManifestError, NativeManifest};
pub use model::{
    AnnotatedType, ClassBinding, EnumBinding, FunctionBinding, MemberBinding, ModuleBindings,
    StructBinding,
};
pub use order::{order_classes, order_structs, ProcessingLedger};
pub use package::{PackagedFiles, Packager, TypeReport, WeaveReport};
pub use resolve::{TypeResolver, TypeUniverse};
pub use rewrite::{RewriteOutput, Rewriter};
pub use runtime::{LayoutQuery, NativeLayoutService, RuntimeRefs};
pub use weaver::{WeaveOutcome, Weaver, WovenModule};
