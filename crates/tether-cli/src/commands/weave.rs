//! `tether weave`: rewrite modules and package the results

use super::files::{load_module, load_universe};
use super::Status;
use crate::output::{resolve_color_choice, StyledOutput};
use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tether_weaver::diagnostic::JsonDiagnostic;
use tether_weaver::{
    Diagnostics, NativeManifest, PackagedFiles, Packager, ProcessingContext, WeaveOutcome,
    Weaver, WeaverConfig,
};
use tracing::info;

pub struct WeaveArgs {
    pub modules: Vec<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub json: bool,
}

/// What happened to one input module
enum ModuleOutcome {
    NoBindings,
    Woven {
        files: PackagedFiles,
        diagnostics: Diagnostics,
    },
    Rejected(Diagnostics),
}

#[derive(Default)]
struct Summary {
    woven: usize,
    no_bindings: usize,
    rejected: usize,
    failed: usize,
}

impl Summary {
    fn status(&self) -> Status {
        if self.failed > 0 {
            Status::Fatal
        } else if self.rejected > 0 {
            Status::Rejected
        } else {
            Status::Success
        }
    }
}

pub fn execute(args: WeaveArgs, color: Option<&str>) -> Result<Status> {
    // 1. Load configuration and the native manifest
    let config = match &args.config {
        Some(path) => WeaverConfig::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => WeaverConfig::default(),
    };
    let manifest = match &args.manifest {
        Some(path) => NativeManifest::from_file(path)
            .with_context(|| format!("Failed to load manifest '{}'", path.display()))?,
        None => NativeManifest::default(),
    };

    // 2. Resolve external modules
    let universe = load_universe(&args.search_paths)?;
    info!(modules = universe.len(), "search paths loaded");

    let ctx = ProcessingContext::new(config, manifest, universe);
    let packager = Packager::new(&args.out_dir, ctx.config.output.sidecar);
    let weaver = Weaver::new(&ctx);
    let mut out = StyledOutput::new(resolve_color_choice(color));

    // 3. Weave each module independently
    let mut summary = Summary::default();
    let mut reports = Vec::new();
    for path in &args.modules {
        let result = weave_one(&weaver, &packager, path);
        match &result {
            Ok(ModuleOutcome::NoBindings) => summary.no_bindings += 1,
            Ok(ModuleOutcome::Woven { .. }) => summary.woven += 1,
            Ok(ModuleOutcome::Rejected(_)) => summary.rejected += 1,
            Err(_) => summary.failed += 1,
        }
        if args.json {
            reports.push(json_report(path, &result));
        } else {
            emit_pretty(&mut out, path, &result);
        }
    }

    // 4. Report
    if args.json {
        let document = json!({
            "modules": reports,
            "summary": {
                "woven": summary.woven,
                "no_bindings": summary.no_bindings,
                "rejected": summary.rejected,
                "failed": summary.failed,
            },
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_summary(&mut out, &summary);
    }
    Ok(summary.status())
}

fn weave_one(weaver: &Weaver<'_>, packager: &Packager, path: &Path) -> Result<ModuleOutcome> {
    let module = load_module(path)?;
    let outcome = weaver
        .weave(&module)
        .with_context(|| format!("Failed to weave '{}'", path.display()))?;
    Ok(match outcome {
        WeaveOutcome::NoBindings => ModuleOutcome::NoBindings,
        WeaveOutcome::Rejected(diagnostics) => ModuleOutcome::Rejected(diagnostics),
        WeaveOutcome::Rewritten(woven) => {
            let files = packager.write(path, &woven)?;
            ModuleOutcome::Woven {
                files,
                diagnostics: woven.diagnostics,
            }
        }
    })
}

fn json_diagnostics(diagnostics: &Diagnostics) -> Vec<JsonDiagnostic> {
    diagnostics.iter().map(JsonDiagnostic::from_diagnostic).collect()
}

fn json_report(path: &Path, result: &Result<ModuleOutcome>) -> serde_json::Value {
    let path = path.display().to_string();
    match result {
        Ok(ModuleOutcome::NoBindings) => json!({
            "path": path,
            "status": "no_bindings",
            "diagnostics": [],
        }),
        Ok(ModuleOutcome::Woven { files, diagnostics }) => json!({
            "path": path,
            "status": "woven",
            "output": files.module.display().to_string(),
            "sidecar": files.sidecar.as_ref().map(|p| p.display().to_string()),
            "diagnostics": json_diagnostics(diagnostics),
        }),
        Ok(ModuleOutcome::Rejected(diagnostics)) => json!({
            "path": path,
            "status": "rejected",
            "diagnostics": json_diagnostics(diagnostics),
        }),
        Err(e) => json!({
            "path": path,
            "status": "failed",
            "error": format!("{:#}", e),
            "diagnostics": [],
        }),
    }
}

fn emit_pretty(out: &mut StyledOutput, path: &Path, result: &Result<ModuleOutcome>) {
    let name = path.display().to_string();
    match result {
        Ok(ModuleOutcome::NoBindings) => {
            out.info("no bindings found");
            out.plain(&format!(" in {}, nothing to weave", name));
            out.newline();
        }
        Ok(ModuleOutcome::Woven { files, diagnostics }) => {
            for diagnostic in diagnostics {
                out.diagnostic(diagnostic);
            }
            out.success("woven");
            out.plain(&format!(" {} -> {}", name, files.module.display()));
            out.newline();
        }
        Ok(ModuleOutcome::Rejected(diagnostics)) => {
            for diagnostic in diagnostics {
                out.diagnostic(diagnostic);
            }
            out.error("rejected");
            out.plain(&format!(
                " {} ({} error{})",
                name,
                diagnostics.error_count(),
                if diagnostics.error_count() == 1 { "" } else { "s" }
            ));
            out.newline();
        }
        Err(e) => out.stderr_error(&format!("{:#}", e)),
    }
}

fn print_summary(out: &mut StyledOutput, summary: &Summary) {
    out.newline();
    out.bold(&format!(
        "{} woven, {} without bindings, {} rejected, {} failed",
        summary.woven, summary.no_bindings, summary.rejected, summary.failed
    ));
    out.newline();
}
