//! tether: weave compiled modules so annotated types are backed by native memory

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Post-compile weaver for native-backed managed types", long_about = None)]
#[command(version)]
struct Cli {
    /// Log weaving decisions (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weave one or more modules into an output directory
    Weave {
        /// Modules to weave
        #[arg(required = true)]
        modules: Vec<PathBuf>,

        /// Files or directories with modules used to resolve external types
        #[arg(short = 's', long = "search-path")]
        search_paths: Vec<PathBuf>,

        /// Output directory for woven modules and sidecars
        #[arg(short, long, default_value = "woven")]
        out_dir: PathBuf,

        /// Weaver configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Native type manifest (JSON)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Diagnostic output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: Format,
    },

    /// Print a module's type tables and disassembly
    Inspect {
        /// Module file
        module: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let color = cli.color.as_deref();

    let result = match cli.command {
        Commands::Weave {
            modules,
            search_paths,
            out_dir,
            config,
            manifest,
            format,
        } => commands::weave::execute(
            commands::weave::WeaveArgs {
                modules,
                search_paths,
                out_dir,
                config,
                manifest,
                json: format == Format::Json,
            },
            color,
        ),
        Commands::Inspect { module } => commands::inspect::execute(&module),
    };

    match result {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            commands::Status::Fatal.exit_code()
        }
    }
}
