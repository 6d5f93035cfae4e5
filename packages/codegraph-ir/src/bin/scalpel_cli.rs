//! Command-line front end for the Code Scalpel engine (spec §6): a thin
//! `clap` shell over [`ToolDispatcher`] for local use and CI, printing the
//! same response envelope a transport layer would ship over the wire.
//!
//! This binary is not the product surface (spec §1 "Out of scope": the
//! transport framing that exposes tools to agents lives outside the
//! core) — it exists so the dispatcher is runnable without one.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use codegraph_ir::config::ScalpelConfig;
use codegraph_ir::dispatcher::{RequestContext, ToolDispatcher, ToolResponse};
use codegraph_ir::features::extract_update::ExtractOptions;

#[derive(Parser)]
#[command(name = "scalpel-cli", about = "Code Scalpel engine CLI", long_about = None)]
struct Cli {
    /// Config file (YAML); falls back to engine defaults if omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tier name to resolve limits for.
    #[arg(long, global = true, default_value = "community")]
    tier: String,

    /// Project/file roots the dispatcher is allowed to touch, beyond the
    /// config file's own `allowed_roots`.
    #[arg(long, global = true)]
    allow_root: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// analyze_code: parse a file and summarize functions/classes/imports.
    Analyze {
        path: PathBuf,
        #[arg(long)]
        accept_partial: bool,
    },
    /// extract_code: return the named function/class/method's source.
    Extract {
        path: PathBuf,
        #[arg(value_enum)]
        target_type: TargetTypeArg,
        target_name: String,
        #[arg(long)]
        include_context: bool,
        #[arg(long, default_value_t = 1)]
        context_depth: usize,
    },
    /// security_scan: intraprocedural taint scan of a single file.
    Scan { path: PathBuf },
    /// cross_file_security_scan: project-wide taint worklist.
    ScanProject {
        project_root: PathBuf,
        #[arg(long)]
        entry_point: Vec<String>,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
    },
    /// get_call_graph: the project-wide call graph, optionally rooted.
    CallGraph {
        project_root: PathBuf,
        #[arg(long)]
        entry_point: Option<String>,
        #[arg(long, default_value_t = 4)]
        depth: usize,
    },
    /// get_project_map: per-file stats, hotspots, entry points.
    ProjectMap {
        project_root: PathBuf,
        #[arg(long, default_value_t = 10)]
        top_n: usize,
    },
    /// crawl_project: per-file summaries across a tree.
    Crawl { root: PathBuf },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TargetTypeArg {
    Function,
    Class,
    Method,
}

impl TargetTypeArg {
    fn as_str(self) -> &'static str {
        match self {
            TargetTypeArg::Function => "function",
            TargetTypeArg::Class => "class",
            TargetTypeArg::Method => "method",
        }
    }
}

fn print_response(response: &ToolResponse) -> ExitCode {
    let rendered = serde_json::to_string_pretty(response).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    println!("{rendered}");
    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ScalpelConfig::load_from_yaml(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("failed to load config {}: {}", path.display(), err.message);
                return ExitCode::FAILURE;
            }
        },
        None => ScalpelConfig::default(),
    };
    config.allowed_roots.extend(cli.allow_root);

    let dispatcher = ToolDispatcher::new(config);
    let ctx = RequestContext::new(cli.tier.clone());

    let response = match cli.command {
        Commands::Analyze { path, accept_partial } => {
            let code = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("reading {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            dispatcher.analyze_code(&ctx, &code, None, accept_partial)
        }
        Commands::Extract { path, target_type, target_name, include_context, context_depth } => {
            dispatcher.extract_code(
                &ctx,
                target_type.as_str(),
                &target_name,
                None,
                Some(&path),
                None,
                ExtractOptions { include_context, context_depth },
            )
        }
        Commands::Scan { path } => dispatcher.security_scan(&ctx, None, Some(&path), None),
        Commands::ScanProject { project_root, entry_point, max_depth } => {
            dispatcher.cross_file_security_scan(&ctx, &project_root, &entry_point, max_depth)
        }
        Commands::CallGraph { project_root, entry_point, depth } => {
            dispatcher.get_call_graph(&ctx, &project_root, entry_point.as_deref(), depth)
        }
        Commands::ProjectMap { project_root, top_n } => dispatcher.get_project_map(&ctx, &project_root, top_n),
        Commands::Crawl { root } => dispatcher.crawl_project(&ctx, &root, None, None),
    };

    print_response(&response)
}
