//! Pampax CLI: the command-line front-end to the code-aware retrieval
//! engine in `pampax-core`.

mod collaborators;
mod commands;
mod output;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pampax_core::config::Config;
use pampax_core::error::PampaxError;
use pampax_core::graph::GraphTraversal;
use pampax_core::retrieval::SeedMixOptimizer;
use pampax_core::storage::Storage;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::commands::parse_intent;
use crate::output::{OutputEnvelope, OutputMode};

#[derive(Parser)]
#[command(name = "pampax")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Code-aware retrieval engine CLI")]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Increase log verbosity
    #[arg(long, global = true)]
    verbose: bool,

    /// Output format: json or text (defaults to json when stdout isn't a
    /// terminal, text when it is)
    #[arg(long, global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply or roll back schema migrations
    Migrate {
        /// Path to the SQLite database (overrides the project default)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Target schema version (defaults to the latest)
        #[arg(long)]
        to: Option<u32>,
    },
    /// Index a repository: extract spans, references, and chunks
    Index {
        /// Repository identifier (defaults to the project directory name)
        #[arg(long)]
        repo: Option<String>,
        /// Glob patterns to include (defaults to everything)
        #[arg(long)]
        include: Vec<String>,
        /// Glob patterns to exclude
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Run a hybrid search query
    Search {
        query: String,
        /// Force this intent for both classification and policy
        #[arg(long)]
        intent: Option<String>,
        /// Alias for --intent, taking priority when both are given
        #[arg(long)]
        force_intent: Option<String>,
        /// Use this intent's policy shape without changing the reported intent
        #[arg(long)]
        policy: Option<String>,
        /// Include entities and suggested policies in the report
        #[arg(long)]
        explain_intent: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        format: Option<String>,
    },
    /// Inspect the intent classifier
    Intent {
        #[command(subcommand)]
        action: IntentAction,
    },
    /// Run a bounded graph traversal from a symbol
    Graph {
        #[arg(long)]
        symbol: String,
        /// Traversal depth, clamped to [1, 5]
        #[arg(long, default_value_t = 2)]
        neighbors: u32,
        /// Comma-separated reference kinds to follow
        #[arg(long)]
        types: Option<String>,
    },
    /// Report aggregate component health
    Health {
        #[arg(long)]
        format: Option<String>,
    },
    /// Report repository statistics and schema version
    Info {
        #[arg(long)]
        format: Option<String>,
    },
}

#[derive(Subcommand)]
enum IntentAction {
    /// Classify a query without running a search
    Analyze {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the policy a given intent resolves to
    Show {
        intent: String,
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn default_repo_name(project_root: &Path) -> String {
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string())
}

fn resolve_db_path(project_root: &Path, config: &Config) -> PathBuf {
    if let Some(configured) = &config.storage.db_path {
        return PathBuf::from(configured);
    }
    project_root.join(".pampax").join("pampax.sqlite")
}

fn exit_with(env: &OutputEnvelope, err: PampaxError) -> ! {
    let code = err.exit_code();
    env.emit_error(&err);
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    info!("pampax v{} starting", env!("CARGO_PKG_VERSION"));

    let project_root = cli.project.clone().unwrap_or_else(|| PathBuf::from("."));
    let config_path = project_root.join("pampax.toml");
    let config = match Config::load(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config from {}: {e}", config_path.display());
            let env = OutputEnvelope::new(OutputMode::resolve(cli.format.as_deref()));
            exit_with(&env, e);
        }
    };

    let format = cli.format.clone();
    let env = OutputEnvelope::new(OutputMode::resolve(format.as_deref()));
    let repo = default_repo_name(&project_root);
    info!(repo = %repo, corr_id = %env.corr_id(), "dispatching command");

    let result = run_command(&cli.command, &project_root, &config, &repo, &env).await;
    if let Err(err) = result {
        error!("command failed: {err}");
        exit_with(&env, err);
    }
}

async fn run_command(
    command: &Commands,
    project_root: &Path,
    config: &Config,
    repo: &str,
    env: &OutputEnvelope,
) -> pampax_core::error::Result<()> {
    match command {
        Commands::Migrate { db, to } => {
            let db_path = db.clone().unwrap_or_else(|| resolve_db_path(project_root, config));
            let storage = Storage::new(Some(db_path))?;
            let report = commands::migrate::run(&storage, *to)?;
            match env.mode() {
                OutputMode::Json => env.emit_json(&report),
                OutputMode::Text => commands::migrate::render_text(&report),
            }
            Ok(())
        }
        Commands::Index { repo: repo_override, include, exclude } => {
            let db_path = resolve_db_path(project_root, config);
            let storage = Storage::new(Some(db_path))?;
            let repo_name = repo_override.clone().unwrap_or_else(|| repo.to_string());
            let report = commands::index::run(&storage, &repo_name, project_root, include, exclude).await?;
            match env.mode() {
                OutputMode::Json => env.emit_json(&report),
                OutputMode::Text => commands::index::render_text(&report),
            }
            Ok(())
        }
        Commands::Search {
            query,
            intent,
            force_intent,
            policy,
            explain_intent,
            limit,
            format,
        } => {
            let db_path = resolve_db_path(project_root, config);
            let storage = Arc::new(Storage::new(Some(db_path))?);
            let graph = Arc::new(GraphTraversal::default());
            let optimizer = SeedMixOptimizer::default();

            let forced_name = force_intent.as_deref().or(intent.as_deref());
            let intent_override = forced_name.map(parse_intent).transpose()?;
            let policy_override = policy.as_deref().map(parse_intent).transpose()?;

            let report = commands::search::run(
                storage,
                graph,
                &optimizer,
                repo,
                query,
                intent_override,
                policy_override,
                *limit,
                true,
                *explain_intent,
            )
            .await?;

            let local_env = format
                .as_deref()
                .map(|f| OutputEnvelope::new(OutputMode::resolve(Some(f))));
            let active_env = local_env.as_ref().unwrap_or(env);
            match active_env.mode() {
                OutputMode::Json => active_env.emit_json(&report),
                OutputMode::Text => commands::search::render_text(&report),
            }
            Ok(())
        }
        Commands::Intent { action } => match action {
            IntentAction::Analyze { query, json } => {
                let report = commands::intent::analyze(query);
                if *json {
                    env.emit_json(&report);
                } else {
                    match env.mode() {
                        OutputMode::Json => env.emit_json(&report),
                        OutputMode::Text => commands::intent::render_analyze_text(&report),
                    }
                }
                Ok(())
            }
            IntentAction::Show { intent, json } => {
                let report = commands::intent::show(intent)?;
                if *json {
                    env.emit_json(&report);
                } else {
                    match env.mode() {
                        OutputMode::Json => env.emit_json(&report),
                        OutputMode::Text => commands::intent::render_show_text(&report),
                    }
                }
                Ok(())
            }
        },
        Commands::Graph { symbol, neighbors, types } => {
            let db_path = resolve_db_path(project_root, config);
            let storage = Storage::new(Some(db_path))?;
            let graph = GraphTraversal::default();
            let report = commands::graph::run(&storage, &graph, repo, symbol, *neighbors, types.as_deref())?;
            match env.mode() {
                OutputMode::Json => env.emit_json(&report),
                OutputMode::Text => commands::graph::render_text(&report),
            }
            Ok(())
        }
        Commands::Health { format } => {
            let db_path = resolve_db_path(project_root, config);
            let storage = Storage::new(Some(db_path))?;
            let optimizer = SeedMixOptimizer::default();
            let report = commands::health::run(
                &storage,
                &optimizer,
                Some(&project_root.join("pampax.toml")),
                config.cache.traversal_capacity,
                0.5,
            );
            let local_env = format
                .as_deref()
                .map(|f| OutputEnvelope::new(OutputMode::resolve(Some(f))));
            let active_env = local_env.as_ref().unwrap_or(env);
            match active_env.mode() {
                OutputMode::Json => active_env.emit_json(&report),
                OutputMode::Text => commands::health::render_text(&report),
            }
            let exit_code = report.exit_code();
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
            Ok(())
        }
        Commands::Info { format } => {
            let db_path = resolve_db_path(project_root, config);
            let storage = Storage::new(Some(db_path))?;
            let report = commands::info::run(&storage, repo)?;
            let local_env = format
                .as_deref()
                .map(|f| OutputEnvelope::new(OutputMode::resolve(Some(f))));
            let active_env = local_env.as_ref().unwrap_or(env);
            match active_env.mode() {
                OutputMode::Json => active_env.emit_json(&report),
                OutputMode::Text => commands::info::render_text(&report),
            }
            Ok(())
        }
    }
}
