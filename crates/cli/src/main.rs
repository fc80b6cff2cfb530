mod config;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use pricewise_eval::{EngineConfig, EstimateService, PageResult, PricingReport, PricingRun};
use pricewise_interchange::from_bundle_json;
use pricewise_storage::MemoryStorage;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Estimation decision-and-pricing engine.
#[derive(Parser)]
#[command(name = "pricewise", version, about = "Estimation decision-and-pricing engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the next page of questions
    Page {
        /// Path to the estimate bundle JSON file
        bundle: PathBuf,
        /// Path to the answers JSON file (defaults to no answers)
        #[arg(long)]
        facts: Option<PathBuf>,
        /// Comma-separated ids of nodes already answered
        #[arg(long, value_delimiter = ',')]
        answered: Vec<i64>,
        /// Maximum number of questions on the page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Price the bundle's graph and print line items and the report
    Price {
        /// Path to the estimate bundle JSON file
        bundle: PathBuf,
        /// Path to the answers JSON file
        #[arg(long)]
        facts: PathBuf,
        /// Identifier of the pricing run
        #[arg(long, default_value = "cli")]
        run_id: String,
    },

    /// Evaluate a decision tree
    Tree {
        /// Path to the estimate bundle JSON file
        bundle: PathBuf,
        /// Decision tree id
        #[arg(long = "tree")]
        tree_id: i64,
        /// Path to the answers JSON file
        #[arg(long)]
        facts: PathBuf,
    },

    /// Check the graph and decision trees for structural problems
    Validate {
        /// Path to the estimate bundle JSON file
        bundle: PathBuf,
    },

    /// Coerce answers against the bundle's fact definitions
    Facts {
        /// Path to the estimate bundle JSON file
        bundle: PathBuf,
        /// Path to the answers JSON file
        #[arg(long)]
        facts: PathBuf,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut engine = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), cli.output, cli.quiet);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Page {
            bundle,
            facts,
            answered,
            page_size,
        } => {
            if let Some(size) = page_size {
                if size == 0 {
                    report_error("error: --page-size must be at least 1", cli.output, cli.quiet);
                    process::exit(1);
                }
                engine.page_size = size;
            }
            cmd_page(&bundle, facts.as_deref(), &answered, engine, cli.output, cli.quiet);
        }
        Commands::Price {
            bundle,
            facts,
            run_id,
        } => {
            cmd_price(&bundle, &facts, &run_id, engine, cli.output, cli.quiet);
        }
        Commands::Tree {
            bundle,
            tree_id,
            facts,
        } => {
            cmd_tree(&bundle, tree_id, &facts, engine, cli.output, cli.quiet);
        }
        Commands::Validate { bundle } => {
            cmd_validate(&bundle, engine, cli.output, cli.quiet);
        }
        Commands::Facts { bundle, facts } => {
            cmd_facts(&bundle, &facts, engine, cli.output, cli.quiet);
        }
    }
}

/// Install the stderr subscriber. `PRICEWISE_LOG` holds the filter and
/// `PRICEWISE_LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PRICEWISE_LOG")
        .unwrap_or_else(|_| "warn".into());
    let log_format = std::env::var("PRICEWISE_LOG_FORMAT").unwrap_or_default();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ──────────────────────────────────────────────
// Shared plumbing
// ──────────────────────────────────────────────

fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> serde_json::Value {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: {} file not found: {}", what, path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error: invalid JSON in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn read_facts(path: Option<&Path>, output: OutputFormat, quiet: bool) -> serde_json::Value {
    match path {
        Some(p) => read_json(p, "facts", output, quiet),
        None => serde_json::Value::Null,
    }
}

/// Load a bundle into a fresh in-memory backend. Returns the service and
/// the bundle's graph id.
fn open_bundle(
    path: &Path,
    engine: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) -> (EstimateService<MemoryStorage>, String) {
    let doc = read_json(path, "bundle", output, quiet);
    let bundle = match from_bundle_json(&doc) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("error: {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let graph_id = bundle.graph.graph_id.clone();
    tracing::debug!(bundle = %path.display(), graph_id = %graph_id, "bundle loaded");
    let service = EstimateService::new(MemoryStorage::from_bundle(bundle), engine);
    (service, graph_id)
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let msg = format!("error: failed to start runtime: {}", e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn or_exit<T, E: std::fmt::Display>(result: Result<T, E>, output: OutputFormat, quiet: bool) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}

// ──────────────────────────────────────────────
// Commands
// ──────────────────────────────────────────────

fn cmd_page(
    bundle_path: &Path,
    facts_path: Option<&Path>,
    answered: &[i64],
    engine: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (service, graph_id) = open_bundle(bundle_path, engine, output, quiet);
    let facts = read_facts(facts_path, output, quiet);
    let answered: BTreeSet<i64> = answered.iter().copied().collect();

    let page = or_exit(
        runtime(output, quiet).block_on(service.compute_page(&graph_id, &facts, &answered)),
        output,
        quiet,
    );
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&page),
        OutputFormat::Text => print_page(&page),
    }
}

fn print_page(page: &PageResult) {
    if page.completed {
        println!("completed");
        return;
    }
    if page.page_nodes.is_empty() {
        println!("no questions ready ({} blocked)", page.blocked.len());
        return;
    }
    println!("{} question(s):", page.page_nodes.len());
    for node in &page.page_nodes {
        println!("  [{}] {}: {}", node.id, node.node_id, node.label);
    }
}

fn cmd_price(
    bundle_path: &Path,
    facts_path: &Path,
    run_id: &str,
    engine: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (service, graph_id) = open_bundle(bundle_path, engine, output, quiet);
    let facts = read_json(facts_path, "facts", output, quiet);
    let rt = runtime(output, quiet);

    let run = or_exit(
        rt.block_on(service.run_pricing(&graph_id, run_id, &facts)),
        output,
        quiet,
    );
    let report = or_exit(rt.block_on(service.build_report(run_id)), output, quiet);
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "variables": run.variables,
            "report": report,
        })),
        OutputFormat::Text => print_price(&run, &report),
    }
}

fn print_price(run: &PricingRun, report: &PricingReport) {
    println!("Run {} ({} line item(s))", run.run_id, run.items.len());
    for item in &report.items {
        println!(
            "  [{}] {}: {:.2} - {:.2}",
            item.category, item.label, item.min_cost, item.max_cost
        );
        if item.explanation != item.label {
            println!("      {}", item.explanation);
        }
    }
    println!("Total: {:.2} - {:.2}", report.total_min, report.total_max);
    println!("Tier: {} ({})", report.tier.label, report.tier.name);
}

fn cmd_tree(
    bundle_path: &Path,
    tree_id: i64,
    facts_path: &Path,
    engine: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (service, _) = open_bundle(bundle_path, engine, output, quiet);
    let facts = read_json(facts_path, "facts", output, quiet);

    let outcome = or_exit(
        runtime(output, quiet).block_on(service.evaluate_tree(tree_id, &facts)),
        output,
        quiet,
    );
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&outcome),
        OutputFormat::Text => {
            println!("Tree {}: branch {}", outcome.tree_id, outcome.order_index);
            println!("Value: {}", outcome.value);
        }
    }
}

fn cmd_validate(bundle_path: &Path, engine: EngineConfig, output: OutputFormat, quiet: bool) {
    let (service, graph_id) = open_bundle(bundle_path, engine, output, quiet);
    let report = or_exit(
        runtime(output, quiet).block_on(service.validate(&graph_id)),
        output,
        quiet,
    );

    match output {
        OutputFormat::Json => {
            if report.valid {
                if !quiet {
                    print_json(&report);
                }
            } else {
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&report).unwrap_or_default()
                );
            }
        }
        OutputFormat::Text => {
            if !quiet {
                if report.valid {
                    println!("valid");
                } else {
                    eprintln!("invalid");
                    for err in &report.errors {
                        eprintln!("  - {}", err);
                    }
                }
                for warning in &report.warnings {
                    eprintln!("  warning: {}", warning);
                }
            }
        }
    }
    if !report.valid {
        process::exit(1);
    }
}

fn cmd_facts(
    bundle_path: &Path,
    facts_path: &Path,
    engine: EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let (service, _) = open_bundle(bundle_path, engine, output, quiet);
    let raw = read_json(facts_path, "facts", output, quiet);

    let facts = or_exit(
        runtime(output, quiet).block_on(service.coerce_facts(&raw)),
        output,
        quiet,
    );
    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&facts),
        OutputFormat::Text => {
            for (key, value) in facts.iter() {
                println!("{} = {} ({})", key, value, value.type_name());
            }
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
