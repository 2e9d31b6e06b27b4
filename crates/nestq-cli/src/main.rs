//! nestq CLI: run nested queries over a JSON dataset.

use clap::{Parser, Subcommand};
use nestq_core::cancel::RequestContext;
use nestq_core::config::EngineConfig;
use nestq_exec::Engine;
use nestq_io::{JsonlWriter, MemorySource};
use nestq_operators::Capabilities;
use nestq_planner::{compile_query, explain, parse_catalog_yaml, parse_query, Catalog, QueryPlan};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nestq")]
#[command(about = "nestq: nested collection queries with adapter pushdown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query and print result records as JSON lines
    Run {
        /// Path to the schema YAML file
        #[arg(short, long)]
        schema: PathBuf,

        /// Path to the JSON dataset (`{ "<root>": [ ... ] }`)
        #[arg(short, long)]
        data: PathBuf,

        /// Path to the query descriptor (YAML or JSON)
        #[arg(short, long)]
        query: PathBuf,

        /// Maximum sibling branches evaluated concurrently (overrides config)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Request deadline in milliseconds (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Evaluate every stage in memory
        #[arg(long)]
        no_pushdown: bool,

        /// Advertise native filter/sort/slice/count/aggregate on the dataset
        #[arg(long)]
        native: bool,

        /// Print execution counters to stderr as JSON
        #[arg(long)]
        stats: bool,
    },

    /// Compile a query against a schema without reading data
    Validate {
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(short, long)]
        query: PathBuf,
    },

    /// Show the compiled plan tree (EXPLAIN)
    Explain {
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(short, long)]
        query: PathBuf,
    },

    /// List every registered collection field and its operators
    Catalog {
        #[arg(short, long)]
        schema: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            schema,
            data,
            query,
            max_parallel,
            timeout_ms,
            no_pushdown,
            native,
            stats,
        } => match EngineConfig::try_from_env() {
            Ok(mut config) => {
                apply_overrides(&mut config, max_parallel, timeout_ms, no_pushdown);
                run_query(&schema, &data, &query, config, native, stats)
            }
            Err(e) => Err(e.into()),
        },
        Commands::Validate { schema, query } => validate_query(&schema, &query).map(|plan| {
            println!("✓ Query is valid (fingerprint {})", plan.fingerprint.short());
        }),
        Commands::Explain { schema, query } => {
            validate_query(&schema, &query).map(|plan| print!("{}", explain(&plan)))
        }
        Commands::Catalog { schema } => list_catalog(&schema),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_catalog(schema_path: &PathBuf) -> Result<Catalog, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(schema_path)?;
    Ok(parse_catalog_yaml(&yaml_content)?)
}

fn compile(catalog: &Catalog, query_path: &PathBuf) -> Result<QueryPlan, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(query_path)?;
    let desc = parse_query(&text)?;
    Ok(compile_query(&desc, catalog)?)
}

fn run_query(
    schema_path: &PathBuf,
    data_path: &PathBuf,
    query_path: &PathBuf,
    config: EngineConfig,
    native: bool,
    print_stats: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(schema_path)?;
    let plan = compile(&catalog, query_path)?;

    let data = fs::read_to_string(data_path)?;
    let name = data_path.display().to_string();
    let mut source = MemorySource::from_json(&name, &data, catalog.roots())?;
    if native {
        source = source.with_capabilities(Capabilities::ALL);
    }

    let engine = Engine::new(config);
    let (rows, stats) = engine.execute_with_stats(&plan, &source, &RequestContext::new())?;

    let mut writer = JsonlWriter::to_writer(std::io::stdout().lock());
    writer.write_records(&rows)?;

    if print_stats {
        eprintln!("{}", serde_json::to_string(&stats)?);
    }
    tracing::info!(rows = writer.rows_written(), elapsed_ms = stats.elapsed_ms, "query done");
    Ok(())
}

fn validate_query(
    schema_path: &PathBuf,
    query_path: &PathBuf,
) -> Result<QueryPlan, Box<dyn std::error::Error>> {
    let catalog = load_catalog(schema_path)?;
    compile(&catalog, query_path)
}

fn list_catalog(schema_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(schema_path)?;
    println!("Collection Fields");
    println!("=================");
    for field in catalog.fields() {
        println!(
            "  {}.{} [{}] ({} element fields)",
            field.root,
            field.path,
            field.operators.names().join(", "),
            field.element.fields.len()
        );
    }
    Ok(())
}

/// Flags win over environment values.
fn apply_overrides(
    cfg: &mut EngineConfig,
    max_parallel: Option<usize>,
    timeout_ms: Option<u64>,
    no_pushdown: bool,
) {
    if let Some(parallel) = max_parallel {
        cfg.max_parallel_tasks = parallel.max(1);
    }
    if let Some(ms) = timeout_ms {
        cfg.timeout_ms = Some(ms);
    }
    if no_pushdown {
        cfg.pushdown = false;
    }
}
