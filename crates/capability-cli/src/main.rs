//! `capctl`: a development CLI for exercising the capability learning pipeline locally, against
//! an in-process [`InMemoryStore`] (SPEC_FULL.md §0 -- the database engine is a non-goal). Every
//! invocation starts from an empty store; `batch` and `match` accept a whole directory of
//! snippets so a single run can show `contains` edges and intent matching across more than one
//! saved capability.

use anyhow::{Context, Result};
use capability_analyzer::{analyze_dialect, edges::NoSchemaClassifier, Dialect};
use capability_core::clock::{Clock, SystemClock};
use capability_core::config::CapabilityConfig;
use capability_core::events::NullEventBus;
use capability_core::risk::ToolRiskCatalog;
use capability_graph::{DependencyGraph, Matcher, TransitiveReliability};
use capability_store::{CapabilityPipeline, InMemoryResolver, InMemoryStore, SaveCapabilityInput};
use capability_vector::HashEmbeddingProvider;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "capctl")]
#[command(about = "Capability Learning Core development CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Organization scope for saved capabilities
    #[arg(long, global = true, default_value = "dev-org")]
    org: String,

    /// Project scope for saved capabilities
    #[arg(long, global = true, default_value = "dev-project")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Js,
    Ts,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Js => Dialect::JavaScript,
            DialectArg::Ts => Dialect::TypeScript,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a snippet and print its static structure, with no save side-effects.
    Analyze {
        /// Path to a JS/TS snippet file
        file: PathBuf,

        #[arg(long, value_enum, default_value = "js")]
        dialect: DialectArg,
    },

    /// Run one snippet through the full save pipeline.
    Save {
        /// Path to a JS/TS snippet file
        file: PathBuf,

        #[arg(long, value_enum, default_value = "js")]
        dialect: DialectArg,

        #[arg(long, default_value = "true")]
        success: bool,

        #[arg(long, default_value = "0")]
        duration_ms: f64,
    },

    /// Save every `*.js`/`*.ts` file in a directory against one shared store, in filename order,
    /// so later files can resolve capability references against earlier ones.
    Batch {
        /// Directory of snippet files
        dir: PathBuf,

        #[arg(long, value_enum, default_value = "js")]
        dialect: DialectArg,
    },

    /// Load a directory of snippets, then rank them against an intent string.
    Match {
        /// Directory of snippets to load first
        dir: PathBuf,

        /// Intent text to match against
        intent: String,

        #[arg(long, value_enum, default_value = "js")]
        dialect: DialectArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let _config = CapabilityConfig::load().context("failed to load capability config")?;

    let output = match &cli.command {
        Commands::Analyze { file, dialect } => run_analyze(file, dialect.clone())?,
        Commands::Save {
            file,
            dialect,
            success,
            duration_ms,
        } => run_save(&cli.org, &cli.project, file, dialect.clone(), *success, *duration_ms).await?,
        Commands::Batch { dir, dialect } => run_batch(&cli.org, &cli.project, dir, dialect.clone()).await?,
        Commands::Match { dir, intent, dialect } => run_match(&cli.org, &cli.project, dir, intent, dialect.clone()).await?,
    };

    print_output(&cli.output, &output)
}

fn run_analyze(file: &Path, dialect: DialectArg) -> Result<serde_json::Value> {
    let source = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let structure = analyze_dialect(&source, dialect.into(), &NoSchemaClassifier);
    Ok(serde_json::to_value(structure)?)
}

struct Runtime {
    store: Arc<InMemoryStore>,
    pipeline: CapabilityPipeline,
    graph: Arc<DependencyGraph>,
    embeddings: Arc<HashEmbeddingProvider>,
    clock: Arc<dyn Clock>,
}

fn build_runtime() -> Runtime {
    let store = Arc::new(InMemoryStore::new());
    let persistence: Arc<dyn capability_core::traits::CapabilityPersistence> = store.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = Arc::new(NullEventBus);
    let embeddings = Arc::new(HashEmbeddingProvider::default());
    let reliability = TransitiveReliability::new(persistence.clone(), clock.clone(), 60);
    let graph = Arc::new(DependencyGraph::new(persistence.clone(), events.clone(), clock.clone(), reliability));
    let pipeline = CapabilityPipeline::new(
        persistence,
        graph.clone(),
        embeddings.clone(),
        events,
        clock.clone(),
        ToolRiskCatalog::new(),
    );
    Runtime {
        store,
        pipeline,
        graph,
        embeddings,
        clock,
    }
}

async fn run_save(
    org: &str,
    project: &str,
    file: &Path,
    dialect: DialectArg,
    success: bool,
    duration_ms: f64,
) -> Result<serde_json::Value> {
    let runtime = build_runtime();
    let resolver = InMemoryResolver::new(&runtime.store);
    let source = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let output = runtime
        .pipeline
        .save_capability(
            SaveCapabilityInput {
                org: org.to_string(),
                project: project.to_string(),
                source,
                dialect: dialect.into(),
                success,
                duration_ms,
                trace: None,
            },
            &resolver,
        )
        .await
        .context("save_capability failed")?;

    Ok(serde_json::json!({
        "capability_id": output.capability.id,
        "is_new": output.is_new,
        "code_hash": output.capability.code_hash,
        "hierarchy_level": output.capability.hierarchy_level,
        "risk_category": output.capability.risk_category,
        "usage_count": output.capability.usage_count,
        "warnings": output.warnings.iter().map(|w| format!("{w:?}")).collect::<Vec<_>>(),
    }))
}

fn snippet_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| matches!(path.extension().and_then(|e| e.to_str()), Some("js") | Some("ts")))
        .collect();
    files.sort();
    Ok(files)
}

async fn run_batch(org: &str, project: &str, dir: &Path, dialect: DialectArg) -> Result<serde_json::Value> {
    let runtime = build_runtime();
    let resolver = InMemoryResolver::new(&runtime.store);
    let mut saved = Vec::new();
    for file in snippet_files(dir)? {
        let source = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        let output = runtime
            .pipeline
            .save_capability(
                SaveCapabilityInput {
                    org: org.to_string(),
                    project: project.to_string(),
                    source,
                    dialect: dialect.clone().into(),
                    success: true,
                    duration_ms: 0.0,
                    trace: None,
                },
                &resolver,
            )
            .await
            .with_context(|| format!("saving {}", file.display()))?;
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        runtime.store.register(org, project, &stem, output.capability.id);
        saved.push(serde_json::json!({
            "file": file,
            "capability_id": output.capability.id,
            "is_new": output.is_new,
            "hierarchy_level": output.capability.hierarchy_level,
        }));
    }
    let _ = runtime.graph;
    let _ = runtime.embeddings;
    let _ = runtime.clock;
    Ok(serde_json::json!({ "saved": saved }))
}

async fn run_match(org: &str, project: &str, dir: &Path, intent: &str, dialect: DialectArg) -> Result<serde_json::Value> {
    let runtime = build_runtime();
    let resolver = InMemoryResolver::new(&runtime.store);
    for file in snippet_files(dir)? {
        let source = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        runtime
            .pipeline
            .save_capability(
                SaveCapabilityInput {
                    org: org.to_string(),
                    project: project.to_string(),
                    source,
                    dialect: dialect.clone().into(),
                    success: true,
                    duration_ms: 0.0,
                    trace: None,
                },
                &resolver,
            )
            .await
            .with_context(|| format!("saving {}", file.display()))?;
    }

    let persistence: Arc<dyn capability_core::traits::CapabilityPersistence> = runtime.store.clone();
    let reliability = Arc::new(TransitiveReliability::new(persistence.clone(), runtime.clock.clone(), 60));
    let matcher = Matcher::new(
        persistence,
        runtime.embeddings.clone(),
        reliability,
        Arc::new(NullEventBus),
        CapabilityConfig::load().context("failed to load capability config")?.matcher,
    );
    let result = matcher.match_intent(intent, None).await.context("match_intent failed")?;
    Ok(match result {
        Some(m) => serde_json::json!({
            "matched": true,
            "capability_id": m.capability.id,
            "semantic_score": m.semantic_score,
            "reliability_factor": m.reliability_factor,
            "score": m.score,
            "decision": format!("{:?}", m.decision),
        }),
        None => serde_json::json!({ "matched": false }),
    })
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Pretty => print_pretty(value, 0),
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                match val {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{pad}{key}:");
                        print_pretty(val, indent + 1);
                    }
                    other => println!("{pad}{key}: {other}"),
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{pad}[{i}]");
                print_pretty(item, indent + 1);
            }
        }
        other => println!("{pad}{other}"),
    }
}
