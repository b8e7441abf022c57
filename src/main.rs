//! Command-line interface for bump-stream
//!
//! # Usage Examples
//!
//! ```bash
//! # Run a pipeline against MongoDB, printing one JSON line per summary
//! bump-stream run \
//!   'bump(products, batchSize=100, cluster="mongodb://localhost:27017/shop", jsonl(file="clicks.jsonl"))'
//!
//! # Same pipeline without writing anything
//! bump-stream run --dry-run \
//!   'bump(products, batchSize=100, cluster=mem://local, jsonl(file="clicks.jsonl"))'
//!
//! # Cluster locators from a settings file
//! bump-stream explain --config bump.toml 'bump(products, batchSize=100, jsonl(file="clicks.jsonl"))'
//!
//! # Check an expression and print its normalized form
//! bump-stream validate 'bump(products,batchSize=5,cluster=mem://x,records())'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bump_core::StreamContext;
use bump_stream::{drain, Settings, StreamFactory};
use clap::{Args, Parser, Subcommand};
use document_store::{MemoryConnector, MemoryStore, WriterConnector, WriterRegistry};
use mongodb_store::MongoConnector;

#[derive(Parser)]
#[command(name = "bump-stream")]
#[command(about = "Increment document counters in batches from a stream of records")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline and print every emitted record as a JSON line
    Run {
        #[command(flatten)]
        pipeline: PipelineOpts,

        /// Share one store connection per cluster across all operators
        #[arg(long)]
        shared_clients: bool,

        /// Write to an in-memory store instead of the configured cluster
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the explain tree of a pipeline as JSON
    Explain {
        #[command(flatten)]
        pipeline: PipelineOpts,
    },

    /// Check a pipeline expression and print its normalized form
    Validate {
        #[command(flatten)]
        pipeline: PipelineOpts,
    },
}

#[derive(Args, Clone)]
struct PipelineOpts {
    /// Streaming expression describing the pipeline
    #[arg(value_name = "EXPRESSION")]
    expression: String,

    /// TOML settings file (default cluster, per-collection clusters, worker id)
    #[arg(long, env = "BUMP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Cluster locator used when neither the expression nor the settings name one
    #[arg(long, env = "BUMP_DEFAULT_CLUSTER")]
    default_cluster: Option<String>,

    /// Worker id reported in summary records
    #[arg(long, env = "BUMP_WORKER_ID")]
    worker_id: Option<String>,

    /// Database used when the cluster locator does not name one
    #[arg(long)]
    database: Option<String>,
}

impl PipelineOpts {
    fn settings(&self) -> anyhow::Result<Settings> {
        match &self.config {
            Some(path) => Settings::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    fn factory(&self, connector: Arc<dyn WriterConnector>) -> anyhow::Result<(StreamFactory, Settings)> {
        let settings = self.settings()?;
        let mut factory = StreamFactory::new(connector).with_settings(&settings);
        if let Some(cluster) = &self.default_cluster {
            factory = factory.with_default_cluster(cluster.clone());
        }
        Ok((factory, settings))
    }

    fn worker_id(&self, settings: &Settings) -> Option<String> {
        self.worker_id.clone().or_else(|| settings.worker_id.clone())
    }

    fn mongo_connector(&self) -> Arc<dyn WriterConnector> {
        let mut connector = MongoConnector::new();
        if let Some(database) = &self.database {
            connector = connector.with_database(database.clone());
        }
        Arc::new(connector)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            shared_clients,
            dry_run,
        } => run_pipeline(pipeline, shared_clients, dry_run).await,
        Commands::Explain { pipeline } => {
            let (factory, _) = pipeline.factory(pipeline.mongo_connector())?;
            let source = factory
                .construct_str(&pipeline.expression)
                .context("Failed to build pipeline")?;
            println!("{}", serde_json::to_string_pretty(&source.explain())?);
            Ok(())
        }
        Commands::Validate { pipeline } => {
            let (factory, _) = pipeline.factory(pipeline.mongo_connector())?;
            let source = factory
                .construct_str(&pipeline.expression)
                .context("Failed to build pipeline")?;
            println!("{}", source.to_expression()?);
            Ok(())
        }
    }
}

async fn run_pipeline(
    pipeline: PipelineOpts,
    shared_clients: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let memory_store = MemoryStore::new();
    let connector: Arc<dyn WriterConnector> = if dry_run {
        tracing::info!("Dry run: increments go to an in-memory store");
        Arc::new(MemoryConnector::new(memory_store.clone()))
    } else {
        pipeline.mongo_connector()
    };

    let (factory, settings) = pipeline.factory(Arc::clone(&connector))?;
    let mut source = factory
        .construct_str(&pipeline.expression)
        .context("Failed to build pipeline")?;

    let mut context = StreamContext::new();
    if let Some(worker_id) = pipeline.worker_id(&settings) {
        context = context.with_worker_id(worker_id);
    }
    let registry = shared_clients.then(|| Arc::new(WriterRegistry::new(Arc::clone(&connector))));
    if let Some(registry) = &registry {
        context = context.with_registry(Arc::clone(registry));
    }
    source.set_context(&context);

    let result = drain(source.as_mut(), |record| println!("{}", record.to_json())).await;

    if let Some(registry) = registry {
        if let Err(e) = registry.shutdown_all().await {
            tracing::warn!("Failed to shut down shared store connections: {e}");
        }
    }

    let emitted = result.context("Pipeline failed")?;
    tracing::info!("Pipeline finished after emitting {emitted} records");
    if dry_run {
        tracing::info!(
            "Dry run applied {} batches ({} write calls)",
            memory_store.batch_sizes().len(),
            memory_store.write_calls()
        );
    }
    Ok(())
}
