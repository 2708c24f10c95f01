//! Worker binary entry point: parses CLI arguments, resolves
//! [`WorkerConfig`], assembles every capability implementation behind its
//! trait, and either runs the worker loop or dispatches a one-shot
//! job/export/import subcommand.
//!
//! Tracing setup mirrors the teacher's demo binaries'
//! `tracing_subscriber::registry().with(...).with(ErrorLayer::default()).init()`
//! pattern (`weavegraph::examples::demo1::init_tracing`), swapping the
//! hand-picked `EnvFilter` default for one scoped to this crate.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use corpus_connections::Orchestrator;
use corpus_ingest::embed::HashSeededEmbedder;
use corpus_ingest::enrich::LocalHeuristicEnrichmentProvider;
use corpus_ingest::extract::{Extractor, HtmlExtractor, MarkdownPassthroughExtractor, PlainTextExtractor, SourceType};
use corpus_storage::{DbPool, LocalFsStore};

use corpus_engine::cli::{Cli, Commands, WorkerAction};
use corpus_engine::config::{WorkerConfig, WorkerConfigOverrides};
use corpus_engine::event_bus::EventBus;
use corpus_engine::url_signer::HmacUrlSigner;
use corpus_engine::worker::{Worker, WorkerDeps};

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(true);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,corpus_engine=debug")).unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let overrides = WorkerConfigOverrides {
        database_url: cli.database_url.clone(),
        object_store_root: None,
    };
    let config = WorkerConfig::load(cli.config.as_deref().and_then(|p| p.to_str()), overrides)?;

    tracing::info!(
        database_url = %config.database_url,
        claim_interval_secs = config.claim_interval_secs,
        "resolved worker config"
    );

    let pool = DbPool::connect(&config.database_url).await?;
    let store: Arc<dyn corpus_storage::ObjectStore> = Arc::new(LocalFsStore::new(&config.object_store_root));

    match cli.command {
        Commands::Worker { action: WorkerAction::Run } => {
            let deps = build_worker_deps(config.clone(), pool, store);
            let worker = Worker::new(config, deps);

            let shutdown = tokio_util::sync::CancellationToken::new();
            let shutdown_for_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received ctrl-c, shutting down");
                    shutdown_for_signal.cancel();
                }
            });

            worker.run(shutdown).await;
        }
        other => {
            corpus_engine::cli::run_one_shot(&pool, other).await?;
        }
    }

    Ok(())
}

fn build_worker_deps(
    config: WorkerConfig,
    pool: DbPool,
    store: Arc<dyn corpus_storage::ObjectStore>,
) -> WorkerDeps {
    let mut extractors: HashMap<SourceType, Arc<dyn Extractor>> = HashMap::new();
    extractors.insert(SourceType::PlainText, Arc::new(PlainTextExtractor));
    extractors.insert(SourceType::Html, Arc::new(HtmlExtractor));
    extractors.insert(SourceType::Markdown, Arc::new(MarkdownPassthroughExtractor));

    let orchestrator = Orchestrator::builder()
        .add_engine(Box::new(corpus_connections::semantic::SemanticSimilarityEngine))
        .add_engine(Box::new(corpus_connections::contradiction::ContradictionEngine))
        .add_engine(Box::new(corpus_connections::thematic_bridge::ThematicBridgeEngine::new(Box::new(
            corpus_connections::thematic_bridge::LocalHeuristicBridgeJudge,
        ))))
        .build();

    WorkerDeps {
        pool,
        store,
        extractors,
        ai_cleanup: None,
        enrichment_provider: Arc::new(LocalHeuristicEnrichmentProvider),
        embedder: Arc::new(HashSeededEmbedder),
        orchestrator,
        orchestrator_config: corpus_connections::OrchestratorConfig::default(),
        events: Arc::new(EventBus::default()),
        url_signer: Arc::new(HmacUrlSigner::new(config.signed_url_secret.clone().into_bytes())),
    }
}
