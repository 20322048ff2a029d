mod config;
mod db;
mod errors;
mod extraction;
mod generation;
mod identity;
mod latex;
mod llm_client;
mod models;
mod resume;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::generation::GenerationChain;
use crate::latex::LatexCompiler;
use crate::llm_client::{ChatCompletionsClient, CompletionProvider, EndpointConfig};
use crate::resume::pipeline::ResumePipeline;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{cleanup::log_failures, ArtifactPublisher, CleanupQueue, S3ObjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume LaTeX API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;

    let s3 = build_s3_client(&config).await;
    let store = S3ObjectStore::new(s3, config.s3_bucket.clone(), config.public_base_url.clone());
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let publisher = ArtifactPublisher::new(Arc::new(store));
    let cleanup = CleanupQueue::spawn(publisher.clone());
    tokio::spawn(log_failures(cleanup.failures));

    let chain = build_generation_chain(&config)?;
    if chain.primary_credentials() == 0 && !chain.has_secondary() {
        warn!("No LLM credentials configured; uploads will use the plain-text fallback document");
    } else {
        info!(
            "Generation chain ready ({} primary credentials, secondary: {})",
            chain.primary_credentials(),
            chain.has_secondary()
        );
    }

    let compiler = LatexCompiler::new(&config.pdflatex_path, config.compile_timeout);
    let pipeline = ResumePipeline::new(
        chain,
        compiler,
        publisher,
        cleanup.queue,
        config.scratch_dir.clone(),
    );

    let state = AppState {
        db,
        pipeline: Arc::new(pipeline),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// One primary client per configured key, in configured order, plus the optional secondary.
fn build_generation_chain(config: &Config) -> Result<GenerationChain> {
    let mut primary: Vec<Arc<dyn CompletionProvider>> = Vec::new();
    for (index, key) in config.groq_api_keys.iter().enumerate() {
        let endpoint = EndpointConfig {
            label: format!("groq#{}", index + 1),
            url: config.groq_api_url.clone(),
            model: config.groq_model.clone(),
            timeout: config.llm_timeout,
        };
        primary.push(Arc::new(ChatCompletionsClient::new(endpoint, key.clone())?));
    }

    let secondary = match &config.gemini_api_key {
        Some(key) => {
            let endpoint = EndpointConfig {
                label: "gemini".to_string(),
                url: config.gemini_api_url.clone(),
                model: config.gemini_model.clone(),
                timeout: config.llm_timeout,
            };
            let client: Arc<dyn CompletionProvider> =
                Arc::new(ChatCompletionsClient::new(endpoint, key.clone())?);
            Some(client)
        }
        None => None,
    };

    Ok(GenerationChain::new(primary, secondary))
}

/// Constructs an S3 client for MinIO (local) or any S3-compatible endpoint.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "resume-static",
    );

    let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
