use eventlens::datasource::GraphQlEventSource;
use eventlens::orchestration::{EventFetcher, Projector};
use eventlens::{api, config::Config, EventSource};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let source: Arc<dyn EventSource> = Arc::new(GraphQlEventSource::new(
        config.indexer_url.clone(),
        config.page_size,
        config.retry_max_elapsed,
    ));
    let fetcher = EventFetcher::new(source, config.max_concurrent_fetches, config.fetch_timeout);
    let projector = Arc::new(Projector::new(fetcher));

    tracing::info!(
        indexer = %config.indexer_url,
        page_size = config.page_size,
        max_concurrent_fetches = config.max_concurrent_fetches,
        "projection engine configured"
    );

    // Create router
    let app = api::create_router(api::AppState::new(projector, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
