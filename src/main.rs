use std::sync::Arc;

use anyhow::Result;
use log::info;

use skytrace::{io, router, AppState, EarthEngineClient};

fn main() -> Result<()> {
    env_logger::init();

    let port: u16 = env_or("SKYTRACE_PORT", 8000);
    let blocking_threads: usize = env_or("SKYTRACE_BLOCKING_THREADS", 32);

    // Credential bootstrap and blocking-client construction happen before
    // the runtime exists; auth failure is logged inside and requests fail at
    // query time instead
    let credentials = io::bootstrap();
    let client = Arc::new(EarthEngineClient::new(credentials));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .max_blocking_threads(blocking_threads)
        .enable_all()
        .build()?;
    runtime.block_on(serve(port, client))
}

async fn serve(port: u16, client: Arc<EarthEngineClient>) -> Result<()> {
    let app = router(AppState { client });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("skytrace listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
