use std::sync::Arc;

use mock_server::Platform;
use tokio::{net::TcpListener, sync::RwLock};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    let db = Arc::new(RwLock::new(Platform::demo(&addr)));
    tracing::info!(%addr, "mock platform listening (school code `demo`, device `dev-123`, token `tok`)");
    mock_server::run(listener, db).await
}
