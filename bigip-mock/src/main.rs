use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bigip_mock::{AppState, create_router};

/// Mock BIG-IP management API
#[derive(Parser, Debug)]
#[command(name = "bigip-mock", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8443")]
    listen: SocketAddr,

    /// Accepted username
    #[arg(long, env = "F5_USER", default_value = "admin")]
    user: String,

    /// Accepted password
    #[arg(long, env = "F5_PASSWORD", default_value = "admin", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigip_mock=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let app = create_router(AppState::new(args.user, args.password));

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("Mock BIG-IP listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
