//! Shared test utilities for bigip-vs integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use bigip_mock::{AppState, create_router};
use bigip_vs::{
    BigIpClient, ConnectionConfig, DesiredState, VirtualServerReconciler, parse_tasks, validate,
};
use tokio::net::TcpListener;

pub const USER: &str = "admin";
pub const PASSWORD: &str = "s3cret";

/// Allocate an available port for testing.
pub fn allocate_port() -> u16 {
    portpicker::pick_unused_port().expect("No available port")
}

/// Parse and validate a single YAML declaration.
pub fn desired(yaml: &str) -> DesiredState {
    let mut tasks = parse_tasks(yaml).expect("Invalid task YAML");
    assert_eq!(tasks.len(), 1);
    validate(tasks.remove(0)).expect("Declaration rejected")
}

/// Mock BIG-IP serving the iControl REST routes on a random local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let state = AppState::new(USER, PASSWORD);
        let router = create_router(state.clone());

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
        let actual_addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr: actual_addr,
            state,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(format!("http://{}", self.addr), USER, PASSWORD);
        config.timeout = Duration::from_secs(5);
        config
    }

    pub fn client(&self) -> BigIpClient {
        BigIpClient::new(&self.config()).expect("Failed to build client")
    }

    pub fn reconciler(&self) -> VirtualServerReconciler<BigIpClient> {
        VirtualServerReconciler::new(self.client()).with_timeout(Duration::from_secs(5))
    }

    /// Shutdown the server.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
