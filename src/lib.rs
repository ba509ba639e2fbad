pub mod adapters;
mod app;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod formatter;
pub mod keys;
pub mod ports;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

pub use keys::{VapidCredentials, generate_vapid_credentials};

use std::net::SocketAddr;

pub async fn serve(addr: SocketAddr, config: config::AppConfig) {
    let state = state::AppState::from_config(config);
    let router = app::router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    state.engine.shutdown();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
