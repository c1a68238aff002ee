//! In-process HTTP server for client tests

use axum::Router;

/// Serve `router` on an ephemeral localhost port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock server");
    let addr = listener.local_addr().expect("Mock server has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock server failed");
    });

    format!("http://{}", addr)
}
