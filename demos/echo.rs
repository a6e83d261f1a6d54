//! Connects to a public echo server, sends a few messages and prints what comes back.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,resocket=debug cargo run --example echo --features tracing
//! ```
//!
//! Pass a different endpoint as the first argument to try another server.

use std::time::Duration;

use futures::StreamExt as _;
use resocket::WebSocketClient;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "wss://echo.websocket.org";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());

    let client = WebSocketClient::with_url(endpoint.as_str());
    client.configure(|config| {
        config
            .set_timeout_seconds(30)
            .insert_header("User-Agent", "resocket-echo");
    })?;

    let mut stream = client.open()?;

    // Greet again after every reconnect
    let mut state = client.state_receiver();
    let greeter = client.clone();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(endpoint = "state", state = %current);
            if current.is_connected() {
                for i in 0..3 {
                    if !greeter.send_message(&format!("hello #{i}")) {
                        warn!("connection went away before greeting {i}");
                    }
                }
            }
        }
    });

    let mut received = 0;
    while let Ok(Some(result)) = timeout(Duration::from_secs(15), stream.next()).await {
        match result {
            Ok(text) => {
                info!(message = %text);
                received += 1;
                if received >= 4 {
                    break;
                }
            }
            Err(e) => debug!(error = %e, "reconnecting"),
        }
    }

    info!(received, dropped = stream.dropped());
    client.shut_down_socket();

    Ok(())
}
