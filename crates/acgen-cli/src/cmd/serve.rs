use super::{load_config, runtime};
use std::path::Path;

pub fn run(path: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    runtime()?.block_on(async move {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        eprintln!("acgen API: http://{local}");

        tokio::select! {
            result = acgen_server::serve_on(config, listener) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
