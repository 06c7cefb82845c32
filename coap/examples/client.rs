use std::error::Error;

use coap::Endpoint;
use coap::message::Request;
use tracing::Level;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_env_filter("coap=debug,client=info")
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_string());

    let endpoint = Endpoint::builder().with_name("coap-client").build();
    endpoint.start_udp_transport("0.0.0.0:0").await?;

    for path in ["/.well-known/core", "/one", "/two"] {
        let request = Request::get(path).with_host(&host);

        match endpoint.send_request(request).await {
            Ok(Some(response)) => tracing::info!(
                "{} {} -> {}",
                path,
                response.code,
                String::from_utf8_lossy(response.payload())
            ),
            Ok(None) => tracing::info!("{} sent", path),
            Err(err) => tracing::error!("{} failed: {}", path, err),
        }
    }

    endpoint.shutdown();

    Ok(())
}
