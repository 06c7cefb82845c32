use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use coap::Endpoint;
use coap::Router;
use coap::router::Resource;
use coap::transaction::ServerTransaction;
use coap::transport::incoming::IncomingRequest;
use tokio::time;
use tracing::Level;

/// Answers after a while, as a separate response.
struct Slow;

#[async_trait]
impl Resource for Slow {
    async fn handle(&self, _: &IncomingRequest, response: &mut ServerTransaction) {
        if let Err(err) = response.defer().await {
            tracing::warn!("Failed to defer: {}", err);
            return;
        }
        time::sleep(Duration::from_secs(2)).await;
        response.set_payload("TWO!!!");
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_env_filter("coap=trace")
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();

    let router = Router::new()
        .get("/one", |_: &IncomingRequest, response: &mut ServerTransaction| {
            response.set_payload("ONE!!!");
        })
        .get("/two", Slow);

    let endpoint = Endpoint::builder()
        .with_name("coap-server")
        .with_handler(router)
        .build();

    let addr = endpoint.start_udp_transport("127.0.0.1:5683").await?;
    tracing::info!("Server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    println!();
    endpoint.shutdown();

    Ok(())
}
