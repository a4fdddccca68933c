//! Simple example of using proxy-refill-pool.
//!
//! Usage: `cargo run --example simple -- path/to/ProxyConfig.toml`

use reqwest_middleware::ClientBuilder;
use proxy_refill_pool::{ProxyPool, ProxyPoolConfig, ProxyPoolMiddleware};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Config/ProxyConfig.toml".to_string());
    let config = ProxyPoolConfig::from_file(&path)?;

    println!("Initializing proxy pool...");
    let pool = ProxyPool::new(config).await?;

    match pool.get_proxy(60).await {
        Ok(proxy) => {
            println!("Got {} with {}s left", proxy.address(), proxy.remaining_lifetime());
            pool.requeue(&proxy).await;
        }
        Err(e) => println!("{}", e),
    }

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::new(pool.clone(), 30))
        .build();

    println!("Sending request...");
    let response = client.get("https://httpbin.org/ip").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);
    println!("Proxies queued: {}", pool.queue_len().await);

    Ok(())
}
