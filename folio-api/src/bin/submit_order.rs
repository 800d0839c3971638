//! Posts an order read from a JSON file and prints the generated order id.

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use folio_order::CreateOrderRequest;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "submit-order")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Order file: `{"products": [...], "customer": {...}}`.
    #[arg(long, short = 'f', default_value = "data.json")]
    file: PathBuf,

    /// Base URL of the ingestion API.
    #[arg(long, env = "FOLIO_API_URL", default_value = "http://localhost:8080")]
    addr: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    order_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let order: CreateOrderRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cli.file.display()))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let url = format!("{}/v1/orders", cli.addr.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&order)
        .send()
        .await
        .context("Failed to send order")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({status}): {body}");
    }

    let created: CreateOrderResponse = response.json().await.context("Failed to parse response")?;
    println!("Generated order id: {}", created.order_id);
    Ok(())
}
