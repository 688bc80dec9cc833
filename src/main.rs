// src/main.rs
use anyhow::Context;
use fal_image_mcp::Config;
use fal_image_mcp::mcp::{GenerateImageTool, ListModelsTool, McpServer};
use fal_image_mcp::services::{FalClient, ImageGenerator, ImagePersister, UsageLogger};
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let default_filter = if config.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    info!("Starting fal-image-mcp...");

    // Initialize services
    let http = reqwest::Client::new();
    let api = Arc::new(FalClient::new(&config, http.clone()));
    let usage = UsageLogger::new(config.log_dir.clone());
    if let Some(file) = usage.usage_file() {
        info!("Recording usage to {}", file.display());
    }
    let generator = Arc::new(ImageGenerator::new(api, ImagePersister::new(http), usage));

    let server = McpServer::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .with_tool(GenerateImageTool::new(generator.clone()))
        .with_tool(ListModelsTool::new(generator));

    info!("Serving MCP over stdio");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Arc::new(server).serve(stdin, tokio::io::stdout()).await?;
    Ok(())
}
