//! `braid serve` — Start the HTTP API server.

use braid_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  WARNING: No API key configured — chat requests will fail.");
        eprintln!("  Set BRAID_API_KEY or OPENAI_API_KEY, or add api_key to");
        eprintln!("  {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
    }

    println!("braid gateway");
    println!("  Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("  Database:  {}", config.storage.database_path);
    println!("  Model:     {}", config.default_model);

    braid_gateway::start(config).await?;

    Ok(())
}
