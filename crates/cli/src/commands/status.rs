//! `braid status` — Show effective configuration.

use braid_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("braid status");
    println!("============");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  Base URL:       {}", config.base_url);
    println!("  Model:          {}", config.default_model);
    println!("  Summary model:  {}", config.summary_model);
    println!("  Temperature:    {}", config.default_temperature);
    println!("  Window size:    {}", config.context.window_size);
    println!("  Database:       {}", config.storage.database_path);
    println!(
        "  Gateway:        {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "  API key:        {}",
        if config.has_api_key() {
            "configured"
        } else {
            "missing"
        }
    );

    Ok(())
}
