//! `braid sessions` — List stored chat sessions.

use braid_config::AppConfig;
use braid_core::store::ChatStore;
use braid_store::SqliteStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let store = SqliteStore::new(&config.storage.database_path).await?;
    let sessions = store.list_sessions().await?;

    if sessions.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }

    println!("{} session(s):", sessions.len());
    for session in sessions {
        let title = session.title.as_deref().unwrap_or("(untitled)");
        let branches = store.list_branches(&session.id).await?;
        println!(
            "  {}  {}  [{} fact(s), {} branch(es)]  {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.facts.len(),
            branches.len(),
            title,
        );
    }

    Ok(())
}
