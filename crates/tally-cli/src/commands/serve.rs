//! Server command implementation

use std::path::Path;

use anyhow::Result;
use tally_server::{parse_origins, ServerConfig, ALLOWED_ORIGINS_ENV};

use super::open_db;

/// Build the server config from the flag, falling back to the environment
pub fn server_config(allowed_origins: Option<&str>) -> ServerConfig {
    match allowed_origins {
        Some(origins) => ServerConfig {
            allowed_origins: parse_origins(origins),
        },
        None => ServerConfig::from_env(),
    }
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    allowed_origins: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let config = server_config(allowed_origins);

    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if config.allowed_origins.is_empty() {
        println!("   🌐 CORS: same-origin only (set {})", ALLOWED_ORIGINS_ENV);
    } else {
        println!("   🌐 CORS: {}", config.allowed_origins.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;
    tally_server::serve(db, host, port, config).await?;

    Ok(())
}
