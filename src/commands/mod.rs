pub mod list;
pub mod send;
pub mod show;

use std::path::Path;
use std::sync::Arc;

use clap::ArgMatches;
use console_chat_session::{ChatApiClient, ChatSessionError, ClientConfig};

/// File and environment first, then command-line flags.
pub fn load_config(matches: &ArgMatches) -> Result<ClientConfig, ChatSessionError> {
    let path = matches.get_one::<String>("config").map(Path::new);
    let mut config = ClientConfig::load(path)?;
    if let Some(url) = matches.get_one::<String>("base-url") {
        config.base_url = url.clone();
    }
    if let Some(token) = matches.get_one::<String>("token") {
        config.token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn client(config: &ClientConfig) -> Arc<ChatApiClient> {
    match ChatApiClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}
