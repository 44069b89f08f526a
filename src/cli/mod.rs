use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::RwLock;

use crate::core::config::RuntimeConfig;
use crate::core::llm::ProviderHandle;
use crate::core::store::ChatStore;
use crate::interfaces::web::ApiServer;

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&args).await,
        Some("user") => user_command(&args[1..]).await,
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => bail!("unknown command: {} (try 'colloquy help')", other),
    }
}

fn print_usage() {
    println!(
        "colloquy - retrieval-augmented chat daemon\n\n\
         USAGE:\n\
         \x20 colloquy [serve] [--api-host <host>] [--api-port <port>] [--data-dir <dir>]\n\
         \x20 colloquy user add <name>     create a user and print their API token\n\
         \x20 colloquy help\n\n\
         ENVIRONMENT:\n\
         \x20 GEMINI_API_KEY        provider credential (required for serve)\n\
         \x20 COLLOQUY_CONFIG       path to colloquy.toml (default ./colloquy.toml)\n\
         \x20 COLLOQUY_DATA_DIR     overrides the configured data directory\n\
         \x20 COLLOQUY_LOG          debug | info | warn | error"
    );
}

async fn serve(args: &[String]) -> Result<()> {
    let mut config = RuntimeConfig::load()?;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    config.api_port = args[i + 1]
                        .parse()
                        .map_err(|_| anyhow::anyhow!("--api-port expects a port number"))?;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    config.api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" => {
                if i + 1 < args.len() {
                    config.data_dir = std::path::PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    crate::logging::init();

    let store = Arc::new(ChatStore::open(&config.data_dir)?);
    let llm = Arc::new(RwLock::new(ProviderHandle::build(&config)?));

    ApiServer::new(store, llm, Arc::new(config)).serve().await
}

async fn user_command(args: &[String]) -> Result<()> {
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("add"), Some(name)) => {
            let config = RuntimeConfig::load()?;
            let store = ChatStore::open(&config.data_dir)?;
            let (token, user) = store.create_user(name).await?;
            println!("Created user '{}' ({})", user.name, user.id);
            println!("API token (shown once, store it now): {}", token);
            Ok(())
        }
        _ => bail!("usage: colloquy user add <name>"),
    }
}
