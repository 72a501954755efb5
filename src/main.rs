#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let matches = Command::new("console-chat")
        .version(VERSION)
        .about("Stream agent chats from the terminal")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Config file (default: <config dir>/console-chat/config.toml)")
                .global(true),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Console API base URL")
                .global(true),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("Bearer token for the console API")
                .global(true),
        )
        .subcommand(
            Command::new("send")
                .about("Send a message and stream the reply")
                .arg(
                    Arg::new("chat")
                        .short('c')
                        .long("chat")
                        .value_name("ID")
                        .help("Chat to send to")
                        .required(true),
                )
                .arg(
                    Arg::new("attach")
                        .short('a')
                        .long("attach")
                        .value_name("FILE")
                        .help("Attach a file (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("auto-approve")
                        .long("auto-approve")
                        .help("Approve every tool call without prompting")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("auto-reject")
                        .long("auto-reject")
                        .help("Reject every tool call without prompting")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("auto-approve"),
                )
                .arg(
                    Arg::new("text")
                        .value_name("TEXT")
                        .help("Message text")
                        .num_args(1..)
                        .trailing_var_arg(true),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print a conversation")
                .arg(
                    Arg::new("chat")
                        .short('c')
                        .long("chat")
                        .value_name("ID")
                        .help("Chat to show")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List chats")
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .value_name("TEXT")
                        .help("Only chats whose title contains TEXT"),
                ),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let config = match commands::load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    match matches.subcommand() {
        Some(("send", sub)) => commands::send::run(sub, &config).await,
        Some(("show", sub)) => commands::show::run(sub, &config).await,
        Some(("list", sub)) => commands::list::run(sub, &config).await,
        _ => {
            println!("console-chat v{}", VERSION);
            println!("Use --help for available commands");
        }
    }
}

/// `RUST_LOG` when set, otherwise warnings only so streamed text stays
/// readable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}
