use clap::ArgMatches;
use console_chat_session::{ChatBackend, ChatSummary, ClientConfig, Typeahead};

pub async fn run(matches: &ArgMatches, config: &ClientConfig) {
    let client = super::client(config);

    let chats = match client.list_chats().await {
        Ok(chats) => chats,
        Err(e) => {
            eprintln!("✗ Failed to list chats: {}", e);
            std::process::exit(1);
        }
    };

    let mut picker = Typeahead::new();
    if let Some(filter) = matches.get_one::<String>("filter") {
        picker.set_filter(filter.as_str());
    }
    let shown = picker.matches(&chats, ChatSummary::label);

    if shown.is_empty() {
        println!("No chats found.");
        return;
    }

    for chat in shown {
        println!(
            "{:<38} {:<40} {}{}",
            chat.id,
            chat.label(),
            chat.updated_at.format("%Y-%m-%d %H:%M"),
            if chat.archived { "  [archived]" } else { "" }
        );
    }
}
