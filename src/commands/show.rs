use clap::ArgMatches;
use console_chat_session::{ChatBackend, ClientConfig, ContentPart, Message, MessageContent, Role};

pub async fn run(matches: &ArgMatches, config: &ClientConfig) {
    let chat_id = matches.get_one::<String>("chat").expect("--chat is required");
    let client = super::client(config);

    let chat = match client.fetch_chat(chat_id).await {
        Ok(chat) => chat,
        Err(e) => {
            eprintln!("✗ Failed to load chat {}: {}", chat_id, e);
            std::process::exit(1);
        }
    };

    let title = chat.title.as_deref().unwrap_or("Untitled");
    println!("\x1b[1m{}\x1b[0m ({}){}", title, chat.id, if chat.archived { " [archived]" } else { "" });
    println!();

    for message in &chat.messages {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    let colour = match message.role {
        Role::User => "\x1b[36m",
        Role::Assistant => "\x1b[32m",
        Role::Tool => "\x1b[33m",
        Role::System => "\x1b[90m",
    };
    println!(
        "{}{}\x1b[0m  {}",
        colour,
        message.role,
        message.created_at.format("%Y-%m-%d %H:%M")
    );

    let text = message.content.text();
    if !text.is_empty() {
        println!("{}", text);
    }
    if let MessageContent::Parts(ref parts) = message.content {
        for part in parts {
            match part {
                ContentPart::Text { .. } => {}
                ContentPart::Unknown => println!("  [unsupported part]"),
                ContentPart::Image { .. } => println!("  [image]"),
                ContentPart::Audio { .. } => println!("  [audio]"),
                ContentPart::File { filename, .. } => {
                    println!("  [file {}]", filename.as_deref().unwrap_or("unnamed"))
                }
            }
        }
    }
    for call in message.tool_calls.iter().flatten() {
        let name = match call.function.namespace {
            Some(ref ns) => format!("{}/{}", ns, call.function.name),
            None => call.function.name.clone(),
        };
        println!("  → {}({})", name, call.function.arguments);
    }
    println!();
}
