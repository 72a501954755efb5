//! `console-chat send`: stream a reply, then walk any tool approvals.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::ArgMatches;
use console_chat_session::{
    compose_content, ApprovalOutcome, Attachment, ChatSession, ChatSessionError, ClientConfig,
    PendingApproval, SessionObserver, StreamOutcome,
};
use tokio::task::JoinHandle;

/// Prints fragments as they arrive.
struct TerminalObserver;

impl SessionObserver for TerminalObserver {
    fn on_content(&self, fragment: &str, _buffer: &str) {
        print!("{}", fragment);
        let _ = std::io::stdout().flush();
    }

    fn on_approval_required(&self, approval: &PendingApproval) {
        eprintln!("\n⏸  {} is waiting for approval", approval.qualified_name());
    }
}

pub async fn run(matches: &ArgMatches, config: &ClientConfig) {
    let chat_id = matches.get_one::<String>("chat").expect("--chat is required");
    let text = matches
        .get_many::<String>("text")
        .map(|words| words.cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let mut attachments = Vec::new();
    for path in matches.get_many::<String>("attach").into_iter().flatten() {
        match Attachment::from_path(Path::new(path)).await {
            Ok(a) => attachments.push(a),
            Err(e) => {
                eprintln!("✗ Failed to attach {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    let attached = attachments.len();
    let content = compose_content(&text, attachments);
    if content.is_empty() {
        eprintln!("✗ Nothing to send: give message text or --attach a file");
        std::process::exit(1);
    }

    tracing::debug!(chat_id = %chat_id, attached, "composed message");

    let decision = if matches.get_flag("auto-approve") {
        Some(true)
    } else if matches.get_flag("auto-reject") {
        Some(false)
    } else {
        None
    };

    let session = Arc::new(
        ChatSession::new(chat_id, super::client(config), config)
            .with_observer(Arc::new(TerminalObserver)),
    );

    let watcher = cancel_on_ctrl_c(session.clone());
    let result = session.send_message(content).await;
    watcher.abort();
    report(result);

    loop {
        let Some(approval) = session.pending_approvals().await.into_iter().next() else {
            break;
        };
        let approved = match decision {
            Some(d) => d,
            None => ask(&approval),
        };

        let watcher = cancel_on_ctrl_c(session.clone());
        let result = session
            .resolve_approval(&approval.tool_call_id, approved)
            .await;
        watcher.abort();

        let verdict = if approved { "approved" } else { "rejected" };
        match result {
            Ok(ApprovalOutcome::Resolved) => {
                println!("✓ {} {}", approval.qualified_name(), verdict)
            }
            Ok(ApprovalOutcome::Streamed(outcome)) => report(Ok(outcome)),
            Err(e) => {
                eprintln!("✗ Approval failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cancel_on_ctrl_c(session: Arc<ChatSession>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            session.cancel().await;
        }
    })
}

fn report(result: Result<StreamOutcome, ChatSessionError>) {
    println!();
    match result {
        Ok(StreamOutcome::Completed) => {}
        Ok(StreamOutcome::Cancelled) => eprintln!("⚠️  Generation cancelled"),
        Ok(StreamOutcome::TimedOut) => eprintln!("⚠️  Stream went quiet; stopped waiting"),
        Ok(StreamOutcome::Closed) => eprintln!("⚠️  Stream closed before the reply finished"),
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "interactive")]
fn ask(approval: &PendingApproval) -> bool {
    use dialoguer::{theme::ColorfulTheme, Confirm};

    let args = serde_json::to_string_pretty(&approval.arguments).unwrap_or_default();
    println!("{} wants to run with:\n{}", approval.qualified_name(), args);
    match Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Allow this tool call?")
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            eprintln!("✗ Prompt failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "interactive"))]
fn ask(approval: &PendingApproval) -> bool {
    eprintln!(
        "✗ {} needs approval; rebuild with the `interactive` feature or pass --auto-approve/--auto-reject",
        approval.qualified_name()
    );
    std::process::exit(1);
}
