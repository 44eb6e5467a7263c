use std::io::{self, Write};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use owo_colors::OwoColorize;

use riko_core::{Conversation, Identity, Message};
use riko_remote::{ConversationStore, MemoryRemote};
use riko_worker::{ChatEvent, ChatWorker, ConversationGuard, ProfileEditor, Session};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("riko_cli=info".parse().unwrap())
                .add_directive("riko_worker=info".parse().unwrap())
                .add_directive("riko_remote=info".parse().unwrap()),
        )
        .init();

    let name = read_line("Display name (empty for 'Riko'): ")?;
    let name = if name.is_empty() { "Riko".to_string() } else { name };
    let identity = Identity::new(
        format!("{}@demo", name.to_lowercase().replace(' ', ".")),
        name,
        "https://i.pravatar.cc/300",
    );

    let remote = Arc::new(MemoryRemote::new(identity));
    let session = Session::connect(&*remote)
        .await
        .wrap_err("Failed to establish session")?;

    let mut worker = ChatWorker::new(remote.clone(), remote.clone(), session.clone());
    let mut event_rx = worker
        .take_event_receiver()
        .ok_or_else(|| color_eyre::eyre::eyre!("Failed to get event receiver"))?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_event(event);
        }
    });

    let mut profile = ProfileEditor::new(session.clone(), remote.clone()).await;
    let mut open: Option<ConversationGuard> = None;

    loop {
        print_menu(open.as_ref());
        let choice = read_line("Choice: ")?;

        match choice.trim() {
            "1" => {
                let id = read_line("Conversation id: ")?;
                if id.is_empty() {
                    println!("❌ Conversation id cannot be empty");
                    continue;
                }
                // Replacing the guard drops the previous subscription.
                open = Some(worker.open_conversation(&id).await?);
                println!("👀 Now following {}", id.cyan());
            }
            "2" => send_message(&worker, open.as_ref()).await?,
            "3" => send_attachment(&worker, open.as_ref()).await?,
            "4" => simulate_incoming(&remote, open.as_ref()).await?,
            "5" => edit_profile(&mut profile).await?,
            "0" => {
                println!("👋 Bye");
                break;
            }
            _ => println!("❌ Invalid choice"),
        }
    }

    Ok(())
}

fn print_menu(open: Option<&ConversationGuard>) {
    let following = open
        .map(|guard| guard.conversation_id().to_string())
        .unwrap_or_else(|| "none".to_string());

    println!();
    println!("╔════════════════════════════════════╗");
    println!("║          RIKO CLI - Chat           ║");
    println!("╠════════════════════════════════════╣");
    println!("║  1. Open Conversation              ║");
    println!("║  2. Send Message                   ║");
    println!("║  3. Send Attachment                ║");
    println!("║  4. Simulate Incoming Message      ║");
    println!("║  5. Edit Profile                   ║");
    println!("║  0. Exit                           ║");
    println!("╚════════════════════════════════════╝");
    println!("   following: {}", following.cyan());
}

fn handle_event(event: ChatEvent) {
    match event {
        ChatEvent::Snapshot {
            conversation_id,
            messages,
        } => {
            println!(
                "\n💬 {} ({} messages)",
                conversation_id.cyan(),
                messages.len()
            );
            for message in &messages {
                let body = message
                    .image
                    .as_deref()
                    .map(|url| format!("[image] {url}"))
                    .unwrap_or_else(|| message.text.clone());
                println!("  {} {}", format!("{}:", message.sender.name).bold(), body);
            }
        }
        ChatEvent::SubscriptionLost {
            conversation_id,
            reason,
        } => {
            println!("\n📴 Lost subscription to {conversation_id}: {reason}");
        }
        ChatEvent::Resubscribed { conversation_id } => {
            println!("\n📡 Resubscribed to {conversation_id}");
        }
        ChatEvent::MessageSent { message_id, .. } => {
            println!("\n📤 Sent {message_id}");
        }
        ChatEvent::UploadStarted { key } => {
            println!("\n📦 Uploading {key}...");
        }
        ChatEvent::UploadProgress {
            bytes_transferred,
            total_bytes,
            ..
        } => {
            let percent = if total_bytes == 0 {
                100.0
            } else {
                bytes_transferred as f64 / total_bytes as f64 * 100.0
            };
            println!("   Upload percent: {percent:.0}%");
        }
        ChatEvent::UploadCompleted { url, .. } => {
            println!("✅ Upload done: {}", url.green());
        }
        ChatEvent::UploadFailed { key, error } => {
            println!("❌ Upload {key} failed: {}", error.red());
        }
        ChatEvent::Error {
            conversation_id,
            error,
        } => {
            println!(
                "\n❌ Error ({}): {}",
                conversation_id.unwrap_or_default(),
                error.red()
            );
        }
    }
}

async fn send_message(worker: &ChatWorker, open: Option<&ConversationGuard>) -> Result<()> {
    let Some(guard) = open else {
        println!("❌ Open a conversation first");
        return Ok(());
    };

    let body = read_line("Message: ")?;
    worker.send_text(guard.conversation_id(), body).await?;
    Ok(())
}

async fn send_attachment(worker: &ChatWorker, open: Option<&ConversationGuard>) -> Result<()> {
    let Some(guard) = open else {
        println!("❌ Open a conversation first");
        return Ok(());
    };

    let path = read_line("File path: ")?;
    match worker.send_attachment(guard.conversation_id(), &path).await {
        Ok(key) => println!("📎 Upload {key} started, watch for progress"),
        Err(err) => println!("❌ Could not read {path}: {err}"),
    }
    Ok(())
}

/// Pretend another device rewrote the conversation document:
/// read, append, write back blind.
async fn simulate_incoming(remote: &MemoryRemote, open: Option<&ConversationGuard>) -> Result<()> {
    let Some(guard) = open else {
        println!("❌ Open a conversation first");
        return Ok(());
    };
    let conversation_id = guard.conversation_id();

    let body = read_line("Incoming text: ")?;
    let peer = Identity::new("peer@demo", "Peer", "https://i.pravatar.cc/301");

    let mut conversation = match remote.load(conversation_id).await? {
        Some(snapshot) => serde_json::from_value::<Conversation>(snapshot.data)?,
        None => Conversation::default(),
    };
    let mut message = Message::text(body, peer.sender());
    message.sent = true;
    message.received = true;
    conversation.append(message);

    remote
        .store(conversation_id, serde_json::to_value(&conversation)?, None)
        .await?;
    Ok(())
}

async fn edit_profile(profile: &mut ProfileEditor) -> Result<()> {
    println!();
    println!(
        "👤 {} · {}",
        profile.display_name().bold(),
        profile.about()
    );
    println!("  1. Edit name");
    println!("  2. Edit about");
    let choice = read_line("Choice (anything else to go back): ")?;

    match choice.trim() {
        "1" => {
            let name = read_line("New name: ")?;
            profile.set_name_input(name);
            match profile.save_name().await {
                Ok(()) => println!("✅ Saved: {}", profile.display_name().bold()),
                Err(err) => println!("❌ Name not saved: {err}"),
            }
        }
        "2" => {
            let about = read_line("New about: ")?;
            profile.set_about_input(about);
            profile.save_about();
            println!("✅ About is now: {}", profile.about());
        }
        _ => {}
    }
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
