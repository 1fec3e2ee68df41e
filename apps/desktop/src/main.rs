mod console;
mod credentials;
mod fixture;

use std::{
    collections::HashMap,
    fs::File,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Parser, Subcommand};
use client_core::{load_settings, Session};
use console::ConsoleNotifier;
use credentials::FileCredentialStore;
use fixture::{Fixture, FixtureBackend};
use shared::domain::{ChatId, Message, MessageId, Profile, UserId, UNKNOWN_SENDER};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// JSON fixture standing in for the messaging backend.
    #[arg(long)]
    fixture: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// Write debug logs here instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        code: String,
    },
    Chats,
    Open {
        chat_id: i64,
    },
    Older {
        chat_id: i64,
    },
    Send {
        chat_id: i64,
        text: String,
    },
    Attachment {
        chat_id: i64,
        message_id: i64,
        index: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Listen {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let config = load_settings(cli.config.as_deref());
    let backend = Arc::new(FixtureBackend::new(Fixture::load(&cli.fixture)?));
    let credentials_path = match cli.credentials {
        Some(path) => path,
        None => FileCredentialStore::default_path()?,
    };
    let credentials = Arc::new(FileCredentialStore::new(credentials_path));
    info!(path = %credentials.path().display(), "desktop: using credential file");
    let session = Session::new(config, backend.clone(), credentials, Arc::new(ConsoleNotifier));

    let result = run(&session, &backend, cli.command).await;
    session.shutdown().await;
    result
}

async fn run(session: &Session, backend: &FixtureBackend, command: Command) -> Result<()> {
    if let Command::Login { phone, code } = &command {
        session.start_verification(phone).await?;
        if !session.confirm_verification(code).await {
            bail!("verification code rejected");
        }
        println!("signed in; token saved");
        return Ok(());
    }

    if !session.restore().await {
        bail!("not signed in; run `login` first");
    }

    match command {
        Command::Login { .. } => {}
        Command::Chats => {
            let mut chats: Vec<_> = session.load_chats().await.into_values().collect();
            chats.sort_by_key(|chat| chat.id);
            for chat in chats {
                println!("{:>8}  {}", chat.id, chat.title);
            }
        }
        Command::Open { chat_id } => {
            let chat_id = ChatId(chat_id);
            open(session, chat_id).await?;
            print_log(session, chat_id, &session.messages(chat_id).await).await;
        }
        Command::Older { chat_id } => {
            let chat_id = ChatId(chat_id);
            open(session, chat_id).await?;
            let added = session.load_older(chat_id).await;
            if added.is_empty() {
                println!("no older messages");
            } else {
                print_log(session, chat_id, &added).await;
            }
        }
        Command::Send { chat_id, text } => {
            open(session, ChatId(chat_id)).await?;
            let message = session
                .send(&text)
                .await
                .ok_or_else(|| anyhow!("send failed"))?;
            println!("sent message {}", message.id);
        }
        Command::Attachment {
            chat_id,
            message_id,
            index,
            out,
        } => {
            let chat_id = ChatId(chat_id);
            let message_id = MessageId(message_id);
            open(session, chat_id).await?;
            let message = session
                .messages(chat_id)
                .await
                .into_iter()
                .find(|message| message.id == message_id)
                .ok_or_else(|| anyhow!("message {message_id} not in the loaded history"))?;
            let descriptor = message
                .attachments
                .get(index)
                .ok_or_else(|| anyhow!("message {message_id} has no attachment #{index}"))?;
            let attachment = session
                .get_attachment(chat_id, message_id, descriptor)
                .await
                .ok_or_else(|| anyhow!("attachment unavailable"))?;
            match out {
                Some(path) => {
                    let bytes = STANDARD.decode(&attachment.content_b64)?;
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("write {}", path.display()))?;
                    println!(
                        "{} ({}, {} bytes) -> {}",
                        attachment.filename,
                        attachment.mime_type,
                        bytes.len(),
                        path.display()
                    );
                }
                None => println!("{}", attachment.data_url()),
            }
        }
        Command::Listen { seconds } => {
            session.load_chats().await;
            let queued = backend.replay_events().await?;
            println!("replayed {queued} push events");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
    }
    Ok(())
}

async fn open(session: &Session, chat_id: ChatId) -> Result<()> {
    if !session.navigate_to_chat(chat_id).await {
        bail!("could not open chat {chat_id}");
    }
    Ok(())
}

async fn print_log(session: &Session, chat_id: ChatId, messages: &[Message]) {
    let profiles = session.chat_profiles(chat_id).await;
    for message in messages {
        let when = message
            .sent_at()
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "[{when}] {}: {}",
            sender_name(&profiles, message.sender_id),
            message.text
        );
    }
}

fn sender_name(profiles: &HashMap<UserId, Profile>, sender: UserId) -> String {
    profiles
        .get(&sender)
        .map(Profile::display_name)
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
}
