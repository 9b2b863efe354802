use anyhow::{Context, Result};
use beacon_client::{
    ClientConfig, Coordinator, EngineState, MediaKind, ResponderMedia, SyntheticMedia,
};
use beacon_core::Role;
use beacon_relay::RelayBroker;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dialoguer::{Input, Select};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Two-party WebRTC sessions coordinated over a STOMP relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room and stay connected until ctrl-c.
    Join {
        #[arg(short, long)]
        room: Option<String>,

        #[arg(long)]
        role: Option<Role>,

        #[arg(long)]
        relay: Option<String>,

        #[arg(long, value_enum)]
        responder_media: Option<MediaPolicy>,

        /// JSON file with client settings.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a local relay broker.
    Relay {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaPolicy {
    ReceiveOnly,
    PreferSend,
    RequireSend,
}

impl From<MediaPolicy> for ResponderMedia {
    fn from(policy: MediaPolicy) -> Self {
        match policy {
            MediaPolicy::ReceiveOnly => ResponderMedia::ReceiveOnly,
            MediaPolicy::PreferSend => ResponderMedia::PreferSend,
            MediaPolicy::RequireSend => ResponderMedia::RequireSend,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Commands::Join {
            room,
            role,
            relay,
            responder_media,
            config,
        } => {
            let mut config = load_config(config)?;
            if let Some(relay) = relay {
                config.relay_url = relay;
            }
            if let Some(policy) = responder_media {
                config.responder_media = policy.into();
            }

            let room = match room {
                Some(room) => room,
                None => Input::<String>::new()
                    .with_prompt("Room code")
                    .interact_text()?,
            };
            let role = match role {
                Some(role) => role,
                None => prompt_role()?,
            };

            run_session(config, room, role).await
        }
        Commands::Relay { port } => {
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("Failed to bind port {port}"))?;
            println!("{}", format!("📡 Relay listening on port {port}").green().bold());
            beacon_relay::serve(listener, RelayBroker::default()).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
        }
        None => Ok(ClientConfig::from_env()),
    }
}

fn prompt_role() -> Result<Role> {
    let roles = [Role::Initiator, Role::Responder];
    let choice = Select::new()
        .with_prompt("Role")
        .items(&roles)
        .default(0)
        .interact()?;
    Ok(roles[choice])
}

async fn run_session(config: ClientConfig, room: String, role: Role) -> Result<()> {
    println!(
        "{}",
        format!("🚀 Joining room {room} as {role} via {}", config.relay_url)
            .green()
            .bold()
    );

    let coordinator = Coordinator::builder(config)
        .media(Arc::new(SyntheticMedia::default()))
        .build();

    coordinator.join(room.as_str(), role).await?;

    let mut state = coordinator.negotiation_state();
    let mut remote = coordinator.remote_stream();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match current {
                    EngineState::Established => println!("{}", "✨ Negotiation complete".green().bold()),
                    EngineState::Closed => {
                        println!("{}", "Session closed".yellow());
                        break;
                    }
                    other => println!("{}", format!("   state: {other:?}").cyan()),
                }
            }
            changed = remote.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(stream) = remote.borrow_and_update().as_ref() {
                    println!(
                        "{}",
                        format!(
                            "📺 Remote stream {} (audio: {}, video: {})",
                            stream.id,
                            stream.track(MediaKind::Audio).is_some(),
                            stream.track(MediaKind::Video).is_some(),
                        )
                        .cyan()
                    );
                }
            }
        }
    }

    if let Some(stats) = coordinator.stats() {
        println!("   {stats:?}");
    }
    coordinator.leave().await;
    println!("{}", "👋 Left the room".green());
    Ok(())
}
