//! kindred CLI
//!
//! Find a friend on the rendezvous network, prove who you both are, and chat
//! over a direct connection.

mod config;
mod keyfile;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kindred_core::signaling::{DirectConnector, MemoryConnectorHub};
use kindred_core::{ChatChannel, ChatMessage, NodeConfig, Orchestrator, PeerSession, ServeEvent};
use kindred_crypto::{Identity, PublicIdentity};
use kindred_discovery::{MemoryRendezvous, TcpSwarm, topic_for};
use rand_core::OsRng;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing_subscriber::EnvFilter;

use config::Config;

/// kindred - meet your friends directly
#[derive(Parser)]
#[command(name = "kindred")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new identity keypair
    Keygen {
        /// Output file (defaults to the configured identity file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show our public identity and discovery topic
    Id,

    /// Show the discovery topic of a public identity
    Topic {
        /// Public identity (hex)
        public_key: String,
    },

    /// Wait for friends to dial us and chat with each in turn
    Serve,

    /// Dial a friend and chat
    Dial {
        /// Friend name or public identity (hex)
        target: String,
    },

    /// Run two nodes in-process and connect them
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Keygen { output, force } => generate_identity(output, force, &config)?,
        Commands::Id => show_identity(&config)?,
        Commands::Topic { public_key } => show_topic(&public_key)?,
        Commands::Serve => serve(&config).await?,
        Commands::Dial { target } => dial(&target, &config).await?,
        Commands::Demo => demo().await?,
    }

    Ok(())
}

/// Generate a new identity keypair
fn generate_identity(output: Option<PathBuf>, force: bool, config: &Config) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| config.node.identity_file.clone());
    let identity = Identity::generate(&mut OsRng);

    keyfile::save(&identity, &path, force)?;

    println!("Public identity: {}", identity.public_identity());
    println!("Private key saved to: {}", path.display());
    println!("\nKeep this file secure! It contains your private key.");
    Ok(())
}

fn show_identity(config: &Config) -> anyhow::Result<()> {
    let identity = keyfile::load(&config.node.identity_file)?;
    let public = identity.public_identity();

    println!("Public identity: {public}");
    println!("Discovery topic: {}", topic_for(&public));
    Ok(())
}

fn show_topic(public_key: &str) -> anyhow::Result<()> {
    let public: PublicIdentity = public_key
        .parse()
        .with_context(|| format!("'{public_key}' is not a public identity"))?;
    println!("{}", topic_for(&public));
    Ok(())
}

fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let identity = keyfile::load(&config.node.identity_file)?;
    let friends = config.friend_registry()?.into_shared();
    Ok(Orchestrator::new(identity, config.node_config()?)?.with_friends(friends))
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config)?;
    let direct = config.direct_config()?;
    let mut serving = orchestrator.serve(
        TcpSwarm::new(config.tcp_swarm_config()?),
        move |role| DirectConnector::new(role, direct.clone()),
    );

    println!("Serving as {}", orchestrator.public_identity());
    println!("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = serving.next_event() => match event {
                Some(ServeEvent::Listening { port }) => println!("Listening on port {port}"),
                Some(ServeEvent::Session(session)) => {
                    let name = config.display_name(&session.peer);
                    println!("{name} connected. Type a message, or /quit to hang up.");
                    let ended = chat(&name, session, stdin_lines(), tokio::signal::ctrl_c()).await?;
                    if ended == ChatEnd::Interrupted {
                        break;
                    }
                    println!("Waiting for friends...");
                }
                Some(ServeEvent::Rejected { error }) => {
                    tracing::debug!("Candidate rejected: {error}");
                }
                None => break,
            },
        }
    }

    println!("\nShutting down...");
    serving.shutdown().await;
    Ok(())
}

async fn dial(target: &str, config: &Config) -> anyhow::Result<()> {
    let host = config.resolve_peer(target)?;
    let orchestrator = orchestrator(config)?;
    let direct = config.direct_config()?;

    println!("Looking for {} ...", config.display_name(&host));
    let mut dialing = orchestrator.dial(
        host,
        TcpSwarm::new(config.tcp_swarm_config()?),
        move |role| DirectConnector::new(role, direct.clone()),
    );

    let session = tokio::select! {
        result = &mut dialing => result?,
        _ = tokio::signal::ctrl_c() => {
            dialing.cancel();
            (&mut dialing).await?
        }
    };

    let name = config.display_name(&session.peer);
    println!("Connected to {name}. Type a message, or /quit to hang up.");
    chat(&name, session, stdin_lines(), tokio::signal::ctrl_c()).await?;
    Ok(())
}

/// How a chat ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatEnd {
    /// Local user typed `/quit` or closed their input
    Quit,
    /// The friend closed the connection
    HungUp,
    /// The interrupt future fired (Ctrl+C)
    Interrupted,
}

fn stdin_lines() -> BufReader<tokio::io::Stdin> {
    BufReader::new(tokio::io::stdin())
}

/// Line chat on `input` and stdout until either side hangs up or
/// `interrupt` resolves.
async fn chat<T, R, I>(
    name: &str,
    session: PeerSession<T>,
    input: R,
    interrupt: I,
) -> anyhow::Result<ChatEnd>
where
    T: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    I: Future,
{
    let mut channel = ChatChannel::new(session.transport);
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    let ended = loop {
        tokio::select! {
            _ = &mut interrupt => break ChatEnd::Interrupted,
            line = lines.next_line() => match line? {
                Some(text) if text.trim() == "/quit" => break ChatEnd::Quit,
                Some(text) => channel.send(&ChatMessage::now(text)).await?,
                None => break ChatEnd::Quit,
            },
            message = channel.recv() => match message? {
                Some(message) => println!("<{name}> {}", message.text),
                None => {
                    println!("{name} hung up");
                    return Ok(ChatEnd::HungUp);
                }
            },
        }
    };

    channel.close().await?;
    Ok(ended)
}

/// Two in-process nodes meeting over an in-memory rendezvous
async fn demo() -> anyhow::Result<()> {
    let rendezvous = MemoryRendezvous::new();
    let signaling = MemoryConnectorHub::new();

    let alice = Orchestrator::new(Identity::generate(&mut OsRng), NodeConfig::default())?;
    let bob = Orchestrator::new(Identity::generate(&mut OsRng), NodeConfig::default())?;
    println!("alice: {}", alice.public_identity());
    println!("bob:   {}", bob.public_identity());

    let hub = signaling.clone();
    let mut serving = bob.serve(rendezvous.swarm(), move |role| hub.connector(role));
    let dialed = alice
        .dial(bob.public_identity(), rendezvous.swarm(), move |role| {
            signaling.connector(role)
        })
        .await?;
    let accepted = serving
        .next_session()
        .await
        .context("bob stopped serving")?;

    println!("alice authenticated {}", dialed.peer.short());
    println!("bob authenticated {}", accepted.peer.short());

    let mut alice_chat = ChatChannel::new(dialed.transport);
    let mut bob_chat = ChatChannel::new(accepted.transport);
    alice_chat.send(&ChatMessage::now("hi bob")).await?;
    if let Some(message) = bob_chat.recv().await? {
        println!("<alice> {}", message.text);
    }

    serving.shutdown().await;
    Ok(())
}
