use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use restyle_contracts::jobs::GenerationMode;
use restyle_contracts::prompts::{compose_prompt, PromptInputs};
use restyle_contracts::requests::SceneDescription;
use restyle_contracts::styles::{LabelKind, LabelSelector};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod extract;
mod routes;

use config::{ServerConfig, VisionBackend};
use routes::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "restyle-rs", version, about = "Room photo restyling relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP relay.
    Serve(ServeArgs),
    /// Print the prompt that would be sent for the given tags.
    Prompt(PromptArgs),
    /// List the style and room-type catalog.
    Styles,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    port: Option<u16>,
    /// `replicate` or `dryrun`.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    mode: Option<GenerationMode>,
    /// `huggingface`, `openai` or `none`.
    #[arg(long)]
    vision: Option<VisionBackend>,
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    room_type: Option<String>,
    /// Observed room contents, as a vision step would report them.
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    prompt: Option<String>,
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("restyle-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Prompt(args) => run_prompt(args),
        Command::Styles => run_styles(),
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(provider) = args.provider {
        config.provider = provider.trim().to_ascii_lowercase();
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(vision) = args.vision {
        config.vision.backend = vision;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfig) -> Result<()> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("restyle-rs/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let state = AppState::from_config(&config, http)?;
    let app = build_router(state, &config.allowed_origin, config.body_limit)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        provider = %config.provider,
        mode = %config.mode,
        vision = config.vision.backend.as_str(),
        "restyle relay listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

fn run_prompt(args: PromptArgs) -> Result<()> {
    let selector = LabelSelector::new(None);
    let style = selector.select(args.style.as_deref(), LabelKind::Style);
    let room_type = selector.select(args.room_type.as_deref(), LabelKind::RoomType);
    for reason in [&style.fallback_reason, &room_type.fallback_reason]
        .into_iter()
        .flatten()
    {
        eprintln!("{reason}");
    }
    let scene = args
        .description
        .as_deref()
        .map(SceneDescription::from_caption)
        .unwrap_or(SceneDescription::Unavailable);
    println!(
        "{}",
        compose_prompt(PromptInputs {
            user_prompt: args.prompt.as_deref().unwrap_or_default(),
            style: &style.spec,
            room_type: &room_type.spec,
            scene: &scene,
        })
    );
    Ok(())
}

fn run_styles() -> Result<()> {
    let selector = LabelSelector::new(None);
    for (heading, kind) in [("styles", LabelKind::Style), ("room types", LabelKind::RoomType)] {
        println!("{heading}:");
        for spec in selector.catalog.list(kind) {
            let marker = if spec.slug == selector.default_slug(kind) {
                " (default)"
            } else {
                ""
            };
            match spec.cues.as_deref() {
                Some(cues) => println!("  {:<24} {}{marker} - {cues}", spec.slug, spec.label),
                None => println!("  {:<24} {}{marker}", spec.slug, spec.label),
            }
        }
    }
    Ok(())
}
