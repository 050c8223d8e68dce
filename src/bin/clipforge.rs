//! CLI for ClipForge - prompt-to-video service.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clipforge::server::{self, AppState};
use clipforge::{Settings, TaskState, VideoGenerationRequest};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(about = "Generate short videos from text prompts with provider fallback")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./clipforge.toml when present)
    #[arg(short, long, global = true, env = "CLIPFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Generate one video through the fallback chain and wait for it
    Generate(GenerateArgs),

    /// List providers in fallback order and whether they are configured
    Providers,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind (overrides settings)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the video
    prompt: String,

    /// Copy the finished video here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// What the video should avoid
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Seed for providers that accept one
    #[arg(long)]
    seed: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipforge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path, true)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().context("loading settings")?,
    };

    match cli.command {
        Commands::Serve(args) => serve(settings, args).await?,
        Commands::Generate(args) => generate(settings, args, cli.json).await?,
        Commands::Providers => list_providers(&settings, cli.json).await?,
    }

    Ok(())
}

async fn serve(mut settings: Settings, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let runner = settings.build_runner()?;
    runner.chain().store().ensure_dir().await?;
    let app = server::router(AppState::new(runner));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, videos_dir = %settings.videos_dir.display(), "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn generate(settings: Settings, args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("prompt must not be empty");
    }

    let mut request = VideoGenerationRequest::new(prompt);
    if let Some(negative) = args.negative_prompt {
        request = request.with_negative_prompt(negative);
    }
    if let Some(seed) = args.seed {
        request = request.with_seed(seed);
    }

    let runner = settings.build_runner()?;
    let task = runner.run(request).await?;

    let (video, is_fallback) = match &task.state {
        TaskState::Completed { video, is_fallback } => (video, *is_fallback),
        TaskState::Failed { error } => anyhow::bail!("generation failed:\n{error}"),
        TaskState::Processing => anyhow::bail!("task {} did not finish", task.id),
    };

    let path = match &args.output {
        Some(output) => {
            tokio::fs::copy(&video.path, output)
                .await
                .with_context(|| format!("copying video to {}", output.display()))?;
            output.clone()
        }
        None => video.path.clone(),
    };

    if json_output {
        let result = serde_json::json!({
            "type": "video",
            "success": true,
            "task_id": task.id.to_string(),
            "output": path.display().to_string(),
            "generator": video.generator,
            "is_fallback": is_fallback,
            "errors": task.error_trail,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Generated video: {} via {}", path.display(), video.generator);
        if is_fallback {
            println!("All providers failed; this is the placeholder video.");
        }
        for error in &task.error_trail {
            println!("  {error}");
        }
    }

    Ok(())
}

async fn list_providers(settings: &Settings, json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ProviderInfo {
        name: String,
        kind: String,
        configured: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    }

    let mut providers = Vec::new();
    for provider in settings.build_providers()? {
        let health = provider.health_check().await;
        providers.push(ProviderInfo {
            name: provider.name().to_string(),
            kind: provider.kind().to_string(),
            configured: health.is_ok(),
            reason: health.err().map(|e| e.to_string()),
        });
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&providers)?);
    } else {
        println!("Providers (in fallback order):\n");
        for (i, p) in providers.iter().enumerate() {
            let status = if p.configured { "ready" } else { "unavailable" };
            println!("  {}. {} ({}) [{}]", i + 1, p.name, p.kind, status);
            if let Some(reason) = &p.reason {
                println!("     {reason}");
            }
        }
        println!("\n  Fallback: placeholder video via {}", settings.ffmpeg.display());
    }

    Ok(())
}
