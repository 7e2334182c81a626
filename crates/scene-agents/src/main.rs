//! `scene-agents`: command-line front end for the render loop.
//!
//! ```bash
//! SCENE_API_KEY=... scene-agents generate "@visual binary search"
//! scene-agents fetch video_20240101_120000_deadbeef_attempt2.mp4 --out clip.mp4
//! scene-agents chat "what is a linked list?"
//! scene-agents --config scene.toml check
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use scene_agents::agents::AgentFactory;
use scene_agents::config::{self, SceneConfig};
use scene_agents::service::{self, VideoRequest};
use scene_agents::RenderLoop;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a video for a topic
    Generate {
        topic: String,

        /// Override the attempt budget
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Print the response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Copy a generated video out of the output directory
    Fetch {
        filename: String,

        /// Destination path (defaults to the file name in the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask the tutor chatbot a question
    Chat { query: String },
    /// Check that the text-generation endpoint is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = SceneConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Generate {
            topic,
            max_attempts,
            json,
        } => {
            if let Some(n) = max_attempts {
                config.max_attempts = n;
                config.validate()?;
            }
            info!(
                endpoint = %config.base_url,
                model = %config.code_model,
                max_attempts = config.max_attempts,
                "Scene loop starting"
            );
            let render_loop = RenderLoop::from_config(&config)?;
            let result = service::generate_video(&render_loop, &VideoRequest { topic }).await;

            match result {
                Ok(response) if json => println!("{}", serde_json::to_string_pretty(&response)?),
                Ok(response) => {
                    for line in &response.logs {
                        println!("{line}");
                    }
                    println!("{}", response.message);
                    let file = response.video_url.rsplit('/').next().unwrap_or_default();
                    println!("{}", config.output_dir.join(file).display());
                }
                Err(failure) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&failure)?);
                    } else {
                        for line in &failure.logs {
                            eprintln!("{line}");
                        }
                    }
                    bail!("[{}] {}", failure.status, failure.detail);
                }
            }
        }
        Command::Fetch { filename, out } => {
            let bytes = service::fetch_video(&config.output_dir, &filename)
                .await
                .map_err(|f| anyhow::anyhow!("[{}] {}", f.status, f.detail))?;
            let Some(bytes) = bytes else {
                bail!("Video not found: {filename}");
            };
            let out = out.unwrap_or_else(|| PathBuf::from(&filename));
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(bytes = bytes.len(), path = %out.display(), "Video written");
        }
        Command::Chat { query } => {
            let chat = AgentFactory::new(&config)?.build_chat();
            match service::answer_chat(&chat, &query).await? {
                Some(response) => println!("{}", response.reply),
                None => bail!("Query must not be empty"),
            }
        }
        Command::Check => {
            let reachable =
                config::check_endpoint(&config.base_url, config.api_key.as_deref()).await;
            if !reachable {
                bail!("Endpoint unreachable: {}", config.base_url);
            }
            println!("ok: {}", config.base_url);
        }
    }

    Ok(())
}
