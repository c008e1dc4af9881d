// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Doubao bridge command-line entry point.

mod commands;
mod doctor;
mod shutdown;
mod video;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use doubao_core::{AttachmentKind, DoubaoError, TaskKey};

use crate::commands::{Bridge, ChatArgs};
use crate::video::GenerateArgs;

/// Drive the Doubao web chat platform from the command line.
#[derive(Parser, Debug)]
#[command(name = "doubao", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one chat turn and print the reply.
    Chat {
        prompt: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, requires = "conversation")]
        section: Option<String>,
        /// Start the conversation on a guest session.
        #[arg(long)]
        guest: bool,
        #[arg(long)]
        deep_think: bool,
        /// Upload a file and attach it to the turn. Repeatable.
        #[arg(long = "attach", value_name = "PATH")]
        attach: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Upload a file and print its attachment descriptor.
    Upload {
        path: PathBuf,
        /// Defaults to image for picture extensions, document otherwise.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Delete a conversation on the platform.
    Delete { conversation: String },
    /// Generate videos and inspect retrieval tasks.
    Video {
        #[command(subcommand)]
        command: VideoCommands,
    },
    /// List the loaded sessions.
    Sessions {
        #[arg(long)]
        plain: bool,
    },
    /// Check configuration, sessions, database, and platform reachability.
    Doctor {
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum VideoCommands {
    /// Request a video and schedule its retrieval.
    Generate {
        prompt: String,
        /// Source image for image-to-video.
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        guest: bool,
        #[arg(long)]
        conversation: Option<String>,
        /// Keep running until the video is retrieved or retries run out.
        #[arg(long)]
        wait: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one task.
    Status {
        conversation: String,
        message: String,
        #[arg(long)]
        json: bool,
    },
    /// List tasks, optionally for one conversation.
    List {
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Resume unfinished tasks and wait for them.
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Image,
    Document,
}

impl From<KindArg> for AttachmentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Image => AttachmentKind::Image,
            KindArg::Document => AttachmentKind::Document,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => doubao_config::load_and_validate_path(path),
        None => doubao_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            doubao_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.general.log_level);

    let Some(command) = cli.command else {
        println!("doubao: use --help for available commands");
        return;
    };

    if let Err(e) = run(command, &config, cli.config.as_deref()).await {
        eprintln!("error: {e}");
        std::process::exit(exit_code(&e));
    }
}

async fn run(
    command: Commands,
    config: &doubao_config::DoubaoConfig,
    config_path: Option<&std::path::Path>,
) -> Result<(), DoubaoError> {
    match command {
        Commands::Chat {
            prompt,
            conversation,
            section,
            guest,
            deep_think,
            attach,
            json,
        } => {
            let bridge = Bridge::connect(config)?;
            commands::run_chat(
                &bridge,
                ChatArgs {
                    prompt,
                    conversation,
                    section,
                    guest,
                    deep_think,
                    attach,
                    json,
                },
            )
            .await
        }
        Commands::Upload { path, kind } => {
            let bridge = Bridge::connect(config)?;
            commands::run_upload(&bridge, &path, kind.map(AttachmentKind::from)).await
        }
        Commands::Delete { conversation } => {
            let bridge = Bridge::connect(config)?;
            commands::run_delete(&bridge, &conversation).await
        }
        Commands::Video { command } => run_video(command, config).await,
        Commands::Sessions { plain } => {
            let bridge = Bridge::connect(config)?;
            commands::run_sessions(&bridge.pool, plain)
        }
        Commands::Doctor { plain } => doctor::run_doctor(config, config_path, plain).await,
    }
}

async fn run_video(
    command: VideoCommands,
    config: &doubao_config::DoubaoConfig,
) -> Result<(), DoubaoError> {
    let bridge = Bridge::connect(config)?;
    let scheduler = video::open_scheduler(config, &bridge).await?;

    match command {
        VideoCommands::Generate {
            prompt,
            image_url,
            guest,
            conversation,
            wait,
            json,
        } => {
            let cancel = shutdown::install_signal_handler();
            video::run_generate(
                bridge,
                scheduler,
                GenerateArgs {
                    prompt,
                    image_url,
                    guest,
                    conversation,
                    wait,
                    json,
                },
                cancel,
            )
            .await
        }
        VideoCommands::Status {
            conversation,
            message,
            json,
        } => video::run_status(&scheduler, &TaskKey::new(conversation, message), json).await,
        VideoCommands::List { conversation, json } => {
            video::run_list(&scheduler, conversation.as_deref(), json).await
        }
        VideoCommands::Watch => {
            let cancel = shutdown::install_signal_handler();
            video::run_watch(scheduler, cancel).await
        }
    }
}

/// Distinct exit codes for failures a script may want to react to.
fn exit_code(error: &DoubaoError) -> i32 {
    match error {
        DoubaoError::RateLimited { .. } => 3,
        DoubaoError::QuotaExhausted | DoubaoError::SessionNotFound { .. } => 4,
        DoubaoError::TaskNotFound { .. } => 5,
        _ => 1,
    }
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("doubao={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
