//! threadview CLI - controller and renderer processes for the thread view.
//!
//! This is the main binary entry point. See the `threadview` library for
//! the core functionality.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use threadview::{commands, renderer, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "threadview")]
#[command(version = VERSION)]
#[command(about = "Sandboxed mail thread view: controller and renderer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the renderer process (spawned by the controller)
    Renderer {
        /// Rendezvous socket created by the controller
        #[arg(long)]
        socket: PathBuf,
    },
    /// Open a conversation from a JSON file and navigate it from stdin
    View {
        /// JSON array of message records
        file: PathBuf,
    },
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to config.json
        #[arg(long)]
        save: bool,
    },
}

/// Log to `THREADVIEW_LOG_FILE`, `THREADVIEW_LOG_DIR/threadview-<role>.log`,
/// or `/tmp/threadview-<role>.log`. Falls back to stderr if the file cannot
/// be created.
fn init_logging(role: &str) {
    let log_path = if let Ok(path) = std::env::var("THREADVIEW_LOG_FILE") {
        PathBuf::from(path)
    } else if let Ok(dir) = std::env::var("THREADVIEW_LOG_DIR") {
        PathBuf::from(dir).join(format!("threadview-{role}.log"))
    } else {
        std::env::temp_dir().join(format!("threadview-{role}.log"))
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("threadview: cannot open log file {}: {e}", log_path.display()),
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Renderer { socket } => {
            init_logging("renderer");
            log::info!("[renderer] starting (socket {})", socket.display());
            renderer::run_renderer(&socket)?;
        }
        Commands::View { file } => {
            init_logging("controller");
            let config = Config::load()?;
            commands::view::run(&file, &config)?;
        }
        Commands::Config { save } => {
            let config = Config::load()?;
            if save {
                config.save()?;
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
