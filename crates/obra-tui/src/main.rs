use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use obra_core::{
    bootstrap, markup, Block, Completion, Config, Controller, HttpEndpoint, LocalClock, Role,
    SqliteStorage, TranscriptStore,
};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "obra")]
#[command(about = "Chat with the construction project assistant")]
struct Cli {
    /// Chat endpoint URL (overrides config and OBRA_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Storage origin (defaults to the endpoint's scheme://host:port)
    #[arg(long, global = true)]
    origin: Option<String>,
    /// Transcript database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Send one message and print the reply
    Ask {
        /// Your question
        message: String,
    },
    /// Check that the assistant service is up
    Health,
    /// Write the saved conversation as an HTML page
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Clear the saved conversation
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|_| Config::new());
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(origin) = cli.origin {
        config.origin = Some(origin);
    }
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            init_logging(Some(&Config::get_data_dir()?.join("obra.log")))?;
            run_chat(&config).await?
        }
        Commands::Ask { message } => {
            init_logging(None)?;
            ask(&config, &message).await?
        }
        Commands::Health => {
            init_logging(None)?;
            health(&config).await?
        }
        Commands::Export { output } => {
            init_logging(None)?;
            export(&config, output.as_deref())?
        }
        Commands::Reset { yes } => {
            init_logging(None)?;
            reset(&config, yes)?
        }
    }

    Ok(())
}

/// Log to a file while the terminal belongs to the UI, to stderr otherwise.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env("OBRA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<TranscriptStore> {
    let storage = SqliteStorage::open(&config.database_path()?, &config.origin()?)?;
    Ok(TranscriptStore::new(storage, &config.storage_key))
}

fn endpoint(config: &Config) -> Result<HttpEndpoint> {
    HttpEndpoint::with_timeout(&config.endpoint, config.request_timeout())
}

async fn run_chat(config: &Config) -> Result<()> {
    let controller = Controller::start(open_store(config)?, Box::new(LocalClock));
    let endpoint = Arc::new(endpoint(config)?);

    let mut events = EventHandler::new(tui::TICK_RATE);
    let mut app = App::new(controller, endpoint, &config.endpoint, events.sender());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(config: &Config, message: &str) -> Result<()> {
    let mut controller = Controller::start(open_store(config)?, Box::new(LocalClock));
    let endpoint = endpoint(config)?;
    let before = controller.transcript().len();

    let Some(completion) = controller.exchange(&endpoint, message).await else {
        println!("{}", "Nothing to send".yellow());
        return Ok(());
    };

    // Skip the user message we just appended
    for block in controller.transcript().blocks().iter().skip(before + 1) {
        match block {
            Block::Message(msg) if msg.role == Role::Assistant => {
                let text = if completion == Completion::Failed {
                    msg.content.red()
                } else {
                    msg.content.normal()
                };
                println!("{} {}", format!("[{}]", msg.timestamp).dimmed(), text);
            }
            Block::Chart(chart) if chart.is_inline() => println!(
                "{} {}",
                format!("▣ {}", chart.summary()).bold().magenta(),
                "(view with `obra export --output chat.html`)".dimmed()
            ),
            Block::Chart(chart) => println!("{}", format!("▣ {}", chart.summary()).bold().magenta()),
            _ => {}
        }
    }

    if completion == Completion::Failed {
        println!(
            "Make sure the assistant is running at {}",
            config.endpoint.bold()
        );
    }
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let endpoint = endpoint(config)?;
    println!("🔍 Checking {}", endpoint.healthcheck_url()?.cyan());

    match endpoint.healthcheck().await {
        Ok(health) if health.is_ok() => {
            println!("{} service is up", "✓".green().bold());
            if let Some(database) = health.database {
                println!("  database: {}", database);
            }
        }
        Ok(health) => {
            println!("{} service reported {}", "✗".red().bold(), health.status.red());
            if let Some(message) = health.message {
                println!("  {}", message.dimmed());
            }
        }
        Err(e) => {
            println!("{}: {}", "Error reaching the assistant".red(), e);
        }
    }
    Ok(())
}

fn export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = open_store(config)?;
    let transcript = bootstrap::restore(&store);
    let page = markup::document("Obra conversation", &transcript.markup());

    match output {
        Some(path) => {
            fs::write(path, page).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "📄 Exported {} blocks to {}",
                transcript.len().to_string().bold(),
                path.display()
            );
        }
        None => print!("{}", page),
    }
    Ok(())
}

fn reset(config: &Config, yes: bool) -> Result<()> {
    let confirmed = yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete the saved conversation?")
            .default(false)
            .interact()?;

    let mut controller = Controller::start(open_store(config)?, Box::new(LocalClock));
    controller.request_reset();
    if controller.confirm_reset(confirmed) {
        println!("{}", "Conversation cleared".green());
    } else {
        println!("{}", "Kept the saved conversation".dimmed());
    }
    Ok(())
}
