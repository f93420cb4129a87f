use anyhow::{Result, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use companion_chat::app::App;
use companion_chat::tui::{self, EventHandler};
use companion_chat::{
    format_note_line, handler, ui, CompletionClient, Config, FileStore, NoteStore, Persona,
    ResponseLength,
};

#[derive(Parser)]
#[command(name = "companion")]
#[command(version, about = "Terminal chat companion with switchable personas and saved messages")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Persona to start with (friend, guide, therapist, scholar)
    #[arg(long, global = true, value_parser = parse_persona)]
    persona: Option<Persona>,

    /// Response length to start with (short, medium, long)
    #[arg(long, global = true, value_parser = parse_length)]
    length: Option<ResponseLength>,

    /// Model identifier sent with each request
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat interface (default)
    Chat,
    /// Print saved messages and exit
    Saved,
}

fn parse_persona(s: &str) -> Result<Persona, String> {
    Persona::from_str(s).ok_or_else(|| format!("unknown persona '{s}'"))
}

fn parse_length(s: &str) -> Result<ResponseLength, String> {
    ResponseLength::from_str(s).ok_or_else(|| format!("unknown length '{s}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(persona) = cli.persona {
        config.persona = persona;
    }
    if let Some(length) = cli.length {
        config.response_length = length;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let _guard = init_file_logging()?;
            run_chat(config).await
        }
        Commands::Saved => {
            init_stderr_logging();
            print_saved()
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("companion_chat=info,companion=info"))
}

/// The terminal belongs to the TUI, so chat sessions log to a file
fn init_file_logging() -> Result<WorkerGuard> {
    let log_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("companion-chat");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "companion.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn print_saved() -> Result<()> {
    let notes = NoteStore::new(FileStore::default_location()?).list_notes()?;

    if notes.is_empty() {
        println!("No saved messages");
        return Ok(());
    }

    for note in &notes {
        println!("{}", format_note_line(note, &Local));
    }
    Ok(())
}

async fn run_chat(config: Config) -> Result<()> {
    let client = match config.resolve_api_key() {
        Some(key) => Some(CompletionClient::new(&config.base_url, &key, &config.model)),
        None => {
            warn!("no API key configured; messages will not be sent");
            None
        }
    };

    let store = FileStore::default_location()?;
    info!(storage = %store.path().display(), model = %config.model, "starting chat session");

    let mut events = EventHandler::new();
    let mut app = App::new(
        config.session_config(),
        client,
        NoteStore::new(store),
        events.sender(),
    )
    .with_remembered_config();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    app.start();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}
