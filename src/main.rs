use std::path::Path;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use fantabase_demo::config::Config;
use fantabase_demo::storage::{self, KeyValueStore, SqliteStore};
use fantabase_demo::widget::session::get_or_create_session_id;
use fantabase_demo::widget::{
    BubbleContent, ChatHistory, ChatWidget, NullObserver, QuotaTracker, Role, SendOutcome,
    ViewState, WidgetEvent, WidgetObserver, MAX_GUEST_MESSAGES,
};
use fantabase_demo::{logging, web};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_FILE: &str = "fantabase.config.yaml";

#[derive(Debug, Parser)]
#[command(
    name = "fantabase",
    version = VERSION,
    about = "Fantabase demo site server and guest chat widget"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<MainCommand>,
}

#[derive(Debug, Subcommand)]
enum MainCommand {
    /// Serve the public site directory over HTTP
    Serve,
    /// Chat as a guest from the terminal
    Chat,
    /// Show the stored guest session
    Status,
    /// Restore the guest allowance and clear the conversation
    Reset,
    /// Write a default fantabase.config.yaml
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show version
    Version,
}

fn print_version() {
    println!("fantabase {VERSION}");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    if config.log_to_file {
        let dir = logging::init_file_logging(&config.data_dir)?;
        eprintln!("Logging to {}", dir.display());
    } else {
        logging::init_console_logging();
    }
    Ok(())
}

fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    storage::open_or_memory(&config.data_root_dir().to_string_lossy())
}

/// `reset` must touch the real store, so it does not fall back to memory.
fn open_store_strict(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let data_dir = config.data_root_dir();
    let store = SqliteStore::open(&data_dir.to_string_lossy())?;
    info!("Widget store opened in {}", data_dir.display());
    Ok(Arc::new(store))
}

/// Renders widget events as plain terminal lines.
struct TerminalObserver;

impl WidgetObserver for TerminalObserver {
    fn on_event(&self, event: &WidgetEvent) {
        match event {
            WidgetEvent::ViewChanged(ViewState::Config) => {
                println!("Sleeper username? (type a name, or /skip)");
            }
            WidgetEvent::ViewChanged(ViewState::Chatting) => {
                println!("Chat ready. /config to change the sleeper, /quit to leave.");
            }
            WidgetEvent::ViewChanged(ViewState::LimitReached) => {
                println!("Guest limit reached. Enter your email to join the waitlist.");
            }
            WidgetEvent::QuotaChanged(display) => {
                println!("[messages used {}]", display.counter_label());
            }
            WidgetEvent::MessageAdded {
                role,
                content: BubbleContent::Text(text),
                ..
            } => match role {
                Role::User => println!("you> {text}"),
                Role::Assistant => println!("fantabase> {text}"),
            },
            WidgetEvent::WaitingStatus { status, .. } => println!("  ({status}...)"),
            WidgetEvent::MessageUpdated { text, .. } => println!("fantabase> {text}"),
            WidgetEvent::ApiErrorShown => {
                println!("Chat API is not configured. Set api_base_url in {DEFAULT_CONFIG_FILE}.");
            }
            WidgetEvent::WaitlistJoined { email } => {
                println!("Thanks! {email} is on the waitlist.");
            }
            _ => {}
        }
    }
}

async fn run_chat(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config);
    let widget = ChatWidget::from_config(config, store, Arc::new(TerminalObserver));
    widget.open();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "/quit" | "/exit" => break,
            "/skip" => widget.skip_sleeper(),
            "/close" => widget.close(),
            "/open" => widget.open(),
            "/config" => widget.open_config(),
            _ if line.starts_with("/config ") => {
                widget.open_config();
                widget.configure_sleeper(&line["/config ".len()..]);
            }
            _ => match widget.view_state() {
                ViewState::Config => widget.configure_sleeper(line),
                ViewState::LimitReached => {
                    widget.submit_waitlist(line);
                }
                ViewState::Chatting => {
                    if !widget.is_open() {
                        println!("(panel closed, /open to continue)");
                        continue;
                    }
                    if let SendOutcome::Busy = widget.send_message(line).await {
                        println!("(still waiting for the previous reply)");
                    }
                }
            },
        }
    }
    widget.close();
    Ok(())
}

fn print_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config);
    let widget = ChatWidget::from_config(config, store, Arc::new(NullObserver));
    println!("session:   {}", widget.session_id());
    println!("messages:  {}", widget.quota_display().counter_label());
    println!(
        "sleeper:   {}",
        widget.sleeper_username().unwrap_or_else(|| "(none)".into())
    );
    println!("history:   {} entries", widget.history().len());
    println!(
        "api:       {}",
        if widget.api_configured() {
            config.api_base_url.as_str()
        } else {
            "(not configured)"
        }
    );
    Ok(())
}

fn reset_session(config: &Config) -> anyhow::Result<()> {
    let store = open_store_strict(config)?;
    let session_id = get_or_create_session_id(store.as_ref());
    QuotaTracker::initialize(store.clone()).set_remaining(f64::from(MAX_GUEST_MESSAGES));
    ChatHistory::new(store).clear(&session_id);
    info!("Guest session {} reset", session_id);
    println!("Session {session_id} reset to {MAX_GUEST_MESSAGES} messages.");
    Ok(())
}

fn init_config(force: bool) -> anyhow::Result<()> {
    if Path::new(DEFAULT_CONFIG_FILE).exists() && !force {
        anyhow::bail!("{DEFAULT_CONFIG_FILE} already exists (use --force to overwrite)");
    }
    Config::default().save_yaml(DEFAULT_CONFIG_FILE)?;
    println!("Wrote {DEFAULT_CONFIG_FILE}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Some(MainCommand::Version) => {
            print_version();
            return Ok(());
        }
        Some(MainCommand::InitConfig { force }) => return init_config(force),
        Some(command) => command,
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            return Ok(());
        }
    };

    let config = Config::load()?;
    init_logging(&config)?;

    match command {
        MainCommand::Serve => web::start_static_server(&config).await,
        MainCommand::Chat => run_chat(&config).await,
        MainCommand::Status => print_status(&config),
        MainCommand::Reset => reset_session(&config),
        MainCommand::Version | MainCommand::InitConfig { .. } => Ok(()),
    }
}
