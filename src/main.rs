//! ChatterBox - terminal chat client
//!
//! Stdin lines are chat input, stdout is the transcript, logs go to stderr.

use anyhow::{bail, Result};
use chatterbox::chat::TokioClock;
use chatterbox::history::HistoryClient;
use chatterbox::session::{ChatSession, ConnectionState, Subscription};
use chatterbox::view::{render_line, ChatView};
use chatterbox::Config;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatterbox")]
#[command(about = "Real-time chat over a STOMP WebSocket broker")]
struct Cli {
    /// Display name in the chat room
    #[arg(short, long, env = "CHAT_USERNAME")]
    username: String,

    /// YAML config file (defaults to ./chatterbox.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How many past messages to preload (1-100)
    #[arg(long)]
    history_limit: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing (stderr, stdout is the transcript)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,chatterbox=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let username = cli.username.trim().to_string();
    if username.is_empty() {
        bail!("username must not be blank");
    }

    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;
    if let Some(limit) = cli.history_limit {
        config.history_limit = chatterbox::history::clamp_limit(limit);
    }

    let session = ChatSession::new(config.session_config());
    let subscription = session.subscribe();
    let mut view = ChatView::new(session);

    let history = HistoryClient::new(&config.api_url);
    let (past, connected) = tokio::join!(
        history.fetch_recent(config.history_limit),
        view.connect(&username)
    );
    view.load_history(past);
    for event in view.transcript() {
        println!("{}", render_line(event));
    }

    if let Err(e) = connected {
        warn!(error = %e, "Could not connect");
        if let Some(banner) = view.connection_error() {
            println!("*** {}", banner);
        }
        return Err(e.into());
    }
    info!(username = %username, "Joined the chat");
    println!("*** Connected as {}. /file <path> attaches a file, /quit leaves.", username);

    let result = run(&mut view, subscription).await;
    view.disconnect();
    result
}

enum Input {
    Message(String),
    File(PathBuf),
    Quit,
    Nothing,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line == "/quit" {
        Input::Quit
    } else if let Some(path) = line.strip_prefix("/file ") {
        Input::File(PathBuf::from(path.trim()))
    } else if line.is_empty() {
        Input::Nothing
    } else {
        Input::Message(line.to_string())
    }
}

async fn run(view: &mut ChatView<TokioClock>, mut subscription: Subscription) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = view.session().watch_state();
    let mut banner: Option<String> = None;

    loop {
        let expiry = view.next_typing_expiry().map(Instant::from_std);

        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match parse_input(&line) {
                        Input::Quit => return Ok(()),
                        Input::Message(text) => {
                            if !view.submit_line(&text) {
                                println!("*** Not connected, message not sent");
                            }
                        }
                        Input::File(path) => send_file(view, &path).await,
                        Input::Nothing => {}
                    },
                    None => return Ok(()),
                }
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                if view.on_event(event) {
                    if let Some(last) = view.transcript().last() {
                        println!("{}", render_line(last));
                    }
                }
            }

            _ = async {
                match expiry {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                view.expire_typing();
            }

            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let now = *state.borrow_and_update();
                match now {
                    ConnectionState::Disconnected => println!("*** Connection lost, reconnecting..."),
                    ConnectionState::Connected => println!("*** Connected"),
                    ConnectionState::Connecting => {}
                }
            }

            _ = tokio::signal::ctrl_c() => return Ok(()),
        }

        let current = view.typing_banner();
        if current != banner {
            if let Some(text) = &current {
                println!("... {}", text);
            }
            banner = current;
        }
    }
}

async fn send_file(view: &ChatView<TokioClock>, path: &Path) {
    match view.attach_file(path).await {
        Ok(()) => info!(path = %path.display(), "File sent"),
        Err(e) => println!("*** Could not send {}: {}", path.display(), e),
    }
}
