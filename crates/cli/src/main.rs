use clap::{Parser, Subcommand};
use lib::gateway::ChatMode;
use lib::ui::{
    ChatController, ChatMessage, ChatTransport, FileHistoryStore, HistoryStore, HttpTransport,
    MemoryHistoryStore, Pending,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Relay chat messages to a hosted agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file. Fill in agent.connectionString and agent.agentId (or set AZURE_AI_CONNECTION_STRING / AZURE_AI_AGENT_ID).
    Init {
        /// Config file path (default: CHAT_RELAY_CONFIG_PATH or ~/.chat-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay server (POST /chat).
    Serve {
        /// Config file path (default: CHAT_RELAY_CONFIG_PATH or ~/.chat-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 3001)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the relay from the terminal (interactive).
    Chat {
        /// Config file path (default: CHAT_RELAY_CONFIG_PATH or ~/.chat-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Chat endpoint (default from config or http://localhost:3001/chat)
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Start in this mode: basic or agent.
        #[arg(long, default_value = "basic")]
        mode: ChatMode,

        /// Start with retrieval turned off.
        #[arg(long)]
        no_rag: bool,

        /// Keep the conversation in memory only.
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chat-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            server,
            mode,
            no_rag,
            ephemeral,
        }) => {
            if let Err(e) = run_chat(config, server, mode, no_rag, ephemeral).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_chat(
    config_path: Option<PathBuf>,
    server: Option<String>,
    mode: ChatMode,
    no_rag: bool,
    ephemeral: bool,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let url = server.unwrap_or_else(|| lib::config::resolve_server_url(&config));
    let session_id = format!("cli-{}", uuid::Uuid::new_v4());
    let transport = HttpTransport::new(url, session_id);

    let rag = !no_rag;
    if ephemeral {
        let history = MemoryHistoryStore::default();
        chat_loop(ChatController::with_mode(transport, history, mode, rag)).await
    } else {
        let history = FileHistoryStore::new(lib::config::resolve_history_path(&config, &path));
        chat_loop(ChatController::with_mode(transport, history, mode, rag)).await
    }
}

async fn chat_loop<T: ChatTransport, H: HistoryStore>(
    mut chat: ChatController<T, H>,
) -> anyhow::Result<()> {
    for message in chat.messages() {
        print_message(message);
    }
    print_status(&chat);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "{} > ", chat.placeholder())?;
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Some(command) = SlashCommand::parse(input) {
            match command {
                SlashCommand::Quit => break,
                SlashCommand::Clear => {
                    chat.clear();
                    println!("(chat cleared)");
                }
                SlashCommand::Mode(m) => {
                    chat.set_mode(m);
                    print_status(&chat);
                }
                SlashCommand::Rag(on) => {
                    if chat.set_rag_enabled(on) {
                        print_status(&chat);
                    } else {
                        eprintln!("retrieval cannot be changed in agent mode");
                    }
                }
                SlashCommand::Usage => eprintln!("{}", SLASH_USAGE),
            }
            continue;
        }

        chat.set_input(line);
        let Some(request) = chat.begin_send() else {
            continue;
        };
        match chat.pending() {
            Some(Pending::Thinking { sender }) => println!("{}: Thinking...", sender),
            Some(pending) => println!("{}", pending.text()),
            None => {}
        }
        let result = chat.transport().send(&request).await;
        chat.finish_send(result);
        if let Some(reply) = chat.messages().last() {
            print_message(reply);
        }
    }

    Ok(())
}

const SLASH_USAGE: &str = "commands: /clear, /mode <basic|agent>, /rag <on|off>, /quit";

/// Terminal commands typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Quit,
    Clear,
    Mode(ChatMode),
    Rag(bool),
    /// Unknown command or bad argument.
    Usage,
}

impl SlashCommand {
    /// `None` when the line is a message rather than a command.
    fn parse(input: &str) -> Option<Self> {
        let command = input.trim().strip_prefix('/')?;
        let mut parts = command.split_whitespace();
        Some(match (parts.next(), parts.next()) {
            (Some("quit") | Some("exit"), _) => SlashCommand::Quit,
            (Some("clear"), _) => SlashCommand::Clear,
            (Some("mode"), Some(m)) => m.parse().map_or(SlashCommand::Usage, SlashCommand::Mode),
            (Some("rag"), Some("on")) => SlashCommand::Rag(true),
            (Some("rag"), Some("off")) => SlashCommand::Rag(false),
            _ => SlashCommand::Usage,
        })
    }
}

fn print_status<T: ChatTransport, H: HistoryStore>(chat: &ChatController<T, H>) {
    println!(
        "(mode: {}, retrieval: {})",
        chat.mode(),
        if chat.rag_enabled() { "on" } else { "off" }
    );
}

fn print_message(message: &ChatMessage) {
    println!("{}: {}", message.role.label(), message.content.trim());
    if let Some(sources) = message.sources.as_deref().filter(|s| !s.is_empty()) {
        println!("  📚 Sources:");
        for source in sources {
            println!("    {}", source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_accepts_only_on_and_off() {
        assert_eq!(SlashCommand::parse("/rag on"), Some(SlashCommand::Rag(true)));
        assert_eq!(SlashCommand::parse("/rag off"), Some(SlashCommand::Rag(false)));
        assert_eq!(SlashCommand::parse("/rag yes"), Some(SlashCommand::Usage));
        assert_eq!(SlashCommand::parse("/rag"), Some(SlashCommand::Usage));
    }

    #[test]
    fn parses_mode_and_plain_messages() {
        assert_eq!(
            SlashCommand::parse("/mode agent"),
            Some(SlashCommand::Mode(ChatMode::Agent))
        );
        assert_eq!(SlashCommand::parse("/mode chaos"), Some(SlashCommand::Usage));
        assert_eq!(SlashCommand::parse("/exit"), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("hello /rag on"), None);
    }
}
