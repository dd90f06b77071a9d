//! parley - terminal chat client for a local/cloud model backend

mod config;
mod prefs;

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;

use parley_api::{BackendClient, FileUpload, ModelKind};
use parley_chat::{
    ChatConfig, ChatController, ChatEvent, Direction, Role,
};

/// parley - chat with a local or cloud model
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the chat backend
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Model type (local, cloud)
    #[arg(long)]
    model_type: Option<String>,

    /// Bearer token for the backend
    #[arg(long)]
    auth_token: Option<String>,

    /// Disable streaming (wait for complete responses)
    #[arg(long)]
    no_stream: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// List stored sessions
    #[arg(long)]
    sessions: bool,

    /// Resume a stored session by ID
    #[arg(long)]
    resume: Option<String>,

    /// Delete a stored session by ID
    #[arg(long)]
    delete: Option<String>,

    /// Rename a stored session
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"])]
    rename: Option<Vec<String>>,

    /// Show the account profile
    #[arg(long)]
    profile: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("parley=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file: {}", path.display());
                println!();
                println!("{}", config::example_config());
            }
            Err(e) => eprintln!("Failed to create config file: {}", e),
        }
        return Ok(());
    }

    let file_config = config::Config::load();
    let backend_url = args
        .backend_url
        .clone()
        .or_else(|| file_config.backend_url.clone())
        .unwrap_or_else(|| "http://localhost:5000".to_string());

    let mut client = BackendClient::new(&backend_url);
    if let Some(token) = &args.auth_token {
        client = client.with_auth_token(token);
    }

    if args.profile {
        let profile = client.profile().await?;
        println!("{} <{}>", profile.name, profile.email);
        return Ok(());
    }

    let chat_config = ChatConfig {
        streaming: !args.no_stream && file_config.streaming.unwrap_or(true),
        cloud_fallback_model: file_config
            .cloud_fallback_model
            .clone()
            .unwrap_or_else(|| "gemini".to_string()),
        ..Default::default()
    };

    let mut controller = ChatController::new(Arc::new(client), chat_config)
        .with_model_store(Arc::new(prefs::PrefModelStore));
    controller.init().await?;

    apply_selection(&mut controller, &args, &file_config);

    if args.sessions {
        list_sessions(&controller);
        return Ok(());
    }
    if let Some(id) = &args.delete {
        controller.delete_session(id).await?;
        println!("Deleted session {}", id);
        return Ok(());
    }
    if let Some(pair) = &args.rename {
        controller.rename_session(&pair[0], &pair[1]).await?;
        println!("Renamed session {} to \"{}\"", pair[0], pair[1]);
        return Ok(());
    }
    if let Some(id) = &args.resume {
        controller.switch_session(id).await?;
    }

    run_interactive(&mut controller).await
}

/// Selection precedence: command-line flags, then the config file, then the
/// stored preference. Each candidate must still be advertised by the
/// backend; otherwise the default from `init` stands.
fn apply_selection(controller: &mut ChatController, args: &Args, file_config: &config::Config) {
    let candidates = [
        args.model
            .clone()
            .map(|name| (kind_or_local(args.model_type.as_deref()), name)),
        file_config
            .model
            .clone()
            .map(|name| (kind_or_local(file_config.model_type.as_deref()), name)),
        prefs::load_selection(),
    ];
    for candidate in candidates.into_iter().flatten() {
        let (kind, name) = candidate;
        if controller.catalog().contains(kind, &name) {
            if controller.set_selection(kind, &name).is_ok() {
                return;
            }
        }
    }
}

fn kind_or_local(value: Option<&str>) -> ModelKind {
    value
        .and_then(prefs::parse_model_kind)
        .unwrap_or(ModelKind::Local)
}

fn list_sessions(controller: &ChatController) {
    let summaries = controller.sessions().summaries();
    if summaries.is_empty() {
        println!("No stored sessions.");
        return;
    }
    for summary in summaries {
        println!("{}  {}  ({})", summary.id, summary.name, summary.preview);
    }
}

fn print_transcript(controller: &ChatController) {
    for message in controller.transcript().messages() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "bot",
        };
        println!("{}> {}", who, message.content);
    }
}

async fn run_interactive(controller: &mut ChatController) -> anyhow::Result<()> {
    use std::io::{self, Write};

    if let Some(selection) = controller.selection() {
        eprintln!(
            "model: {} ({})  [/help for commands]",
            selection.name,
            selection.kind.as_str()
        );
    } else {
        eprintln!("warning: backend advertised no models");
    }
    print_transcript(controller);

    // Ctrl-C stops the active generation instead of exiting
    let handle = controller.handle();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            handle.abort();
        }
    });

    let printer = tokio::spawn(print_events(controller.subscribe()));

    loop {
        print!("\n> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match handle_command(controller, command).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    eprintln!("error: {}", e);
                    continue;
                }
            }
        }

        if let Err(e) = controller.send(line, None).await {
            eprintln!("error: {}", e);
        }
    }

    printer.abort();
    Ok(())
}

/// Render controller events; streamed content is printed incrementally by
/// tracking how much of each message has been written already.
async fn print_events(mut receiver: tokio::sync::broadcast::Receiver<ChatEvent>) {
    use std::io::Write;

    let mut printed: HashMap<String, usize> = HashMap::new();
    while let Ok(event) = receiver.recv().await {
        match event {
            ChatEvent::MessageStart { message } if message.role == Role::Assistant => {
                print!("bot> ");
                let _ = std::io::stdout().flush();
                printed.insert(message.id, 0);
            }
            ChatEvent::MessageUpdate { message } => {
                let seen = printed.entry(message.id.clone()).or_insert(0);
                if let Some(rest) = message.content.get(*seen..) {
                    print!("{}", rest);
                    let _ = std::io::stdout().flush();
                    *seen = message.content.len();
                }
            }
            ChatEvent::MessageEnd { message } => {
                if message.role != Role::Assistant {
                    continue;
                }
                match printed.remove(&message.id) {
                    Some(seen) => {
                        if let Some(rest) = message.content.get(seen..) {
                            print!("{}", rest);
                        }
                        println!();
                    }
                    // non-streamed reply, nothing printed yet
                    None => println!("bot> {}", message.content),
                }
            }
            ChatEvent::SessionAdopted { session_id } => {
                tracing::debug!("session assigned: {}", session_id);
            }
            ChatEvent::FallbackTriggered { from, to } => {
                eprintln!("(local model {} failed, switched to {})", from, to);
            }
            ChatEvent::LimitReached { message } => {
                eprintln!("(limit reached: {})", message);
            }
            ChatEvent::Error { message } => {
                eprintln!("(error: {})", message);
            }
            _ => {}
        }
    }
}

/// Id of the most recent assistant reply, the target for /retry and
/// version navigation
fn last_assistant_id(controller: &ChatController) -> Option<String> {
    controller
        .transcript()
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !parley_chat::session::is_welcome_message(&m.id))
        .map(|m| m.id.clone())
}

async fn handle_command(controller: &mut ChatController, command: &str) -> anyhow::Result<bool> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match name {
        "quit" | "exit" => return Ok(false),
        "help" => {
            println!("/new                start a fresh conversation");
            println!("/sessions           list stored sessions");
            println!("/switch <id>        resume a stored session");
            println!("/rename <name>      rename the active session");
            println!("/clear              wipe the active session's messages");
            println!("/retry [type name]  regenerate the last reply");
            println!("/prev, /next        step through reply versions");
            println!("/models             list advertised models");
            println!("/model <type> <name>  switch models");
            println!("/attach <path> <message>  send a message with a file");
            println!("/export [path]      export the transcript");
            println!("/stop               stop the active generation");
            println!("/quit               exit");
        }
        "new" => {
            controller.new_session();
            print_transcript(controller);
        }
        "sessions" => list_sessions(controller),
        "switch" => match rest.first() {
            Some(id) => {
                controller.switch_session(id).await?;
                print_transcript(controller);
            }
            None => eprintln!("usage: /switch <id>"),
        },
        "rename" => {
            if rest.is_empty() {
                eprintln!("usage: /rename <name>");
            } else {
                let id = controller.sessions().active_id().to_string();
                controller.rename_session(&id, &rest.join(" ")).await?;
            }
        }
        "clear" => {
            let id = controller.sessions().active_id().to_string();
            if controller.sessions().is_sentinel() {
                controller.new_session();
            } else {
                controller.clear_session(&id).await?;
            }
            print_transcript(controller);
        }
        "retry" => match last_assistant_id(controller) {
            Some(id) => {
                let model_override = match (rest.first(), rest.get(1)) {
                    (Some(kind), Some(model)) => prefs::parse_model_kind(kind)
                        .map(|k| (k, model.to_string())),
                    _ => None,
                };
                controller.retry(&id, model_override).await?;
            }
            None => eprintln!("nothing to retry yet"),
        },
        "prev" | "next" => match last_assistant_id(controller) {
            Some(id) => {
                let direction = if name == "prev" {
                    Direction::Prev
                } else {
                    Direction::Next
                };
                controller.navigate_version(&id, direction);
                if let Some(message) = controller.transcript().get(&id) {
                    let total = message.version_count().max(1);
                    println!(
                        "bot> {}  (version {}/{})",
                        message.content,
                        message.current_version + 1,
                        total
                    );
                }
            }
            None => eprintln!("no reply to navigate"),
        },
        "models" => {
            let catalog = controller.catalog();
            for model in &catalog.local_models {
                println!("local  {}", model);
            }
            for model in &catalog.cloud_models {
                println!("cloud  {}", model);
            }
            if let Some(selection) = controller.selection() {
                println!("selected: {} ({})", selection.name, selection.kind.as_str());
            }
        }
        "model" => match (rest.first(), rest.get(1)) {
            (Some(kind), Some(model)) => match prefs::parse_model_kind(kind) {
                Some(k) => {
                    controller.set_selection(k, model)?;
                    if let Err(e) = prefs::save_selection(k, model) {
                        tracing::warn!("failed to persist selection: {}", e);
                    }
                    println!("selected: {} ({})", model, k.as_str());
                }
                None => eprintln!("model type must be 'local' or 'cloud'"),
            },
            _ => eprintln!("usage: /model <local|cloud> <name>"),
        },
        "attach" => match rest.split_first() {
            Some((path, message)) if !message.is_empty() => {
                let upload = read_upload(path)?;
                controller.send(&message.join(" "), Some(upload)).await?;
            }
            _ => eprintln!("usage: /attach <path> <message>"),
        },
        "export" => {
            let text = controller.export_transcript();
            match rest.first() {
                Some(path) => {
                    std::fs::write(path, &text)?;
                    println!("exported to {}", path);
                }
                None => print!("{}", text),
            }
        }
        "stop" => controller.cancel(),
        _ => eprintln!("unknown command: /{} (try /help)", name),
    }
    Ok(true)
}

fn read_upload(path: &str) -> anyhow::Result<FileUpload> {
    let bytes = std::fs::read(path)?;
    let name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(FileUpload {
        media_type: media_type_for(&name).to_string(),
        size: bytes.len() as u64,
        name,
        bytes,
    })
}

fn media_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or_default().to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "csv" => "text/csv",
        "md" | "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for_known_extensions() {
        assert_eq!(media_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(media_type_for("notes.md"), "text/plain");
        assert_eq!(media_type_for("data.bin"), "application/octet-stream");
        assert_eq!(media_type_for("no_extension"), "application/octet-stream");
    }

    #[test]
    fn test_kind_or_local_defaults() {
        assert_eq!(kind_or_local(None), ModelKind::Local);
        assert_eq!(kind_or_local(Some("cloud")), ModelKind::Cloud);
        assert_eq!(kind_or_local(Some("bogus")), ModelKind::Local);
    }
}
