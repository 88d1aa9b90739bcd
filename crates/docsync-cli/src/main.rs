//! docsync CLI Client
//!
//! Interactive terminal participant for docsync servers.
//!
//! # Usage
//!
//! ```bash
//! # Connect to local server
//! docsync
//!
//! # Join a document right away
//! docsync --username ada --document notes
//!
//! # Connect to remote server, save every 5 seconds
//! docsync --host example.com --port 4000 --autosave-secs 5
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::*;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use docsync_core::{Content, CursorRange, DocumentId, EditOperation};
use docsync_protocol::{
    decode, encode_line, ClientEvent, CursorMove, JoinRequest, SaveRequest, ServerEvent,
};

/// docsync Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about = "docsync CLI - collaborative document client")]
struct Args {
    /// Server hostname
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "DOCSYNC_HOST")]
    host: String,

    /// Server TCP port
    #[arg(short, long, default_value = "4000", env = "DOCSYNC_PORT")]
    port: u16,

    /// Username to join with
    #[arg(short, long)]
    username: Option<String>,

    /// Document to join after connecting
    #[arg(short, long, requires = "username")]
    document: Option<String>,

    /// Seconds between autosaves of the local copy (0 disables)
    #[arg(long, default_value = "2")]
    autosave_secs: u64,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

/// What this participant currently holds
#[derive(Debug, Default)]
struct LocalState {
    username: Option<String>,
    document_id: Option<DocumentId>,
    content: Content,
    /// Set once the server's snapshot arrived for the current document
    loaded: bool,
}

impl LocalState {
    /// Apply a server event to the local copy
    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::LoadDocument(content) => {
                self.content = content.clone();
                self.loaded = true;
            }
            ServerEvent::ReceiveChanges(op) => {
                if let Some(content) = op.resulting_content() {
                    self.content = content;
                }
            }
            _ => {}
        }
    }

    /// The save request the autosave timer would send now
    fn pending_save(&self) -> Option<ClientEvent> {
        match (&self.document_id, self.loaded) {
            (Some(document_id), true) => Some(ClientEvent::SaveDocument(SaveRequest {
                document_id: document_id.clone(),
                data: self.content.clone(),
            })),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Join {
        document_id: DocumentId,
        username: Option<String>,
    },
    Edit(String),
    Send(Value),
    Cursor(Option<CursorRange>),
    Save,
    Create(DocumentId),
    Delete(Option<DocumentId>),
    Show,
    Help,
    Clear,
    Quit,
}

fn parse_command(line: &str) -> Result<Command> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "join" => {
            let mut parts = rest.split_whitespace();
            let document = parts
                .next()
                .ok_or_else(|| anyhow!("usage: join <document> [username]"))?;
            Command::Join {
                document_id: DocumentId::new(document)?,
                username: parts.next().map(str::to_string),
            }
        }
        "edit" => Command::Edit(rest.to_string()),
        "send" => Command::Send(
            serde_json::from_str(rest).context("send expects a JSON edit operation")?,
        ),
        "cursor" => match rest {
            "" | "none" => Command::Cursor(None),
            _ => {
                let mut parts = rest.split_whitespace();
                let index = parts
                    .next()
                    .unwrap_or_default()
                    .parse()
                    .context("cursor index must be a number")?;
                let length = match parts.next() {
                    Some(n) => n.parse().context("cursor length must be a number")?,
                    None => 0,
                };
                Command::Cursor(Some(CursorRange { index, length }))
            }
        },
        "save" => Command::Save,
        "create" => Command::Create(DocumentId::new(rest).context("usage: create <document>")?),
        "delete" | "del" => match rest {
            "" => Command::Delete(None),
            id => Command::Delete(Some(DocumentId::new(id)?)),
        },
        "show" => Command::Show,
        "help" => Command::Help,
        "clear" => Command::Clear,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}', type 'help'", other),
    };
    Ok(command)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let rt = tokio::runtime::Runtime::new()?;
    let stream = rt
        .block_on(TcpStream::connect(&addr))
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let (read_half, write_half) = stream.into_split();

    let state = Arc::new(Mutex::new(LocalState {
        username: args.username.clone(),
        ..Default::default()
    }));
    let (tx, rx) = mpsc::unbounded_channel();

    rt.spawn(write_events(write_half, rx));
    rt.spawn(read_events(read_half, state.clone()));
    if args.autosave_secs > 0 {
        rt.spawn(autosave(tx.clone(), state.clone(), Duration::from_secs(args.autosave_secs)));
    }

    if !args.quiet {
        println!(
            "{}",
            format!(
                r#"
  docsync CLI
  Connected to {}
  Type 'help' for commands, 'quit' to exit
"#,
                addr
            )
            .cyan()
        );
    }

    if let Some(document) = args.document {
        let document_id = DocumentId::new(document)?;
        run_command(Command::Join { document_id, username: None }, &state, &tx)?;
    }

    // Interactive mode
    let mut rl = DefaultEditor::new()?;
    let history_path = dirs_next::home_dir()
        .map(|p| p.join(".docsync_history"))
        .unwrap_or_default();

    let _ = rl.load_history(&history_path);

    loop {
        let prompt = match &state.lock().document_id {
            Some(id) => format!("{}:{}> ", "docsync".green(), id),
            None => format!("{}> ", "docsync".green()),
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                let command = match parse_command(line) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{} {}", "Error:".red(), e);
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }
                if let Err(e) = run_command(command, &state, &tx) {
                    eprintln!("{} {}", "Error:".red(), e);
                    if tx.is_closed() {
                        eprintln!("{}", "Connection lost.".red());
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    rt.shutdown_timeout(Duration::from_millis(200));
    Ok(())
}

fn run_command(
    command: Command,
    state: &Mutex<LocalState>,
    tx: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<()> {
    let send = |event: ClientEvent| tx.send(event).map_err(|_| anyhow!("connection closed"));
    let mut state = state.lock();

    match command {
        Command::Join { document_id, username } => {
            if let Some(name) = username {
                state.username = Some(name);
            }
            let username = state
                .username
                .clone()
                .ok_or_else(|| anyhow!("no username yet, use: join <document> <username>"))?;
            state.document_id = Some(document_id.clone());
            state.loaded = false;
            send(ClientEvent::Join(JoinRequest { username, document_id }))?;
        }
        Command::Edit(text) => {
            let document_id = state
                .document_id
                .clone()
                .ok_or_else(|| anyhow!("join a document first"))?;
            state.content = Content::new(Value::String(text.clone()));
            send(ClientEvent::SendChanges(EditOperation::new(json!({
                "documentId": document_id,
                "data": text,
            }))))?;
        }
        Command::Send(op) => {
            let op = EditOperation::new(op);
            if let Some(content) = op.resulting_content() {
                state.content = content;
            }
            send(ClientEvent::SendChanges(op))?;
        }
        Command::Cursor(range) => {
            send(ClientEvent::CursorMove(CursorMove {
                username: state.username.clone(),
                range,
            }))?;
        }
        Command::Save => match state.pending_save() {
            Some(event) => send(event)?,
            None => bail!("nothing to save, join a document first"),
        },
        Command::Create(document_id) => {
            // The server ignores lifecycle requests until this connection has joined
            state.document_id.as_ref().ok_or_else(|| anyhow!("join a document first"))?;
            send(ClientEvent::CreateDocument(document_id))?;
        }
        Command::Delete(id) => {
            let current = state
                .document_id
                .clone()
                .ok_or_else(|| anyhow!("join a document first"))?;
            send(ClientEvent::DeleteDocument(id.unwrap_or(current)))?;
        }
        Command::Show => println!("{}", state.content.as_value()),
        Command::Help => print_help(),
        Command::Clear => print!("\x1B[2J\x1B[1;1H"),
        Command::Quit => {}
    }
    Ok(())
}

async fn write_events(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = rx.recv().await {
        let line = match encode_line(&event) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{} {}", "Error:".red(), e);
                continue;
            }
        };
        if writer.write_all(&line).await.is_err() {
            break;
        }
    }
}

async fn read_events(reader: OwnedReadHalf, state: Arc<Mutex<LocalState>>) {
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match decode::<ServerEvent>(&line) {
            Ok(event) => {
                state.lock().apply(&event);
                print_event(&event);
            }
            Err(e) => eprintln!("{} {}", "Unreadable event:".red(), e),
        }
    }
    eprintln!("{}", "Server closed the connection.".red());
}

async fn autosave(
    tx: mpsc::UnboundedSender<ClientEvent>,
    state: Arc<Mutex<LocalState>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let event = state.lock().pending_save();
        if let Some(event) = event {
            if tx.send(event).is_err() {
                break;
            }
        }
    }
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::LoadDocument(content) if content.is_empty() => {
            println!("{}", "(document is empty)".dimmed());
        }
        ServerEvent::LoadDocument(content) => {
            println!("{} {}", "Loaded:".green(), content.as_value());
        }
        ServerEvent::ReceiveChanges(op) => {
            println!("{} {}", "Change:".blue(), op.as_value());
        }
        ServerEvent::CursorMove(cursor) => {
            let position = match &cursor.range {
                Some(range) => format!("{}+{}", range.index, range.length),
                None => "away".to_string(),
            };
            println!(
                "{} {} at {} ({})",
                "Cursor:".dimmed(),
                cursor.username,
                position,
                cursor.color
            );
        }
        ServerEvent::UserJoined(update) | ServerEvent::UserLeft(update) => {
            let verb = if matches!(event, ServerEvent::UserJoined(_)) { "joined" } else { "left" };
            let users: Vec<&str> = update.users.iter().map(|u| u.username.as_str()).collect();
            println!(
                "{} {} {} [{}]",
                "Presence:".yellow(),
                update.username,
                verb,
                users.join(", ")
            );
        }
    }
}

fn print_help() {
    println!(
        r#"
{}

{}
  join <document> [username]             Join a document room
  create <document>                      Create an empty document
  delete [document]                      Delete a document (default: joined one)

{}
  edit <text>                            Replace the content and relay it
  send <json>                            Relay a raw edit operation
  cursor <index> [length] | none         Share your cursor position
  save                                   Save the local copy now
  show                                   Print the local copy

{}
  help                                   Show this help
  clear                                  Clear screen
  quit/exit                              Exit CLI
"#,
        "docsync Commands".cyan().bold(),
        "Documents".yellow().bold(),
        "Editing".yellow().bold(),
        "Local".yellow().bold(),
    );
}

// Minimal dirs_next replacement for home directory
mod dirs_next {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("join notes ada").unwrap(),
            Command::Join {
                document_id: doc("notes"),
                username: Some("ada".into())
            }
        );
        assert_eq!(parse_command("edit hello world").unwrap(), Command::Edit("hello world".into()));
        assert_eq!(
            parse_command("cursor 4 2").unwrap(),
            Command::Cursor(Some(CursorRange { index: 4, length: 2 }))
        );
        assert_eq!(parse_command("cursor none").unwrap(), Command::Cursor(None));
        assert_eq!(parse_command("DELETE").unwrap(), Command::Delete(None));
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("join").is_err());
        assert!(parse_command("create").is_err());
        assert!(parse_command("cursor left").is_err());
        assert!(parse_command("send {not json").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_autosave_waits_for_snapshot() {
        let mut state = LocalState {
            username: Some("ada".into()),
            document_id: Some(doc("notes")),
            ..Default::default()
        };
        assert!(state.pending_save().is_none());

        state.apply(&ServerEvent::LoadDocument(Content::new(json!("from server"))));
        state.apply(&ServerEvent::ReceiveChanges(EditOperation::new(json!({"data": "edited"}))));

        assert_eq!(
            state.pending_save(),
            Some(ClientEvent::SaveDocument(SaveRequest {
                document_id: doc("notes"),
                data: Content::new(json!("edited")),
            }))
        );
    }

    #[test]
    fn test_edit_requires_join() {
        let state = Mutex::new(LocalState::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(run_command(Command::Edit("hi".into()), &state, &tx).is_err());
        assert!(run_command(
            Command::Join {
                document_id: doc("notes"),
                username: Some("ada".into())
            },
            &state,
            &tx
        )
        .is_ok());
        assert!(run_command(Command::Edit("hi".into()), &state, &tx).is_ok());

        assert_eq!(rx.try_recv().unwrap().name(), "join");
        assert_eq!(rx.try_recv().unwrap().name(), "send-changes");
    }

    #[test]
    fn test_lifecycle_commands_require_join() {
        let state = Mutex::new(LocalState::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(run_command(Command::Create(doc("todo")), &state, &tx).is_err());
        assert!(run_command(Command::Delete(Some(doc("todo"))), &state, &tx).is_err());
        assert!(rx.try_recv().is_err());

        run_command(
            Command::Join {
                document_id: doc("notes"),
                username: Some("ada".into()),
            },
            &state,
            &tx,
        )
        .unwrap();
        run_command(Command::Create(doc("todo")), &state, &tx).unwrap();
        run_command(Command::Delete(None), &state, &tx).unwrap();

        assert_eq!(rx.try_recv().unwrap().name(), "join");
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::CreateDocument(doc("todo")));
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::DeleteDocument(doc("notes")));
        assert_eq!(state.lock().document_id, Some(doc("notes")));
    }
}
