//! Line-oriented terminal front end.

use crate::advisor::Advisor;
use crate::chat::SendOutcome;
use crate::config;
use crate::error::AdvisorError;
use crate::history::SessionGroup;
use crate::models::{ChatMessage, PromptId, SignupRequest, UploadFile, Workspace, WorkspaceId};
use crate::notify::NoticeLevel;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const HELP: &str = "\
/signin <email> <password>     sign in
/signup <name> <email> <password>
/logout
/workspaces                    list workspaces and their documents
/new <name>                    create a workspace
/rename <ws_id> <name>         rename a workspace
/delete <ws_id>                delete a workspace
/use <ws_id>                   select a workspace and resume its latest session
/upload <path.pdf>             upload a PDF into the selected workspace
/rmdoc <doc_id>                delete a document
/docs                          documents in the current session
/history                       past sessions of the selected workspace
/open <prompt_id>              reopen the session containing a prompt
/users [role_id]               list users (super admin)
/user-history <user_id>        a user's sessions (super admin)
/llm-key <key>                 store the LLM API key in the OS keyring
/quit
Anything else is sent as a question.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SignIn { email: String, password: String },
    SignUp { name: String, email: String, password: String },
    Logout,
    Workspaces,
    New(String),
    Rename { ws_id: WorkspaceId, name: String },
    Delete(WorkspaceId),
    Use(WorkspaceId),
    Upload(PathBuf),
    DeleteDocument(i64),
    Docs,
    History,
    Open(PromptId),
    Users(i64),
    UserHistory(i64),
    SetLlmKey(String),
    Help,
    Quit,
    Send(String),
}

/// Parses one input line. Lines not starting with `/` are questions.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "signin" => {
            let (email, password) = two_args(args, "/signin <email> <password>")?;
            Command::SignIn { email, password }
        }
        "signup" => {
            let mut parts = args.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(email), Some(password)) => Command::SignUp {
                    name: name.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                },
                _ => return Err("usage: /signup <name> <email> <password>".to_string()),
            }
        }
        "logout" => Command::Logout,
        "workspaces" | "ws" => Command::Workspaces,
        "new" if !args.is_empty() => Command::New(args.to_string()),
        "new" => return Err("usage: /new <name>".to_string()),
        "rename" => {
            let (id, name) = two_args(args, "/rename <ws_id> <name>")?;
            Command::Rename {
                ws_id: number(&id)?,
                name,
            }
        }
        "delete" => Command::Delete(number(args)?),
        "use" => Command::Use(number(args)?),
        "upload" if !args.is_empty() => Command::Upload(PathBuf::from(args)),
        "upload" => return Err("usage: /upload <path.pdf>".to_string()),
        "rmdoc" => Command::DeleteDocument(number(args)?),
        "docs" => Command::Docs,
        "history" => Command::History,
        "open" => Command::Open(number(args)?),
        "users" if args.is_empty() => Command::Users(crate::models::GUEST_ROLE),
        "users" => Command::Users(number(args)?),
        "user-history" => Command::UserHistory(number(args)?),
        "llm-key" if !args.is_empty() => Command::SetLlmKey(args.to_string()),
        "llm-key" => return Err("usage: /llm-key <key>".to_string()),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: /{}", other)),
    };
    Ok(command)
}

fn two_args(args: &str, usage: &str) -> Result<(String, String), String> {
    match args.split_once(char::is_whitespace) {
        Some((first, second)) if !second.trim().is_empty() => {
            Ok((first.to_string(), second.trim().to_string()))
        }
        _ => Err(format!("usage: {}", usage)),
    }
}

fn number(arg: &str) -> Result<i64, String> {
    arg.trim()
        .parse()
        .map_err(|_| format!("expected a number, got '{}'", arg.trim()))
}

/// Runs the interactive loop until `/quit` or end of input.
pub async fn run_repl(advisor: Advisor) -> Result<()> {
    spawn_notice_printer(&advisor);

    match advisor.identity().await {
        Some(identity) => {
            println!("Signed in as {}.", identity.user.user_name);
            if let Err(e) = advisor.refresh_workspaces().await {
                log::debug!("Initial workspace load failed: {}", e);
            }
        }
        None => println!("Not signed in. Use /signin <email> <password>."),
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&advisor).await;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("[error] {}", message);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = execute(&advisor, command).await {
            report(e);
        }
    }
    Ok(())
}

async fn prompt(advisor: &Advisor) {
    match advisor.selected_workspace().await {
        Some(ws_id) => print!("advisor[{}]> ", ws_id),
        None => print!("advisor> "),
    }
    std::io::stdout().flush().ok();
}

fn spawn_notice_printer(advisor: &Advisor) {
    let mut notices = advisor.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    let tag = match notice.level {
                        NoticeLevel::Success => "ok",
                        NoticeLevel::Info => "info",
                        NoticeLevel::Error => "error",
                    };
                    println!("[{}] {}", tag, notice.message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Dropped {} notices", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

// Operations already announce their failures as notices; only errors that
// never reach the notifier are printed here.
fn report(err: AdvisorError) {
    match err {
        AdvisorError::Storage(_) => println!("[error] {}", err),
        other => log::debug!("Command failed: {}", other),
    }
}

async fn execute(advisor: &Advisor, command: Command) -> Result<(), AdvisorError> {
    match command {
        Command::SignIn { email, password } => {
            advisor.sign_in(&email, &password).await?;
            print_workspaces(&advisor.refresh_workspaces().await?);
        }
        Command::SignUp {
            name,
            email,
            password,
        } => {
            advisor
                .sign_up(SignupRequest {
                    user_name: name,
                    user_email: email,
                    user_pwd: password,
                    user_mobile: String::new(),
                    gender: "OTHER".to_string(),
                    is_active: true,
                })
                .await?;
        }
        Command::Logout => advisor.logout().await?,
        Command::Workspaces => print_workspaces(&advisor.refresh_workspaces().await?),
        Command::New(name) => {
            let workspace = advisor.create_workspace(&name).await?;
            if let Some(ws_id) = workspace.ws_id {
                advisor.select_workspace(ws_id).await?;
            }
        }
        Command::Rename { ws_id, name } => {
            let identity = advisor.require_user().await?;
            advisor
                .update_workspace(Workspace {
                    ws_id: Some(ws_id),
                    ws_name: name,
                    user_id: identity.user_id(),
                    is_active: true,
                })
                .await?;
        }
        Command::Delete(ws_id) => advisor.delete_workspace(ws_id).await?,
        Command::Use(ws_id) => {
            advisor.select_workspace(ws_id).await?;
            print_thread(&advisor.messages(ws_id));
        }
        Command::Upload(path) => {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    println!("[error] Failed to read {}: {}", path.display(), e);
                    return Ok(());
                }
            };
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            advisor.upload_document(UploadFile::new(file_name, bytes)).await?;
        }
        Command::DeleteDocument(doc_id) => advisor.delete_document(doc_id).await?,
        Command::Docs => {
            let documents = advisor.current_session_documents().await;
            if documents.is_empty() {
                println!("No documents in the current session.");
            }
            for document in documents {
                println!("  {}", document);
            }
        }
        Command::History => {
            let ws_id = selected(advisor).await?;
            print_sessions(&advisor.session_history(ws_id).await?);
        }
        Command::Open(prompt_id) => {
            let ws_id = selected(advisor).await?;
            let groups = advisor.session_history(ws_id).await?;
            let record = groups
                .iter()
                .flat_map(|group| group.prompts.iter())
                .find(|record| record.prompt_id == Some(prompt_id))
                .cloned();
            match record {
                Some(record) => {
                    advisor.load_session(&record).await?;
                    print_thread(&advisor.messages(record.ws_id));
                }
                None => println!("[error] no prompt {} in this workspace", prompt_id),
            }
        }
        Command::Users(role_id) => {
            for user in advisor.list_users(role_id).await? {
                let status = if user.is_active { "active" } else { "inactive" };
                println!(
                    "  #{} {} <{}> {}",
                    user.user_id, user.user_name, user.user_email, status
                );
            }
        }
        Command::UserHistory(user_id) => {
            print_sessions(&advisor.user_chat_history(user_id).await?)
        }
        Command::SetLlmKey(key) => match config::set_api_key_in_keyring(&key) {
            Ok(()) => println!("Stored. Set ADVISOR_LLM_API_KEY_REF=keyring and restart to use it."),
            Err(e) => println!("[error] {:#}", e),
        },
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
        Command::Send(text) => {
            let ws_id = selected(advisor).await?;
            let outcome = advisor.send(ws_id, &text).await?;
            print_message(outcome.bot_message());
            if let SendOutcome::Failed { reason, .. } = outcome {
                log::debug!("Send failed: {}", reason);
            }
        }
    }
    Ok(())
}

async fn selected(advisor: &Advisor) -> Result<WorkspaceId, AdvisorError> {
    match advisor.selected_workspace().await {
        Some(ws_id) => Ok(ws_id),
        None => {
            let err = AdvisorError::NoWorkspaceSelected;
            println!("[error] {}", err);
            Err(err)
        }
    }
}

fn print_workspaces(workspaces: &[crate::models::WorkspaceWithDocuments]) {
    if workspaces.is_empty() {
        println!("No workspaces yet. Create one with /new <name>.");
    }
    for ws in workspaces {
        println!(
            "  #{} {} ({} files)",
            ws.workspace.ws_id.unwrap_or_default(),
            ws.workspace.ws_name,
            ws.file_count
        );
        for doc in &ws.documents {
            println!("      - {} [doc {}]", doc.ws_doc_name, doc.ws_doc_id.unwrap_or_default());
        }
    }
}

fn print_sessions(groups: &[SessionGroup]) {
    if groups.is_empty() {
        println!("No chat history.");
    }
    for group in groups {
        println!(
            "  session {} ({} prompts) {}",
            group.session_id,
            group.prompts.len(),
            group.documents.join(", ")
        );
        for record in &group.prompts {
            println!(
                "      [{}] {}",
                record.prompt_id.unwrap_or_default(),
                record.prompt_text
            );
        }
    }
}

fn print_thread(messages: &[ChatMessage]) {
    for message in messages {
        print_message(message);
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.kind {
        crate::models::MessageKind::User => "you",
        crate::models::MessageKind::Bot => "advisor",
    };
    println!("{}: {}", who, message.content);
    for source in message.sources.iter().flatten() {
        println!("    ({} p.{}) {}", source.file, source.page, source.summary);
    }
}
