//! Terminal chat: a stdin/stdout REPL over a [`ChatSession`].

use std::pin::pin;

use futures::{StreamExt, stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::conversation::{ChatSession, PendingState};
use crate::error::{Error, ErrorKind, Result};

const TITLE_LEN: usize = 48;

const HELP: &str = "\
Commands:
  /new [title]   start a new conversation with the next message
  /list          list conversations for this assistant
  /open <id>     continue an existing conversation
  /retry         resend a failed message or ask again for a missing reply
  /discard       drop a message that failed to send
  /quit          exit";

/// What the REPL should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Assistant reply to print.
    Reply(String),
    /// Status text for stderr.
    Info(String),
    Quit,
}

pub struct TerminalChat {
    session: ChatSession,
    /// Title for the conversation the next plain message starts.
    next_title: Option<String>,
}

impl TerminalChat {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session,
            next_title: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> Result<Outcome> {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return self.say(line).await.map(Outcome::Reply);
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match name {
            "quit" | "exit" => Ok(Outcome::Quit),
            "help" => Ok(Outcome::Info(HELP.to_string())),
            "new" => {
                self.session.close();
                self.next_title = (!arg.is_empty()).then(|| arg.to_string());
                Ok(Outcome::Info(
                    "Next message starts a new conversation.".to_string(),
                ))
            }
            "list" => {
                let conversations = self.session.conversations().await?;
                if conversations.is_empty() {
                    return Ok(Outcome::Info("No conversations yet.".to_string()));
                }
                let lines: Vec<String> = conversations
                    .iter()
                    .map(|c| {
                        format!(
                            "{}  {}  ({})",
                            c.id,
                            c.title,
                            c.updated_at.format("%Y-%m-%d %H:%M")
                        )
                    })
                    .collect();
                Ok(Outcome::Info(lines.join("\n")))
            }
            "open" => {
                let id = Uuid::parse_str(arg)
                    .map_err(|_| Error::InvalidInput(format!("Invalid conversation ID: {arg}")))?;
                self.session.open(id).await?;
                self.next_title = None;
                Ok(Outcome::Info(self.transcript()))
            }
            "retry" => self.session.retry().await.map(Outcome::Reply),
            "discard" => Ok(Outcome::Info(match self.session.discard_pending() {
                Some(p) => format!("Discarded: {}", p.content),
                None => "Nothing to discard.".to_string(),
            })),
            other => Err(Error::InvalidInput(format!(
                "Unknown command /{other}. Type /help for commands."
            ))),
        }
    }

    async fn say(&mut self, text: &str) -> Result<String> {
        if self.session.active().is_some() {
            return self.session.send(text).await;
        }
        let title = self
            .next_title
            .take()
            .unwrap_or_else(|| derive_title(text));
        self.session.start(&title, text).await
    }

    /// Confirmed messages followed by a pending one, one per line.
    fn transcript(&self) -> String {
        let mut out = Vec::new();
        if let Some(c) = self.session.active() {
            out.push(format!("── {} ──", c.title));
        }
        for m in self.session.visible() {
            out.push(format!("{}: {}", m.role(), m.content()));
        }
        if let Some(PendingState::Failed(kind)) = self.session.pending().map(|p| p.state) {
            out.push(format!(
                "(last message not saved: {}; /retry to resend)",
                kind.as_str()
            ));
        }
        if self.session.awaiting_reply() {
            out.push("(awaiting reply; /retry to ask again)".to_string());
        }
        out.join("\n")
    }

    /// Read stdin line by line until EOF or `/quit`.
    pub async fn run(mut self) {
        let reader = BufReader::new(tokio::io::stdin());
        let mut input = pin!(stream::unfold(reader.lines(), |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((line, lines)),
                Ok(None) => None,
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    None
                }
            }
        }));

        eprintln!(
            "Chatting with the {} assistant. Type /help for commands.",
            self.session.assistant_type()
        );
        eprint!("> ");

        while let Some(line) = input.next().await {
            if line.trim().is_empty() {
                eprint!("> ");
                continue;
            }
            match self.handle_line(&line).await {
                Ok(Outcome::Reply(text)) => println!("\n{}\n", text),
                Ok(Outcome::Info(text)) => eprintln!("{}", text),
                Ok(Outcome::Quit) => break,
                Err(e) => eprintln!("{}", failure_hint(&e)),
            }
            eprint!("> ");
        }
    }
}

/// Short title from the first line of a message.
pub fn derive_title(text: &str) -> String {
    let first = text.lines().next().unwrap_or("").trim();
    if first.chars().count() <= TITLE_LEN {
        return first.to_string();
    }
    let cut: String = first.chars().take(TITLE_LEN).collect();
    format!("{}…", cut.trim_end())
}

fn failure_hint(e: &Error) -> String {
    match e.kind() {
        ErrorKind::Provider => format!("The assistant could not reply ({e}). /retry to try again."),
        ErrorKind::Store => format!("Your message may not have been saved ({e}). /retry to resend."),
        _ => e.to_string(),
    }
}
