//! Interactive chat session: the REPL, the streaming consumer, and the
//! tool-call round loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::Result;
use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use dialoguer::{theme::ColorfulTheme, Select};
use regex::Regex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::{Map, Value};

use crate::extract::extract_json;
use crate::files::FileIndex;
use crate::logger::Logger;
use crate::ollama::OllamaClient;
use crate::permissions::{PermissionGate, Verdict};
use crate::protocol::{Action, LlmReply, Message, Role, StreamEvent};
use crate::tools::{ToolContext, ToolRegistry};

const CANCEL_MARKER: &str = "\n\n--- Canceled ---";

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\S+)").unwrap());

pub struct ChatSession {
    client: OllamaClient,
    model: String,
    context_window: i64,
    messages: Vec<Message>,
    registry: ToolRegistry,
    gate: PermissionGate,
    files: FileIndex,
    logger: Arc<Logger>,
    working_directory: PathBuf,
    last_stats: Option<String>,
}

/// How one streaming round ended.
enum Round {
    /// The model gave its final answer; hand the prompt back to the user.
    Finished,
    /// A tool ran and its result was appended; stream again.
    Continue,
    /// The user stopped generation.
    Canceled,
    /// The stream failed; the error was already shown.
    Errored,
}

impl ChatSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: OllamaClient,
        model: String,
        context_window: i64,
        system_prompt: String,
        working_directory: PathBuf,
        gate: PermissionGate,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        let files = FileIndex::new(&working_directory)?;
        Ok(Self {
            client,
            model,
            context_window,
            messages: vec![Message::new(Role::System, &system_prompt)],
            registry: ToolRegistry::new(),
            gate,
            files,
            logger,
            working_directory,
            last_stats: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        println!("Chatting with {}. Type /help for commands, /bye to quit.", self.model);
        self.print_status_line();

        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(input);
                    if let Some(command) = input.strip_prefix('/') {
                        if !self.handle_command(command) {
                            break;
                        }
                        continue;
                    }
                    self.send_turn(input).await;
                    self.print_status_line();
                }
                Err(ReadlineError::Interrupted) => {
                    println!("(Use /bye to quit)");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    print_error(&format!("Input error: {e}"));
                    break;
                }
            }
        }
        println!("Goodbye.");
        Ok(())
    }

    /// Returns false when the session should end.
    fn handle_command(&mut self, command: &str) -> bool {
        let (name, _rest) = match command.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "new" => {
                self.messages.truncate(1);
                self.last_stats = None;
                println!("Started a new conversation.");
            }
            "log" => println!("{}", self.logger.toggle()),
            "yolo" => {
                if self.gate.toggle_bypass() {
                    println!("YOLO mode enabled: destructive commands run without confirmation.");
                } else {
                    println!("YOLO mode disabled.");
                }
            }
            "help" => print_help(),
            "bye" | "quit" => return false,
            other => println!("Unknown command: {other}. Type /help for a list."),
        }
        true
    }

    async fn send_turn(&mut self, input: &str) {
        let expanded = self.expand_mentions(input);
        self.logger.log(&format!("user: {expanded}"));
        self.messages.push(Message::new(Role::User, &expanded));

        loop {
            match self.stream_round().await {
                Round::Continue => continue,
                Round::Finished | Round::Canceled | Round::Errored => break,
            }
        }
    }

    /// Inlines `@name` file references into the prompt. Unresolvable
    /// mentions are left as typed.
    fn expand_mentions(&self, input: &str) -> String {
        let mut expanded = input.to_string();
        for caps in MENTION.captures_iter(input) {
            let term = &caps[1];
            let Some(content) = self.read_mentioned(term) else {
                continue;
            };
            expanded.push_str(&format!(
                "\n\n---\nFile: {}\n```\n{}\n```\n",
                term, content
            ));
        }
        expanded
    }

    fn read_mentioned(&self, term: &str) -> Option<String> {
        let direct = self.working_directory.join(term);
        if let Ok(content) = std::fs::read_to_string(&direct) {
            return Some(content);
        }
        let name = self.files.find(term)?;
        std::fs::read_to_string(self.working_directory.join(name)).ok()
    }

    async fn stream_round(&mut self) -> Round {
        let mut handle =
            self.client
                .start_stream(&self.model, self.messages.clone(), self.context_window);

        let mut live = String::new();
        let mut printing = false;

        loop {
            tokio::select! {
                pressed = tokio::signal::ctrl_c() => {
                    if pressed.is_err() {
                        continue;
                    }
                    handle.cancel();
                    return self.finish_canceled(live, printing);
                }
                event = handle.next_event() => match event {
                    None => return self.finish_canceled(live, printing),
                    Some(StreamEvent::Chunk(text)) => {
                        live.push_str(&text);
                        // Structured replies are parsed at the end of the
                        // round instead of echoed token by token.
                        if looks_like_json(&live) {
                            continue;
                        }
                        if !printing {
                            print_assistant_prefix();
                            printing = true;
                        }
                        print!("{text}");
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                    }
                    Some(StreamEvent::Done { stats, message }) => {
                        if printing {
                            println!();
                        }
                        self.last_stats = Some(stats);
                        return self.finish_round(message, printing).await;
                    }
                    Some(StreamEvent::Failed(e)) => {
                        if printing {
                            println!();
                        }
                        print_error(&format!("Stream failed: {e:#}"));
                        return Round::Errored;
                    }
                },
            }
        }
    }

    fn finish_canceled(&mut self, live: String, printing: bool) -> Round {
        if printing {
            println!();
        }
        let mut content = live;
        append_cancel_marker(&mut content);
        self.messages.push(Message::new(Role::Assistant, &content));
        self.logger.log("generation canceled by user");
        Round::Canceled
    }

    async fn finish_round(&mut self, mut message: Message, already_printed: bool) -> Round {
        let Some(action) = classify(&message) else {
            // Plain prose was echoed live; a suppressed JSON blob that
            // failed to classify still deserves to be shown.
            if !already_printed && !message.content.trim().is_empty() {
                print_assistant_prefix();
                println!("{}", message.content.trim());
            }
            self.messages.push(message);
            return Round::Finished;
        };

        if action.tool == "respond" {
            let text = respond_text(&action.input);
            message.content = text.clone();
            self.messages.push(message);
            print_assistant_prefix();
            println!("{text}");
            return Round::Finished;
        }

        // The model sees a short summary on the next round instead of its
        // own structured blob.
        message.content = format!("Command received: {}", action.tool);
        self.messages.push(message);

        let details = render_action_details(&action);
        if self.gate.check(&action) == Verdict::NeedsConfirmation {
            println!("\nThe model wants to run a command:\n\n{details}");
            match prompt_permission() {
                Permission::AllowOnce => {}
                Permission::AlwaysAllow => self.gate.remember(&action),
                Permission::Deny => {
                    let refusal = format!("Command denied by user:\n\n{details}");
                    if let Some(last) = self.messages.last_mut() {
                        last.content = refusal.clone();
                    }
                    println!("{refusal}");
                    return Round::Finished;
                }
            }
        } else {
            print_dim(&format!("Running: {}", summarize_action(&action)));
        }

        let ctx = ToolContext {
            working_directory: &self.working_directory,
            logger: &self.logger,
        };
        let outcome = self
            .registry
            .dispatch(&action.tool, &ctx, &Value::Object(action.input.clone()))
            .await;

        if outcome.mutated_files {
            if let Err(e) = self.files.refresh() {
                self.logger.log(&format!("file index refresh failed: {e}"));
            }
        }

        if outcome.text.is_empty() {
            return Round::Finished;
        }
        let mut tool_message = Message::new(Role::Tool, &outcome.text);
        tool_message.display_content = preview(&outcome.text);
        print_dim(
            tool_message
                .display_content
                .as_deref()
                .unwrap_or(&outcome.text),
        );
        self.messages.push(tool_message);
        Round::Continue
    }

    fn print_status_line(&self) {
        let context = if self.context_window > 0 {
            self.context_window.to_string()
        } else {
            "N/A".to_string()
        };
        let stats = self.last_stats.as_deref().unwrap_or("-");
        let mut line = format!("Model: {} | Context: {} | {}", self.model, context, stats);
        if self.gate.bypass() {
            line.push_str(" | YOLO");
        }
        print_dim(&line);
    }
}

/// Picks the tool call out of a finished assistant message. Native
/// `tool_calls` take precedence over JSON embedded in the content.
fn classify(message: &Message) -> Option<Action> {
    if let Some(call) = message.tool_calls.first() {
        return Some(Action {
            tool: call.function.name.clone(),
            input: call.function.arguments.clone(),
        });
    }
    let recovered = extract_json(&message.content);
    let reply: LlmReply = serde_json::from_str(&recovered).unwrap_or_default();
    if let Some(call) = reply.tool_calls.first() {
        return Some(Action {
            tool: call.function.name.clone(),
            input: call.function.arguments.clone(),
        });
    }
    let action = reply.action;
    if !action.tool.is_empty() {
        return Some(action);
    }
    // Some models put the tool call at the top level instead of nesting it
    // under "action".
    let flat: Action = serde_json::from_str(&recovered).unwrap_or_default();
    if flat.tool.is_empty() {
        None
    } else {
        Some(flat)
    }
}

/// The `respond` tool's payload: a `message` that may arrive as a string or
/// as an array of lines.
fn respond_text(input: &Map<String, Value>) -> String {
    match input.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Human-readable dump of an action for the permission prompt. File content
/// is elided; what matters for approval is the tool and the target.
fn render_action_details(action: &Action) -> String {
    let mut out = format!("Tool: {}\n", action.tool);
    let mut keys: Vec<&String> = action.input.keys().collect();
    keys.sort();
    for key in keys {
        if key == "content" {
            let len = action
                .input
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::len)
                .unwrap_or(0);
            out.push_str(&format!("Content: ({len} chars)\n"));
            continue;
        }
        let value = &action.input[key];
        let rendered = match value {
            Value::String(s) => format!("{s:?}"),
            other => other.to_string(),
        };
        out.push_str(&format!("{}: {}\n", title_case(key), rendered));
    }
    out
}

fn summarize_action(action: &Action) -> String {
    match action.input.get("path").and_then(|v| v.as_str()) {
        Some(path) => format!("{} {}", action.tool, path),
        None => action.tool.clone(),
    }
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// A shortened rendering of a long tool result for the terminal; the model
/// still receives the full text. `None` means the text is short enough to
/// show as is.
fn preview(text: &str) -> Option<String> {
    const MAX_PREVIEW_LINES: usize = 8;
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= MAX_PREVIEW_LINES {
        return None;
    }
    let mut shortened = lines[..MAX_PREVIEW_LINES].join("\n");
    shortened.push_str(&format!(
        "\n... ({} more lines)",
        lines.len() - MAX_PREVIEW_LINES
    ));
    Some(shortened)
}

fn append_cancel_marker(content: &mut String) {
    if !content.ends_with(CANCEL_MARKER) {
        content.push_str(CANCEL_MARKER);
    }
}

/// A burst of streamed JSON should not be echoed live.
fn looks_like_json(accumulated: &str) -> bool {
    accumulated.trim_start().starts_with('{')
}

enum Permission {
    AllowOnce,
    AlwaysAllow,
    Deny,
}

fn prompt_permission() -> Permission {
    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Allow this command?")
        .items(&["Allow once", "Always allow", "Deny"])
        .default(0)
        .interact();
    match choice {
        Ok(0) => Permission::AllowOnce,
        Ok(1) => Permission::AlwaysAllow,
        _ => Permission::Deny,
    }
}

fn print_assistant_prefix() {
    print!(
        "{}Assistant:{} ",
        SetForegroundColor(Color::Green),
        ResetColor
    );
}

fn print_error(text: &str) {
    eprintln!("{}{}{}", SetForegroundColor(Color::Red), text, ResetColor);
}

fn print_dim(text: &str) {
    println!(
        "{}{}{}",
        SetAttribute(Attribute::Dim),
        text,
        SetAttribute(Attribute::Reset)
    );
}

fn print_help() {
    println!("Commands:");
    println!("  /new   start a new conversation");
    println!("  /log   toggle session logging");
    println!("  /yolo  toggle confirmation bypass for destructive commands");
    println!("  /help  show this help");
    println!("  /bye   quit (also /quit)");
    println!("Mention a file with @name to inline its contents.");
    println!("Press Ctrl+C while the model is replying to stop generation.");
}
