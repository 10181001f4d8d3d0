//! Interactive chat with the tutoring assistant.
//!
//! This binary hosts the chat widget in a terminal: the panel is drawn as
//! text, replies stream in as they arrive, and slash commands stand in for
//! the page's buttons.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the API key is read from GEMINI_API_KEY (or API_KEY)
//! tutorchat
//!
//! # Specify a model
//! tutorchat --model gemini-2.5-pro
//!
//! # Use a different persona
//! tutorchat --system-file persona.txt
//!
//! # Disable colors (useful for piping output)
//! tutorchat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/open`, `/close`, `/toggle` - Show or hide the panel
//! - `/book` - How to book a session
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application
//!
//! Set `RUST_LOG=tutorchat=debug` for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tutorchat::booking::booking_markdown;
use tutorchat::chat::view::render_with;
use tutorchat::chat::{
    AutoScroll, ChatArgs, ChatCommand, ChatConfig, ChatSession, LiveView, MarkdownOptions,
    PlainTextRenderer, Renderer, SendOutcome, help_text, parse_command,
};

/// A line of input, or why there is none.
enum Input {
    Line(String),
    Interrupt,
    Eof,
    Failed(String),
}

/// Cancellation tokens of the sends not yet answered, by turn id.
///
/// A token is dropped only when its own turn's outcome arrives.
#[derive(Default)]
struct InFlight {
    next_id: AtomicU64,
    turns: Mutex<Vec<(u64, CancellationToken)>>,
}

impl InFlight {
    fn turns(&self) -> MutexGuard<'_, Vec<(u64, CancellationToken)>> {
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new turn and returns its id and token.
    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.turns().push((id, token.clone()));
        (id, token)
    }

    /// Forgets the turn `id`.
    fn finish(&self, id: u64) {
        self.turns().retain(|(turn, _)| *turn != id);
    }

    /// Cancels every pending turn; false if there was none.
    fn cancel_all(&self) -> bool {
        let turns = self.turns();
        for (_, token) in turns.iter() {
            token.cancel();
        }
        !turns.is_empty()
    }
}

/// Main entry point for the tutorchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (args, _) = ChatArgs::from_command_line_relaxed("tutorchat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let markdown = MarkdownOptions {
        gfm: true,
        use_color: config.use_color,
    };

    let session = Arc::new(ChatSession::initialize(config.credential(), &config));
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let in_flight = Arc::new(InFlight::default());
    let handler_in_flight = Arc::clone(&in_flight);
    ctrlc::set_handler(move || {
        handler_in_flight.cancel_all();
    })?;

    println!("LTG AI Assistant (model: {})", config.model);
    println!("Type /help for commands, /quit to exit\n");
    if !session.has_session() {
        renderer.print_error(&format!(
            "no API key found in {}; chat is disabled",
            config.api_key_env.join(" or ")
        ));
    }

    let mut inputs = spawn_input_thread();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel::<(u64, SendOutcome)>();
    let mut updates = session.subscribe();
    let mut live = LiveView::new();
    let mut scroll = AutoScroll::new();

    session.set_open(true);
    redraw(&session, &mut renderer, &mut live, &markdown);
    let _ = updates.borrow_and_update();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if scroll.observe(&state) {
                    live.update(&state, &mut renderer);
                }
            }
            Some((id, outcome)) = outcomes.recv() => {
                in_flight.finish(id);
                match outcome {
                    SendOutcome::Completed { .. } => {}
                    SendOutcome::Failed(err) if err.is_abort() => renderer.print_interrupted(),
                    SendOutcome::Failed(_) => {}
                    SendOutcome::Rejected(reason) => renderer.print_info(&format!("Not sent: {reason}.")),
                }
            }
            input = inputs.recv() => {
                let Some(input) = input else {
                    break;
                };
                match input {
                    Input::Line(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_command(line) {
                            Some(ChatCommand::Quit) => {
                                println!("Goodbye!");
                                break;
                            }
                            Some(command) => {
                                handle_command(command, &session, &mut renderer, &mut live, &markdown, &in_flight, &outcome_tx);
                            }
                            None => {
                                if !session.state().open {
                                    renderer.print_info("The chat is closed; use /open to chat.");
                                    continue;
                                }
                                spawn_send(&session, Some(line.to_string()), &in_flight, &outcome_tx);
                            }
                        }
                    }
                    Input::Interrupt => {
                        if !in_flight.cancel_all() {
                            renderer.print_info("Use /quit to exit.");
                        }
                    }
                    Input::Eof => {
                        println!("\nGoodbye!");
                        break;
                    }
                    Input::Failed(err) => {
                        renderer.print_error(&format!("Input error: {err}"));
                        break;
                    }
                }
            }
        }
    }

    in_flight.cancel_all();
    Ok(())
}

/// Reads lines on a blocking thread and forwards them to the async loop.
fn spawn_input_thread() -> mpsc::UnboundedReceiver<Input> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(err) => {
                let _ = tx.send(Input::Failed(err.to_string()));
                return;
            }
        };
        loop {
            let input = match editor.readline("> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted) => Input::Interrupt,
                Err(ReadlineError::Eof) => Input::Eof,
                Err(err) => Input::Failed(err.to_string()),
            };
            let last = matches!(input, Input::Eof | Input::Failed(_));
            if tx.send(input).is_err() || last {
                break;
            }
        }
    });
    rx
}

/// Sends `text`, or the draft when `None`, on its own task.
fn spawn_send(
    session: &Arc<ChatSession>,
    text: Option<String>,
    in_flight: &InFlight,
    outcomes: &mpsc::UnboundedSender<(u64, SendOutcome)>,
) {
    let (id, token) = in_flight.begin();
    let session = Arc::clone(session);
    let outcomes = outcomes.clone();
    tokio::spawn(async move {
        let outcome = match text {
            Some(text) => session.send_with_cancel(&text, &token).await,
            None => session.submit_with_cancel(&token).await,
        };
        let _ = outcomes.send((id, outcome));
    });
}

fn handle_command(
    command: ChatCommand,
    session: &Arc<ChatSession>,
    renderer: &mut PlainTextRenderer,
    live: &mut LiveView,
    markdown: &MarkdownOptions,
    in_flight: &InFlight,
    outcomes: &mpsc::UnboundedSender<(u64, SendOutcome)>,
) {
    match command {
        ChatCommand::Open => {
            session.set_open(true);
            redraw(session, renderer, live, markdown);
        }
        ChatCommand::Close => {
            session.set_open(false);
            renderer.print_info("Chat closed. Replies keep arriving; use /open to see them.");
        }
        ChatCommand::Toggle => {
            if session.toggle_open() {
                redraw(session, renderer, live, markdown);
            } else {
                renderer.print_info("Chat closed.");
            }
        }
        ChatCommand::Show => {
            if session.state().open {
                redraw(session, renderer, live, markdown);
            } else {
                renderer.print_info("The chat is closed; use /open to show it.");
            }
        }
        ChatCommand::Draft(text) => {
            if session.set_draft(&text) {
                renderer.print_info(&format!("Draft: {text}"));
            } else {
                renderer.print_info("The input is disabled.");
            }
        }
        ChatCommand::Send => {
            if session.state().can_submit() {
                spawn_send(session, None, in_flight, outcomes);
            } else {
                renderer.print_info("Nothing to send.");
            }
        }
        ChatCommand::Book => renderer.print_markdown(&booking_markdown()),
        ChatCommand::Stats => print_stats(session),
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Quit => {}
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
}

/// Draws the whole panel and marks it as shown.
fn redraw(
    session: &ChatSession,
    renderer: &mut PlainTextRenderer,
    live: &mut LiveView,
    markdown: &MarkdownOptions,
) {
    let state = session.state();
    renderer.draw(&render_with(&state, markdown));
    live.sync(&state);
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!(
        "      Session: {}",
        if stats.session_available {
            "available"
        } else {
            "unavailable"
        }
    );
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Turns: {} completed, {} failed",
        stats.turns_completed, stats.turns_failed
    );
    println!("      Rejected sends: {}", stats.sends_rejected);
    println!("      Fragments received: {}", stats.fragments_received);
    match stats.stream_timeout {
        Some(timeout) => println!("      Stream timeout: {}s", timeout.as_secs()),
        None => println!("      Stream timeout: (disabled)"),
    }
}
