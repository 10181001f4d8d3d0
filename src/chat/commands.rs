//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat widget without sending messages
//! to the API.

/// A parsed chat command.
///
/// These commands control the widget and are not sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Show the chat panel.
    Open,

    /// Hide the chat panel.  A reply in flight keeps streaming.
    Close,

    /// Flip panel visibility.
    Toggle,

    /// Redraw the whole panel.
    Show,

    /// Type text into the input without sending it.
    Draft(String),

    /// Send the current draft.
    Send,

    /// Show how to book a tutoring session.
    Book,

    /// Display session statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use tutorchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/draft How do I book?").is_some());
/// assert!(parse_command("Do you tutor chemistry?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "open" => ChatCommand::Open,
        "close" => ChatCommand::Close,
        "toggle" => ChatCommand::Toggle,
        "show" | "redraw" => ChatCommand::Show,
        "draft" => match argument {
            Some(text) => ChatCommand::Draft(text.to_string()),
            None => ChatCommand::Invalid("/draft requires some text".to_string()),
        },
        "send" => ChatCommand::Send,
        "book" | "booking" => ChatCommand::Book,
        "stats" | "status" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /open                  Show the chat panel
  /close                 Hide the chat panel (replies keep streaming)
  /toggle                Show or hide the chat panel
  /show                  Redraw the whole conversation
  /draft <text>          Type into the input without sending
  /send                  Send the current draft
  /book                  How to book a tutoring session
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit the chat

Anything else is sent to the assistant.  Ctrl-C cancels a reply in flight."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_panel_commands() {
        assert_eq!(parse_command("/open"), Some(ChatCommand::Open));
        assert_eq!(parse_command("/close"), Some(ChatCommand::Close));
        assert_eq!(parse_command("/toggle"), Some(ChatCommand::Toggle));
        assert_eq!(parse_command("/show"), Some(ChatCommand::Show));
        assert_eq!(parse_command("/redraw"), Some(ChatCommand::Show));
    }

    #[test]
    fn parse_draft_and_send() {
        assert_eq!(
            parse_command("/draft  How do I book? "),
            Some(ChatCommand::Draft("How do I book?".to_string()))
        );
        assert!(matches!(
            parse_command("/draft"),
            Some(ChatCommand::Invalid(_))
        ));
        assert_eq!(parse_command("/send"), Some(ChatCommand::Send));
    }

    #[test]
    fn parse_info_commands() {
        assert_eq!(parse_command("/book"), Some(ChatCommand::Book));
        assert_eq!(parse_command("/booking"), Some(ChatCommand::Book));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/status"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn parse_quit_command() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_case_insensitive() {
        assert_eq!(parse_command("/QUIT"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/Toggle"), Some(ChatCommand::Toggle));
    }

    #[test]
    fn parse_with_whitespace() {
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_regular_message() {
        assert!(parse_command("Hello, Adam!").is_none());
        assert!(parse_command("What about 1/2 of a session?").is_none());
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            parse_command("/model gemini-2.5-pro"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for command in [
            "/open", "/close", "/toggle", "/show", "/draft", "/send", "/book", "/stats",
            "/help", "/quit",
        ] {
            assert!(help.contains(command), "missing {command}");
        }
    }
}
