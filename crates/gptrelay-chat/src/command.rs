//! Bot command parsing.
//!
//! The command word is matched case-insensitively; the prompt after `gpt`
//! keeps the author's text as typed.

/// Reply to `ping`.
pub const PONG_REPLY: &str = "pong";

/// Reply to `gpt` without a prompt.
pub const INVALID_PROMPT_REPLY: &str = "Invalid prompt: to give a prompt, type `!gpt <prompt>`";

/// Reply to `clear`.
pub const CLEARED_REPLY: &str = "Conversation cleared.";

/// A recognised bot command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Clear,
    /// `gpt` followed by prompt text.
    GptPrompt(String),
    /// `gpt` with nothing after it.
    EmptyPrompt,
}

impl Command {
    /// Parse a raw message. `None` means the message is not for the bot.
    ///
    /// `ping`, `help`, and `clear` must stand alone; anything after them makes
    /// the message unrecognised.
    pub fn parse(content: &str, prefix: &str) -> Option<Command> {
        let body = content.trim().strip_prefix(prefix)?;
        let (word, rest) = match body.find(char::is_whitespace) {
            Some(idx) => (&body[..idx], body[idx..].trim()),
            None => (body, ""),
        };

        match word.to_lowercase().as_str() {
            "ping" if rest.is_empty() => Some(Command::Ping),
            "help" if rest.is_empty() => Some(Command::Help),
            "clear" if rest.is_empty() => Some(Command::Clear),
            "gpt" if rest.is_empty() => Some(Command::EmptyPrompt),
            "gpt" => Some(Command::GptPrompt(rest.to_string())),
            _ => None,
        }
    }
}

/// Help text listing every command under `prefix`.
pub fn help_text(prefix: &str) -> String {
    format!(
        "Sure, I can help you. Here are the commands I can do: \n\n\
         `{p}ping` - I'll respond with `pong`\n\
         `{p}help` - I'll respond with this message\n\
         `{p}gpt <prompt>` - I'll respond with a GPT response to the prompt, \
         remembering earlier prompts in this channel for a day\n\
         `{p}clear` - I'll forget this channel's conversation",
        p = prefix
    )
}
