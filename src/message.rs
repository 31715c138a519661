//! Message protocol definitions
//!
//! Newline-delimited UTF-8 text in both directions:
//! - Server → Client: [`Message`], rendered as `* <text>` or `<nickname>: <text>`
//! - Client → Server: [`ClientLine`], parsed from each line after the handshake

use std::fmt;

use crate::error::ChatError;

/// Prompt sent to every new connection before the nickname line
pub const NICK_PROMPT: &str = "NICK";

/// Reserved command that ends a session
pub const QUIT_COMMAND: &str = "/quit";

/// Header prefix introducing a raw file upload
pub const UPLOAD_PREFIX: &str = "FILE|";

/// Server → Client message
///
/// Immutable once constructed; cloned once per recipient during fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Server-generated notice (joins, departures, errors)
    SystemNotice { text: String },
    /// Chat line relayed from a client
    ChatLine { sender: String, text: String },
}

impl Message {
    pub fn notice(text: impl Into<String>) -> Self {
        Message::SystemNotice { text: text.into() }
    }

    pub fn chat(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Message::ChatLine {
            sender: sender.into(),
            text: text.into(),
        }
    }

    pub fn joined(nickname: &str) -> Self {
        Self::notice(format!("{nickname} has joined"))
    }

    pub fn left(nickname: &str) -> Self {
        Self::notice(format!("{nickname} has left"))
    }

    pub fn uploaded(nickname: &str, file_name: &str, size: usize) -> Self {
        Self::notice(format!("{nickname} uploaded file: {file_name} ({size} bytes)"))
    }
}

/// Wire rendering, without the trailing newline
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::SystemNotice { text } => write!(f, "* {text}"),
            Message::ChatLine { sender, text } => write!(f, "{sender}: {text}"),
        }
    }
}

/// Convert a client-facing ChatError into a notice for the offending client
impl From<&ChatError> for Message {
    fn from(err: &ChatError) -> Self {
        match err {
            ChatError::NicknameTaken(_)
            | ChatError::InvalidNickname(_)
            | ChatError::InvalidUpload(_) => Message::notice(err.to_string()),
            ChatError::Store(e) => Message::notice(format!("upload failed: {e}")),
            // Fatal errors are not typically converted (connection closes)
            _ => Message::notice("internal error"),
        }
    }
}

/// Client → Server line, after the nickname handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Blank line, ignored
    Empty,
    /// Reserved disconnect command
    Quit,
    /// Upload header; `size` raw bytes follow the line
    Upload { file_name: String, size: usize },
    /// Anything else is chat text
    Chat(String),
}

impl ClientLine {
    /// Parse one inbound line (line terminator already stripped)
    pub fn parse(line: &str) -> Result<Self, ChatError> {
        if line.trim().is_empty() {
            return Ok(ClientLine::Empty);
        }
        if line.trim() == QUIT_COMMAND {
            return Ok(ClientLine::Quit);
        }
        if let Some(header) = line.strip_prefix(UPLOAD_PREFIX) {
            return parse_upload_header(header);
        }
        Ok(ClientLine::Chat(line.to_string()))
    }
}

fn parse_upload_header(header: &str) -> Result<ClientLine, ChatError> {
    let Some((file_name, size)) = header.split_once('|') else {
        return Err(ChatError::InvalidUpload("invalid file header".into()));
    };
    let size = size
        .trim()
        .parse::<usize>()
        .map_err(|_| ChatError::InvalidUpload("invalid file size".into()))?;
    if file_name.trim().is_empty() {
        return Err(ChatError::InvalidUpload("missing file name".into()));
    }
    Ok(ClientLine::Upload {
        file_name: file_name.trim().to_string(),
        size,
    })
}
