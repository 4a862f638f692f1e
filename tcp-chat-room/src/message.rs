use std::{fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Written once to every new connection, without a trailing newline.
pub const LOGIN_PROMPT: &str = "Please enter your username: ";

/// Longest accepted line in bytes, terminator included.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Sender tag used for join and leave announcements.
pub const SYSTEM_SENDER: &str = "System";

/// One line of chat, routed by the coordinator to every participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub body: String,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }

    pub fn system(body: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, body)
    }

    pub fn joined(name: &str) -> Self {
        Self::system(format!("*{name} joined*"))
    }

    pub fn left(name: &str) -> Self {
        Self::system(format!("*{name} left*"))
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.body)
    }
}

/// Reads one line and strips its terminator (`\n`, then a single `\r`).
///
/// Returns `Ok(None)` once the peer has closed its side and nothing is left
/// to read. A final line without a terminator is still returned. A line
/// longer than [`MAX_LINE_LENGTH`] fails with `InvalidData`.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_line(&mut line)
        .await?;
    if bytes == 0 {
        return Ok(None);
    }
    if bytes == MAX_LINE_LENGTH && !line.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_LENGTH} bytes"),
        ));
    }

    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}

/// Writes `<sender>: <body>\n` and flushes so peers see it immediately.
pub async fn write_message<W>(writer: &mut W, message: &ChatMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = format!("{message}\n");
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await
}

pub async fn write_prompt<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(LOGIN_PROMPT.as_bytes()).await?;
    writer.flush().await
}
