//! CLI channel — line-based console REPL.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::channels::Channel;
use crate::error::ChannelError;

/// Reads user lines from `R` and writes coach replies to `W`.
pub struct CliChannel<R, W> {
    reader: R,
    writer: W,
    prompt: String,
}

impl CliChannel<BufReader<Stdin>, Stdout> {
    /// Channel bound to the process stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> CliChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            prompt: "You: ".to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Consume the channel and return the writer (for inspecting output).
    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn write(&mut self, text: &str) -> Result<(), ChannelError> {
        self.writer
            .write_all(text.as_bytes())
            .await
            .map_err(|e| send_failed(&e))?;
        self.writer.flush().await.map_err(|e| send_failed(&e))
    }
}

fn send_failed(e: &std::io::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "cli".to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl<R, W> Channel for CliChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "cli"
    }

    async fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let prompt = self.prompt.clone();
        self.write(&prompt).await?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ChannelError::ReadFailed {
                name: "cli".to_string(),
                reason: e.to_string(),
            })?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn respond(&mut self, content: &str) -> Result<(), ChannelError> {
        self.write(&format!("\nCoach: {content}\n\n")).await
    }

    async fn notice(&mut self, content: &str) -> Result<(), ChannelError> {
        self.write(&format!("{content}\n")).await
    }
}
