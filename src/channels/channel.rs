//! The `Channel` trait — how a coach talks to the person on the other end.

use async_trait::async_trait;

use crate::error::ChannelError;

/// A turn-based text channel.
#[async_trait]
pub trait Channel: Send {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Read the next user line. `None` at end of input.
    async fn read_line(&mut self) -> Result<Option<String>, ChannelError>;

    /// Send a coach reply.
    async fn respond(&mut self, content: &str) -> Result<(), ChannelError>;

    /// Send out-of-band text such as a final summary.
    async fn notice(&mut self, content: &str) -> Result<(), ChannelError>;
}
