//! Gateway trait: the abstraction over the language-model backend.
//!
//! A gateway turns an ordered list of turns into a completion, either in one
//! piece or as a finite stream of text fragments.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::message::Turn;

/// Receiving end of a streamed completion.
///
/// Yields fragments in arrival order and ends when the sender is dropped.
/// An `Err` item means the stream broke mid-way.
pub type FragmentStream = mpsc::Receiver<std::result::Result<String, GatewayError>>;

/// The core Gateway trait.
///
/// Agents call `complete()` or `complete_streaming()` without knowing which
/// backend is behind it.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// A human-readable name for this backend (e.g., "glm", "openai").
    fn name(&self) -> &str;

    /// The model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send the turns and wait for the full completion text.
    async fn complete(
        &self,
        turns: &[Turn],
        temperature: f32,
    ) -> std::result::Result<String, GatewayError>;

    /// Send the turns and receive the completion incrementally.
    ///
    /// Default implementation calls `complete()` and delivers the result as a
    /// single fragment.
    async fn complete_streaming(
        &self,
        turns: &[Turn],
        temperature: f32,
    ) -> std::result::Result<FragmentStream, GatewayError> {
        let text = self.complete(turns, temperature).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(text)).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGateway;

    #[async_trait]
    impl Gateway for FixedGateway {
        fn name(&self) -> &str { "fixed" }
        fn model(&self) -> &str { "fixed-1" }
        async fn complete(
            &self,
            turns: &[Turn],
            _t: f32,
        ) -> std::result::Result<String, GatewayError> {
            Ok(format!("{} turns", turns.len()))
        }
    }

    #[tokio::test]
    async fn default_streaming_yields_one_fragment() {
        let gateway = FixedGateway;
        let mut rx = gateway
            .complete_streaming(&[Turn::user("a"), Turn::user("b")], 0.2)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap(), "2 turns");
        assert!(rx.recv().await.is_none());
    }
}
