//! Stream relay: forwards provider tokens to the client as frames.
//!
//! One streamed request moves through
//! `Open -> Streaming -> Completed [-> Evaluating -> Evaluated]` or ends in
//! `Errored`. Exactly one terminal frame is emitted, and content already
//! forwarded is never retracted.

use std::time::Duration;

use futures::Stream;
use personachat_core::{ChatError, ProviderError, ProviderId};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::evaluator::{correction_fragment, Evaluator};
use crate::providers::{BoxedStream, StreamChunk};
use crate::types::StreamFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Open,
    Streaming,
    Completed,
    Evaluating,
    Evaluated,
    Errored,
}

impl RelayState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_move_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Open, Streaming)
                | (Open, Errored)
                | (Streaming, Completed)
                | (Streaming, Errored)
                | (Completed, Evaluating)
                | (Evaluating, Evaluated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayState::Completed | RelayState::Evaluated | RelayState::Errored
        )
    }
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Provider whose stream is being relayed.
    pub provider: ProviderId,
    /// Longest wait for the next provider chunk.
    pub idle_timeout: Duration,
}

/// Deferred critique of the finished answer.
pub struct EvaluationJob {
    pub evaluator: Evaluator,
    pub user_message: String,
}

/// Tracks the relay state and notices when the client goes away mid-stream.
struct Tracker {
    state: RelayState,
    provider: ProviderId,
}

impl Tracker {
    fn move_to(&mut self, next: RelayState) {
        debug_assert!(
            self.state.can_move_to(next),
            "illegal relay transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(provider = %self.provider, "relay {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // A drop in a non-terminal state means the response body was dropped,
        // which axum does when the client disconnects.
        if matches!(
            self.state,
            RelayState::Open | RelayState::Streaming | RelayState::Evaluating
        ) {
            debug!(
                provider = %self.provider,
                state = ?self.state,
                "client disconnected, provider stream released"
            );
        }
    }
}

/// Relay `chunks` as frames, optionally running `evaluation` afterwards.
pub fn relay(
    chunks: BoxedStream,
    options: RelayOptions,
    evaluation: Option<EvaluationJob>,
) -> impl Stream<Item = StreamFrame> + Send + 'static {
    async_stream::stream! {
        let mut chunks = chunks;
        let mut tracker = Tracker {
            state: RelayState::Open,
            provider: options.provider,
        };
        let mut full_text = String::new();
        let mut forwarded = 0usize;

        tracker.move_to(RelayState::Streaming);

        loop {
            let next = match tokio::time::timeout(options.idle_timeout, chunks.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let e = ProviderError::timeout(
                        options.provider,
                        format!("No data for {:?}", options.idle_timeout),
                    );
                    warn!("Stream aborted after {} chunks: {}", forwarded, e);
                    tracker.move_to(RelayState::Errored);
                    yield StreamFrame::error(ChatError::from(e).user_message());
                    return;
                }
            };

            match next {
                Some(StreamChunk::Token(text)) => {
                    forwarded += 1;
                    full_text.push_str(&text);
                    yield StreamFrame::content(text);
                }
                Some(StreamChunk::Done) | None => break,
                Some(StreamChunk::Error(e)) => {
                    warn!("Stream aborted after {} chunks: {}", forwarded, e);
                    tracker.move_to(RelayState::Errored);
                    yield StreamFrame::error(ChatError::from(e).user_message());
                    return;
                }
            }
        }

        // Release the provider connection before any evaluation call.
        drop(chunks);

        if full_text.trim().is_empty() {
            let e = ProviderError::empty(options.provider);
            warn!("{}", e);
            tracker.move_to(RelayState::Errored);
            yield StreamFrame::error(ChatError::from(e).user_message());
            return;
        }

        tracker.move_to(RelayState::Completed);
        debug!(chunks = forwarded, chars = full_text.len(), "primary stream complete");

        if let Some(job) = evaluation {
            tracker.move_to(RelayState::Evaluating);
            let verdict = job.evaluator.evaluate(&job.user_message, &full_text).await;
            if let Some(fragment) = verdict.as_ref().and_then(correction_fragment) {
                yield StreamFrame::content(fragment);
            }
            tracker.move_to(RelayState::Evaluated);
        }

        yield StreamFrame::done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderAdapter;
    use crate::types::Prompt;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn options() -> RelayOptions {
        RelayOptions {
            provider: ProviderId::Gemini,
            idle_timeout: Duration::from_millis(200),
        }
    }

    fn scripted(chunks: Vec<StreamChunk>) -> BoxedStream {
        Box::pin(futures::stream::iter(chunks))
    }

    fn tokens(words: &[&str]) -> Vec<StreamChunk> {
        words.iter().map(|w| StreamChunk::Token(w.to_string())).collect()
    }

    struct Critic {
        reply: Result<String, ProviderError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for Critic {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAI
        }
        fn model(&self) -> &str {
            "critic"
        }
        fn server_credential(&self) -> Option<&str> {
            Some("k")
        }
        async fn complete_once(&self, prompt: &Prompt, _api_key: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.user.contains("Hello world"));
            self.reply.clone()
        }
        fn complete_streaming(&self, _prompt: &Prompt, _api_key: &str) -> BoxedStream {
            scripted(vec![StreamChunk::Done])
        }
    }

    fn job(reply: Result<String, ProviderError>) -> (EvaluationJob, Arc<Critic>) {
        let critic = Arc::new(Critic {
            reply,
            calls: AtomicUsize::new(0),
        });
        let job = EvaluationJob {
            evaluator: Evaluator::new(critic.clone(), "k", Duration::from_secs(1)),
            user_message: "Say hello".into(),
        };
        (job, critic)
    }

    #[test]
    fn test_state_machine_transitions() {
        use RelayState::*;
        assert!(Open.can_move_to(Streaming));
        assert!(Streaming.can_move_to(Completed));
        assert!(Completed.can_move_to(Evaluating));
        assert!(Evaluating.can_move_to(Evaluated));
        assert!(Streaming.can_move_to(Errored));
        assert!(!Completed.can_move_to(Streaming));
        assert!(!Evaluated.can_move_to(Streaming));
        assert!(!Errored.can_move_to(Streaming));
        assert!(!Evaluating.can_move_to(Errored));
    }

    #[tokio::test]
    async fn test_n_chunks_then_one_done() {
        let words = ["Hello", " ", "world", "!", " Bye"];
        let mut chunks = tokens(&words);
        chunks.push(StreamChunk::Done);

        let frames: Vec<StreamFrame> = relay(scripted(chunks), options(), None).collect().await;

        assert_eq!(frames.len(), words.len() + 1);
        for (frame, word) in frames.iter().zip(words.iter()) {
            assert_eq!(frame, &StreamFrame::content(*word));
        }
        assert_eq!(frames.last(), Some(&StreamFrame::done()));
    }

    #[tokio::test]
    async fn test_end_without_done_marker_still_terminates() {
        let frames: Vec<StreamFrame> =
            relay(scripted(tokens(&["a", "b"])), options(), None).collect().await;
        assert_eq!(
            frames,
            vec![StreamFrame::content("a"), StreamFrame::content("b"), StreamFrame::done()]
        );
    }

    #[tokio::test]
    async fn test_error_mid_stream_keeps_partial_and_ends_with_error() {
        let mut chunks = tokens(&["partial"]);
        chunks.push(StreamChunk::Error(ProviderError::network(ProviderId::Gemini, "reset")));
        chunks.push(StreamChunk::Token("never".into()));

        let frames: Vec<StreamFrame> = relay(scripted(chunks), options(), None).collect().await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::content("partial"));
        assert!(matches!(&frames[1], StreamFrame::Error { done: true, .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_error_frame_message() {
        let chunks = vec![StreamChunk::Error(ProviderError::classify(
            ProviderId::Gemini,
            429,
            "quota",
        ))];
        let frames: Vec<StreamFrame> = relay(scripted(chunks), options(), None).collect().await;
        match &frames[..] {
            [StreamFrame::Error { error, .. }] => assert!(error.contains("rate limit")),
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_error() {
        let frames: Vec<StreamFrame> =
            relay(scripted(vec![StreamChunk::Done]), options(), None).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_terminal());
        assert!(matches!(frames[0], StreamFrame::Error { .. }));
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_stream() {
        let stalled: BoxedStream = Box::pin(async_stream::stream! {
            yield StreamChunk::Token("first".into());
            tokio::time::sleep(Duration::from_secs(5)).await;
            yield StreamChunk::Token("late".into());
        });

        let frames: Vec<StreamFrame> = relay(stalled, options(), None).collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], StreamFrame::content("first"));
        match &frames[1] {
            StreamFrame::Error { error, .. } => assert!(error.contains("too long")),
            other => panic!("expected timeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_incorrect_verdict_appends_correction_before_done() {
        let (job, critic) = job(Ok(
            "VERDICT: INCORRECT\nEXPLANATION: Missing greeting.\nCORRECTED:\nHello there, world!".into(),
        ));
        let mut chunks = tokens(&["Hello", " world"]);
        chunks.push(StreamChunk::Done);

        let frames: Vec<StreamFrame> = relay(scripted(chunks), options(), Some(job)).collect().await;

        assert_eq!(critic.calls.load(Ordering::SeqCst), 1);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0], StreamFrame::content("Hello"));
        assert_eq!(frames[1], StreamFrame::content(" world"));
        match &frames[2] {
            StreamFrame::Content { content } => {
                assert!(content.contains("**Correction:** Missing greeting."));
                assert!(content.ends_with("Hello there, world!"));
            }
            other => panic!("expected correction, got {:?}", other),
        }
        assert_eq!(frames[3], StreamFrame::done());
    }

    #[tokio::test]
    async fn test_correct_verdict_adds_nothing() {
        let (job, _) = job(Ok("VERDICT: CORRECT\nEXPLANATION: fine".into()));
        let frames: Vec<StreamFrame> =
            relay(scripted(tokens(&["Hello world"])), options(), Some(job)).collect().await;
        assert_eq!(
            frames,
            vec![StreamFrame::content("Hello world"), StreamFrame::done()]
        );
    }

    #[tokio::test]
    async fn test_failed_evaluation_matches_plain_path() {
        let plain: Vec<StreamFrame> =
            relay(scripted(tokens(&["Hello", " world"])), options(), None).collect().await;

        let (job, critic) = job(Err(ProviderError::network(ProviderId::OpenAI, "down")));
        let evaluated: Vec<StreamFrame> =
            relay(scripted(tokens(&["Hello", " world"])), options(), Some(job)).collect().await;

        assert_eq!(critic.calls.load(Ordering::SeqCst), 1);
        assert_eq!(plain, evaluated);
    }

    #[tokio::test]
    async fn test_errored_stream_skips_evaluation() {
        let (job, critic) = job(Ok("VERDICT: INCORRECT".into()));
        let chunks = vec![
            StreamChunk::Token("Hello world".into()),
            StreamChunk::Error(ProviderError::network(ProviderId::Gemini, "reset")),
        ];
        let frames: Vec<StreamFrame> = relay(scripted(chunks), options(), Some(job)).collect().await;

        assert_eq!(critic.calls.load(Ordering::SeqCst), 0);
        assert_eq!(frames.len(), 2);
    }
}
