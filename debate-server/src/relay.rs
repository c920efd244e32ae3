//! Translates an upstream fragment stream into debate stream events.
//!
//! Every relay produces zero or more `Content` events followed by exactly one
//! terminal event (`Done` or `Error`). Failures from the upstream, whether
//! before the first fragment or mid-stream, are turned into the terminal
//! `Error` event and never escape the relay task.

use debate_shared::{ChatMessage, StreamEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::llm::ChatCompletion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    NotStarted,
    Streaming,
    Done,
}

/// Sending half of a relay. Refuses to emit anything after the terminal event.
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
    state: RelayState,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx,
            state: RelayState::NotStarted,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Forward one fragment. Returns `false` once the receiver is gone or the
    /// stream has already ended, which tells the caller to stop reading upstream.
    pub fn content(&mut self, fragment: String) -> bool {
        if self.state == RelayState::Done {
            return false;
        }
        self.state = RelayState::Streaming;
        if self.tx.send(StreamEvent::Content(fragment)).is_err() {
            self.state = RelayState::Done;
            return false;
        }
        true
    }

    pub fn complete(&mut self) {
        self.finish(StreamEvent::Done);
    }

    pub fn fail(&mut self, error: &ServiceError) {
        self.finish(StreamEvent::Error(error.to_string()));
    }

    fn finish(&mut self, event: StreamEvent) {
        if self.state == RelayState::Done {
            return;
        }
        self.state = RelayState::Done;
        let _ = self.tx.send(event);
    }
}

#[derive(Clone)]
pub struct Relay {
    upstream: Arc<dyn ChatCompletion>,
    idle_timeout: Duration,
}

impl Relay {
    pub fn new(upstream: Arc<dyn ChatCompletion>, idle_timeout: Duration) -> Self {
        Self {
            upstream,
            idle_timeout,
        }
    }

    pub fn upstream(&self) -> &Arc<dyn ChatCompletion> {
        &self.upstream
    }

    /// Spawn a relay task and hand back the event receiver. Dropping the
    /// receiver stops the task and drops the upstream stream with it.
    pub fn start(
        &self,
        messages: Vec<ChatMessage>,
        model: String,
        temperature: f32,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = self.clone();
        tokio::spawn(async move {
            let mut sink = EventSink::new(tx);
            relay.run(messages, &model, temperature, &mut sink).await;
        });
        rx
    }

    /// A stream that ends immediately with `error`, for requests refused
    /// before any upstream work.
    pub fn reject(error: ServiceError) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        warn!("Debate stream rejected: {}", error);
        EventSink::new(tx).fail(&error);
        rx
    }

    pub async fn run(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
        sink: &mut EventSink,
    ) {
        if let Err(e) = self.upstream.preflight() {
            warn!("Debate stream not started: {}", e);
            sink.fail(&e);
            return;
        }

        info!("Streaming {} messages through {}", messages.len(), model);
        let mut fragments = match self.upstream.stream(messages, model, temperature).await {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!("Failed to open upstream stream: {}", e);
                sink.fail(&e);
                return;
            }
        };

        let mut forwarded = 0usize;
        loop {
            let next = match tokio::time::timeout(self.idle_timeout, fragments.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!("Upstream went quiet for {:?}", self.idle_timeout);
                    sink.fail(&ServiceError::Timeout(self.idle_timeout));
                    return;
                }
            };

            match next {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if !sink.content(fragment) {
                        debug!("Client went away after {} fragments", forwarded);
                        return;
                    }
                    forwarded += 1;
                }
                Some(Err(e)) => {
                    warn!("Upstream failed after {} fragments: {}", forwarded, e);
                    sink.fail(&e);
                    return;
                }
                None => {
                    debug!("Upstream finished after {} fragments", forwarded);
                    sink.complete();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FragmentStream;
    use async_trait::async_trait;
    use debate_shared::MessageRole;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    enum Step {
        Fragment(&'static str),
        Fail(&'static str),
    }

    struct ScriptedUpstream {
        configured: bool,
        script: Vec<&'static str>,
        fail_after: Option<&'static str>,
        stream_calls: AtomicUsize,
    }

    impl ScriptedUpstream {
        fn new(script: Vec<&'static str>) -> Self {
            Self {
                configured: true,
                script,
                fail_after: None,
                stream_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedUpstream {
        fn preflight(&self) -> Result<(), ServiceError> {
            if self.configured {
                Ok(())
            } else {
                Err(ServiceError::Configuration(
                    "DeepSeek API key not configured".into(),
                ))
            }
        }

        async fn stream(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<FragmentStream, ServiceError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            let mut steps: Vec<Step> = self.script.iter().map(|f| Step::Fragment(*f)).collect();
            if let Some(message) = self.fail_after {
                steps.push(Step::Fail(message));
                // Anything after a failure must never be relayed.
                steps.push(Step::Fragment("unreachable"));
            }
            let items = steps.into_iter().map(|step| match step {
                Step::Fragment(f) => Ok(f.to_string()),
                Step::Fail(m) => Err(ServiceError::Transport(m.to_string())),
            });
            Ok(Box::pin(stream::iter(items)))
        }

        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ServiceError> {
            Ok(self.script.concat())
        }
    }

    fn prompt() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: MessageRole::User,
            content: "Argue for the motion.".to_string(),
        }]
    }

    async fn collect(upstream: Arc<dyn ChatCompletion>) -> Vec<StreamEvent> {
        let relay = Relay::new(upstream, Duration::from_secs(5));
        let mut rx = relay.start(prompt(), "deepseek-chat".into(), 0.7);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn assert_well_formed(events: &[StreamEvent]) {
        let (last, body) = events.split_last().expect("at least one event");
        assert!(last.is_terminal());
        assert!(body.iter().all(|e| !e.is_terminal()));
    }

    #[tokio::test]
    async fn test_fragments_then_done() {
        let events = collect(Arc::new(ScriptedUpstream::new(vec!["A", "B"]))).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("A".into()),
                StreamEvent::Content("B".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_fragments_are_skipped_in_order() {
        let upstream = ScriptedUpstream::new(vec!["", "The ", "", "motion ", "fails", ""]);
        let events = collect(Arc::new(upstream)).await;
        assert_well_formed(&events);

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "The motion fails");
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_upstream_is_just_done() {
        let events = collect(Arc::new(ScriptedUpstream::new(vec![]))).await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_missing_credential_never_calls_upstream() {
        let upstream = Arc::new(ScriptedUpstream {
            configured: false,
            ..ScriptedUpstream::new(vec!["A"])
        });
        let events = collect(upstream.clone()).await;
        assert_eq!(
            events,
            vec![StreamEvent::Error("DeepSeek API key not configured".into())]
        );
        assert_eq!(upstream.stream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_prior_fragments() {
        let upstream = ScriptedUpstream {
            fail_after: Some("connection reset"),
            ..ScriptedUpstream::new(vec!["First", "Second"])
        };
        let events = collect(Arc::new(upstream)).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("First".into()),
                StreamEvent::Content("Second".into()),
                StreamEvent::Error("connection reset".into()),
            ]
        );
    }

    struct OpenFailure;

    #[async_trait]
    impl ChatCompletion for OpenFailure {
        async fn stream(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<FragmentStream, ServiceError> {
            Err(ServiceError::Transport("401 Unauthorized".into()))
        }

        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ServiceError> {
            Err(ServiceError::Transport("401 Unauthorized".into()))
        }
    }

    #[tokio::test]
    async fn test_open_failure_is_terminal_error() {
        let events = collect(Arc::new(OpenFailure)).await;
        assert_eq!(events, vec![StreamEvent::Error("401 Unauthorized".into())]);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Produces fragments forever, flagging when the stream itself is dropped.
    struct EndlessUpstream {
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ChatCompletion for EndlessUpstream {
        async fn stream(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<FragmentStream, ServiceError> {
            let guard = DropFlag(self.dropped.clone());
            let fragments = stream::unfold(guard, |guard| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Some((Ok::<_, ServiceError>("tick".to_string()), guard))
            });
            Ok(Box::pin(fragments))
        }

        async fn generate(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, ServiceError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_client_disconnect_drops_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let upstream = Arc::new(EndlessUpstream {
            dropped: dropped.clone(),
        });
        let relay = Relay::new(upstream, Duration::from_secs(5));
        let mut rx = relay.start(prompt(), "deepseek-chat".into(), 0.7);

        assert_eq!(rx.recv().await, Some(StreamEvent::Content("tick".into())));
        drop(rx);

        for _ in 0..200 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_idle_upstream_times_out() {
        struct Silent;

        #[async_trait]
        impl ChatCompletion for Silent {
            async fn stream(
                &self,
                _messages: Vec<ChatMessage>,
                _model: &str,
                _temperature: f32,
            ) -> Result<FragmentStream, ServiceError> {
                Ok(Box::pin(stream::pending::<Result<String, ServiceError>>()))
            }

            async fn generate(
                &self,
                _messages: Vec<ChatMessage>,
                _model: &str,
                _temperature: f32,
            ) -> Result<String, ServiceError> {
                Ok(String::new())
            }
        }

        let relay = Relay::new(Arc::new(Silent), Duration::from_millis(20));
        let mut rx = relay.start(prompt(), "deepseek-chat".into(), 0.7);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_rejected_stream_is_single_error_event() {
        let mut rx = Relay::reject(ServiceError::InvalidRequest(
            "messages must not be empty".into(),
        ));
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Error("messages must not be empty".into()))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_sink_refuses_events_after_terminal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = EventSink::new(tx);
        assert_eq!(sink.state(), RelayState::NotStarted);

        assert!(sink.content("one".into()));
        assert_eq!(sink.state(), RelayState::Streaming);

        sink.complete();
        sink.fail(&ServiceError::Transport("late".into()));
        assert!(!sink.content("two".into()));
        assert_eq!(sink.state(), RelayState::Done);
        drop(sink);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![StreamEvent::Content("one".into()), StreamEvent::Done]
        );
    }
}
