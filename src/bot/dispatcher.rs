//! Reply dispatcher
//!
//! Delivers a parsed [`ModelResponse`] back into the chat it answers.

use crate::chat::ChatMessage;
use crate::response::ModelResponse;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Error returned by a [`ChatSink`]
#[derive(Debug, Error)]
pub enum SendError {
    /// Telegram rejected the request
    #[error("Telegram error: {0}")]
    Telegram(String),
}

/// Where replies to a message go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: i64,
    /// Forum topic, if the message was posted in one
    pub thread_id: Option<i32>,
}

impl From<&ChatMessage> for ReplyTarget {
    fn from(message: &ChatMessage) -> Self {
        Self {
            chat_id: message.chat.id,
            thread_id: message.thread_id,
        }
    }
}

/// Outbound text channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post `text` to `target`, threaded under `reply_to` if given.
    async fn send_text(
        &self,
        target: ReplyTarget,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), SendError>;
}

/// Sends model answers as chat messages
#[derive(Clone)]
pub struct ReplyDispatcher {
    sink: Arc<dyn ChatSink>,
}

impl ReplyDispatcher {
    #[must_use]
    pub fn new(sink: Arc<dyn ChatSink>) -> Self {
        Self { sink }
    }

    /// Send every answer of `response` to the chat of `message`, in order.
    ///
    /// Returns the number of messages actually sent. A failed send is logged
    /// and the remaining answers are still attempted.
    pub async fn dispatch(&self, message: &ChatMessage, response: &ModelResponse) -> usize {
        if response.skip {
            debug!(message_id = message.message_id, "Model skipped the turn");
            return 0;
        }

        let answers = match response.answers.as_deref() {
            Some(answers) if !answers.is_empty() => answers,
            _ => {
                warn!("Key \"answers\" is empty");
                return 0;
            }
        };

        let target = ReplyTarget::from(message);
        let mut sent = 0;
        for answer in answers {
            match self.sink.send_text(target, &answer.text, answer.reply_to).await {
                Ok(()) => sent += 1,
                Err(e) => error!(
                    chat_id = target.chat_id,
                    reply_to = ?answer.reply_to,
                    "Failed to send answer: {e}"
                ),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatInfo;
    use crate::response::ModelAnswer;
    use chrono::{DateTime, Utc};
    use mockall::predicate::eq;
    use std::io;
    use std::sync::Mutex as StdMutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the test and the subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<StdMutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            self.0
                .lock()
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut inner) = self.0.lock() {
                inner.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn message() -> ChatMessage {
        let mut message = ChatMessage::new(10, ChatInfo::new(-500, "supergroup"), DateTime::<Utc>::UNIX_EPOCH);
        message.thread_id = Some(3);
        message
    }

    fn answer(text: &str, reply_to: Option<i32>) -> ModelAnswer {
        ModelAnswer {
            reply_to,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn skip_and_empty_answers_send_nothing() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text().never();
        let dispatcher = ReplyDispatcher::new(Arc::new(sink));

        let skip = ModelResponse {
            answers: Some(vec![answer("ignored", None)]),
            skip: true,
        };
        assert_eq!(dispatcher.dispatch(&message(), &skip).await, 0);

        let empty = ModelResponse {
            answers: Some(Vec::new()),
            skip: false,
        };
        assert_eq!(dispatcher.dispatch(&message(), &empty).await, 0);
        assert_eq!(dispatcher.dispatch(&message(), &ModelResponse::default()).await, 0);
    }

    #[tokio::test]
    async fn missing_answers_are_reported_but_skip_is_silent() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text().never();
        let dispatcher = ReplyDispatcher::new(Arc::new(sink));

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let skip = ModelResponse {
            answers: None,
            skip: true,
        };
        dispatcher.dispatch(&message(), &skip).await;
        assert!(logs.contents().is_empty());

        let empty = ModelResponse {
            answers: Some(Vec::new()),
            skip: false,
        };
        dispatcher.dispatch(&message(), &empty).await;
        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains(r#"Key "answers" is empty"#));
    }

    #[tokio::test]
    async fn answers_are_sent_in_order_to_the_original_thread() {
        let target = ReplyTarget {
            chat_id: -500,
            thread_id: Some(3),
        };
        let mut sink = MockChatSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_send_text()
            .with(eq(target), eq("first"), eq(Some(10)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        sink.expect_send_text()
            .with(eq(target), eq("second"), eq(None))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        let dispatcher = ReplyDispatcher::new(Arc::new(sink));

        let response = ModelResponse {
            answers: Some(vec![answer("first", Some(10)), answer("second", None)]),
            skip: false,
        };
        assert_eq!(dispatcher.dispatch(&message(), &response).await, 2);
    }

    #[tokio::test]
    async fn failed_send_does_not_stop_the_rest() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text()
            .with(eq(ReplyTarget::from(&message())), eq("broken"), eq(Some(999)))
            .returning(|_, _, _| Err(SendError::Telegram("message to reply not found".to_string())));
        sink.expect_send_text()
            .with(eq(ReplyTarget::from(&message())), eq("fine"), eq(None))
            .returning(|_, _, _| Ok(()));
        let dispatcher = ReplyDispatcher::new(Arc::new(sink));

        let response = ModelResponse {
            answers: Some(vec![answer("broken", Some(999)), answer("fine", None)]),
            skip: false,
        };
        assert_eq!(dispatcher.dispatch(&message(), &response).await, 1);
    }
}
