//! Host-side message channel.
//!
//! The sandboxed execution context posts batches of structured messages
//! back to the host (`{ method, arguments, source? }`). The dispatcher
//! owns a process-wide subscription with an explicit lifecycle —
//! established once when the preview surface initializes, torn down
//! when it goes away — and queues incoming events for the console
//! consumer.
//!
//! One message pattern is not a log entry: a loop-guard trip carries a
//! fixed phrase in its arguments and must be surfaced as a control
//! signal (stop playback, expand the console) no matter how the batch
//! is shaped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

/// Fixed phrase the loop-guard runtime embeds in its trip report.
pub const LOOP_TRIP_PHRASE: &str = "Exiting potential infinite loop";

/// One message from the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessage {
    pub method: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ConsoleMessage {
    pub fn error(text: &str, source: Option<&str>) -> Self {
        Self {
            method: "error".to_string(),
            arguments: Value::String(text.to_string()),
            source: source.map(str::to_string),
        }
    }
}

/// Cross-cutting signals extracted from a batch, handled by the host
/// outside the normal console flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The loop guard interrupted a runaway loop.
    LoopTripped,
}

/// Scan a batch for control signals. The trip phrase is searched in
/// every string reachable from each message's arguments, whatever the
/// arguments' shape.
pub fn detect_control_signal(batch: &[ConsoleMessage]) -> Option<ControlSignal> {
    for message in batch {
        if value_contains_phrase(&message.arguments, LOOP_TRIP_PHRASE) {
            return Some(ControlSignal::LoopTripped);
        }
    }
    None
}

fn value_contains_phrase(value: &Value, phrase: &str) -> bool {
    match value {
        Value::String(s) => s.contains(phrase),
        Value::Array(items) => items.iter().any(|v| value_contains_phrase(v, phrase)),
        Value::Object(map) => map.values().any(|v| value_contains_phrase(v, phrase)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    AlreadySubscribed,
    NotSubscribed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySubscribed => write!(f, "message channel is already subscribed"),
            Self::NotSubscribed => write!(f, "message channel is not subscribed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Queue-backed dispatcher between the execution surface and the
/// console consumer. Exactly one subscription may be live at a time.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    subscribed: bool,
    queue: VecDeque<ConsoleMessage>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Result<(), ChannelError> {
        if self.subscribed {
            return Err(ChannelError::AlreadySubscribed);
        }
        self.subscribed = true;
        Ok(())
    }

    pub fn teardown(&mut self) -> Result<(), ChannelError> {
        if !self.subscribed {
            return Err(ChannelError::NotSubscribed);
        }
        self.subscribed = false;
        self.queue.clear();
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Enqueue a batch and report any control signal it carried.
    /// Batches arriving without a live subscription are dropped.
    pub fn push_batch(&mut self, batch: Vec<ConsoleMessage>) -> Option<ControlSignal> {
        if !self.subscribed {
            return None;
        }
        let signal = detect_control_signal(&batch);
        self.queue.extend(batch);
        signal
    }

    /// Hand every queued message to the console consumer.
    pub fn drain(&mut self) -> Vec<ConsoleMessage> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let message = ConsoleMessage::error("boom (sketch: line 3)", Some("sketch"));
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(
            wire,
            json!({
                "method": "error",
                "arguments": "boom (sketch: line 3)",
                "source": "sketch"
            })
        );

        let message = ConsoleMessage::error("boom", None);
        let wire = serde_json::to_value(&message).unwrap();
        assert!(wire.get("source").is_none());
    }

    #[test]
    fn test_loop_trip_detected_in_nested_arguments() {
        let batch = vec![ConsoleMessage {
            method: "log".to_string(),
            arguments: json!(["Exiting potential infinite loop at line 5"]),
            source: None,
        }];
        assert_eq!(detect_control_signal(&batch), Some(ControlSignal::LoopTripped));

        let batch = vec![ConsoleMessage {
            method: "log".to_string(),
            arguments: json!({"0": "all fine"}),
            source: None,
        }];
        assert_eq!(detect_control_signal(&batch), None);
    }

    #[test]
    fn test_subscription_lifecycle() {
        let mut dispatcher = MessageDispatcher::new();
        assert!(!dispatcher.is_subscribed());
        dispatcher.subscribe().unwrap();
        assert_eq!(dispatcher.subscribe(), Err(ChannelError::AlreadySubscribed));
        dispatcher.teardown().unwrap();
        assert_eq!(dispatcher.teardown(), Err(ChannelError::NotSubscribed));
    }

    #[test]
    fn test_batches_queue_and_drain() {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.subscribe().unwrap();
        let signal = dispatcher.push_batch(vec![
            ConsoleMessage::error("boom", None),
            ConsoleMessage {
                method: "log".to_string(),
                arguments: serde_json::json!("Exiting potential infinite loop"),
                source: None,
            },
        ]);
        assert_eq!(signal, Some(ControlSignal::LoopTripped));
        let drained = dispatcher.drain();
        assert_eq!(drained.len(), 2);
        assert!(dispatcher.drain().is_empty());
    }

    #[test]
    fn test_unsubscribed_batches_dropped() {
        let mut dispatcher = MessageDispatcher::new();
        assert_eq!(dispatcher.push_batch(vec![ConsoleMessage::error("x", None)]), None);
        dispatcher.subscribe().unwrap();
        assert!(dispatcher.drain().is_empty());
    }
}
