use std::sync::{Mutex, PoisonError};

use serde_json::Value as JsonValue;

use crate::logger::{LogError, LogField, Logger, fields_to_object};

/// Keeps every event as a JSON object. Optionally reports failure after recording.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<JsonValue>>,
    fail: bool,
}

impl RecordingLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events but returns an error from every `log` call.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    #[must_use]
    pub fn events(&self) -> Vec<JsonValue> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(op, query)` of each event, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<(String, String)> {
        self.events()
            .iter()
            .map(|event| {
                (
                    event["op"].as_str().unwrap_or_default().to_owned(),
                    event["query"].as_str().unwrap_or_default().to_owned(),
                )
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, fields: &[LogField]) -> Result<(), LogError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fields_to_object(fields));
        if self.fail {
            Err(LogError("recording logger configured to fail".into()))
        } else {
            Ok(())
        }
    }
}
