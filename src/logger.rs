use std::time::Instant;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::RowValues;

/// One structured key/value pair of a log event.
pub type LogField = (&'static str, JsonValue);

/// Failure reported by a [`Logger`]. Never surfaced to database callers.
#[derive(Debug, Error)]
#[error("logger error: {0}")]
pub struct LogError(pub String);

/// Sink for per-operation timing events.
///
/// Each `exec`/`query`/`query_row` call produces exactly one event carrying
/// `op`, `query`, `args`, `duration_us` and `ok`.
pub trait Logger: Send + Sync {
    /// # Errors
    /// Implementations may fail; the caller ignores the failure.
    fn log(&self, fields: &[LogField]) -> Result<(), LogError>;
}

/// Forwards events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, fields: &[LogField]) -> Result<(), LogError> {
        let rendered = serde_json::to_string(&fields_to_object(fields))
            .map_err(|e| LogError(e.to_string()))?;
        tracing::debug!(target: "sql_handle::db", event = %rendered);
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _fields: &[LogField]) -> Result<(), LogError> {
        Ok(())
    }
}

/// Collapse a field list into a JSON object (later keys win).
#[must_use]
pub fn fields_to_object(fields: &[LogField]) -> JsonValue {
    let map = fields
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect::<serde_json::Map<_, _>>();
    JsonValue::Object(map)
}

/// Emits one timing event when dropped, whatever path the operation took.
pub(crate) struct OpTimer<'a> {
    logger: &'a dyn Logger,
    op: &'static str,
    query: &'a str,
    args: &'a [RowValues],
    started: Instant,
    ok: bool,
}

impl<'a> OpTimer<'a> {
    pub(crate) fn start(
        logger: &'a dyn Logger,
        op: &'static str,
        query: &'a str,
        args: &'a [RowValues],
    ) -> Self {
        Self {
            logger,
            op,
            query,
            args,
            started: Instant::now(),
            ok: false,
        }
    }

    /// Record the outcome reported in the event.
    pub(crate) fn finish<T, E>(&mut self, outcome: &Result<T, E>) {
        self.ok = outcome.is_ok();
    }
}

impl Drop for OpTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let args = self
            .args
            .iter()
            .map(RowValues::to_log_value)
            .collect::<Vec<_>>();
        let fields = [
            ("op", JsonValue::from(self.op)),
            ("query", JsonValue::from(self.query)),
            ("args", JsonValue::Array(args)),
            (
                "duration_us",
                JsonValue::from(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)),
            ),
            ("ok", JsonValue::from(self.ok)),
        ];
        if let Err(err) = self.logger.log(&fields) {
            tracing::trace!(op = self.op, error = %err, "logger rejected event");
        }
    }
}
