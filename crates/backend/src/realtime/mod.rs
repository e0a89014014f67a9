//! Server side of the realtime channel: topic fan-out and presence state.

mod hub;

use api_types::{ChangeEvent, ChangeTable, Topic};
use serde::Serialize;

pub use hub::RealtimeHub;

/// Receiver of row-change events produced by the services.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, topic: Topic, event: ChangeEvent);
}

/// Row serialisation for change events. Publishing is best-effort, so a row
/// that fails to serialise is logged and dropped.
pub(crate) fn row_value<T: Serialize>(table: ChangeTable, row: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(row) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(?error, ?table, "failed to serialise row for change event");
            None
        }
    }
}

pub(crate) fn publish_insert<T: Serialize>(
    sink: &dyn ChangeSink,
    topic: Topic,
    table: ChangeTable,
    row: &T,
) {
    if let Some(new) = row_value(table, row) {
        sink.publish(topic, ChangeEvent::insert(table, new));
    }
}

pub(crate) fn publish_update<T: Serialize>(
    sink: &dyn ChangeSink,
    topic: Topic,
    table: ChangeTable,
    row: &T,
    old: Option<&T>,
) {
    if let Some(new) = row_value(table, row) {
        let old = old.and_then(|old| row_value(table, old));
        sink.publish(topic, ChangeEvent::update(table, new, old));
    }
}

pub(crate) fn publish_delete<T: Serialize>(
    sink: &dyn ChangeSink,
    topic: Topic,
    table: ChangeTable,
    row: &T,
) {
    if let Some(old) = row_value(table, row) {
        sink.publish(topic, ChangeEvent::delete(table, old));
    }
}
