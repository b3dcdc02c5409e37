//! Step and document transition broadcasting.
//!
//! Every store write the pipeline makes is followed by an event on this
//! channel, so push clients observe the same ordered transition sequence
//! polling clients can read back from the store.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::{DocumentId, DocumentStatus, StepName, StepStatus};

/// One observable pipeline transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Step {
        document_id: DocumentId,
        step: StepName,
        status: StepStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Document {
        document_id: DocumentId,
        status: DocumentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        record_count: Option<i64>,
    },
}

/// Broadcast channel for progress events. Senders never block; events
/// are dropped for receivers that fall too far behind.
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn step(
        &self,
        document_id: DocumentId,
        step: StepName,
        status: StepStatus,
        error: Option<&str>,
    ) {
        self.publish(ProgressEvent::Step {
            document_id,
            step,
            status,
            error: error.map(String::from),
        });
    }

    pub fn document(
        &self,
        document_id: DocumentId,
        status: DocumentStatus,
        error: Option<&str>,
        record_count: Option<i64>,
    ) {
        self.publish(ProgressEvent::Document {
            document_id,
            status,
            error: error.map(String::from),
            record_count,
        });
    }

    fn publish(&self, event: ProgressEvent) {
        // A send error just means nobody is listening right now.
        if self.tx.send(event).is_err() {
            debug!("No progress subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let channel = ProgressChannel::new(16);
        let mut rx = channel.subscribe();

        channel.step(1, StepName::TextExtract, StepStatus::Processing, None);
        channel.step(1, StepName::TextExtract, StepStatus::Completed, None);
        channel.document(1, DocumentStatus::Completed, None, Some(20));

        match rx.recv().await.unwrap() {
            ProgressEvent::Step { step, status, .. } => {
                assert_eq!(step, StepName::TextExtract);
                assert_eq!(status, StepStatus::Processing);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Step {
                status: StepStatus::Completed,
                ..
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::Document {
                record_count: Some(20),
                ..
            }
        ));
    }

    #[test]
    fn publishing_without_subscribers_does_not_panic() {
        let channel = ProgressChannel::new(4);
        channel.document(1, DocumentStatus::Error, Some("boom"), None);
    }
}
