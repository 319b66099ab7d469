//! Placement progress callbacks

use tokio::sync::mpsc;

use super::report::BatchReport;
use super::request::PlacedObjectRecord;
use crate::core::Error;

/// Receives placement events as a batch runs. All methods default to no-ops.
pub trait PlacementObserver {
    fn on_progress(&mut self, _placed: usize, _total: usize) {}

    fn on_object_placed(&mut self, _record: &PlacedObjectRecord) {}

    fn on_placement_failed(&mut self, _object_type: &str, _error: &Error) {}

    fn on_batch_complete(&mut self, _records: &[PlacedObjectRecord], _report: &BatchReport) {}
}

impl PlacementObserver for () {}

/// Event forwarded by [`ChannelObserver`]
#[derive(Clone, Debug)]
pub enum PlacementEvent {
    Progress { placed: usize, total: usize },
    Placed(PlacedObjectRecord),
    Failed { object_type: String, reason: String },
    BatchComplete(BatchReport),
}

/// Forwards events over an unbounded tokio channel
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PlacementEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<PlacementEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlacementEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PlacementEvent) {
        // Receiver may have been dropped; placement carries on regardless
        let _ = self.tx.send(event);
    }
}

impl PlacementObserver for ChannelObserver {
    fn on_progress(&mut self, placed: usize, total: usize) {
        self.send(PlacementEvent::Progress { placed, total });
    }

    fn on_object_placed(&mut self, record: &PlacedObjectRecord) {
        self.send(PlacementEvent::Placed(record.clone()));
    }

    fn on_placement_failed(&mut self, object_type: &str, error: &Error) {
        self.send(PlacementEvent::Failed {
            object_type: object_type.to_string(),
            reason: error.to_string(),
        });
    }

    fn on_batch_complete(&mut self, _records: &[PlacedObjectRecord], report: &BatchReport) {
        self.send(PlacementEvent::BatchComplete(report.clone()));
    }
}
