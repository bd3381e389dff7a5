use crate::audio::PlaybackReport;
use crate::integration::orchestrator::OrchestratorCommand;
use crate::stream::PresentationEvent;
use crate::transport::Inbound;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Every channel the driver loop selects over, plus the presentation feed
pub struct CompanionChannels {
    pub command_tx: Sender<OrchestratorCommand>,
    pub command_rx: Receiver<OrchestratorCommand>,
    pub inbound_tx: Sender<Inbound>,
    pub inbound_rx: Receiver<Inbound>,
    /// Unbounded: a completion can be resolved on the driver thread itself
    pub report_tx: Sender<PlaybackReport>,
    pub report_rx: Receiver<PlaybackReport>,
    /// Unbounded: state events are never dropped, amplitude is thinned at the source
    pub presentation_tx: Sender<PresentationEvent>,
    pub presentation_rx: Receiver<PresentationEvent>,
}

impl CompanionChannels {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (command_tx, command_rx) = bounded(capacity);
        let (inbound_tx, inbound_rx) = bounded(capacity);
        let (report_tx, report_rx) = unbounded();
        let (presentation_tx, presentation_rx) = unbounded();

        Self {
            command_tx,
            command_rx,
            inbound_tx,
            inbound_rx,
            report_tx,
            report_rx,
            presentation_tx,
            presentation_rx,
        }
    }
}

impl Default for CompanionChannels {
    fn default() -> Self {
        Self::new(64)
    }
}
