//! Driver thread for the streaming core
//!
//! Owns the [`SessionCoordinator`] and multiplexes user commands, backend
//! frames, playback completion reports and the presentation tick.

use crate::audio::{AudioSink, ClockSink};
use crate::integration::config::{CompanionConfig, PlaybackConfig};
use crate::messages::{Turn, TurnSink, TurnStore};
use crate::stream::{PresentationEvent, SessionCoordinator};
use crate::transport::{Inbound, InboundSender, TransportEvent, TransportLink, WireDecoder};
use crate::utils::channels::CompanionChannels;
use crate::{CompanionError, Result};
use crossbeam_channel::{select, tick, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Commands from the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorCommand {
    /// Send a user message; supersedes any reply still streaming
    BeginTurn(String),

    /// Cut the current reply short
    Interrupt,

    Shutdown,
}

/// Cloneable control surface for UI and connection code
#[derive(Clone)]
pub struct CompanionHandle {
    command_tx: Sender<OrchestratorCommand>,
    inbound: InboundSender,
    presentation_rx: Receiver<PresentationEvent>,
    history: TurnStore,
}

impl CompanionHandle {
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| CompanionError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn begin_turn(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::BeginTurn(text.into()))
    }

    pub fn interrupt(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Interrupt)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Shutdown)
    }

    /// Where the connection delivers frames and events
    pub fn inbound_sender(&self) -> InboundSender {
        self.inbound.clone()
    }

    pub fn presentation_receiver(&self) -> Receiver<PresentationEvent> {
        self.presentation_rx.clone()
    }

    pub fn try_recv_presentation(&self) -> Option<PresentationEvent> {
        self.presentation_rx.try_recv().ok()
    }

    /// Persisted turns, oldest first
    pub fn history(&self) -> Vec<Turn> {
        self.history.get_all()
    }
}

pub struct Orchestrator {
    config: CompanionConfig,
    sink: Arc<dyn AudioSink>,
    turns: Arc<dyn TurnSink>,
    channels: CompanionChannels,
}

impl Orchestrator {
    pub fn new(config: CompanionConfig) -> Result<(Self, CompanionHandle)> {
        let sink = sink_from_config(&config.playback)?;
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: CompanionConfig, sink: Arc<dyn AudioSink>) -> Result<(Self, CompanionHandle)> {
        Self::assemble(config, sink, TurnStore::new(), None)
    }

    fn assemble(
        config: CompanionConfig,
        sink: Arc<dyn AudioSink>,
        history: TurnStore,
        turns: Option<Arc<dyn TurnSink>>,
    ) -> Result<(Self, CompanionHandle)> {
        config.validate()?;
        let channels = CompanionChannels::new(config.channel_capacity);

        let handle = CompanionHandle {
            command_tx: channels.command_tx.clone(),
            inbound: InboundSender::new(channels.inbound_tx.clone()),
            presentation_rx: channels.presentation_rx.clone(),
            history: history.clone(),
        };

        let orchestrator = Self {
            config,
            sink,
            turns: turns.unwrap_or_else(|| Arc::new(history)),
            channels,
        };

        Ok((orchestrator, handle))
    }

    /// Spawn the driver loop. `link` carries user turns to the backend.
    pub fn start(self, link: Arc<dyn TransportLink>) -> Result<JoinHandle<()>> {
        let Self {
            config,
            sink,
            turns,
            channels,
        } = self;

        let CompanionChannels {
            command_rx,
            inbound_tx,
            inbound_rx,
            report_tx,
            report_rx,
            presentation_tx,
            ..
        } = channels;

        let tick_every = Duration::from_millis(config.presentation.amplitude_interval_ms);
        let decoder = WireDecoder::new(config.stream.first_index);

        thread::Builder::new()
            .name("companion-driver".into())
            .spawn(move || {
                // Held so the inbound channel never reads as disconnected
                let _inbound_tx = inbound_tx;
                let mut coordinator =
                    SessionCoordinator::new(&config, sink, turns, report_tx, presentation_tx);
                let ticker = tick(tick_every);

                info!("Companion driver started");

                loop {
                    select! {
                        recv(command_rx) -> cmd => match cmd {
                            Ok(OrchestratorCommand::BeginTurn(text)) => {
                                if let Some(previous) = coordinator.active_token() {
                                    link.cancel_turn(&previous);
                                }
                                let token = coordinator.begin_turn(&text);
                                if let Err(e) = link.dispatch_turn(&token, &text) {
                                    warn!("Failed to dispatch turn: {}", e);
                                    coordinator.handle_transport(TransportEvent::StreamError {
                                        token,
                                        description: e.user_message(),
                                    });
                                }
                            }
                            Ok(OrchestratorCommand::Interrupt) => {
                                if let Some(token) = coordinator.interrupt() {
                                    link.cancel_turn(&token);
                                }
                            }
                            Ok(OrchestratorCommand::Shutdown) => {
                                info!("Companion driver shutdown requested");
                                break;
                            }
                            Err(_) => {
                                warn!("Command channel disconnected");
                                break;
                            }
                        },
                        recv(inbound_rx) -> inbound => match inbound {
                            Ok(Inbound::Frame(frame)) => {
                                let active = coordinator.active_token();
                                match decoder.decode_frame(&frame, active.as_ref()) {
                                    Ok(events) => {
                                        for event in events {
                                            coordinator.handle_transport(event);
                                        }
                                    }
                                    Err(e) => warn!("Dropping undecodable frame: {}", e),
                                }
                            }
                            Ok(Inbound::Event(event)) => coordinator.handle_transport(event),
                            Err(_) => {}
                        },
                        recv(report_rx) -> report => {
                            if let Ok(report) = report {
                                coordinator.on_playback_report(report);
                            }
                        },
                        recv(ticker) -> _ => coordinator.tick(Instant::now()),
                    }
                }

                if let Some(token) = coordinator.interrupt() {
                    link.cancel_turn(&token);
                }
                debug!(
                    "Average time to first audio: {:?}",
                    coordinator.average_first_audio()
                );
                info!("Companion driver stopped");
            })
            .map_err(|e| CompanionError::ChannelError(format!("Failed to spawn driver: {}", e)))
    }
}

/// Clock sink, or the output device when asked for and compiled in
pub fn sink_from_config(playback: &PlaybackConfig) -> Result<Arc<dyn AudioSink>> {
    if playback.use_device {
        #[cfg(feature = "audio-io")]
        {
            return Ok(Arc::new(crate::audio::CpalSink::new()?));
        }
        #[cfg(not(feature = "audio-io"))]
        {
            warn!("Built without audio-io, falling back to the clock sink");
        }
    }

    Ok(Arc::new(ClockSink::new(
        Duration::from_millis(playback.block_ms),
        playback.speed,
    )))
}

/// Builder for an orchestrator with a custom sink or persistence
pub struct OrchestratorBuilder {
    config: CompanionConfig,
    sink: Option<Arc<dyn AudioSink>>,
    turns: Option<Arc<dyn TurnSink>>,
    history: TurnStore,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: CompanionConfig::default(),
            sink: None,
            turns: None,
            history: TurnStore::new(),
        }
    }

    pub fn with_config(mut self, config: CompanionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Persist turns somewhere other than the handle's in-memory history
    pub fn with_turn_sink(mut self, turns: Arc<dyn TurnSink>) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn build(self) -> Result<(Orchestrator, CompanionHandle)> {
        let sink = match self.sink {
            Some(sink) => sink,
            None => sink_from_config(&self.config.playback)?,
        };
        Orchestrator::assemble(self.config, sink, self.history, self.turns)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Role, SessionToken};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingLink {
        dispatched: Mutex<Vec<(SessionToken, String)>>,
        cancelled: Mutex<Vec<SessionToken>>,
    }

    impl TransportLink for RecordingLink {
        fn dispatch_turn(&self, token: &SessionToken, text: &str) -> Result<()> {
            self.dispatched.lock().push((token.clone(), text.to_string()));
            Ok(())
        }

        fn cancel_turn(&self, token: &SessionToken) {
            self.cancelled.lock().push(token.clone());
        }
    }

    struct FailingLink;

    impl TransportLink for FailingLink {
        fn dispatch_turn(&self, _token: &SessionToken, _text: &str) -> Result<()> {
            Err(CompanionError::TransportError("socket closed".into()))
        }
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_orchestrator_creation() {
        assert!(Orchestrator::new(CompanionConfig::default()).is_ok());

        let mut invalid = CompanionConfig::default();
        invalid.channel_capacity = 0;
        assert!(Orchestrator::new(invalid).is_err());
    }

    #[test]
    fn test_turn_is_dispatched_and_superseded() {
        let (orchestrator, handle) = OrchestratorBuilder::new().build().unwrap();
        let link = Arc::new(RecordingLink::default());
        let driver = orchestrator.start(link.clone()).unwrap();

        handle.begin_turn("first").unwrap();
        handle.begin_turn("second").unwrap();
        assert!(wait_for(|| link.dispatched.lock().len() == 2));

        let first = link.dispatched.lock()[0].0.clone();
        assert!(wait_for(|| link.cancelled.lock().contains(&first)));

        handle.shutdown().unwrap();
        driver.join().unwrap();

        let users: Vec<_> = handle
            .history()
            .into_iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.text)
            .collect();
        assert_eq!(users, vec!["first", "second"]);
    }

    #[test]
    fn test_dispatch_failure_surfaces_once() {
        let (orchestrator, handle) = OrchestratorBuilder::new().build().unwrap();
        let driver = orchestrator.start(Arc::new(FailingLink)).unwrap();
        let events = handle.presentation_receiver();

        handle.begin_turn("hello?").unwrap();
        let closed = loop {
            match events.recv_timeout(Duration::from_secs(2)).unwrap() {
                PresentationEvent::SessionClosed(outcome) => break outcome,
                _ => continue,
            }
        };
        assert!(matches!(
            closed,
            crate::stream::SessionOutcome::Failed { .. }
        ));
        assert!(wait_for(|| handle.history().len() == 1));
        assert_eq!(handle.history()[0].role, Role::User);

        handle.shutdown().unwrap();
        driver.join().unwrap();
    }

    #[test]
    fn test_driver_stops_when_handles_dropped() {
        let (orchestrator, handle) = OrchestratorBuilder::new().build().unwrap();
        let driver = orchestrator.start(Arc::new(RecordingLink::default())).unwrap();
        drop(handle);
        driver.join().unwrap();
    }
}
