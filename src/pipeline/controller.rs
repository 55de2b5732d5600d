//! Pipeline controller: lifecycle state machine and thread orchestration.
//!
//! The media thread pulls frames from the source, runs inference and
//! tracking, and hands each processed frame to the worker thread through a
//! bounded queue; a full queue drops the frame. The worker thread drains
//! frames and commands into the [`Solution`]. End of stream and fatal
//! errors travel from the media thread to the controller on the bus.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded, select, unbounded,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::channel::Command;
use crate::error::{PipelineError, SourceError};
use crate::inference::InferenceStage;
use crate::lifecycle::{DropCounter, ShutdownSignal, StoppableThread};
use crate::pipeline::latest_frame::LatestFrame;
use crate::pipeline::solution::{FrameMeta, Solution};
use crate::pipeline::state::PipelineState;
use crate::pipeline::tracking::TrackingStage;
use crate::source::{FrameSource, RetryingSource};
use crate::tracker::{MultiClassTracker, TrackerConfig};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const DRAIN_YIELD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_queue_capacity: usize,
    pub command_queue_capacity: usize,
    pub inference_batch_size: usize,
    pub confidence_threshold: f32,
    pub join_timeout_ms: u64,
    pub source_open_retries: u32,
    pub source_retry_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 100,
            command_queue_capacity: 50,
            inference_batch_size: 1,
            confidence_threshold: 0.3,
            join_timeout_ms: 5_000,
            source_open_retries: 3,
            source_retry_delay_ms: 500,
        }
    }
}

impl PipelineConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn source_retry_delay(&self) -> Duration {
        Duration::from_millis(self.source_retry_delay_ms)
    }
}

/// Messages from the media thread to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Eos,
    Error(String),
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// End of stream or a graceful shutdown request
    Clean,
    Failed(String),
    /// A second termination request arrived during shutdown
    Forced,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed(_) => 1,
            RunOutcome::Forced => 130,
        }
    }
}

pub struct PipelineController {
    config: PipelineConfig,
    tracker_config: TrackerConfig,
    state: PipelineState,
    shutdown: ShutdownSignal,
    latest_frame: LatestFrame,
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
    bus_tx: Sender<BusMessage>,
    bus_rx: Receiver<BusMessage>,
    source: Option<Box<dyn FrameSource>>,
    tracking: Option<TrackingStage>,
    solution: Option<Box<dyn Solution>>,
    media: Option<StoppableThread>,
    worker: Option<StoppableThread>,
}

impl PipelineController {
    pub fn new(config: PipelineConfig, tracker_config: TrackerConfig, shutdown: ShutdownSignal) -> Self {
        let (command_tx, command_rx) = bounded(config.command_queue_capacity.max(1));
        let (bus_tx, bus_rx) = unbounded();
        Self {
            config,
            tracker_config,
            state: PipelineState::Created,
            shutdown,
            latest_frame: LatestFrame::new(),
            command_tx,
            command_rx,
            bus_tx,
            bus_rx,
            source: None,
            tracking: None,
            solution: None,
            media: None,
            worker: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Sender side of the command queue, for the command router.
    pub fn command_sender(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    /// Slot the media thread fills with the most recent frame.
    pub fn latest_frame(&self) -> LatestFrame {
        self.latest_frame.clone()
    }

    fn transition(&mut self, to: PipelineState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        info!(from = %self.state, to = %to, "Pipeline state change");
        self.state = to;
        Ok(())
    }

    /// Attach the stages and open the source (with bounded retries).
    pub fn init(
        &mut self,
        source: Box<dyn FrameSource>,
        inference: InferenceStage,
        solution: Box<dyn Solution>,
    ) -> Result<(), PipelineError> {
        self.transition(PipelineState::Initialized)?;

        let mut source = RetryingSource::new(
            source,
            self.config.source_open_retries,
            self.config.source_retry_delay(),
        );
        if let Err(e) = source.open() {
            error!(source = %source.describe(), "Failed to open source: {}", e);
            self.transition(PipelineState::Error)?;
            self.solution = Some(solution);
            return Err(e.into());
        }

        self.source = Some(Box::new(source));
        self.tracking = Some(TrackingStage::new(
            inference,
            MultiClassTracker::new(self.tracker_config.clone()),
        ));
        self.solution = Some(solution);
        Ok(())
    }

    /// Start the worker (`PAUSED`) and then the media thread (`PLAYING`).
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.source.is_none() {
            return Err(PipelineError::MissingStage("source"));
        }
        if self.tracking.is_none() {
            return Err(PipelineError::MissingStage("inference stage"));
        }
        if self.solution.is_none() {
            return Err(PipelineError::MissingStage("solution"));
        }
        self.transition(PipelineState::Paused)?;

        let (frame_tx, frame_rx) = bounded(self.config.frame_queue_capacity.max(1));

        let solution = self.solution.take().ok_or(PipelineError::MissingStage("solution"))?;
        let command_rx = self.command_rx.clone();
        self.worker = Some(
            StoppableThread::spawn("cityeye-worker", move |stop| {
                worker_loop(solution, frame_rx, command_rx, stop)
            })
            .map_err(PipelineError::Spawn)?,
        );

        self.transition(PipelineState::Playing)?;

        let source = self.source.take().ok_or(PipelineError::MissingStage("source"))?;
        let tracking = self
            .tracking
            .take()
            .ok_or(PipelineError::MissingStage("inference stage"))?;
        let bus_tx = self.bus_tx.clone();
        let latest = self.latest_frame.clone();
        self.media = Some(
            StoppableThread::spawn("cityeye-media", move |stop| {
                media_loop(source, tracking, frame_tx, bus_tx, latest, stop)
            })
            .map_err(PipelineError::Spawn)?,
        );
        Ok(())
    }

    /// Block until end of stream, a fatal error, or a shutdown request,
    /// then shut down.
    pub fn run(&mut self) -> RunOutcome {
        let outcome = if self.state != PipelineState::Playing {
            RunOutcome::Failed(format!("pipeline is {}, not PLAYING", self.state))
        } else {
            loop {
                if self.shutdown.is_requested() {
                    info!("Shutdown requested");
                    break RunOutcome::Clean;
                }
                match self.bus_rx.recv_timeout(POLL_TIMEOUT) {
                    Ok(BusMessage::Eos) => {
                        info!("End of stream");
                        let _ = self.transition(PipelineState::Eos);
                        break RunOutcome::Clean;
                    }
                    Ok(BusMessage::Error(reason)) => {
                        error!(%reason, "Pipeline error");
                        let _ = self.transition(PipelineState::Error);
                        break RunOutcome::Failed(reason);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        break RunOutcome::Failed("pipeline bus closed".to_string());
                    }
                }
            }
        };

        self.shutdown();
        if self.shutdown.is_forced() {
            RunOutcome::Forced
        } else {
            outcome
        }
    }

    /// Graceful stop: `PLAYING -> PAUSED -> READY -> NULL`. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let timeout = self.config.join_timeout();

        if self.state == PipelineState::Playing {
            let _ = self.transition(PipelineState::Paused);
        }
        if let Some(mut media) = self.media.take() {
            media.stop(timeout);
        }
        thread::sleep(DRAIN_YIELD);

        if matches!(
            self.state,
            PipelineState::Paused | PipelineState::Eos | PipelineState::Error
        ) {
            let _ = self.transition(PipelineState::Ready);
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop(timeout);
        }
        // Never handed to a worker thread.
        if let Some(mut solution) = self.solution.take() {
            solution.cleanup();
        }
        if let Some(mut source) = self.source.take() {
            source.close();
        }

        if let Err(e) = self.transition(PipelineState::Null) {
            warn!("Forcing pipeline to NULL: {}", e);
            self.state = PipelineState::Null;
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn media_loop(
    mut source: Box<dyn FrameSource>,
    mut tracking: TrackingStage,
    frame_tx: Sender<FrameMeta>,
    bus_tx: Sender<BusMessage>,
    latest: LatestFrame,
    stop: Receiver<()>,
) {
    let dropped = DropCounter::default();
    let send = |meta: FrameMeta| match frame_tx.try_send(meta) {
        Ok(()) => {}
        Err(TrySendError::Full(meta)) => {
            if let Some(total) = dropped.record() {
                warn!(frame = meta.frame.index, total, "Frame queue full, frame dropped");
            }
        }
        Err(TrySendError::Disconnected(_)) => {}
    };

    info!(source = %source.describe(), "Media thread started");
    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => {
                debug!("Media thread stop requested");
                tracking.flush().into_iter().for_each(&send);
                break;
            }
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                latest.set(frame.clone());
                tracking.process_frame(frame).into_iter().for_each(&send);
            }
            Ok(None) => {
                tracking.flush().into_iter().for_each(&send);
                let _ = bus_tx.send(BusMessage::Eos);
                break;
            }
            Err(e @ SourceError::Decode(_)) => {
                warn!("Skipping undecodable frame: {}", e);
            }
            Err(e) => {
                let _ = bus_tx.send(BusMessage::Error(e.to_string()));
                break;
            }
        }
    }
    source.close();
    info!(dropped_frames = dropped.total(), "Media thread stopped");
}

fn worker_loop(
    mut solution: Box<dyn Solution>,
    frame_rx: Receiver<FrameMeta>,
    command_rx: Receiver<Command>,
    stop: Receiver<()>,
) {
    info!(solution = solution.name(), "Worker thread started");
    solution.on_start();
    loop {
        select! {
            recv(frame_rx) -> msg => match msg {
                Ok(meta) => solution.on_frame(meta),
                // Media thread finished and the queue is drained.
                Err(_) => break,
            },
            recv(command_rx) -> msg => {
                if let Ok(command) = msg {
                    solution.on_command(command);
                }
            },
            recv(stop) -> _ => break,
            default(POLL_TIMEOUT) => solution.on_idle(),
        }
    }

    while let Ok(meta) = frame_rx.try_recv() {
        solution.on_frame(meta);
    }
    while let Ok(command) = command_rx.try_recv() {
        solution.on_command(command);
    }
    solution.cleanup();
    info!(solution = solution.name(), "Worker thread stopped");
}
