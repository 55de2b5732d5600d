//! The City Eye solution: zone counting, persistence and cloud commands.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, error, info, warn};

use crate::channel::{
    AppStatus, CaptureResponse, CloudChannel, Command, ObjectStore, Presence, Topics, ZoneUpdateStatus,
    publish_json, write_atomic,
};
use crate::counter::{CountEvent, ZoneCounter, ZoneSet};
use crate::error::{ChannelError, ChannelResult};
use crate::pipeline::latest_frame::LatestFrame;
use crate::pipeline::solution::{FrameMeta, Solution};
use crate::source::{Frame, PixelFormat};
use crate::store::LocalStore;

const JPEG_QUALITY: u8 = 85;
const CAPTURE_FILENAME: &str = "capture.jpg";

/// Collaborators shared with the rest of the process.
#[derive(Clone)]
pub struct SolutionContext {
    pub device_id: String,
    pub solution_id: String,
    pub topics: Topics,
    pub channel: Arc<dyn CloudChannel>,
    pub objects: Arc<dyn ObjectStore>,
    pub store: Arc<LocalStore>,
    pub latest_frame: LatestFrame,
}

pub struct CityEyeSolution {
    ctx: SolutionContext,
    counter: ZoneCounter,
    zones_path: PathBuf,
    last_frame: u64,
    /// Worker polls without a frame since `last_frame`
    idle_polls: u64,
    stored: u64,
    cleaned_up: bool,
}

impl CityEyeSolution {
    pub fn new(ctx: SolutionContext, counter: ZoneCounter, zones_path: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            counter,
            zones_path: zones_path.into(),
            last_frame: 0,
            idle_polls: 0,
            stored: 0,
            cleaned_up: false,
        }
    }

    pub fn counter(&self) -> &ZoneCounter {
        &self.counter
    }

    /// Number of count rows written so far.
    pub fn stored(&self) -> u64 {
        self.stored
    }

    fn finish_stale(&mut self, frame_idx: u64) {
        while let Some(event) = self.counter.finish_tracklets(frame_idx) {
            self.persist(&event);
        }
    }

    fn persist(&mut self, event: &CountEvent) {
        match self.ctx.store.insert_count_event(event, Utc::now()) {
            Ok(_) => self.stored += 1,
            Err(e) => error!(track_id = %event.track_id, route = %event.route, "Failed to store count: {}", e),
        }
    }

    fn update_zones(&mut self, content: String, message_id: Option<String>, version: Option<u64>) {
        let status = match self.apply_zones(&content) {
            Ok(()) => {
                info!(?message_id, ?version, "Zone configuration updated");
                ZoneUpdateStatus::successful(message_id, version)
            }
            Err(reason) => {
                warn!(?message_id, ?version, "Zone update rejected: {}", reason);
                ZoneUpdateStatus::failed(message_id, version, reason)
            }
        };
        if let Err(e) = publish_json(self.ctx.channel.as_ref(), &self.ctx.topics.shadow_update, &status) {
            warn!("Failed to report zone update status: {}", e);
        }
    }

    /// Validate, persist, then swap in the new zones. Nothing changes on error.
    fn apply_zones(&mut self, content: &str) -> Result<(), String> {
        ZoneSet::parse(content).map_err(|e| e.to_string())?;
        write_atomic(&self.zones_path, content.as_bytes())
            .map_err(|e| format!("failed to write {}: {}", self.zones_path.display(), e))?;
        self.counter
            .reload_config(&self.zones_path, content)
            .map_err(|e| e.to_string())
    }

    fn capture(&mut self, message_id: String) {
        let response = match self.upload_capture() {
            Ok(path) => {
                info!(%message_id, %path, "Capture uploaded");
                CaptureResponse::uploaded(message_id, CAPTURE_FILENAME.to_string(), path)
            }
            Err(e) => {
                warn!(%message_id, "Capture failed: {}", e);
                CaptureResponse::failed(message_id, e)
            }
        };
        if let Err(e) = publish_json(self.ctx.channel.as_ref(), &self.ctx.topics.capture_response, &response) {
            warn!("Failed to publish capture response: {}", e);
        }
    }

    fn upload_capture(&self) -> ChannelResult<String> {
        let frame = self.ctx.latest_frame.get().ok_or(ChannelError::NoFrame)?;
        let jpeg = encode_jpeg(&frame)?;
        let key = format!(
            "captures/{}/{}/{}",
            self.ctx.solution_id, self.ctx.device_id, CAPTURE_FILENAME
        );
        self.ctx.objects.put(&key, &jpeg, "image/jpeg")
    }

    fn publish_presence(&self, presence: Presence) {
        let status = AppStatus::new(self.ctx.device_id.clone(), presence);
        if let Err(e) = publish_json(self.ctx.channel.as_ref(), &self.ctx.topics.status, &status) {
            warn!(?presence, "Failed to publish application status: {}", e);
        }
    }
}

fn encode_jpeg(frame: &Frame) -> ChannelResult<Vec<u8>> {
    let color = match frame.format {
        PixelFormat::Rgb24 => ExtendedColorType::Rgb8,
        PixelFormat::Gray8 => ExtendedColorType::L8,
    };
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode(&frame.data, frame.width, frame.height, color)
        .map_err(|e| ChannelError::Upload(format!("jpeg encoding failed: {}", e)))?;
    Ok(bytes)
}

impl Solution for CityEyeSolution {
    fn name(&self) -> &str {
        &self.ctx.solution_id
    }

    fn on_start(&mut self) {
        info!(
            solution = %self.ctx.solution_id,
            device = %self.ctx.device_id,
            zones = self.counter.zones().len(),
            "Solution started"
        );
        self.publish_presence(Presence::Online);
    }

    fn on_frame(&mut self, meta: FrameMeta) {
        let frame_idx = meta.frame.index;
        self.last_frame = frame_idx;
        self.idle_polls = 0;
        self.counter.count_by_frame(frame_idx, &meta.detections);
        self.finish_stale(frame_idx);
    }

    /// A stalled stream still ages its tracks: each idle poll counts as one
    /// frame past the last one seen.
    fn on_idle(&mut self) {
        if self.counter.track_count() == 0 {
            return;
        }
        self.idle_polls += 1;
        self.finish_stale(self.last_frame + self.idle_polls);
    }

    fn on_command(&mut self, command: Command) {
        debug!(?command, "Executing command");
        match command {
            Command::UpdateZones {
                content,
                message_id,
                version,
            } => self.update_zones(content, message_id, version),
            Command::CaptureImage { message_id } => self.capture(message_id),
        }
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        for event in self.counter.finish_all() {
            self.persist(&event);
        }
        self.publish_presence(Presence::Offline);
        info!(last_frame = self.last_frame, stored = self.stored, "Solution cleaned up");
    }
}
