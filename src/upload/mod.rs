//! Background upload pipeline.
//!
//! Every file selection starts a new *generation*. A worker thread walks the
//! read, decode and conditioning stages and reports each step over a channel.
//! The UI thread drains that channel once per frame and applies an event only
//! if it belongs to the latest generation, so a slow earlier upload can never
//! overwrite a newer one. Abandoned workers run to completion and their
//! results are dropped.

use crate::assets::texture::{RenderTexture, TextureConditioner, WrapMode};
use crate::assets::{decode_image_bytes, read_image_bytes, AssetError, DecodedImage};
use crate::scene::dimensions::{DimensionCalculator, PhysicalDimensions};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Reading,
    Decoding,
    Conditioning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    InFlight {
        generation: Generation,
        stage: UploadStage,
    },
    Ready {
        generation: Generation,
    },
    Failed {
        generation: Generation,
        message: String,
    },
}

/// Result of a finished upload, ready to be published to the scene.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub generation: Generation,
    pub image: DecodedImage,
    pub dimensions: PhysicalDimensions,
    pub texture: Arc<RenderTexture>,
}

#[derive(Debug)]
pub enum UploadEvent {
    Stage {
        generation: Generation,
        stage: UploadStage,
    },
    Finished {
        generation: Generation,
        result: Result<UploadOutcome, AssetError>,
    },
}

impl UploadEvent {
    pub fn generation(&self) -> Generation {
        match self {
            UploadEvent::Stage { generation, .. } | UploadEvent::Finished { generation, .. } => {
                *generation
            }
        }
    }
}

/// Everything a worker needs, copied into each upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadSettings {
    pub pixels_per_inch: f32,
    pub wrap: WrapMode,
    pub conditioner: TextureConditioner,
    pub calculator: DimensionCalculator,
}

pub struct UploadPipeline {
    settings: UploadSettings,
    latest: Generation,
    state: UploadState,
    in_flight: HashSet<Generation>,
    sender: Sender<UploadEvent>,
    receiver: Receiver<UploadEvent>,
}

impl UploadPipeline {
    pub fn new(settings: UploadSettings) -> Self {
        let (sender, receiver) = channel();
        Self {
            settings,
            latest: 0,
            state: UploadState::Idle,
            in_flight: HashSet::new(),
            sender,
            receiver,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Workers that have not reported back yet, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Caps the texture side of later uploads, e.g. at the GPU's limit.
    pub fn limit_texture_side(&mut self, max_side: u32) {
        let conditioner = &mut self.settings.conditioner;
        if max_side < conditioner.max_side() {
            log::info!(
                "Upload textures capped at {} px (was {})",
                max_side,
                conditioner.max_side()
            );
            *conditioner = conditioner.with_max_side(max_side);
        }
    }

    /// Entry point for the file picker. A cancelled dialog (`None`) changes
    /// nothing.
    pub fn on_file_selected(&mut self, path: Option<PathBuf>) -> Option<Generation> {
        let Some(path) = path else {
            log::debug!("File selection cancelled");
            return None;
        };
        let generation = self.begin();
        let sender = self.sender.clone();
        let settings = self.settings;
        log::info!("Upload #{} started: {}", generation, path.display());
        let spawned = std::thread::Builder::new()
            .name(format!("upload-{generation}"))
            .spawn(move || run_upload(generation, &path, settings, &sender));
        if let Err(err) = spawned {
            self.in_flight.remove(&generation);
            self.state = UploadState::Failed {
                generation,
                message: format!("could not start upload worker: {err}"),
            };
            log::warn!("Upload #{} failed to start: {}", generation, err);
        }
        Some(generation)
    }

    /// Tags a new upload and makes it the only one whose results count.
    fn begin(&mut self) -> Generation {
        self.latest += 1;
        self.in_flight.insert(self.latest);
        self.state = UploadState::InFlight {
            generation: self.latest,
            stage: UploadStage::Reading,
        };
        self.latest
    }

    /// Drains pending worker events. Returns the newest committed outcome, if
    /// any arrived since the last poll.
    pub fn poll(&mut self) -> Option<UploadOutcome> {
        let mut committed = None;
        while let Ok(event) = self.receiver.try_recv() {
            if let Some(outcome) = self.apply(event) {
                committed = Some(outcome);
            }
        }
        committed
    }

    fn apply(&mut self, event: UploadEvent) -> Option<UploadOutcome> {
        let generation = event.generation();
        if let UploadEvent::Finished { .. } = event {
            self.in_flight.remove(&generation);
        }
        if generation != self.latest {
            log::debug!(
                "Discarding stale upload #{} event (latest is #{})",
                generation,
                self.latest
            );
            return None;
        }

        match event {
            UploadEvent::Stage { stage, .. } => {
                log::debug!("Upload #{} -> {:?}", generation, stage);
                self.state = UploadState::InFlight { generation, stage };
                None
            }
            UploadEvent::Finished {
                result: Ok(outcome),
                ..
            } => {
                log::info!(
                    "Upload #{} ready: {} ({}x{} px, sha256 {})",
                    generation,
                    outcome.image.label(),
                    outcome.image.width_px(),
                    outcome.image.height_px(),
                    outcome.image.content_hash().unwrap_or("-")
                );
                self.state = UploadState::Ready { generation };
                Some(outcome)
            }
            UploadEvent::Finished {
                result: Err(err), ..
            } => {
                log::warn!("Upload #{} failed: {}", generation, err);
                self.state = UploadState::Failed {
                    generation,
                    message: err.to_string(),
                };
                None
            }
        }
    }
}

fn run_upload(
    generation: Generation,
    path: &Path,
    settings: UploadSettings,
    sender: &Sender<UploadEvent>,
) {
    run_guarded(generation, path, sender, |report| {
        process_upload(generation, path, settings, report)
    });
}

/// Runs `work` and always follows it with a `Finished` event, even if it
/// panics, so the generation never stays in flight.
fn run_guarded<W>(generation: Generation, path: &Path, sender: &Sender<UploadEvent>, work: W)
where
    W: FnOnce(&mut dyn FnMut(UploadStage)) -> Result<UploadOutcome, AssetError>,
{
    let mut report = |stage: UploadStage| {
        // The pipeline may already be gone; nothing to report to then.
        let _ = sender.send(UploadEvent::Stage { generation, stage });
    };
    let result = catch_unwind(AssertUnwindSafe(|| work(&mut report))).unwrap_or_else(|payload| {
        Err(AssetError::Crashed {
            path: path.display().to_string(),
            message: panic_message(payload.as_ref()),
        })
    });
    let _ = sender.send(UploadEvent::Finished { generation, result });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Read, decode and condition one file, reporting each stage as it starts.
pub fn process_upload<F>(
    generation: Generation,
    path: &Path,
    settings: UploadSettings,
    mut report: F,
) -> Result<UploadOutcome, AssetError>
where
    F: FnMut(UploadStage),
{
    report(UploadStage::Reading);
    let bytes = read_image_bytes(path)?;

    report(UploadStage::Decoding);
    let image = decode_image_bytes(&bytes)?;
    let dimensions = settings
        .calculator
        .compute(&image, settings.pixels_per_inch);

    report(UploadStage::Conditioning);
    let texture = Arc::new(settings.conditioner.condition_untiled(&image, settings.wrap));

    Ok(UploadOutcome {
        generation,
        image,
        dimensions,
        texture,
    })
}
