//! Bridge context
//!
//! Everything the host thread owns: element tree, canvases, image table, audio,
//! network requests and the event queue.
//! Every dispatch receives `&mut BridgeContext`; there is no global mutable state.

use crate::audio::{Audio, AudioOutput, NullAudioOutput};
use crate::config::BridgeConfig;
use crate::network::{Fetcher, NetworkMultiplexer};
use crate::platform::{translate, Event, EventId, EventQueue, UiInput};
use crate::render::{Canvas, FlushStats, RasterSurfaceFactory, SurfaceFactory};
use crate::resources::{ResourceTable, UploadedImage};
use crate::ui::ElementTree;

use super::error::ResourceResult;

/// Opaque host-side collaborators.
pub struct Backends {
    pub fetcher: Box<dyn Fetcher>,
    pub audio_output: Box<dyn AudioOutput>,
    pub surfaces: Box<dyn SurfaceFactory>,
}

impl Backends {
    /// Uses `fetcher` and the default software raster and null audio output.
    pub fn with_fetcher(fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            audio_output: Box::new(NullAudioOutput::new()),
            surfaces: Box::new(RasterSurfaceFactory),
        }
    }
}

/// Bridge state held by the host thread.
pub struct BridgeContext {
    pub elements: ElementTree,
    pub canvas: Canvas,
    pub images: ResourceTable<UploadedImage>,
    pub audio: Audio,
    pub network: NetworkMultiplexer,
    pub events: EventQueue,
    /// Largest bytes answer that fits in the answer slot.
    pub max_answer_bytes: usize,
    running: bool,
}

impl BridgeContext {
    pub fn new(config: &BridgeConfig, backends: Backends) -> Self {
        Self {
            elements: ElementTree::new(),
            canvas: Canvas::with_factory(config.canvas.clone(), backends.surfaces),
            images: ResourceTable::new("image"),
            audio: Audio::new(backends.audio_output),
            network: NetworkMultiplexer::new(backends.fetcher),
            events: EventQueue::new(config.host.event_history),
            max_answer_bytes: config.answer.capacity_bytes.saturating_sub(4),
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops serving the compute side.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Translates and queues one native input, returning the event id.
    pub fn inject(&mut self, input: &UiInput) -> ResourceResult<Option<EventId>> {
        Ok(translate(input, &mut self.elements)?.map(|event| self.events.push(event)))
    }

    pub fn push_event(&mut self, event: Event) -> EventId {
        self.events.push(event)
    }

    /// Executes and clears the draw commands of every canvas.
    pub fn flush_canvas(&mut self) -> FlushStats {
        self.canvas.flush(&mut self.images)
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("elements", &self.elements.table().len())
            .field("canvas", &self.canvas)
            .field("images", &self.images.len())
            .field("audio", &self.audio)
            .field("network", &self.network)
            .field("pending_events", &self.events.pending_len())
            .field("running", &self.running)
            .finish()
    }
}
