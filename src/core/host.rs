//! Host loop
//!
//! The host thread owns the [`BridgeContext`] and receives compute-side commands
//! and native input over one message channel. Canvases are flushed once per frame,
//! audio refills are polled on their own timer and network completions are
//! collected on every iteration.
//!
//! The host never waits on the compute thread: an answer is written into the
//! single-slot mailbox and the call returns. The compute side has already armed
//! the slot (WAITING) before posting the request.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::context::{Backends, BridgeContext};
use super::error::{AnswerError, BridgeError, BridgeResult, DispatchError};
use crate::audio::AudioOutput;
use crate::bindings::answer::{AnswerChannel, STATE_WAITING};
use crate::bindings::dispatch::dispatch;
use crate::bindings::protocol::Command;
use crate::bindings::stub::ComputeStub;
use crate::config::{BridgeConfig, HostConfig};
use crate::network::{Fetcher, HttpFetcher};
use crate::platform::{Event, EventId, EventKind, UiInput};
use crate::render::{RasterSurfaceFactory, SurfaceFactory};

/// Messages delivered to the host thread.
#[derive(Debug, Clone)]
pub enum Message {
    /// A compute-side command.
    Command(Command),
    /// Native host input, translated into an event by the listeners.
    Input(UiInput),
    Shutdown,
}

/// Counters collected while the host runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub commands: u64,
    pub answers: u64,
    /// Requests answered with FAULT.
    pub faults: u64,
    /// Fire-and-forget commands that failed (logged only).
    pub failed_commands: u64,
    pub frames: u64,
    pub draw_commands: u64,
    pub events_pushed: u64,
    pub inputs: u64,
}

/// Posts input or a shutdown request to the host from any thread.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: Sender<Message>,
}

impl HostHandle {
    pub fn post_input(&self, input: UiInput) -> BridgeResult<()> {
        self.tx
            .send(Message::Input(input))
            .map_err(|_| DispatchError::ChannelClosed.into())
    }

    /// Asks the host loop to exit. Ignored if it already has.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

/// Host side: bridge state plus the message loop.
pub struct Host {
    ctx: BridgeContext,
    answer: Arc<AnswerChannel>,
    rx: Receiver<Message>,
    config: HostConfig,
    stats: HostStats,
    last_frame: Instant,
    last_audio_poll: Instant,
    /// Last frame-tick not yet popped; used for coalescing.
    pending_tick: Option<EventId>,
}

impl Host {
    fn new(config: &BridgeConfig, backends: Backends, answer: Arc<AnswerChannel>, rx: Receiver<Message>) -> Self {
        let now = Instant::now();
        let mut host = Self {
            ctx: BridgeContext::new(config, backends),
            answer,
            rx,
            config: config.host.clone(),
            stats: HostStats::default(),
            last_frame: now,
            last_audio_poll: now,
            pending_tick: None,
        };
        // initial window resize
        host.inject(UiInput::WindowResize);
        host
    }

    pub fn context(&self) -> &BridgeContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BridgeContext {
        &mut self.ctx
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Translates and queues one native input. An invalid target is only logged.
    pub fn inject(&mut self, input: UiInput) -> Option<EventId> {
        self.stats.inputs += 1;
        match self.ctx.inject(&input) {
            Ok(Some(id)) => {
                self.stats.events_pushed += 1;
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(target: "bridge::host", input = ?input, error = %e, "Dropped input");
                None
            }
        }
    }

    /// Executes one command and answers it.
    ///
    /// Errors only on a protocol violation (an answer with no armed request);
    /// the host stops afterwards.
    pub fn serve(&mut self, command: Command) -> BridgeResult<()> {
        self.stats.commands += 1;
        let name = command.name();
        let answers = command.answer_type().is_some();
        let events_before = self.ctx.events.pending_len();
        let result = dispatch(&mut self.ctx, command);
        self.stats.events_pushed += self.ctx.events.pending_len().saturating_sub(events_before) as u64;

        if !answers {
            if let Err(e) = result {
                self.stats.failed_commands += 1;
                tracing::error!(target: "bridge::host", command = name, error = %e, "Command failed");
            }
            return Ok(());
        }

        let reply = match result {
            Ok(Some(answer)) => match self.answer.send(&answer) {
                Ok(()) => {
                    self.stats.answers += 1;
                    Ok(())
                }
                // answers larger than the slot become a FAULT
                Err(e @ AnswerError::PayloadTooLarge { .. }) => self.fault(name, &e.to_string()),
                Err(e) => Err(e),
            },
            Ok(None) => self.fault(name, "command produced no answer"),
            Err(e) => self.fault(name, &e.to_string()),
        };
        reply.map_err(|e| self.fatal(e))
    }

    fn fault(&mut self, command: &'static str, message: &str) -> Result<(), AnswerError> {
        tracing::warn!(target: "bridge::host", command, error = message, "Answering with fault");
        self.stats.faults += 1;
        self.answer.send_fault(message)
    }

    fn fatal(&mut self, error: AnswerError) -> BridgeError {
        tracing::error!(target: "bridge::host", error = %error, "Answer protocol violated, stopping host");
        self.ctx.stop();
        error.into()
    }

    fn handle(&mut self, message: Message) -> BridgeResult<()> {
        match message {
            Message::Command(command) => self.serve(command),
            Message::Input(input) => {
                self.inject(input);
                Ok(())
            }
            Message::Shutdown => {
                tracing::info!(target: "bridge::host", "Shutdown requested");
                self.ctx.stop();
                Ok(())
            }
        }
    }

    /// Handles every message that has already arrived without blocking and
    /// returns how many were handled.
    pub fn pump(&mut self) -> BridgeResult<usize> {
        let mut handled = 0;
        while self.ctx.is_running() {
            match self.rx.try_recv() {
                Ok(message) => {
                    self.handle(message)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!(target: "bridge::host", "All senders dropped");
                    self.ctx.stop();
                    break;
                }
            }
        }
        Ok(handled)
    }

    /// One round of timed work: network completions, frame flush, audio refills.
    pub fn tick(&mut self, now: Instant) {
        self.ctx.network.poll();

        if now.duration_since(self.last_frame) >= self.config.frame_interval() {
            self.last_frame = now;
            self.frame();
        }

        let audio_interval = self.config.audio_poll_interval();
        if now.duration_since(self.last_audio_poll) >= audio_interval {
            self.last_audio_poll = now;
            for source in self.ctx.audio.poll(now, audio_interval * 2) {
                tracing::trace!(target: "bridge::audio", source = source.raw(), "Audio buffer needed");
                self.ctx.push_event(Event::targeted(EventKind::AudioBufferNeeded, source.raw()));
                self.stats.events_pushed += 1;
            }
        }
    }

    /// Flushes every canvas and, if enabled, pushes a frame-tick (coalesced
    /// with the previous one while it is still pending).
    pub fn frame(&mut self) {
        let flushed = self.ctx.flush_canvas();
        self.stats.frames += 1;
        self.stats.draw_commands += flushed.commands as u64;

        if self.config.frame_tick_events {
            let coalesced = self
                .pending_tick
                .is_some_and(|id| self.ctx.events.is_pending(id));
            if !coalesced {
                self.pending_tick = Some(self.ctx.push_event(Event::new(EventKind::FrameTick)));
                self.stats.events_pushed += 1;
            }
        }
    }

    fn next_deadline(&self) -> Instant {
        let frame = self.last_frame + self.config.frame_interval();
        let audio = self.last_audio_poll + self.config.audio_poll_interval();
        frame.min(audio)
    }

    /// Runs until stop-execution, a shutdown request, or every sender is gone.
    pub fn run(&mut self) -> BridgeResult<()> {
        tracing::info!(target: "bridge::host", "Host loop started");
        let result = self.run_loop();
        self.close();
        tracing::info!(target: "bridge::host", stats = ?self.stats, "Host loop stopped");
        result
    }

    fn run_loop(&mut self) -> BridgeResult<()> {
        while self.ctx.is_running() {
            self.tick(Instant::now());
            if !self.ctx.is_running() {
                break;
            }
            let timeout = self
                .next_deadline()
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1));
            match self.rx.recv_timeout(timeout) {
                Ok(message) => {
                    self.handle(message)?;
                    self.pump()?;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!(target: "bridge::host", "All senders dropped");
                    self.ctx.stop();
                }
            }
        }
        Ok(())
    }

    /// Disconnects the command channel and releases a waiting compute thread
    /// with a FAULT.
    fn close(&mut self) {
        // with the receiver gone, compute-side sends fail immediately
        self.rx = crossbeam_channel::never();
        self.release_waiter();
    }

    fn release_waiter(&self) {
        if self.answer.is_in_flight() && self.answer.state() == STATE_WAITING {
            if let Err(e) = self.answer.send_fault("host shut down") {
                tracing::debug!(target: "bridge::host", error = %e, "No waiter to release");
            }
        }
    }

    /// Runs on a thread named `bridge-host`. Joining returns the host so its
    /// stats can be read.
    pub fn spawn(mut self) -> BridgeResult<JoinHandle<Host>> {
        let handle = std::thread::Builder::new()
            .name("bridge-host".to_string())
            .spawn(move || {
                if let Err(e) = self.run() {
                    tracing::error!(target: "bridge::host", error = %e, "Host loop failed");
                }
                self
            })?;
        Ok(handle)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.release_waiter();
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("ctx", &self.ctx)
            .field("answer", &self.answer)
            .field("stats", &self.stats)
            .finish()
    }
}

/// A connected host and compute stub.
#[derive(Debug)]
pub struct Bridge {
    pub host: Host,
    pub compute: ComputeStub,
    pub handle: HostHandle,
}

impl Bridge {
    /// Uses the default backends (HTTP fetcher, software raster, null audio).
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        BridgeBuilder::new(config).build()
    }
}

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    fetcher: Option<Box<dyn Fetcher>>,
    audio_output: Option<Box<dyn AudioOutput>>,
    surfaces: Option<Box<dyn SurfaceFactory>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            fetcher: None,
            audio_output: None,
            surfaces: None,
        }
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn audio_output(mut self, output: impl AudioOutput + 'static) -> Self {
        self.audio_output = Some(Box::new(output));
        self
    }

    pub fn surface_factory(mut self, factory: impl SurfaceFactory + 'static) -> Self {
        self.surfaces = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> BridgeResult<Bridge> {
        self.config.validate()?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Box::new(HttpFetcher::new(&self.config.network)?),
        };
        let backends = Backends {
            fetcher,
            audio_output: self
                .audio_output
                .unwrap_or_else(|| Box::new(crate::audio::NullAudioOutput::new())),
            surfaces: self.surfaces.unwrap_or_else(|| Box::new(RasterSurfaceFactory)),
        };

        let answer = Arc::new(AnswerChannel::new(&self.config.answer));
        let (tx, rx) = crossbeam_channel::unbounded();
        let host = Host::new(&self.config, backends, Arc::clone(&answer), rx);
        let compute = ComputeStub::new(tx.clone(), answer, self.config.compute.clone());
        tracing::debug!(target: "bridge::host", capacity = self.config.answer.capacity_bytes, "Bridge built");
        Ok(Bridge {
            host,
            compute,
            handle: HostHandle { tx },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::answer::Answer;
    use crate::network::MemoryFetcher;

    fn bridge() -> Bridge {
        BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_resize_is_queued() {
        let bridge = bridge();
        let events = &bridge.host.context().events;
        assert_eq!(events.pending_len(), 1);
        assert_eq!(events.type_of(0).unwrap(), EventKind::Resize);
    }

    #[test]
    fn test_serve_answers_into_slot() {
        let mut bridge = bridge();
        bridge.compute.answer_channel().begin_request().unwrap();
        bridge
            .host
            .serve(Command::ElementCreate { tag: "div".into(), kind: "container".into() })
            .unwrap();
        let answer = bridge
            .compute
            .answer_channel()
            .wait_answer(crate::bindings::answer::AnswerType::Int)
            .unwrap();
        assert_eq!(answer, Answer::Int(0));
        assert_eq!(bridge.host.stats().answers, 1);
    }

    #[test]
    fn test_failed_answering_command_sends_fault() {
        let mut bridge = bridge();
        bridge.compute.answer_channel().begin_request().unwrap();
        bridge.host.serve(Command::ElementGetWidth { element: 9 }).unwrap();
        let err = bridge
            .compute
            .answer_channel()
            .wait_answer(crate::bindings::answer::AnswerType::Int)
            .unwrap_err();
        assert!(matches!(err, AnswerError::HostFault(msg) if msg.contains("invalid element handle 9")));
        assert_eq!(bridge.host.stats().faults, 1);
    }

    #[test]
    fn test_failed_fire_and_forget_is_counted() {
        let mut bridge = bridge();
        bridge.host.serve(Command::ElementSetRoot { element: 3 }).unwrap();
        assert_eq!(bridge.host.stats().failed_commands, 1);
        assert!(bridge.host.is_running());
    }

    #[test]
    fn test_answer_without_waiter_is_fatal() {
        let mut bridge = bridge();
        let err = bridge.host.serve(Command::EventHasPending).unwrap_err();
        assert!(matches!(err, BridgeError::Answer(AnswerError::NotWaiting { .. })));
        assert!(!bridge.host.is_running());
    }

    #[test]
    fn test_frame_ticks_are_coalesced() {
        let mut bridge = bridge();
        bridge.host.frame();
        bridge.host.frame();
        let events = &bridge.host.context().events;
        // initial resize plus one frame-tick
        assert_eq!(events.pending_len(), 2);
        assert_eq!(bridge.host.stats().frames, 2);
    }

    #[test]
    fn test_shutdown_message_stops_pump() {
        let mut bridge = bridge();
        bridge.handle.post_input(UiInput::WindowResize).unwrap();
        bridge.handle.shutdown();
        assert_eq!(bridge.host.pump().unwrap(), 2);
        assert!(!bridge.host.is_running());
    }
}
