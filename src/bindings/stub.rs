//! Compute-Side Stub
//!
//! What the sandboxed program links against: one method per command. Fire
//! and forget commands are posted and return immediately; commands with a
//! declared answer type arm the answer slot, post, and block for the reply.
//!
//! Every call takes `&mut self`, so a single stub can never have two requests
//! outstanding at once.

use std::sync::Arc;

use crossbeam_channel::Sender;

use super::answer::{Answer, AnswerChannel, AnswerType};
use super::protocol::{Arg, Command};
use crate::config::ComputeConfig;
use crate::core::error::{AnswerError, BridgeError, BridgeResult, DispatchError};
use crate::core::host::Message;
use crate::core::utils::current_timestamp_ms;
use crate::platform::EventKind;

/// Compute-thread side of the bridge.
#[derive(Debug)]
pub struct ComputeStub {
    tx: Sender<Message>,
    answer: Arc<AnswerChannel>,
    config: ComputeConfig,
}

impl ComputeStub {
    pub(crate) fn new(tx: Sender<Message>, answer: Arc<AnswerChannel>, config: ComputeConfig) -> Self {
        Self { tx, answer, config }
    }

    pub fn answer_channel(&self) -> &AnswerChannel {
        &self.answer
    }

    /// Posts `command` and, if it declares an answer type, waits for the reply.
    pub fn call(&mut self, command: Command) -> BridgeResult<Option<Answer>> {
        let Some(ty) = command.answer_type() else {
            self.tx
                .send(Message::Command(command))
                .map_err(|_| DispatchError::ChannelClosed)?;
            return Ok(None);
        };
        let tx = &self.tx;
        let answer = self.answer.request::<BridgeError, _>(ty, || {
            tx.send(Message::Command(command))
                .map_err(|_| AnswerError::Disconnected.into())
        })?;
        Ok(Some(answer))
    }

    /// Name-based entry point for callers that only have a wire name and
    /// positional arguments.
    pub fn call_named(&mut self, name: &str, args: &[Arg]) -> BridgeResult<Option<Answer>> {
        self.call(Command::decode(name, args)?)
    }

    fn answered(&mut self, command: Command) -> BridgeResult<Answer> {
        let name = command.name();
        self.call(command)?.ok_or_else(|| {
            DispatchError::BadArguments {
                command: name,
                reason: "command does not produce an answer".to_string(),
            }
            .into()
        })
    }

    fn int(&mut self, command: Command) -> BridgeResult<i64> {
        let answer = self.answered(command)?;
        answer.as_int().ok_or_else(|| mismatch(AnswerType::Int, &answer))
    }

    fn uint(&mut self, command: Command) -> BridgeResult<u32> {
        let value = self.int(command)?;
        u32::try_from(value).map_err(|_| AnswerError::HostFault(format!("answer {value} does not fit in u32")).into())
    }

    fn bool(&mut self, command: Command) -> BridgeResult<bool> {
        let answer = self.answered(command)?;
        answer.as_bool().ok_or_else(|| mismatch(AnswerType::Bool, &answer))
    }

    fn bytes(&mut self, command: Command) -> BridgeResult<Vec<u8>> {
        let answer = self.answered(command)?;
        let actual = answer.answer_type();
        answer.into_bytes().ok_or_else(|| {
            AnswerError::TypeMismatch {
                expected: AnswerType::Bytes.name(),
                actual: actual.name(),
            }
            .into()
        })
    }

    fn text(&mut self, command: Command) -> BridgeResult<String> {
        let bytes = self.bytes(command)?;
        Ok(crate::core::utils::decode_utf8_lossy(&bytes))
    }

    fn post(&mut self, command: Command) -> BridgeResult<()> {
        self.call(command).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: &str, kind: &str) -> BridgeResult<u32> {
        self.uint(Command::ElementCreate {
            tag: tag.to_string(),
            kind: kind.to_string(),
        })
    }

    pub fn append(&mut self, parent: u32, child: u32) -> BridgeResult<()> {
        self.post(Command::ElementAppend { parent, child })
    }

    pub fn set_root(&mut self, element: u32) -> BridgeResult<()> {
        self.post(Command::ElementSetRoot { element })
    }

    pub fn set_text(&mut self, element: u32, text: &str) -> BridgeResult<()> {
        self.post(Command::ElementSetText {
            element,
            text: text.to_string(),
        })
    }

    /// UTF-8 byte length of the element text.
    pub fn text_len(&mut self, element: u32) -> BridgeResult<usize> {
        Ok(self.int(Command::ElementGetTextLength { element })? as usize)
    }

    pub fn get_text(&mut self, element: u32) -> BridgeResult<String> {
        self.text(Command::ElementGetText { element })
    }

    pub fn set_attribute(&mut self, element: u32, name: &str, value: &str) -> BridgeResult<()> {
        self.post(Command::ElementSetAttribute {
            element,
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn remove_attribute(&mut self, element: u32, name: &str) -> BridgeResult<()> {
        self.post(Command::ElementRemoveAttribute {
            element,
            name: name.to_string(),
        })
    }

    pub fn attribute_len(&mut self, element: u32, name: &str) -> BridgeResult<usize> {
        Ok(self.int(Command::ElementGetAttributeLength {
            element,
            name: name.to_string(),
        })? as usize)
    }

    pub fn get_attribute(&mut self, element: u32, name: &str) -> BridgeResult<String> {
        self.text(Command::ElementGetAttribute {
            element,
            name: name.to_string(),
        })
    }

    pub fn set_style(&mut self, element: u32, name: &str, value: &str) -> BridgeResult<()> {
        self.post(Command::ElementSetStyle {
            element,
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn remove_style(&mut self, element: u32, name: &str) -> BridgeResult<()> {
        self.post(Command::ElementRemoveStyle {
            element,
            name: name.to_string(),
        })
    }

    pub fn style_len(&mut self, element: u32, name: &str) -> BridgeResult<usize> {
        Ok(self.int(Command::ElementGetStyleLength {
            element,
            name: name.to_string(),
        })? as usize)
    }

    pub fn get_style(&mut self, element: u32, name: &str) -> BridgeResult<String> {
        self.text(Command::ElementGetStyle {
            element,
            name: name.to_string(),
        })
    }

    pub fn get_value(&mut self, element: u32) -> BridgeResult<f64> {
        let answer = self.answered(Command::ElementGetValue { element })?;
        answer
            .as_float()
            .ok_or_else(|| mismatch(AnswerType::Float, &answer))
    }

    pub fn set_pos(&mut self, element: u32, x: i32, y: i32) -> BridgeResult<()> {
        self.post(Command::ElementSetPos { element, x, y })
    }

    pub fn set_size(&mut self, element: u32, width: u32, height: u32) -> BridgeResult<()> {
        self.post(Command::ElementSetSize {
            element,
            width,
            height,
        })
    }

    pub fn width(&mut self, element: u32) -> BridgeResult<u32> {
        self.uint(Command::ElementGetWidth { element })
    }

    pub fn height(&mut self, element: u32) -> BridgeResult<u32> {
        self.uint(Command::ElementGetHeight { element })
    }

    // ------------------------------------------------------------------
    // Canvas
    // ------------------------------------------------------------------

    pub fn open_context(&mut self, element: u32) -> BridgeResult<u32> {
        self.uint(Command::CanvasOpenContext { element })
    }

    pub fn set_color(&mut self, ctx: u32, r: u8, g: u8, b: u8, a: u8) -> BridgeResult<()> {
        self.post(Command::CanvasSetColor { ctx, r, g, b, a })
    }

    pub fn move_to(&mut self, ctx: u32, x: f32, y: f32) -> BridgeResult<()> {
        self.post(Command::CanvasMoveTo { ctx, x, y })
    }

    pub fn line_to(&mut self, ctx: u32, x: f32, y: f32) -> BridgeResult<()> {
        self.post(Command::CanvasLineTo { ctx, x, y })
    }

    pub fn rect_path(&mut self, ctx: u32, x: f32, y: f32, width: f32, height: f32) -> BridgeResult<()> {
        self.post(Command::CanvasRectPath {
            ctx,
            x,
            y,
            width,
            height,
        })
    }

    pub fn ellipse(&mut self, ctx: u32, x: f32, y: f32, width: f32, height: f32) -> BridgeResult<()> {
        self.post(Command::CanvasEllipse {
            ctx,
            x,
            y,
            width,
            height,
        })
    }

    pub fn fill_text(&mut self, ctx: u32, text: &str, x: f32, y: f32) -> BridgeResult<()> {
        self.post(Command::CanvasFillText {
            ctx,
            text: text.to_string(),
            x,
            y,
        })
    }

    pub fn fill_image(&mut self, ctx: u32, image: u32, x: i32, y: i32) -> BridgeResult<()> {
        self.post(Command::CanvasFillImage { ctx, image, x, y })
    }

    pub fn fill(&mut self, ctx: u32) -> BridgeResult<()> {
        self.post(Command::CanvasFill { ctx })
    }

    pub fn stroke(&mut self, ctx: u32) -> BridgeResult<()> {
        self.post(Command::CanvasStroke { ctx })
    }

    // ------------------------------------------------------------------
    // Resources / audio
    // ------------------------------------------------------------------

    pub fn upload_image(
        &mut self,
        width: u32,
        height: u32,
        stride: u32,
        is_rgb: bool,
        bytes: &[u8],
    ) -> BridgeResult<u32> {
        self.uint(Command::ResourceUploadImage {
            width,
            height,
            stride,
            is_rgb,
            bytes: bytes.to_vec(),
        })
    }

    pub fn create_audio_source(&mut self, sample_rate: f32, delay_seconds: f32) -> BridgeResult<u32> {
        self.uint(Command::AudioCreateSource {
            sample_rate,
            delay_seconds,
        })
    }

    /// Stages one channel of samples; they travel as little-endian f32.
    pub fn copy_to_channel(&mut self, source: u32, samples: &[f32], channel: u32) -> BridgeResult<()> {
        let samples = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.post(Command::AudioCopyToChannel {
            source,
            samples,
            channel,
        })
    }

    pub fn upload_audio(&mut self, source: u32) -> BridgeResult<()> {
        self.post(Command::AudioUpload { source })
    }

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------

    pub fn fetch(&mut self, url: &str) -> BridgeResult<u32> {
        self.uint(Command::NetFetch {
            url: url.to_string(),
        })
    }

    pub fn is_ready(&mut self, request: u32) -> BridgeResult<bool> {
        self.bool(Command::NetIsReady { request })
    }

    /// 0 pending, 1 ready, 2 failed.
    pub fn net_status(&mut self, request: u32) -> BridgeResult<u32> {
        self.uint(Command::NetGetStatus { request })
    }

    pub fn read(&mut self, request: u32, max_len: u32) -> BridgeResult<Vec<u8>> {
        self.bytes(Command::NetRead { request, max_len })
    }

    /// Reads into `buf` and returns the number of bytes written.
    pub fn read_into(&mut self, request: u32, buf: &mut [u8]) -> BridgeResult<usize> {
        let max_len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let chunk = self.read(request, max_len)?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn has_pending_event(&mut self) -> BridgeResult<bool> {
        self.bool(Command::EventHasPending)
    }

    pub fn pop_event(&mut self) -> BridgeResult<u64> {
        Ok(self.int(Command::EventPop)? as u64)
    }

    pub fn event_type(&mut self, event: u64) -> BridgeResult<EventKind> {
        let code = self.int(Command::EventGetType { event })?;
        u32::try_from(code)
            .ok()
            .and_then(EventKind::from_code)
            .ok_or_else(|| AnswerError::HostFault(format!("unknown event type {code}")).into())
    }

    pub fn event_target(&mut self, event: u64) -> BridgeResult<u32> {
        self.uint(Command::EventGetTarget { event })
    }

    pub fn event_arg(&mut self, event: u64, index: u32) -> BridgeResult<i64> {
        self.int(Command::EventGetArg { event, index })
    }

    /// Tells the host to stop serving this program.
    pub fn stop_execution(&mut self) -> BridgeResult<()> {
        self.post(Command::StopExecution)
    }

    // ------------------------------------------------------------------
    // Local imports (never cross the bridge)
    // ------------------------------------------------------------------

    pub fn print(&self, text: &str) {
        tracing::info!(target: "bridge::compute", "{}", text);
    }

    /// Milliseconds since the Unix epoch.
    pub fn now_ms(&self) -> u64 {
        current_timestamp_ms()
    }

    /// Cooperative sleep.
    pub fn yield_now(&self) {
        std::thread::sleep(self.config.yield_interval());
    }
}

fn mismatch(expected: AnswerType, answer: &Answer) -> BridgeError {
    AnswerError::TypeMismatch {
        expected: expected.name(),
        actual: answer.answer_type().name(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::core::host::BridgeBuilder;
    use crate::network::MemoryFetcher;

    #[test]
    fn test_fire_and_forget_does_not_wait() {
        let mut bridge = BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        // 主机尚未运行，无应答命令也能立即返回
        bridge.compute.set_text(0, "x").unwrap();
        bridge.compute.stop_execution().unwrap();
        assert_eq!(bridge.host.pump().unwrap(), 2);
        assert!(!bridge.host.is_running());
        assert_eq!(bridge.host.stats().failed_commands, 1);
    }

    #[test]
    fn test_round_trip_through_host_thread() {
        let bridge = BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        let mut compute = bridge.compute;
        let host = bridge.host.spawn().unwrap();

        let h = compute.create_element("input", "text-field").unwrap();
        compute.set_text(h, "héllo").unwrap();
        assert_eq!(compute.text_len(h).unwrap(), 6);
        assert_eq!(compute.get_text(h).unwrap(), "héllo");
        compute.stop_execution().unwrap();

        let host = host.join().unwrap();
        assert_eq!(host.stats().answers, 3);
    }

    #[test]
    fn test_disconnected_host_is_reported() {
        let bridge = BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        let mut compute = bridge.compute;
        drop(bridge.host);

        let err = compute.has_pending_event().unwrap_err();
        assert!(matches!(err, BridgeError::Answer(AnswerError::Disconnected)));
        assert!(!compute.answer_channel().is_in_flight());
        let err = compute.set_root(0).unwrap_err();
        assert!(matches!(err, BridgeError::Dispatch(DispatchError::ChannelClosed)));
    }

    #[test]
    fn test_local_imports() {
        let bridge = BridgeBuilder::new(BridgeConfig::default())
            .fetcher(MemoryFetcher::new())
            .build()
            .unwrap();
        assert!(bridge.compute.now_ms() > 1_600_000_000_000);
        bridge.compute.print("hello from compute");
    }
}
