//! Unified Command Protocol
//!
//! The closed vocabulary the compute side may invoke on the host. Commands
//! travel as typed [`Command`] values; the string names exist for callers that
//! only have a wire name plus positional arguments (see [`Command::decode`]).

use serde::{Deserialize, Serialize};

use super::answer::AnswerType;
use crate::core::error::{DispatchError, DispatchResult};

macro_rules! command_ids {
    ($($variant:ident => $name:literal, $answer:expr;)*) => {
        /// Identifier of a command in the closed vocabulary.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum CommandId {
            $($variant),*
        }

        impl CommandId {
            pub const ALL: &'static [CommandId] = &[$(CommandId::$variant),*];

            /// Wire name of the command.
            pub fn name(self) -> &'static str {
                match self {
                    $(CommandId::$variant => $name),*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(CommandId::$variant),)*
                    _ => None,
                }
            }

            /// Declared answer type, `None` for fire-and-forget commands.
            pub fn answer_type(self) -> Option<AnswerType> {
                match self {
                    $(CommandId::$variant => $answer),*
                }
            }
        }
    };
}

command_ids! {
    ElementCreate => "element-create", Some(AnswerType::Int);
    ElementAppend => "element-append", None;
    ElementSetRoot => "element-set-root", None;
    ElementSetText => "element-set-text", None;
    ElementGetTextLength => "element-get-text-length", Some(AnswerType::Int);
    ElementGetText => "element-get-text", Some(AnswerType::Bytes);
    ElementSetAttribute => "element-set-attribute", None;
    ElementRemoveAttribute => "element-remove-attribute", None;
    ElementGetAttributeLength => "element-get-attribute-length", Some(AnswerType::Int);
    ElementGetAttribute => "element-get-attribute", Some(AnswerType::Bytes);
    ElementSetStyle => "element-set-style", None;
    ElementRemoveStyle => "element-remove-style", None;
    ElementGetStyleLength => "element-get-style-length", Some(AnswerType::Int);
    ElementGetStyle => "element-get-style", Some(AnswerType::Bytes);
    ElementGetValue => "element-get-value", Some(AnswerType::Float);
    ElementSetPos => "element-set-pos", None;
    ElementSetSize => "element-set-size", None;
    ElementGetWidth => "element-get-width", Some(AnswerType::Int);
    ElementGetHeight => "element-get-height", Some(AnswerType::Int);
    CanvasOpenContext => "canvas-open-context", Some(AnswerType::Int);
    CanvasSetColor => "canvas-set-color", None;
    CanvasMoveTo => "canvas-move-to", None;
    CanvasLineTo => "canvas-line-to", None;
    CanvasRectPath => "canvas-rect-path", None;
    CanvasEllipse => "canvas-ellipse", None;
    CanvasFillText => "canvas-fill-text", None;
    CanvasFillImage => "canvas-fill-image", None;
    CanvasFill => "canvas-fill", None;
    CanvasStroke => "canvas-stroke", None;
    ResourceUploadImage => "resource-upload-image", Some(AnswerType::Int);
    AudioCreateSource => "audio-create-source", Some(AnswerType::Int);
    AudioCopyToChannel => "audio-copy-to-channel", None;
    AudioUpload => "audio-upload", None;
    NetFetch => "net-fetch", Some(AnswerType::Int);
    NetIsReady => "net-is-ready", Some(AnswerType::Bool);
    NetGetStatus => "net-get-status", Some(AnswerType::Int);
    NetRead => "net-read", Some(AnswerType::Bytes);
    EventHasPending => "event-has-pending", Some(AnswerType::Bool);
    EventPop => "event-pop", Some(AnswerType::Int);
    EventGetType => "event-get-type", Some(AnswerType::Int);
    EventGetTarget => "event-get-target", Some(AnswerType::Int);
    EventGetArg => "event-get-arg", Some(AnswerType::Int);
    StopExecution => "stop-execution", None;
}

/// A request from the compute side, with its positional arguments.
///
/// Handles travel as raw `u32` indices; the host validates them on lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // Elements
    ElementCreate { tag: String, kind: String },
    ElementAppend { parent: u32, child: u32 },
    ElementSetRoot { element: u32 },
    ElementSetText { element: u32, text: String },
    ElementGetTextLength { element: u32 },
    ElementGetText { element: u32 },
    ElementSetAttribute { element: u32, name: String, value: String },
    ElementRemoveAttribute { element: u32, name: String },
    ElementGetAttributeLength { element: u32, name: String },
    ElementGetAttribute { element: u32, name: String },
    ElementSetStyle { element: u32, name: String, value: String },
    ElementRemoveStyle { element: u32, name: String },
    ElementGetStyleLength { element: u32, name: String },
    ElementGetStyle { element: u32, name: String },
    ElementGetValue { element: u32 },
    ElementSetPos { element: u32, x: i32, y: i32 },
    ElementSetSize { element: u32, width: u32, height: u32 },
    ElementGetWidth { element: u32 },
    ElementGetHeight { element: u32 },

    // Canvas
    CanvasOpenContext { element: u32 },
    CanvasSetColor { ctx: u32, r: u8, g: u8, b: u8, a: u8 },
    CanvasMoveTo { ctx: u32, x: f32, y: f32 },
    CanvasLineTo { ctx: u32, x: f32, y: f32 },
    CanvasRectPath { ctx: u32, x: f32, y: f32, width: f32, height: f32 },
    CanvasEllipse { ctx: u32, x: f32, y: f32, width: f32, height: f32 },
    CanvasFillText { ctx: u32, text: String, x: f32, y: f32 },
    CanvasFillImage { ctx: u32, image: u32, x: i32, y: i32 },
    CanvasFill { ctx: u32 },
    CanvasStroke { ctx: u32 },

    // Resources
    ResourceUploadImage { width: u32, height: u32, stride: u32, is_rgb: bool, bytes: Vec<u8> },

    // Audio
    AudioCreateSource { sample_rate: f32, delay_seconds: f32 },
    AudioCopyToChannel { source: u32, samples: Vec<u8>, channel: u32 },
    AudioUpload { source: u32 },

    // Network
    NetFetch { url: String },
    NetIsReady { request: u32 },
    NetGetStatus { request: u32 },
    NetRead { request: u32, max_len: u32 },

    // Events
    EventHasPending,
    EventPop,
    EventGetType { event: u64 },
    EventGetTarget { event: u64 },
    EventGetArg { event: u64, index: u32 },

    StopExecution,
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::ElementCreate { .. } => CommandId::ElementCreate,
            Command::ElementAppend { .. } => CommandId::ElementAppend,
            Command::ElementSetRoot { .. } => CommandId::ElementSetRoot,
            Command::ElementSetText { .. } => CommandId::ElementSetText,
            Command::ElementGetTextLength { .. } => CommandId::ElementGetTextLength,
            Command::ElementGetText { .. } => CommandId::ElementGetText,
            Command::ElementSetAttribute { .. } => CommandId::ElementSetAttribute,
            Command::ElementRemoveAttribute { .. } => CommandId::ElementRemoveAttribute,
            Command::ElementGetAttributeLength { .. } => CommandId::ElementGetAttributeLength,
            Command::ElementGetAttribute { .. } => CommandId::ElementGetAttribute,
            Command::ElementSetStyle { .. } => CommandId::ElementSetStyle,
            Command::ElementRemoveStyle { .. } => CommandId::ElementRemoveStyle,
            Command::ElementGetStyleLength { .. } => CommandId::ElementGetStyleLength,
            Command::ElementGetStyle { .. } => CommandId::ElementGetStyle,
            Command::ElementGetValue { .. } => CommandId::ElementGetValue,
            Command::ElementSetPos { .. } => CommandId::ElementSetPos,
            Command::ElementSetSize { .. } => CommandId::ElementSetSize,
            Command::ElementGetWidth { .. } => CommandId::ElementGetWidth,
            Command::ElementGetHeight { .. } => CommandId::ElementGetHeight,
            Command::CanvasOpenContext { .. } => CommandId::CanvasOpenContext,
            Command::CanvasSetColor { .. } => CommandId::CanvasSetColor,
            Command::CanvasMoveTo { .. } => CommandId::CanvasMoveTo,
            Command::CanvasLineTo { .. } => CommandId::CanvasLineTo,
            Command::CanvasRectPath { .. } => CommandId::CanvasRectPath,
            Command::CanvasEllipse { .. } => CommandId::CanvasEllipse,
            Command::CanvasFillText { .. } => CommandId::CanvasFillText,
            Command::CanvasFillImage { .. } => CommandId::CanvasFillImage,
            Command::CanvasFill { .. } => CommandId::CanvasFill,
            Command::CanvasStroke { .. } => CommandId::CanvasStroke,
            Command::ResourceUploadImage { .. } => CommandId::ResourceUploadImage,
            Command::AudioCreateSource { .. } => CommandId::AudioCreateSource,
            Command::AudioCopyToChannel { .. } => CommandId::AudioCopyToChannel,
            Command::AudioUpload { .. } => CommandId::AudioUpload,
            Command::NetFetch { .. } => CommandId::NetFetch,
            Command::NetIsReady { .. } => CommandId::NetIsReady,
            Command::NetGetStatus { .. } => CommandId::NetGetStatus,
            Command::NetRead { .. } => CommandId::NetRead,
            Command::EventHasPending => CommandId::EventHasPending,
            Command::EventPop => CommandId::EventPop,
            Command::EventGetType { .. } => CommandId::EventGetType,
            Command::EventGetTarget { .. } => CommandId::EventGetTarget,
            Command::EventGetArg { .. } => CommandId::EventGetArg,
            Command::StopExecution => CommandId::StopExecution,
        }
    }

    pub fn name(&self) -> &'static str {
        self.id().name()
    }

    pub fn answer_type(&self) -> Option<AnswerType> {
        self.id().answer_type()
    }

    /// Decodes a wire name plus positional arguments into a typed command.
    ///
    /// Unknown names fail with `UnknownCommand`; wrong arity or argument
    /// kinds fail with `BadArguments`.
    pub fn decode(name: &str, args: &[Arg]) -> DispatchResult<Command> {
        let id = CommandId::from_name(name)
            .ok_or_else(|| DispatchError::UnknownCommand(name.to_string()))?;
        let mut r = ArgReader::new(id.name(), args);

        let command = match id {
            CommandId::ElementCreate => Command::ElementCreate {
                tag: r.string()?,
                kind: r.string()?,
            },
            CommandId::ElementAppend => Command::ElementAppend {
                parent: r.handle()?,
                child: r.handle()?,
            },
            CommandId::ElementSetRoot => Command::ElementSetRoot { element: r.handle()? },
            CommandId::ElementSetText => Command::ElementSetText {
                element: r.handle()?,
                text: r.string()?,
            },
            CommandId::ElementGetTextLength => Command::ElementGetTextLength { element: r.handle()? },
            CommandId::ElementGetText => Command::ElementGetText { element: r.handle()? },
            CommandId::ElementSetAttribute => Command::ElementSetAttribute {
                element: r.handle()?,
                name: r.string()?,
                value: r.string()?,
            },
            CommandId::ElementRemoveAttribute => Command::ElementRemoveAttribute {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementGetAttributeLength => Command::ElementGetAttributeLength {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementGetAttribute => Command::ElementGetAttribute {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementSetStyle => Command::ElementSetStyle {
                element: r.handle()?,
                name: r.string()?,
                value: r.string()?,
            },
            CommandId::ElementRemoveStyle => Command::ElementRemoveStyle {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementGetStyleLength => Command::ElementGetStyleLength {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementGetStyle => Command::ElementGetStyle {
                element: r.handle()?,
                name: r.string()?,
            },
            CommandId::ElementGetValue => Command::ElementGetValue { element: r.handle()? },
            CommandId::ElementSetPos => Command::ElementSetPos {
                element: r.handle()?,
                x: r.i32()?,
                y: r.i32()?,
            },
            CommandId::ElementSetSize => Command::ElementSetSize {
                element: r.handle()?,
                width: r.u32()?,
                height: r.u32()?,
            },
            CommandId::ElementGetWidth => Command::ElementGetWidth { element: r.handle()? },
            CommandId::ElementGetHeight => Command::ElementGetHeight { element: r.handle()? },
            CommandId::CanvasOpenContext => Command::CanvasOpenContext { element: r.handle()? },
            CommandId::CanvasSetColor => Command::CanvasSetColor {
                ctx: r.handle()?,
                r: r.u8()?,
                g: r.u8()?,
                b: r.u8()?,
                a: r.u8()?,
            },
            CommandId::CanvasMoveTo => Command::CanvasMoveTo {
                ctx: r.handle()?,
                x: r.f32()?,
                y: r.f32()?,
            },
            CommandId::CanvasLineTo => Command::CanvasLineTo {
                ctx: r.handle()?,
                x: r.f32()?,
                y: r.f32()?,
            },
            CommandId::CanvasRectPath => Command::CanvasRectPath {
                ctx: r.handle()?,
                x: r.f32()?,
                y: r.f32()?,
                width: r.f32()?,
                height: r.f32()?,
            },
            CommandId::CanvasEllipse => Command::CanvasEllipse {
                ctx: r.handle()?,
                x: r.f32()?,
                y: r.f32()?,
                width: r.f32()?,
                height: r.f32()?,
            },
            CommandId::CanvasFillText => Command::CanvasFillText {
                ctx: r.handle()?,
                text: r.string()?,
                x: r.f32()?,
                y: r.f32()?,
            },
            CommandId::CanvasFillImage => Command::CanvasFillImage {
                ctx: r.handle()?,
                image: r.handle()?,
                x: r.i32()?,
                y: r.i32()?,
            },
            CommandId::CanvasFill => Command::CanvasFill { ctx: r.handle()? },
            CommandId::CanvasStroke => Command::CanvasStroke { ctx: r.handle()? },
            CommandId::ResourceUploadImage => Command::ResourceUploadImage {
                width: r.u32()?,
                height: r.u32()?,
                stride: r.u32()?,
                is_rgb: r.bool()?,
                bytes: r.bytes()?,
            },
            CommandId::AudioCreateSource => Command::AudioCreateSource {
                sample_rate: r.f32()?,
                delay_seconds: r.f32()?,
            },
            CommandId::AudioCopyToChannel => Command::AudioCopyToChannel {
                source: r.handle()?,
                samples: r.bytes()?,
                channel: r.u32()?,
            },
            CommandId::AudioUpload => Command::AudioUpload { source: r.handle()? },
            CommandId::NetFetch => Command::NetFetch { url: r.string()? },
            CommandId::NetIsReady => Command::NetIsReady { request: r.handle()? },
            CommandId::NetGetStatus => Command::NetGetStatus { request: r.handle()? },
            CommandId::NetRead => Command::NetRead {
                request: r.handle()?,
                max_len: r.u32()?,
            },
            CommandId::EventHasPending => Command::EventHasPending,
            CommandId::EventPop => Command::EventPop,
            CommandId::EventGetType => Command::EventGetType { event: r.u64()? },
            CommandId::EventGetTarget => Command::EventGetTarget { event: r.u64()? },
            CommandId::EventGetArg => Command::EventGetArg {
                event: r.u64()?,
                index: r.u32()?,
            },
            CommandId::StopExecution => Command::StopExecution,
        };
        r.finish()?;
        Ok(command)
    }
}

/// A positional argument as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Arg {
    fn kind(&self) -> &'static str {
        match self {
            Arg::Int(_) => "int",
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
            Arg::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self {
        Arg::Bytes(v)
    }
}

/// Sequential positional-argument reader with range checks.
struct ArgReader<'a> {
    command: &'static str,
    args: &'a [Arg],
    pos: usize,
}

impl<'a> ArgReader<'a> {
    fn new(command: &'static str, args: &'a [Arg]) -> Self {
        Self { command, args, pos: 0 }
    }

    fn bad(&self, reason: String) -> DispatchError {
        DispatchError::BadArguments {
            command: self.command,
            reason,
        }
    }

    fn next(&mut self) -> DispatchResult<&'a Arg> {
        let arg = self
            .args
            .get(self.pos)
            .ok_or_else(|| self.bad(format!("missing argument {}", self.pos)))?;
        self.pos += 1;
        Ok(arg)
    }

    fn int(&mut self) -> DispatchResult<i64> {
        let index = self.pos;
        match self.next()? {
            Arg::Int(v) => Ok(*v),
            // 计算侧整数可能以浮点形式到达，只接受整值
            Arg::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(*f as i64),
            other => Err(self.bad(format!("argument {} must be an int, got {}", index, other.kind()))),
        }
    }

    fn ranged<T: TryFrom<i64>>(&mut self, what: &str) -> DispatchResult<T> {
        let index = self.pos;
        let v = self.int()?;
        T::try_from(v).map_err(|_| self.bad(format!("argument {} ({}) out of range for {}", index, v, what)))
    }

    fn handle(&mut self) -> DispatchResult<u32> {
        self.ranged("a handle")
    }

    fn u32(&mut self) -> DispatchResult<u32> {
        self.ranged("u32")
    }

    fn i32(&mut self) -> DispatchResult<i32> {
        self.ranged("i32")
    }

    fn u8(&mut self) -> DispatchResult<u8> {
        self.ranged("u8")
    }

    fn u64(&mut self) -> DispatchResult<u64> {
        self.ranged("u64")
    }

    fn bool(&mut self) -> DispatchResult<bool> {
        Ok(self.int()? != 0)
    }

    fn f32(&mut self) -> DispatchResult<f32> {
        let index = self.pos;
        match self.next()? {
            Arg::Float(f) => Ok(*f as f32),
            Arg::Int(v) => Ok(*v as f32),
            other => Err(self.bad(format!("argument {} must be a number, got {}", index, other.kind()))),
        }
    }

    fn string(&mut self) -> DispatchResult<String> {
        let index = self.pos;
        match self.next()? {
            Arg::Str(s) => Ok(s.clone()),
            Arg::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            other => Err(self.bad(format!("argument {} must be a string, got {}", index, other.kind()))),
        }
    }

    fn bytes(&mut self) -> DispatchResult<Vec<u8>> {
        let index = self.pos;
        match self.next()? {
            Arg::Bytes(b) => Ok(b.clone()),
            Arg::Str(s) => Ok(s.as_bytes().to_vec()),
            other => Err(self.bad(format!("argument {} must be bytes, got {}", index, other.kind()))),
        }
    }

    fn finish(&self) -> DispatchResult<()> {
        if self.pos == self.args.len() {
            Ok(())
        } else {
            Err(self.bad(format!(
                "expected {} arguments, got {}",
                self.pos,
                self.args.len()
            )))
        }
    }
}
