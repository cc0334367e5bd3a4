//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **协议层错误** (`AnswerError`, `DispatchError`): 应答通道与命令分发的协议违规
//! - **资源层错误** (`ResourceError`, `EventError`): 句柄越界、事件队列误用
//! - **外部协作者错误** (`NetworkError`, `AudioError`): 主机侧不透明实现的失败
//!
//! `BridgeError` 可以同时承载以上所有错误。

use thiserror::Error;

/// 桥接层核心错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Answer channel error: {0}")]
    Answer(#[from] AnswerError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 应答通道错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnswerError {
    /// 主机写入应答时槽位不处于 WAITING 状态（没有未完成的请求）
    #[error("answer slot is not waiting for a reply (state {state})")]
    NotWaiting { state: u32 },

    /// 计算侧在上一个请求完成之前发起了新请求
    #[error("a request is already in flight")]
    RequestInFlight,

    /// 应答类型与声明类型不一致
    #[error("answer type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("payload of {len} bytes exceeds slot capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("timed out after {0}ms waiting for an answer")]
    TimedOut(u64),

    /// 主机处理请求失败，错误信息经由槽位回传
    #[error("host failed to answer: {0}")]
    HostFault(String),

    #[error("host side disconnected")]
    Disconnected,
}

/// 命令分发错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("bad arguments for `{command}`: {reason}")]
    BadArguments {
        command: &'static str,
        reason: String,
    },

    #[error("command channel closed")]
    ChannelClosed,
}

/// 资源表错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("invalid {table} handle {handle} (table length {len})")]
    InvalidHandle {
        table: &'static str,
        handle: u32,
        len: usize,
    },

    #[error("{0} table is full")]
    TableFull(&'static str),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("surface {width}x{height} exceeds the {limit} byte limit")]
    SurfaceTooLarge { width: u32, height: u32, limit: u64 },
}

/// 事件队列错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("popped an event although none is pending")]
    QueueEmpty,

    #[error("unknown event id {0}")]
    UnknownEvent(u64),

    #[error("event {0} is a global event and has no target")]
    NoTarget(u64),

    #[error("event {id} has no argument at index {index}")]
    ArgOutOfRange { id: u64, index: usize },
}

/// 网络请求错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("unsupported url `{0}`")]
    UnsupportedUrl(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("fetch worker is gone")]
    WorkerGone,

    #[error("failed to start fetch worker: {0}")]
    WorkerStart(String),
}

/// 音频系统错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f32),

    #[error("invalid start delay {0}s")]
    InvalidDelay(f32),

    #[error("buffer of {frames} frames at {sample_rate}Hz cannot be scheduled")]
    UnschedulableBuffer { frames: usize, sample_rate: f32 },

    #[error("sample buffer length {0} is not a multiple of 4 bytes")]
    MisalignedSamples(usize),

    #[error("channel index {channel} out of range (max {max})")]
    ChannelOutOfRange { channel: u32, max: u32 },

    #[error("audio output error: {0}")]
    Output(String),
}

/// 桥接层结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type AnswerResult<T> = Result<T, AnswerError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
pub type ResourceResult<T> = Result<T, ResourceError>;
pub type EventResult<T> = Result<T, EventError>;
pub type NetworkResult<T> = Result<T, NetworkError>;
pub type AudioResult<T> = Result<T, AudioError>;
