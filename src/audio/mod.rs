//! 音频源模块
//!
//! 计算侧创建音频源、逐声道拷贝 f32 样本、再整体上传给主机的音频输出。
//! 音频如何混合与播放由 [`AudioOutput`] 实现决定。
//!
//! ## 补充数据
//!
//! 主机定时轮询每个音频源：已排程的音频即将播完（或从未上传过）时，
//! 发出一次 `audio-buffer-needed` 事件，直到下一次上传。

use std::time::{Duration, Instant};

use crate::core::error::{AudioError, AudioResult, BridgeError, ResourceResult};
use crate::resources::{Handle, ResourceTable};

/// 单个音频源最多的声道数
pub const MAX_CHANNELS: u32 = 32;

/// 允许的采样率范围（Hz）
pub const MIN_SAMPLE_RATE: f32 = 1.0;
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// 音频源句柄
pub type SourceHandle = Handle<AudioSource>;

/// 上传给输出端的一段音频
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: f32,
    /// 每个声道的样本
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// 帧数（最长声道的样本数）
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn duration(&self) -> AudioResult<Duration> {
        let frames = self.frames();
        Duration::try_from_secs_f64(frames as f64 / self.sample_rate as f64).map_err(|_| {
            AudioError::UnschedulableBuffer {
                frames,
                sample_rate: self.sample_rate,
            }
        })
    }
}

/// 音频输出（主机侧不透明实现）
pub trait AudioOutput: Send {
    /// 在 `start` 时刻开始播放 `buffer`
    fn schedule(&mut self, source: u32, buffer: AudioBuffer, start: Instant) -> AudioResult<()>;
}

/// 只记录日志的输出
#[derive(Debug, Default)]
pub struct NullAudioOutput {
    scheduled: u64,
}

impl NullAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }
}

impl AudioOutput for NullAudioOutput {
    fn schedule(&mut self, source: u32, buffer: AudioBuffer, _start: Instant) -> AudioResult<()> {
        self.scheduled += 1;
        tracing::debug!(
            target: "bridge::audio",
            source,
            frames = buffer.frames(),
            channels = buffer.channels.len(),
            "Audio buffer scheduled"
        );
        Ok(())
    }
}

/// 音频源表条目
#[derive(Debug, Clone)]
pub struct AudioSource {
    pub sample_rate: f32,
    /// 首次播放前的延迟
    pub delay: Duration,
    staged: Vec<Vec<f32>>,
    /// 已排程音频的结束时刻
    scheduled_end: Option<Instant>,
    /// 已请求补充、等待上传
    refill_requested: bool,
    uploads: u64,
}

impl AudioSource {
    pub fn staged_channels(&self) -> usize {
        self.staged.len()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn scheduled_end(&self) -> Option<Instant> {
        self.scheduled_end
    }
}

/// 把小端 f32 字节解码为样本
pub fn decode_samples(bytes: &[u8]) -> AudioResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AudioError::MisalignedSamples(bytes.len()));
    }
    let mut samples = vec![0f32; bytes.len() / 4];
    bytemuck::cast_slice_mut::<f32, u8>(&mut samples).copy_from_slice(bytes);
    if cfg!(target_endian = "big") {
        for s in &mut samples {
            *s = f32::from_bits(u32::from_le(s.to_bits()));
        }
    }
    Ok(samples)
}

/// 所有音频源及输出
pub struct Audio {
    sources: ResourceTable<AudioSource>,
    output: Box<dyn AudioOutput>,
}

impl Audio {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            sources: ResourceTable::new("audio source"),
            output,
        }
    }

    pub fn sources(&self) -> &ResourceTable<AudioSource> {
        &self.sources
    }

    pub fn create_source(&mut self, sample_rate: f32, delay_seconds: f32) -> Result<SourceHandle, BridgeError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(AudioError::InvalidSampleRate(sample_rate).into());
        }
        // 负数和 NaN 视为无延迟
        let delay = if delay_seconds > 0.0 {
            Duration::try_from_secs_f32(delay_seconds)
                .map_err(|_| AudioError::InvalidDelay(delay_seconds))?
        } else {
            Duration::ZERO
        };
        let handle = self.sources.create(AudioSource {
            sample_rate,
            delay,
            staged: Vec::new(),
            scheduled_end: None,
            refill_requested: false,
            uploads: 0,
        })?;
        tracing::debug!(target: "bridge::audio", source = handle.raw(), sample_rate, "Audio source created");
        Ok(handle)
    }

    /// 把样本暂存到指定声道，覆盖该声道原有内容
    pub fn copy_to_channel(
        &mut self,
        handle: SourceHandle,
        bytes: &[u8],
        channel: u32,
    ) -> Result<(), BridgeError> {
        if channel >= MAX_CHANNELS {
            return Err(AudioError::ChannelOutOfRange {
                channel,
                max: MAX_CHANNELS - 1,
            }
            .into());
        }
        let samples = decode_samples(bytes)?;
        let source = self.sources.get_mut(handle)?;
        let index = channel as usize;
        if source.staged.len() <= index {
            source.staged.resize_with(index + 1, Vec::new);
        }
        source.staged[index] = samples;
        Ok(())
    }

    /// 把暂存声道交给输出端，排在上一段之后播放
    pub fn upload(&mut self, handle: SourceHandle, now: Instant) -> Result<(), BridgeError> {
        let source = self.sources.get_mut(handle)?;
        if source.staged.is_empty() {
            tracing::warn!(target: "bridge::audio", source = handle.raw(), "Upload with no staged samples");
            return Ok(());
        }
        let buffer = AudioBuffer {
            sample_rate: source.sample_rate,
            channels: std::mem::take(&mut source.staged),
        };
        let start = match source.scheduled_end {
            Some(end) if end > now => Some(end),
            Some(_) => Some(now),
            None => now.checked_add(source.delay),
        };
        let end = match (start, buffer.duration()) {
            (Some(start), Ok(duration)) => start.checked_add(duration).map(|end| (start, end)),
            _ => None,
        };
        let Some((start, end)) = end else {
            // 暂存数据已取出，失败时直接丢弃
            return Err(AudioError::UnschedulableBuffer {
                frames: buffer.frames(),
                sample_rate: buffer.sample_rate,
            }
            .into());
        };
        source.scheduled_end = Some(end);
        source.refill_requested = false;
        source.uploads += 1;
        self.output.schedule(handle.raw(), buffer, start)?;
        Ok(())
    }

    /// 返回需要补充数据的音频源；每个源在下一次上传前只返回一次
    pub fn poll(&mut self, now: Instant, lookahead: Duration) -> Vec<SourceHandle> {
        let mut needed = Vec::new();
        for (handle, source) in self.sources.iter_mut() {
            if source.refill_requested {
                continue;
            }
            let running_out = match source.scheduled_end {
                Some(end) => end <= now + lookahead,
                None => true,
            };
            if running_out {
                source.refill_requested = true;
                needed.push(handle);
            }
        }
        needed
    }

    pub fn source(&self, handle: SourceHandle) -> ResourceResult<&AudioSource> {
        self.sources.get(handle)
    }
}

impl std::fmt::Debug for Audio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("sources", &self.sources.len())
            .finish()
    }
}
