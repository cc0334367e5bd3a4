//! 绘制命令缓冲
//!
//! 计算侧的画布调用只记录为 [`DrawCommand`]，主机每帧按记录顺序对原生
//! 绘制表面执行一次后清空。记录顺序即路径构建顺序，不做合并或重排。

use serde::{Deserialize, Serialize};

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// 已记录但尚未执行的画布操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    SetColor(Color),
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    RectPath { x: f32, y: f32, width: f32, height: f32 },
    Ellipse { x: f32, y: f32, width: f32, height: f32 },
    FillText { text: String, x: f32, y: f32 },
    FillImage { image: u32, x: i32, y: i32 },
    /// 填充当前路径并开始新路径
    Fill,
    /// 描边当前路径并开始新路径
    Stroke,
}

/// 单个画布上下文的命令列表
#[derive(Debug, Default, Clone)]
pub struct DrawCommandBuffer {
    commands: Vec<DrawCommand>,
    /// 累计记录数
    recorded: u64,
}

impl DrawCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, command: DrawCommand) {
        self.commands.push(command);
        self.recorded += 1;
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn total_recorded(&self) -> u64 {
        self.recorded
    }

    /// 取出全部命令（按记录顺序）并清空缓冲
    pub fn drain(&mut self) -> std::vec::Drain<'_, DrawCommand> {
        self.commands.drain(..)
    }
}
