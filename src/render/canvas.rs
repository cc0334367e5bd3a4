//! 画布上下文
//!
//! 每个上下文绑定一个元素，拥有一块原生绘制表面和一份命令缓冲。
//! 表面如何光栅化由 [`DrawSurface`] 实现决定；默认实现是 [`super::RasterSurface`]。

use image::RgbaImage;

use super::draw_buffer::{Color, DrawCommand, DrawCommandBuffer};
use super::raster::RasterSurface;
use crate::config::CanvasConfig;
use crate::core::error::{ResourceError, ResourceResult};
use crate::resources::{Handle, ResourceTable, UploadedImage};
use crate::ui::Element;

/// 画布上下文句柄
pub type CanvasHandle = Handle<CanvasContext>;

/// 原生绘制表面（立即模式路径 API）
///
/// 所有方法都在主机线程上、帧刷新期间调用。
pub trait DrawSurface: Send {
    /// 像素尺寸
    fn size(&self) -> (u32, u32);

    /// 清除全部像素并丢弃当前路径
    fn clear(&mut self);

    /// 同时设置填充色和描边色
    fn set_color(&mut self, color: Color);

    fn set_line_width(&mut self, width: f32);

    fn begin_path(&mut self);

    fn move_to(&mut self, x: f32, y: f32);

    fn line_to(&mut self, x: f32, y: f32);

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// 以 (x, y) 为左上角、width × height 为外接矩形的椭圆子路径
    fn ellipse(&mut self, x: f32, y: f32, width: f32, height: f32);

    fn fill(&mut self);

    fn stroke(&mut self);

    /// 文本按左对齐、顶部基线绘制
    fn fill_text(&mut self, text: &str, x: f32, y: f32);

    /// 直接写入像素，不做混合
    fn put_image(&mut self, image: &RgbaImage, x: i32, y: i32);

    /// 当前路径是否为空
    fn path_is_empty(&self) -> bool;

    /// 像素快照（不支持回读的表面返回 `None`）
    fn pixels(&self) -> Option<&RgbaImage> {
        None
    }
}

/// 绘制表面工厂
pub trait SurfaceFactory: Send {
    fn create(&mut self, width: u32, height: u32) -> Box<dyn DrawSurface>;
}

/// 生成 [`RasterSurface`] 的默认工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterSurfaceFactory;

impl SurfaceFactory for RasterSurfaceFactory {
    fn create(&mut self, width: u32, height: u32) -> Box<dyn DrawSurface> {
        Box::new(RasterSurface::new(width, height))
    }
}

/// 画布上下文表条目
pub struct CanvasContext {
    /// 所属元素
    pub owner: u32,
    surface: Box<dyn DrawSurface>,
    buffer: DrawCommandBuffer,
}

impl CanvasContext {
    pub fn surface(&self) -> &dyn DrawSurface {
        self.surface.as_ref()
    }

    pub fn buffer(&self) -> &DrawCommandBuffer {
        &self.buffer
    }
}

impl std::fmt::Debug for CanvasContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasContext")
            .field("owner", &self.owner)
            .field("size", &self.surface.size())
            .field("pending", &self.buffer.len())
            .finish()
    }
}

/// 一次帧刷新的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub contexts: usize,
    pub commands: usize,
    /// 因图像句柄无效而跳过的命令
    pub skipped: usize,
}

/// 所有画布上下文
pub struct Canvas {
    contexts: ResourceTable<CanvasContext>,
    factory: Box<dyn SurfaceFactory>,
    config: CanvasConfig,
}

impl Canvas {
    pub fn new(config: CanvasConfig) -> Self {
        Self::with_factory(config, Box::new(RasterSurfaceFactory))
    }

    pub fn with_factory(config: CanvasConfig, factory: Box<dyn SurfaceFactory>) -> Self {
        Self {
            contexts: ResourceTable::new("canvas context"),
            factory,
            config,
        }
    }

    pub fn contexts(&self) -> &ResourceTable<CanvasContext> {
        &self.contexts
    }

    pub fn context(&self, handle: CanvasHandle) -> ResourceResult<&CanvasContext> {
        self.contexts.get(handle)
    }

    /// 表面像素尺寸；像素缓冲超过 `max_surface_bytes` 时返回错误
    fn surface_size(&self, element: &Element) -> ResourceResult<(u32, u32)> {
        let ratio = self.config.device_pixel_ratio;
        let (w, h) = if element.width == 0 || element.height == 0 {
            (self.config.fallback_width, self.config.fallback_height)
        } else {
            (element.width, element.height)
        };
        // f32 -> u32 的转换是饱和的
        let scale = |v: u32| ((v as f32 * ratio).round() as u32).max(1);
        let (w, h) = (scale(w), scale(h));
        let limit = self.config.max_surface_bytes;
        match (w as u64).checked_mul(h as u64).and_then(|px| px.checked_mul(4)) {
            Some(bytes) if bytes <= limit => Ok((w, h)),
            _ => Err(ResourceError::SurfaceTooLarge {
                width: w,
                height: h,
                limit,
            }),
        }
    }

    fn fresh_surface(&mut self, element: &Element) -> ResourceResult<Box<dyn DrawSurface>> {
        let (w, h) = self.surface_size(element)?;
        let mut surface = self.factory.create(w, h);
        surface.set_line_width(self.config.line_width);
        surface.begin_path();
        Ok(surface)
    }

    /// 打开元素的绘制上下文
    ///
    /// 元素已有上下文时返回同一句柄，表面按当前元素尺寸重建（即清空），
    /// 尚未刷新的命令一并丢弃。
    pub fn open_context(&mut self, owner: u32, element: &Element) -> ResourceResult<CanvasHandle> {
        let existing = self
            .contexts
            .iter()
            .find(|(_, ctx)| ctx.owner == owner)
            .map(|(handle, _)| handle);

        let surface = self.fresh_surface(element)?;
        match existing {
            Some(handle) => {
                let ctx = self.contexts.get_mut(handle)?;
                ctx.surface = surface;
                let dropped = ctx.buffer.drain().count();
                tracing::debug!(target: "bridge::canvas", ctx = handle.raw(), owner, dropped, "Reopened canvas context");
                Ok(handle)
            }
            None => {
                let (w, h) = surface.size();
                let handle = self.contexts.create(CanvasContext {
                    owner,
                    surface,
                    buffer: DrawCommandBuffer::new(),
                })?;
                tracing::debug!(target: "bridge::canvas", ctx = handle.raw(), owner, width = w, height = h, "Opened canvas context");
                Ok(handle)
            }
        }
    }

    /// 记录一条绘制命令
    pub fn record(&mut self, handle: CanvasHandle, command: DrawCommand) -> ResourceResult<()> {
        self.contexts.get_mut(handle)?.buffer.record(command);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.contexts.iter().map(|(_, ctx)| ctx.buffer.len()).sum()
    }

    /// 按记录顺序执行所有上下文的命令并清空缓冲（每帧一次）
    pub fn flush(&mut self, images: &mut ResourceTable<UploadedImage>) -> FlushStats {
        let mut stats = FlushStats::default();
        for (handle, ctx) in self.contexts.iter_mut() {
            if ctx.buffer.is_empty() {
                continue;
            }
            stats.contexts += 1;
            let surface = ctx.surface.as_mut();
            for command in ctx.buffer.drain() {
                stats.commands += 1;
                if !execute(surface, command, images) {
                    stats.skipped += 1;
                }
            }
            tracing::trace!(target: "bridge::canvas", ctx = handle.raw(), "Flushed draw commands");
        }
        stats
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("contexts", &self.contexts.len())
            .field("config", &self.config)
            .finish()
    }
}

/// 执行单条命令；图像句柄无效时返回 `false`
fn execute(
    surface: &mut dyn DrawSurface,
    command: DrawCommand,
    images: &mut ResourceTable<UploadedImage>,
) -> bool {
    match command {
        DrawCommand::SetColor(color) => surface.set_color(color),
        DrawCommand::MoveTo { x, y } => surface.move_to(x, y),
        DrawCommand::LineTo { x, y } => surface.line_to(x, y),
        DrawCommand::RectPath { x, y, width, height } => surface.rect(x, y, width, height),
        DrawCommand::Ellipse { x, y, width, height } => surface.ellipse(x, y, width, height),
        DrawCommand::FillText { text, x, y } => surface.fill_text(&text, x, y),
        DrawCommand::FillImage { image, x, y } => match images.get_mut(Handle::from_raw(image)) {
            Ok(uploaded) => surface.put_image(uploaded.rgba(), x, y),
            Err(e) => {
                tracing::error!(target: "bridge::canvas", error = %e, "Skipping fill-image");
                return false;
            }
        },
        DrawCommand::Fill => {
            surface.fill();
            surface.begin_path();
        }
        DrawCommand::Stroke => {
            surface.stroke();
            surface.begin_path();
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ImageFormat;

    fn canvas_element(w: u32, h: u32) -> Element {
        let mut element = Element::new("canvas", "canvas");
        element.width = w;
        element.height = h;
        element
    }

    #[test]
    fn test_surface_size_uses_pixel_ratio() {
        let config = CanvasConfig {
            device_pixel_ratio: 2.0,
            ..Default::default()
        };
        let mut canvas = Canvas::new(config);
        let ctx = canvas.open_context(0, &canvas_element(20, 10)).unwrap();
        assert_eq!(canvas.context(ctx).unwrap().surface().size(), (40, 20));
    }

    #[test]
    fn test_oversized_surface_is_rejected() {
        let mut canvas = Canvas::new(CanvasConfig::default());
        for (w, h) in [(u32::MAX, u32::MAX), (100_000, 100_000), (4097, 4096)] {
            let err = canvas.open_context(0, &canvas_element(w, h)).unwrap_err();
            assert!(matches!(err, ResourceError::SurfaceTooLarge { .. }), "{w}x{h}");
        }
        assert!(canvas.contexts().is_empty());
    }

    #[test]
    fn test_pixel_ratio_counts_towards_surface_limit() {
        let config = CanvasConfig {
            device_pixel_ratio: 3.0,
            max_surface_bytes: 100 * 100 * 4,
            ..Default::default()
        };
        let mut canvas = Canvas::new(config);
        assert!(canvas.open_context(0, &canvas_element(33, 33)).is_ok());
        let err = canvas.open_context(1, &canvas_element(34, 34)).unwrap_err();
        assert!(matches!(err, ResourceError::SurfaceTooLarge { width: 102, height: 102, .. }));
    }

    #[test]
    fn test_reopen_returns_same_context_and_clears() {
        let mut canvas = Canvas::new(CanvasConfig::default());
        let element = canvas_element(4, 4);
        let ctx = canvas.open_context(3, &element).unwrap();
        canvas.record(ctx, DrawCommand::RectPath { x: 0.0, y: 0.0, width: 4.0, height: 4.0 }).unwrap();
        canvas.record(ctx, DrawCommand::Fill).unwrap();
        let mut images = ResourceTable::new("image");
        canvas.flush(&mut images);
        let painted = canvas.context(ctx).unwrap().surface().pixels().unwrap().get_pixel(1, 1).0;
        assert_eq!(painted, [0, 0, 0, 255]);

        canvas.record(ctx, DrawCommand::Fill).unwrap();
        let again = canvas.open_context(3, &element).unwrap();
        assert_eq!(again, ctx);
        assert_eq!(canvas.pending(), 0);
        let cleared = canvas.context(ctx).unwrap().surface().pixels().unwrap().get_pixel(1, 1).0;
        assert_eq!(cleared, [0, 0, 0, 0]);
    }

    #[test]
    fn test_flush_twice_is_noop() {
        let mut canvas = Canvas::new(CanvasConfig::default());
        let ctx = canvas.open_context(0, &canvas_element(8, 8)).unwrap();
        canvas.record(ctx, DrawCommand::SetColor(Color::rgba(255, 0, 0, 255))).unwrap();
        let mut images = ResourceTable::new("image");
        assert_eq!(canvas.flush(&mut images).commands, 1);
        assert_eq!(canvas.flush(&mut images), FlushStats::default());
    }

    #[test]
    fn test_fill_image_with_bad_handle_is_skipped() {
        let mut canvas = Canvas::new(CanvasConfig::default());
        let ctx = canvas.open_context(0, &canvas_element(8, 8)).unwrap();
        canvas.record(ctx, DrawCommand::FillImage { image: 5, x: 0, y: 0 }).unwrap();
        let mut images = ResourceTable::new("image");
        assert_eq!(canvas.flush(&mut images).skipped, 1);
    }

    #[test]
    fn test_fill_image_converts_once() {
        let mut canvas = Canvas::new(CanvasConfig::default());
        let ctx = canvas.open_context(0, &canvas_element(4, 4)).unwrap();
        let mut images = ResourceTable::new("image");
        let image = images
            .create(UploadedImage::new(1, 1, 3, ImageFormat::Rgb, vec![1, 2, 3]).unwrap())
            .unwrap();
        canvas.record(ctx, DrawCommand::FillImage { image: image.raw(), x: 2, y: 1 }).unwrap();
        canvas.flush(&mut images);
        assert!(images.get(image).unwrap().is_converted());
        let px = canvas.context(ctx).unwrap().surface().pixels().unwrap().get_pixel(2, 1).0;
        assert_eq!(px, [1, 2, 3, 255]);
    }
}
