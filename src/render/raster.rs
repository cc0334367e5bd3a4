//! 软件光栅化表面
//!
//! 基于 `image::RgbaImage` 的最小立即模式实现：非零环绕规则填充、
//! 按距离判定的线段描边、多边形近似椭圆。文本只记录不栅格化。

use image::{Rgba, RgbaImage};

use super::canvas::DrawSurface;
use super::draw_buffer::Color;

/// 椭圆近似的边数
const ELLIPSE_SEGMENTS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
struct SubPath {
    points: Vec<(f32, f32)>,
    closed: bool,
}

/// 已绘制的文本
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: Color,
}

/// 软件绘制表面
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
    color: Color,
    line_width: f32,
    path: Vec<SubPath>,
    text_runs: Vec<TextRun>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            color: Color::BLACK,
            line_width: 1.0,
            path: Vec::new(),
            text_runs: Vec::new(),
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    pub fn text_runs(&self) -> &[TextRun] {
        &self.text_runs
    }

    fn current(&mut self) -> Option<&mut SubPath> {
        self.path.last_mut().filter(|p| !p.closed)
    }

    /// source-over 混合
    fn blend(&mut self, x: u32, y: u32) {
        let Color { r, g, b, a } = self.color;
        let dst = self.pixels.get_pixel_mut(x, y);
        if a == 255 {
            *dst = Rgba([r, g, b, a]);
            return;
        }
        let sa = a as f32 / 255.0;
        let da = dst[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            *dst = Rgba([0, 0, 0, 0]);
            return;
        }
        let mix = |s: u8, d: u8| {
            let v = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
            v.round().clamp(0.0, 255.0) as u8
        };
        *dst = Rgba([
            mix(r, dst[0]),
            mix(g, dst[1]),
            mix(b, dst[2]),
            (out_a * 255.0).round() as u8,
        ]);
    }

    /// 路径的所有边；填充时每个子路径都隐式闭合
    fn edges(&self, close_all: bool) -> Vec<((f32, f32), (f32, f32))> {
        let mut edges = Vec::new();
        for sub in &self.path {
            let pts = &sub.points;
            for pair in pts.windows(2) {
                edges.push((pair[0], pair[1]));
            }
            if (sub.closed || close_all) && pts.len() > 2 {
                if let (Some(&first), Some(&last)) = (pts.first(), pts.last()) {
                    edges.push((last, first));
                }
            }
        }
        edges
    }
}

impl DrawSurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.text_runs.clear();
        self.path.clear();
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    fn begin_path(&mut self) {
        self.path.clear();
    }

    fn move_to(&mut self, x: f32, y: f32) {
        self.path.push(SubPath {
            points: vec![(x, y)],
            closed: false,
        });
    }

    fn line_to(&mut self, x: f32, y: f32) {
        match self.current() {
            Some(sub) => sub.points.push((x, y)),
            // 没有当前子路径时等同 move_to
            None => self.move_to(x, y),
        }
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.path.push(SubPath {
            points: vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)],
            closed: true,
        });
        self.move_to(x, y);
    }

    fn ellipse(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let (rx, ry) = (width / 2.0, height / 2.0);
        let (cx, cy) = (x + rx, y + ry);
        let points = (0..ELLIPSE_SEGMENTS)
            .map(|i| {
                let t = i as f32 / ELLIPSE_SEGMENTS as f32 * std::f32::consts::TAU;
                (cx + rx * t.cos(), cy + ry * t.sin())
            })
            .collect();
        self.path.push(SubPath { points, closed: true });
    }

    fn fill(&mut self) {
        let edges = self.edges(true);
        if edges.is_empty() {
            return;
        }
        let (width, height) = self.pixels.dimensions();
        let mut crossings: Vec<(f32, i32)> = Vec::new();
        for py in 0..height {
            let sy = py as f32 + 0.5;
            crossings.clear();
            for &((x0, y0), (x1, y1)) in &edges {
                if y0 == y1 {
                    continue;
                }
                let (dir, lo, hi) = if y0 < y1 { (1, y0, y1) } else { (-1, y1, y0) };
                if sy < lo || sy >= hi {
                    continue;
                }
                let t = (sy - y0) / (y1 - y0);
                crossings.push((x0 + t * (x1 - x0), dir));
            }
            if crossings.is_empty() {
                continue;
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for i in 0..crossings.len() - 1 {
                winding += crossings[i].1;
                if winding == 0 {
                    continue;
                }
                // 像素中心落在 [left, right) 内即覆盖
                let left = (crossings[i].0 - 0.5).ceil().max(0.0) as u32;
                let right = ((crossings[i + 1].0 - 0.5).ceil().max(0.0) as u32).min(width);
                for px in left..right {
                    self.blend(px, py);
                }
            }
        }
    }

    fn stroke(&mut self) {
        let edges = self.edges(false);
        let half = self.line_width / 2.0;
        let (width, height) = self.pixels.dimensions();
        for ((x0, y0), (x1, y1)) in edges {
            let min_x = (x0.min(x1) - half).floor().max(0.0) as u32;
            let max_x = ((x0.max(x1) + half).ceil().max(0.0) as u32).min(width);
            let min_y = (y0.min(y1) - half).floor().max(0.0) as u32;
            let max_y = ((y0.max(y1) + half).ceil().max(0.0) as u32).min(height);
            for py in min_y..max_y {
                for px in min_x..max_x {
                    let d = distance_to_segment((px as f32 + 0.5, py as f32 + 0.5), (x0, y0), (x1, y1));
                    if d <= half {
                        self.blend(px, py);
                    }
                }
            }
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        self.text_runs.push(TextRun {
            text: text.to_string(),
            x,
            y,
            color: self.color,
        });
    }

    fn put_image(&mut self, image: &RgbaImage, x: i32, y: i32) {
        // 在 i64 中裁剪，偏移接近 i32 边界时也不会溢出
        let clip = |offset: i32, src: u32, dst: u32| {
            let start = i64::from(offset).max(0);
            let end = (i64::from(offset) + i64::from(src)).min(i64::from(dst));
            (start < end).then(|| (start - i64::from(offset)) as u32..(end - i64::from(offset)) as u32)
        };
        let (width, height) = self.pixels.dimensions();
        let (Some(cols), Some(rows)) = (clip(x, image.width(), width), clip(y, image.height(), height)) else {
            return;
        };
        for sy in rows {
            let dy = (i64::from(y) + i64::from(sy)) as u32;
            for sx in cols.clone() {
                let dx = (i64::from(x) + i64::from(sx)) as u32;
                self.pixels.put_pixel(dx, dy, *image.get_pixel(sx, sy));
            }
        }
    }

    fn path_is_empty(&self) -> bool {
        self.path.is_empty()
    }

    fn pixels(&self) -> Option<&RgbaImage> {
        Some(&self.pixels)
    }
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgba(255, 0, 0, 255);

    fn solid(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([9, 8, 7, 255]))
    }

    fn painted(surface: &RasterSurface) -> usize {
        surface.pixels().unwrap().pixels().filter(|p| p.0[3] != 0).count()
    }

    #[test]
    fn test_put_image_clips_at_edges() {
        let mut surface = RasterSurface::new(8, 8);
        surface.put_image(&solid(4, 4), -2, 6);
        // 只有 (0..2, 6..8) 可见
        assert_eq!(painted(&surface), 4);
        assert_eq!(surface.pixels().unwrap().get_pixel(1, 7).0, [9, 8, 7, 255]);
        assert_eq!(surface.pixels().unwrap().get_pixel(2, 7).0[3], 0);
    }

    #[test]
    fn test_put_image_at_extreme_offsets() {
        let mut surface = RasterSurface::new(8, 8);
        for (x, y) in [
            (i32::MAX, 0),
            (0, i32::MAX),
            (i32::MAX - 1, i32::MAX - 1),
            (i32::MIN, 0),
            (0, i32::MIN),
            (i32::MIN, i32::MIN),
        ] {
            surface.put_image(&solid(4, 4), x, y);
        }
        assert_eq!(painted(&surface), 0);

        surface.put_image(&solid(4, 4), 6, 6);
        assert_eq!(painted(&surface), 4);
    }

    #[test]
    fn test_fill_rect_covers_exact_pixels() {
        let mut surface = RasterSurface::new(16, 16);
        surface.set_color(RED);
        surface.rect(0.0, 0.0, 10.0, 10.0);
        surface.fill();
        let img = surface.pixels().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(9, 9).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 9).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(9, 10).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_triangle_path_fill() {
        let mut surface = RasterSurface::new(10, 10);
        surface.move_to(0.0, 0.0);
        surface.line_to(10.0, 0.0);
        surface.line_to(0.0, 10.0);
        surface.fill();
        let img = surface.pixels().unwrap();
        assert_eq!(img.get_pixel(1, 1).0[3], 255);
        assert_eq!(img.get_pixel(8, 8).0[3], 0);
    }

    #[test]
    fn test_stroke_line() {
        let mut surface = RasterSurface::new(10, 10);
        surface.set_line_width(2.0);
        surface.move_to(0.0, 5.0);
        surface.line_to(10.0, 5.0);
        surface.stroke();
        let img = surface.pixels().unwrap();
        assert_eq!(img.get_pixel(5, 4).0[3], 255);
        assert_eq!(img.get_pixel(5, 1).0[3], 0);
    }

    #[test]
    fn test_ellipse_fill_centre() {
        let mut surface = RasterSurface::new(20, 20);
        surface.ellipse(0.0, 0.0, 20.0, 10.0);
        surface.fill();
        let img = surface.pixels().unwrap();
        assert_eq!(img.get_pixel(10, 5).0[3], 255);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(10, 15).0[3], 0);
    }

    #[test]
    fn test_half_alpha_blends() {
        let mut surface = RasterSurface::new(2, 1);
        surface.set_color(Color::rgba(0, 0, 255, 255));
        surface.rect(0.0, 0.0, 2.0, 1.0);
        surface.fill();
        surface.begin_path();
        surface.set_color(Color::rgba(255, 0, 0, 128));
        surface.rect(0.0, 0.0, 1.0, 1.0);
        surface.fill();
        let px = surface.pixels().unwrap().get_pixel(0, 0).0;
        assert_eq!(px[3], 255);
        assert!(px[0] > 120 && px[2] > 120);
    }

    #[test]
    fn test_put_image_clips_and_overwrites() {
        let mut surface = RasterSurface::new(2, 2);
        surface.set_color(RED);
        surface.rect(0.0, 0.0, 2.0, 2.0);
        surface.fill();
        let image = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        surface.put_image(&image, 1, 1);
        let img = surface.pixels().unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_fill_text_records_run() {
        let mut surface = RasterSurface::new(4, 4);
        surface.fill_text("hi", 1.0, 2.0);
        assert_eq!(surface.text_runs()[0].text, "hi");
    }
}
