//! 上传的位图资源
//!
//! 计算侧上传的是带行跨度的 RGB/RGBA 原始字节。首次绘制时转换为紧凑的
//! RGBA8 图像并缓存，随后释放源字节。

use image::RgbaImage;

use crate::core::error::{ResourceError, ResourceResult};

/// 源像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 3 字节/像素，转换时 alpha 固定为 0xFF
    Rgb,
    /// 4 字节/像素
    Rgba,
}

impl ImageFormat {
    pub fn from_is_rgb(is_rgb: bool) -> Self {
        if is_rgb {
            ImageFormat::Rgb
        } else {
            ImageFormat::Rgba
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgb => 3,
            ImageFormat::Rgba => 4,
        }
    }
}

/// 图像表条目
#[derive(Debug)]
pub struct UploadedImage {
    pub width: u32,
    pub height: u32,
    /// 每行字节数（可能大于 width × 每像素字节数）
    pub stride: u32,
    pub format: ImageFormat,
    /// 源字节；转换后置空
    source: Option<Vec<u8>>,
    /// 转换后的 RGBA 图像
    converted: Option<RgbaImage>,
}

impl UploadedImage {
    /// 校验尺寸并创建条目
    pub fn new(
        width: u32,
        height: u32,
        stride: u32,
        format: ImageFormat,
        bytes: Vec<u8>,
    ) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidImage(format!(
                "empty image {}x{}",
                width, height
            )));
        }
        let min_stride = width as usize * format.bytes_per_pixel();
        if (stride as usize) < min_stride {
            return Err(ResourceError::InvalidImage(format!(
                "stride {} is smaller than a {}-pixel row ({} bytes)",
                stride, width, min_stride
            )));
        }
        // 最后一行不要求补齐到完整跨度
        let required = stride as usize * (height as usize - 1) + min_stride;
        if bytes.len() < required {
            return Err(ResourceError::InvalidImage(format!(
                "{} bytes supplied, {} required",
                bytes.len(),
                required
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            source: Some(bytes),
            converted: None,
        })
    }

    /// 是否已转换（源字节已释放）
    pub fn is_converted(&self) -> bool {
        self.converted.is_some()
    }

    /// 获取 RGBA 图像，首次调用时转换
    pub fn rgba(&mut self) -> &RgbaImage {
        let (width, height, stride, format) = (self.width, self.height, self.stride, self.format);
        let source = &mut self.source;
        self.converted.get_or_insert_with(|| {
            let bytes = source.take().unwrap_or_default();
            convert_to_rgba(width, height, stride, format, &bytes)
        })
    }
}

fn convert_to_rgba(
    width: u32,
    height: u32,
    stride: u32,
    format: ImageFormat,
    source: &[u8],
) -> RgbaImage {
    let bpp = format.bytes_per_pixel();
    let stride = stride as usize;
    RgbaImage::from_fn(width, height, |x, y| {
        let offset = y as usize * stride + x as usize * bpp;
        match source.get(offset..offset + bpp) {
            Some(px) => {
                let alpha = match format {
                    ImageFormat::Rgb => 0xFF,
                    ImageFormat::Rgba => px[3],
                };
                image::Rgba([px[0], px[1], px[2], alpha])
            }
            None => image::Rgba([0, 0, 0, 0]),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_source_gets_opaque_alpha() {
        // 2x1 RGB，跨度带 2 字节填充
        let bytes = vec![10, 20, 30, 40, 50, 60, 0, 0];
        let mut img = UploadedImage::new(2, 1, 8, ImageFormat::Rgb, bytes).unwrap();
        let rgba = img.rgba();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 0xFF]);
        assert_eq!(rgba.get_pixel(1, 0).0, [40, 50, 60, 0xFF]);
        assert!(img.is_converted());
    }

    #[test]
    fn test_rgba_source_keeps_alpha() {
        let bytes = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut img = UploadedImage::new(1, 2, 4, ImageFormat::Rgba, bytes).unwrap();
        assert_eq!(img.rgba().get_pixel(0, 1).0, [5, 6, 7, 8]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = UploadedImage::new(4, 4, 16, ImageFormat::Rgba, vec![0; 10]).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidImage(_)));
    }

    #[test]
    fn test_stride_smaller_than_row_rejected() {
        let err = UploadedImage::new(4, 1, 8, ImageFormat::Rgba, vec![0; 16]).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidImage(_)));
    }
}
