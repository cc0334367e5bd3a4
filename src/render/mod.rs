pub mod canvas;
pub mod draw_buffer;
pub mod raster;

// Re-export canvas components for convenience
pub use canvas::{
    Canvas, CanvasContext, CanvasHandle, DrawSurface, FlushStats, RasterSurfaceFactory,
    SurfaceFactory,
};
pub use draw_buffer::{Color, DrawCommand, DrawCommandBuffer};
pub use raster::{RasterSurface, TextRun};
