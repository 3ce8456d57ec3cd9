use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::Array4;

/// Gray used by the YOLO exporter for letterbox padding.
pub const PAD_VALUE: f32 = 114.0 / 255.0;

/// How a photo was placed inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    /// Map a model-space coordinate back onto the original photo.
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize `img` to fit `size x size` keeping its aspect ratio, center it on a gray canvas
/// and return the normalized NCHW tensor.
pub fn letterbox(img: &DynamicImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (w0, h0) = img.dimensions();
    let scale = f32::min(size as f32 / w0 as f32, size as f32 / h0 as f32);
    let w_new = ((w0 as f32 * scale).round() as u32).clamp(1, size);
    let h_new = ((h0 as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = ((size - w_new) / 2) as f32;
    let pad_y = ((size - h_new) / 2) as f32;

    let resized = img.resize_exact(w_new, h_new, FilterType::Triangle).to_rgb8();

    let side = size as usize;
    let mut tensor = Array4::from_elem([1, 3, side, side], PAD_VALUE);
    let (ox, oy) = (pad_x as usize, pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize + ox, y as usize + oy);
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y, x]] = r as f32 / 255.0;
        tensor[[0, 1, y, x]] = g as f32 / 255.0;
        tensor[[0, 2, y, x]] = b as f32 / 255.0;
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
            orig_width: w0,
            orig_height: h0,
        },
    )
}
