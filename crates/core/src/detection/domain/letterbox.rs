//! Aspect-preserving resize-with-padding into the model's square input.

use ndarray::Array4;

use crate::shared::constants::LETTERBOX_FILL;
use crate::shared::frame::Frame;

/// Geometry of one letterbox transform, kept so boxes predicted in model
/// space can be mapped back onto the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub target_size: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl Letterbox {
    /// Computes the transform fitting `src_w` × `src_h` into `target_size`².
    pub fn fit(src_w: u32, src_h: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / src_w.max(1) as f32).min(target / src_h.max(1) as f32);
        let resized_width = ((src_w as f32 * scale).round() as u32).min(target_size);
        let resized_height = ((src_h as f32 * scale).round() as u32).min(target_size);
        Self {
            target_size,
            scale,
            pad_x: (target_size - resized_width) / 2,
            pad_y: (target_size - resized_height) / 2,
            resized_width,
            resized_height,
        }
    }

    /// Maps a point from model-input space back to source-frame space.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Maps a point from source-frame space into model-input space.
    pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }
}

/// Letterbox-resize a frame into a `[1, 3, T, T]` tensor normalized to [0, 1].
///
/// Uses nearest-neighbour sampling; the border is filled with 114/255 gray.
pub fn letterbox(frame: &Frame, target_size: u32) -> (Array4<f32>, Letterbox) {
    let geometry = Letterbox::fit(frame.width(), frame.height(), target_size);
    let t = target_size as usize;
    let fill = LETTERBOX_FILL as f32 / 255.0;
    let mut tensor = Array4::<f32>::from_elem((1, 3, t, t), fill);

    if frame.is_empty() {
        return (tensor, geometry);
    }

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let channels = (frame.channels() as usize).min(3);
    let scale = geometry.scale as f64;

    for y in 0..geometry.resized_height as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        let ty = geometry.pad_y as usize + y;
        for x in 0..geometry.resized_width as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let tx = geometry.pad_x as usize + x;
            for c in 0..3 {
                // Gray sources are broadcast over all three channels.
                let sc = if channels == 3 { c } else { 0 };
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, sc]] as f32 / 255.0;
            }
        }
    }

    (tensor, geometry)
}
