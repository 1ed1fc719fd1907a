use std::time::SystemTime;

use ndarray::ArrayView3;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at the source boundary; everything downstream
/// treats the pixel data as `[height, width, channels]`.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    captured_at: SystemTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            captured_at: SystemTime::now(),
        }
    }

    pub fn with_capture_time(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// A frame with no pixels; sources may yield these while a stream warms up.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Nearest-neighbour resize to `width` × `height`.
    ///
    /// Keeps the index and capture time so the resized frame still
    /// identifies the original capture.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let c = self.channels as usize;
        let (dst_w, dst_h) = (width as usize, height as usize);
        let mut out = vec![0u8; dst_w * dst_h * c];
        if !self.is_empty() {
            let src_w = self.width as usize;
            let src_h = self.height as usize;
            for y in 0..dst_h {
                let src_y = (y * src_h / dst_h).min(src_h - 1);
                for x in 0..dst_w {
                    let src_x = (x * src_w / dst_w).min(src_w - 1);
                    let src = (src_y * src_w + src_x) * c;
                    let dst = (y * dst_w + x) * c;
                    out[dst..dst + c].copy_from_slice(&self.data[src..src + c]);
                }
            }
        }
        Frame {
            data: out,
            width,
            height,
            channels: self.channels,
            index: self.index,
            captured_at: self.captured_at,
        }
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
