use std::path::Path;

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceDescriptor};

/// Adapts a single still image to the [`FrameSource`] interface.
///
/// Yields exactly one RGB frame, then `None`.
pub struct ImageFileSource {
    frame: Option<Frame>,
}

impl ImageFileSource {
    pub fn new() -> Self {
        Self { frame: None }
    }
}

impl Default for ImageFileSource {
    fn default() -> Self {
        Self::new()
    }
}

/// True if the path has a still-image extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes an image file into an RGB frame.
pub fn load_image(path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), width, height, 3, 0))
}

impl FrameSource for ImageFileSource {
    fn open(
        &mut self,
        source: &SourceDescriptor,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let SourceDescriptor::File(path) = source else {
            return Err(format!("{source} is not an image file").into());
        };
        let frame = load_image(path)?;
        let metadata = VideoMetadata {
            width: frame.width(),
            height: frame.height(),
            fps: 0.0,
            total_frames: 1,
            codec: String::new(),
            live: false,
        };
        self.frame = Some(frame);
        Ok(metadata)
    }

    fn read(&mut self) -> Option<Frame> {
        self.frame.take()
    }

    fn close(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_image(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("driver.png");
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut source = ImageFileSource::new();
        let meta = source.open(&SourceDescriptor::File(path)).unwrap();
        assert_eq!((meta.width, meta.height), (100, 80));
        assert_eq!(meta.total_frames, 1);
        assert!(!meta.live);
    }

    #[test]
    fn test_yields_single_rgb_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let mut source = ImageFileSource::new();
        source.open(&SourceDescriptor::File(path)).unwrap();

        let frame = source.read().unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(&frame.data()[..3], &[50, 100, 200]);
        assert!(source.read().is_none());
    }

    #[test]
    fn test_rejects_live_descriptor() {
        let mut source = ImageFileSource::new();
        assert!(source.open(&SourceDescriptor::Device(0)).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut source = ImageFileSource::new();
        let missing = SourceDescriptor::File(PathBuf::from("/nonexistent/x.png"));
        assert!(source.open(&missing).is_err());
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a/b.JPG")));
        assert!(is_image_path(Path::new("c.webp")));
        assert!(!is_image_path(Path::new("clip.mp4")));
        assert!(!is_image_path(Path::new("noext")));
    }
}
