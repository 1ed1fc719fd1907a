use std::fmt;
use std::path::PathBuf;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A finite video or image file.
    File(PathBuf),
    /// A local capture device by index.
    Device(u32),
    /// A network stream URL, e.g. `rtsp://…`.
    Network(String),
}

impl SourceDescriptor {
    /// Live sources never end on their own; a failed read is retried.
    pub fn is_live(&self) -> bool {
        !matches!(self, SourceDescriptor::File(_))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::File(path) => write!(f, "file {}", path.display()),
            SourceDescriptor::Device(index) => write!(f, "device {index}"),
            SourceDescriptor::Network(url) => write!(f, "stream {url}"),
        }
    }
}

/// Pull-based frame producer.
///
/// `read` returns `None` when no frame is available: end of stream for
/// files, a transient failure for live sources (the caller decides
/// whether to retry).
pub trait FrameSource: Send {
    fn open(
        &mut self,
        source: &SourceDescriptor,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    fn read(&mut self) -> Option<Frame>;

    /// Releases any resources held by the source. Idempotent.
    fn close(&mut self);
}
