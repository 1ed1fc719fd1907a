/// Properties of an opened frame source.
///
/// Live sources usually report `total_frames == 0`; `fps` is 0 when the
/// container does not declare a rate.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub live: bool,
}

impl std::fmt::Display for VideoMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if self.fps > 0.0 {
            write!(f, " @ {:.1} fps", self.fps)?;
        }
        if self.live {
            write!(f, " ({}, live)", self.codec)
        } else {
            write!(f, " ({}, {} frames)", self.codec, self.total_frames)
        }
    }
}
