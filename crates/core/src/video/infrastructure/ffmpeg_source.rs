use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceDescriptor};

/// Decodes frames from files, capture devices and network streams via
/// ffmpeg-next (libavformat + libavcodec + libavdevice).
///
/// Every decoded frame is converted to RGB24. A live input whose read
/// fails is dropped and reopened on the next `read`.
pub struct FfmpegSource {
    descriptor: Option<SourceDescriptor>,
    decoding: Option<Decoding>,
    frame_index: usize,
    device_name: Option<String>,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

struct Decoding {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    stream_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            descriptor: None,
            decoding: None,
            frame_index: 0,
            device_name: None,
        }
    }

    /// Capture device name. DirectShow addresses cameras by friendly name
    /// and needs one; elsewhere it replaces the index-derived address.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    fn connect(
        source: &SourceDescriptor,
        device_name: Option<&str>,
    ) -> Result<(Decoding, VideoMetadata), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = open_input(source, device_name)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(format!("{source} reports an empty frame size").into());
        }

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            live: source.is_live(),
        };

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok((
            Decoding {
                ictx,
                decoder,
                scaler,
                width,
                height,
                stream_index,
                flushing: false,
                done: false,
            },
            metadata,
        ))
    }

    fn reconnect(&mut self) -> bool {
        let Some(source) = self.descriptor.as_ref() else {
            return false;
        };
        match Self::connect(source, self.device_name.as_deref()) {
            Ok((decoding, _)) => {
                log::info!("Reconnected to {source}");
                self.decoding = Some(decoding);
                true
            }
            Err(e) => {
                log::warn!("Reconnect to {source} failed: {e}");
                false
            }
        }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegSource {
    fn open(
        &mut self,
        source: &SourceDescriptor,
    ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        self.close();
        let (decoding, metadata) = Self::connect(source, self.device_name.as_deref())?;
        log::info!(
            "Opened {source}: {}x{} @ {:.2} fps ({})",
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );
        self.descriptor = Some(source.clone());
        self.decoding = Some(decoding);
        self.frame_index = 0;
        Ok(metadata)
    }

    fn read(&mut self) -> Option<Frame> {
        let live = self.descriptor.as_ref()?.is_live();
        if self.decoding.is_none() && !(live && self.reconnect()) {
            return None;
        }
        let decoding = self.decoding.as_mut()?;

        match decoding.next_frame(self.frame_index) {
            Ok(Some(frame)) => {
                self.frame_index += 1;
                Some(frame)
            }
            Ok(None) => {
                if live {
                    log::warn!("Live input ended unexpectedly; reopening on next read");
                    self.decoding = None;
                }
                None
            }
            Err(e) => {
                log::warn!("Frame decode failed: {e}");
                if live {
                    self.decoding = None;
                }
                None
            }
        }
    }

    fn close(&mut self) {
        self.decoding = None;
        self.descriptor = None;
    }
}

impl Decoding {
    fn next_frame(
        &mut self,
        index: usize,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive(index)? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive(index)? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };

            if stream.index() != self.stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive(index)? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;
        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height, 3, index)))
    }
}

fn open_input(
    source: &SourceDescriptor,
    device_name: Option<&str>,
) -> Result<ffmpeg_next::format::context::Input, Box<dyn std::error::Error>> {
    match source {
        SourceDescriptor::File(path) => Ok(ffmpeg_next::format::input(path)?),
        SourceDescriptor::Network(url) => {
            let mut options = ffmpeg_next::Dictionary::new();
            if url.starts_with("rtsp://") {
                options.set("rtsp_transport", "tcp");
            }
            options.set("timeout", "5000000");
            Ok(ffmpeg_next::format::input_with_dictionary(url, options)?)
        }
        SourceDescriptor::Device(index) => {
            ffmpeg_next::device::register_all();
            let address = device_address(*index, device_name)?;
            let format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == address.format)
                .ok_or_else(|| format!("Capture backend {} not available", address.format))?;
            let mut options = ffmpeg_next::Dictionary::new();
            for (key, value) in &address.options {
                options.set(key, value);
            }
            match ffmpeg_next::format::open_with(
                &address.url,
                &ffmpeg_next::format::Format::Input(format),
                options,
            )? {
                ffmpeg_next::format::context::Context::Input(input) => Ok(input),
                _ => Err(format!("{} did not open as an input", address.url).into()),
            }
        }
    }
}

/// Where and how to open a capture device.
#[derive(Debug, PartialEq)]
struct DeviceAddress {
    format: &'static str,
    url: String,
    options: Vec<(&'static str, String)>,
}

/// Platform capture backend and device address for a device index.
fn device_address(index: u32, name: Option<&str>) -> Result<DeviceAddress, String> {
    if cfg!(target_os = "macos") {
        let device = name.map_or_else(|| index.to_string(), str::to_string);
        Ok(DeviceAddress {
            format: "avfoundation",
            url: format!("{device}:none"),
            options: Vec::new(),
        })
    } else if cfg!(target_os = "windows") {
        dshow_address(index, name)
    } else {
        Ok(DeviceAddress {
            format: "video4linux2,v4l2",
            url: name.map_or_else(|| format!("/dev/video{index}"), str::to_string),
            options: Vec::new(),
        })
    }
}

/// DirectShow takes `video=<friendly name>`; the index picks among
/// devices sharing that name.
fn dshow_address(index: u32, name: Option<&str>) -> Result<DeviceAddress, String> {
    let name = name.ok_or_else(|| {
        format!("DirectShow capture needs a device name for device {index}")
    })?;
    Ok(DeviceAddress {
        format: "dshow",
        url: format!("video={name}"),
        options: vec![("video_device_number", index.to_string())],
    })
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
