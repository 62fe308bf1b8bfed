//! Video4Linux2 capture library using the v4l crate.
//!
//! Each facing maps to a `/dev/videoN` index. The `Device` handle is not
//! shared between threads: stills and recordings run on worker threads that
//! open their own handle, so the library itself stays cheap to lock.
//!
//! Stills are JPEG: MJPG frames pass through, YUYV frames are converted.
//! Recordings are raw MJPEG streams (concatenated JPEG frames).
//!
//! V4L2 has no scene metering, so [`Flash::Auto`] fires the LED like
//! [`Flash::On`].

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::control::{Control, Value as ControlValue};
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::frame::{FourCC, RawFrame};
use crate::preset::{ResolutionPreset, SizeSelector};
use crate::traits::{
    completion, CaptureConfig, CaptureError, CaptureLibrary, Completion, Facing, Flash,
    LibraryEvent, Listener, Picture, RecordingRequest, Result, VideoResult,
};

/// `V4L2_CID_ZOOM_ABSOLUTE`.
const CID_ZOOM_ABSOLUTE: u32 = 0x009a_090d;
/// `V4L2_CID_FLASH_LED_MODE`.
const CID_FLASH_LED_MODE: u32 = 0x009c_0901;
/// `V4L2_FLASH_LED_MODE_NONE`.
const FLASH_LED_NONE: i64 = 0;
/// `V4L2_FLASH_LED_MODE_FLASH`.
const FLASH_LED_FLASH: i64 = 1;

/// Requested when the selector asks for the best available size; drivers
/// clamp it down to what they offer.
const BEST_AVAILABLE_REQUEST: (u32, u32) = (3840, 2160);

/// Device selection and streaming parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4l2Config {
    /// Device index for the front camera.
    pub front: usize,
    /// Device index for the back camera, if there is one.
    pub back: Option<usize>,
    /// mmap buffers per stream.
    pub buffers: u32,
    /// Frames dropped after stream start while exposure settles.
    pub warmup_frames: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            front: 0,
            back: None,
            buffers: 4,
            warmup_frames: 5,
        }
    }
}

impl V4l2Config {
    /// Device index serving `facing`.
    pub fn index(&self, facing: Facing) -> Result<usize> {
        match facing {
            Facing::Front => Ok(self.front),
            Facing::Back => self
                .back
                .ok_or_else(|| CaptureError::Unsupported("no back camera configured".to_owned())),
        }
    }
}

struct Recorder {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// [`CaptureLibrary`] backed by V4L2 devices.
pub struct V4l2Library {
    config: V4l2Config,
    listener: Option<Listener>,
    facing: Facing,
    flash: Flash,
    zoom: f32,
    picture_size: SizeSelector,
    video_size: SizeSelector,
    open: bool,
    recorder: Option<Recorder>,
}

impl V4l2Library {
    /// Create a closed library.
    #[must_use]
    pub const fn new(config: V4l2Config) -> Self {
        Self {
            config,
            listener: None,
            facing: Facing::Front,
            flash: Flash::Off,
            zoom: 0.0,
            picture_size: SizeSelector::Preset(ResolutionPreset::DEFAULT),
            video_size: SizeSelector::Preset(ResolutionPreset::DEFAULT),
            open: false,
            recorder: None,
        }
    }

    fn notify(&self, event: LibraryEvent) {
        if let Some(listener) = &self.listener {
            let _ = listener.send(event);
        }
    }

    fn device(&self) -> Result<Device> {
        open_device(self.config.index(self.facing)?)
    }

    fn apply_zoom(&self) {
        let applied = self
            .device()
            .and_then(|device| set_scaled_control(&device, CID_ZOOM_ABSOLUTE, self.zoom));
        if let Err(err) = applied {
            debug!(%err, zoom = self.zoom, "zoom not applied");
        }
    }

    fn recording_active(&self) -> bool {
        self.recorder
            .as_ref()
            .is_some_and(|recorder| !recorder.worker.is_finished())
    }

    fn stop_recorder(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.stop.store(true, Ordering::Release);
        }
    }
}

impl CaptureLibrary for V4l2Library {
    fn set_listener(&mut self, listener: Listener) {
        self.listener = Some(listener);
    }

    fn supports_preset(&self, preset: ResolutionPreset) -> bool {
        let Ok(device) = self.device() else {
            return false;
        };
        let (width, height) = preset.dimensions();
        [FourCC::MJPG, FourCC::YUYV].into_iter().any(|fourcc| {
            device
                .enum_framesizes(v4l::FourCC::new(&fourcc.0))
                .is_ok_and(|sizes| {
                    sizes
                        .iter()
                        .any(|size| frame_size_fits(&size.size, width, height))
                })
        })
    }

    fn configure(&mut self, config: &CaptureConfig) {
        self.facing = config.facing;
        self.flash = config.flash;
        self.picture_size = config.picture_size;
        self.video_size = config.video_size;
    }

    fn open(&mut self) -> Result<()> {
        let index = self.config.index(self.facing)?;
        let device = open_device(index)?;
        let caps = device
            .query_caps()
            .map_err(|err| CaptureError::OpenFailed(err.to_string()))?;
        let flags = v4l::capability::Flags::VIDEO_CAPTURE | v4l::capability::Flags::STREAMING;
        if !caps.capabilities.contains(flags) {
            return Err(CaptureError::OpenFailed(format!(
                "{} cannot stream video",
                caps.card
            )));
        }

        info!(index, card = %caps.card, driver = %caps.driver, "camera opened");
        self.open = true;
        self.apply_zoom();
        self.notify(LibraryEvent::Opened);
        Ok(())
    }

    fn close(&mut self) {
        self.stop_recorder();
        if self.open {
            self.open = false;
            self.notify(LibraryEvent::Closed);
        }
    }

    fn destroy(&mut self) {
        self.close();
        self.listener = None;
    }

    fn take_picture(&mut self) -> Completion<Picture> {
        let (done, pending) = completion();
        if !self.open {
            let _ = done.send(Err(CaptureError::NotOpen));
            return pending;
        }

        let job = StillJob {
            index: self.config.index(self.facing),
            size: self.picture_size,
            flash: self.flash,
            buffers: self.config.buffers,
            warmup: self.config.warmup_frames,
        };
        thread::spawn(move || {
            let _ = done.send(job.run());
        });
        pending
    }

    fn start_recording(&mut self, request: &RecordingRequest) -> Result<()> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        if self.recording_active() {
            return Err(CaptureError::RecordingFailed("already recording".to_owned()));
        }
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| CaptureError::RecordingFailed("no listener installed".to_owned()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let job = RecordingJob {
            index: self.config.index(self.facing)?,
            size: self.video_size,
            max_width: request.max_width,
            max_height: request.max_height,
            buffers: self.config.buffers,
            file: request.file.clone(),
            max_duration: request.max_duration,
            stop: Arc::clone(&stop),
        };
        let worker = thread::spawn(move || {
            let outcome = job.run(&listener);
            let _ = listener.send(LibraryEvent::RecordingFinished(outcome));
        });
        self.recorder = Some(Recorder { stop, worker });
        Ok(())
    }

    fn stop_recording(&mut self) {
        self.stop_recorder();
    }

    fn set_facing(&mut self, facing: Facing) -> Result<()> {
        let index = self.config.index(facing)?;
        if self.open {
            open_device(index)?;
        }
        self.facing = facing;
        self.zoom = 0.0;
        Ok(())
    }

    fn set_flash(&mut self, flash: Flash) -> Result<()> {
        self.flash = flash;
        Ok(())
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_nan() { 0.0 } else { zoom.clamp(0.0, 1.0) };
        if self.open {
            self.apply_zoom();
        }
    }

    fn set_video_size(&mut self, size: SizeSelector) {
        self.video_size = size;
    }

    fn permissions_granted(&self) -> bool {
        self.config
            .index(self.facing)
            .and_then(open_device)
            .is_ok()
    }
}

impl Drop for V4l2Library {
    fn drop(&mut self) {
        self.stop_recorder();
    }
}

struct StillJob {
    index: Result<usize>,
    size: SizeSelector,
    flash: Flash,
    buffers: u32,
    warmup: u32,
}

impl StillJob {
    fn run(self) -> Result<Picture> {
        let device = open_device(self.index?)?;
        let (width, height, fourcc) = negotiate(&device, requested_size(self.size))?;
        set_flash_mode(&device, self.flash);

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, self.buffers)
            .map_err(|err| CaptureError::CaptureFailed(err.to_string()))?;
        for _ in 0..self.warmup {
            stream
                .next()
                .map_err(|err| CaptureError::CaptureFailed(err.to_string()))?;
        }
        let frame = next_frame(&mut stream, width, height, fourcc)
            .map_err(|err| CaptureError::CaptureFailed(err.to_string()))?;
        let data = frame
            .to_jpeg()
            .map_err(|err| CaptureError::CaptureFailed(err.to_string()))?;

        debug!(width, height, bytes = data.len(), "still captured");
        Ok(Picture { data })
    }
}

struct RecordingJob {
    index: usize,
    size: SizeSelector,
    max_width: Option<u32>,
    max_height: Option<u32>,
    buffers: u32,
    file: PathBuf,
    max_duration: Duration,
    stop: Arc<AtomicBool>,
}

impl RecordingJob {
    fn run(self, listener: &Listener) -> Result<VideoResult> {
        let failed = |err: &dyn std::fmt::Display| CaptureError::RecordingFailed(err.to_string());

        let device = open_device(self.index)?;
        let requested = cap_size(requested_size(self.size), self.max_width, self.max_height);
        let (width, height, fourcc) = negotiate(&device, requested)?;
        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, self.buffers)
            .map_err(|err| failed(&err))?;
        let mut out = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.file)?,
        );

        let started = Instant::now();
        let mut frames = 0_u64;
        while !self.stop.load(Ordering::Acquire) && started.elapsed() < self.max_duration {
            let frame = next_frame(&mut stream, width, height, fourcc).map_err(|err| failed(&err))?;
            let jpeg = frame.to_jpeg().map_err(|err| failed(&err))?;
            out.write_all(&jpeg)?;
            if frames == 0 {
                let _ = listener.send(LibraryEvent::RecordingStarted);
            }
            frames += 1;
        }
        out.flush()?;

        let duration = started.elapsed();
        info!(file = %self.file.display(), frames, ?duration, "recording finalized");
        Ok(VideoResult {
            path: self.file,
            width,
            height,
            duration,
        })
    }
}

fn open_device(index: usize) -> Result<Device> {
    Device::new(index).map_err(|err| CaptureError::OpenFailed(format!("/dev/video{index}: {err}")))
}

fn requested_size(size: SizeSelector) -> (u32, u32) {
    size.dimensions().unwrap_or(BEST_AVAILABLE_REQUEST)
}

/// Scale `(width, height)` down, keeping its aspect ratio, until it fits
/// both caps.
fn cap_size(
    (width, height): (u32, u32),
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    let mut scaled = (u64::from(width), u64::from(height));
    if let Some(cap) = max_width.map(u64::from).filter(|cap| *cap < scaled.0) {
        scaled = (cap, (scaled.1 * cap / scaled.0).max(1));
    }
    if let Some(cap) = max_height.map(u64::from).filter(|cap| *cap < scaled.1) {
        scaled = ((scaled.0 * cap / scaled.1).max(1), cap);
    }
    (
        u32::try_from(scaled.0).unwrap_or(u32::MAX),
        u32::try_from(scaled.1).unwrap_or(u32::MAX),
    )
}

/// Set the capture format, preferring MJPG over YUYV.
fn negotiate(device: &Device, (width, height): (u32, u32)) -> Result<(u32, u32, FourCC)> {
    let mut last_error = None;
    for fourcc in [FourCC::MJPG, FourCC::YUYV] {
        let requested = v4l::Format::new(width, height, v4l::FourCC::new(&fourcc.0));
        match device.set_format(&requested) {
            Ok(actual) if actual.fourcc.repr == fourcc.0 => {
                debug!(width = actual.width, height = actual.height, ?fourcc, "format negotiated");
                return Ok((actual.width, actual.height, fourcc));
            }
            Ok(actual) => debug!(?fourcc, got = ?actual.fourcc, "format not accepted"),
            Err(err) => last_error = Some(err),
        }
    }
    Err(CaptureError::Unsupported(last_error.map_or_else(
        || "device offers neither MJPG nor YUYV".to_owned(),
        |err| err.to_string(),
    )))
}

fn next_frame(
    stream: &mut Stream<'_>,
    width: u32,
    height: u32,
    fourcc: FourCC,
) -> std::io::Result<RawFrame> {
    let (buf, meta) = stream.next()?;
    let used = usize::try_from(meta.bytesused).unwrap_or(buf.len());
    Ok(RawFrame {
        data: buf.get(..used).unwrap_or(buf).to_vec(),
        width,
        height,
        fourcc,
    })
}

const fn flash_led_mode(flash: Flash) -> i64 {
    match flash {
        Flash::Off => FLASH_LED_NONE,
        // no metering to decide from
        Flash::On | Flash::Auto => FLASH_LED_FLASH,
    }
}

fn set_flash_mode(device: &Device, flash: Flash) {
    let control = Control {
        id: CID_FLASH_LED_MODE,
        value: ControlValue::Integer(flash_led_mode(flash)),
    };
    if let Err(err) = device.set_control(control) {
        debug!(%err, %flash, "flash control unavailable");
    }
}

/// Map `fraction` in `0.0..=1.0` onto an integer control's range.
fn set_scaled_control(device: &Device, id: u32, fraction: f32) -> Result<()> {
    let description = device
        .query_controls()?
        .into_iter()
        .find(|description| description.id == id)
        .ok_or_else(|| CaptureError::Unsupported(format!("control {id:#x}")))?;
    let value = scale_to_range(fraction, description.minimum, description.maximum, description.step);
    device.set_control(Control {
        id,
        value: ControlValue::Integer(value),
    })?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale_to_range(fraction: f32, minimum: i64, maximum: i64, step: u64) -> i64 {
    let span = (maximum - minimum).max(0);
    let raw = (f64::from(fraction.clamp(0.0, 1.0)) * span as f64).round() as i64;
    let step = i64::try_from(step.max(1)).unwrap_or(1);
    minimum + (raw / step) * step
}

fn frame_size_fits(size: &FrameSizeEnum, width: u32, height: u32) -> bool {
    match size {
        FrameSizeEnum::Discrete(discrete) => discrete.width == width && discrete.height == height,
        FrameSizeEnum::Stepwise(stepwise) => {
            (stepwise.min_width..=stepwise.max_width).contains(&width)
                && (stepwise.min_height..=stepwise.max_height).contains(&height)
        }
    }
}
