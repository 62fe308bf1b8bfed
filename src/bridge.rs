//! The bridge adapter: one per embedded camera view.
//!
//! Each command is checked against the session (open, not recording, not
//! taking a picture, in that order), parsed, and forwarded to the
//! [`CaptureLibrary`]. Library lifecycle events are drained
//! by a background task that updates the session and emits [`Event`]s.
//!
//! Capture commands re-run their checks and set the session's capture flag
//! under one lock before anything awaits, so concurrent calls see the flag.
//!
//! `takePicture` and `stopRecording` hold their reply until the library
//! reports an outcome. `startRecording` and `takeSnapshot` reply as soon as
//! the library accepts the request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{Command, MethodCall, MethodKind, RecordingArgs, SnapshotArgs};
use crate::config::ViewOptions;
use crate::error::{BridgeError, Reply};
use crate::event::{Event, EventSink, VideoTaken, ViewId};
use crate::media::{MediaEntry, MediaError, MediaIndex, MediaKind, Unindexed};
use crate::preset::SizeSelector;
use crate::session::Session;
use crate::thumbnail::{self, FrameReader, MjpegFrameReader};
use crate::traits::{
    CaptureConfig, CaptureError, CaptureLibrary, Facing, Flash, LibraryEvent, RecordingRequest,
    VideoResult,
};

/// Platform collaborators besides the capture library.
#[derive(Clone)]
pub struct Services {
    /// Where produced files are registered.
    pub media: Arc<dyn MediaIndex>,
    /// Reads the first frame of a recording for its thumbnail.
    pub frames: Arc<dyn FrameReader>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            media: Arc::new(Unindexed),
            frames: Arc::new(MjpegFrameReader),
        }
    }
}

/// Bookkeeping for the recording in progress.
struct ActiveRecording {
    store_thumbnail: bool,
    thumbnail_dir: Option<PathBuf>,
    stop_waiter: Option<oneshot::Sender<Result<(), BridgeError>>>,
}

struct Shared<L> {
    view_id: ViewId,
    session: Mutex<Session>,
    library: Mutex<L>,
    recording: Mutex<Option<ActiveRecording>>,
    events: EventSink,
    services: Services,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mediates between method calls and one capture library instance.
pub struct BridgeAdapter<L: CaptureLibrary> {
    shared: Arc<Shared<L>>,
    pump: JoinHandle<()>,
}

impl<L: CaptureLibrary> BridgeAdapter<L> {
    /// Configure `library` from the creation params and start opening it.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        mut library: L,
        options: &ViewOptions,
        services: Services,
        events: EventSink,
    ) -> Self {
        let view_id = events.view_id();
        let (listener, library_events) = mpsc::unbounded_channel();
        library.set_listener(listener);

        let size = SizeSelector::from_label(&options.resolution_preset, |preset| {
            library.supports_preset(preset)
        });
        debug!(view_id, requested = %options.resolution_preset, ?size, "selected capture size");
        library.configure(&CaptureConfig {
            facing: options.facing,
            flash: options.flash,
            picture_size: size,
            video_size: size,
        });

        let shared = Arc::new(Shared {
            view_id,
            session: Mutex::new(Session::new(options)),
            library: Mutex::new(library),
            recording: Mutex::new(None),
            events,
            services,
        });
        let pump = tokio::spawn(pump_library_events(Arc::clone(&shared), library_events));

        let adapter = Self { shared, pump };
        adapter.shared.open();
        adapter
    }

    /// The view this adapter serves.
    #[must_use]
    pub fn view_id(&self) -> ViewId {
        self.shared.view_id
    }

    /// Snapshot of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.shared.session().clone()
    }

    /// Handle one method call and produce its single reply.
    pub async fn handle(&self, call: MethodCall) -> Reply {
        let view_id = self.shared.view_id;
        let Some(kind) = MethodKind::from_name(&call.method) else {
            debug!(view_id, method = %call.method, "method not implemented");
            return Reply::NotImplemented;
        };

        debug!(view_id, method = kind.name(), arguments = %call.arguments, "method call");
        let result = self.dispatch(kind, &call.arguments).await;
        if let Err(err) = &result {
            debug!(view_id, method = kind.name(), code = err.code(), %err, "method call failed");
        }
        Reply::from(result)
    }

    async fn dispatch(&self, kind: MethodKind, arguments: &Value) -> Result<Value, BridgeError> {
        self.shared.session().check_all(kind.preconditions())?;

        match Command::parse(kind, arguments)? {
            Command::StartPreview => self.start_preview(),
            Command::StopPreview => self.stop_preview(),
            Command::TakePicture { file } => self.take_picture(file).await,
            Command::StartRecording(args) => self.start_recording(args).await,
            Command::TakeSnapshot(args) => self.take_snapshot(args).await,
            Command::StopRecording => self.stop_recording().await,
            Command::SetFacing(facing) => self.set_facing(facing),
            Command::SetFlash(flash) => self.set_flash(flash),
            Command::SetZoom(zoom) => self.set_zoom(zoom),
            Command::IsPermissionsGranted => {
                Ok(Value::Bool(self.shared.library().permissions_granted()))
            }
            Command::Dispose => {
                self.dispose();
                Ok(Value::Null)
            }
        }
    }

    fn start_preview(&self) -> Result<Value, BridgeError> {
        if self.shared.session().is_disposed() {
            return Err(BridgeError::Disposed);
        }
        self.shared.open();
        Ok(Value::Bool(true))
    }

    fn stop_preview(&self) -> Result<Value, BridgeError> {
        let should_close = {
            let mut session = self.shared.session();
            if session.is_disposed() {
                return Err(BridgeError::Disposed);
            }
            let active = session.is_open() || session.is_opening();
            session.closed();
            active
        };
        if should_close {
            self.shared.library().close();
        }
        Ok(Value::Bool(true))
    }

    async fn take_picture(&self, file: PathBuf) -> Result<Value, BridgeError> {
        self.shared
            .session()
            .try_begin_picture(MethodKind::TakePicture.preconditions())?;
        if let Err(err) = ensure_absent(&file).await {
            self.shared.session().end_picture();
            return Err(err);
        }

        let completion = self.shared.library().take_picture();
        let outcome = match completion.await {
            Ok(Ok(picture)) => save_picture(&file, &picture.data)
                .await
                .map_err(BridgeError::SavePicture),
            Ok(Err(err)) => Err(BridgeError::TakePicture(err)),
            Err(_) => Err(BridgeError::TakePicture(CaptureError::Abandoned)),
        };
        if outcome.is_ok() {
            self.shared.register_media(&file, MediaKind::Picture);
        }
        self.shared.session().end_picture();

        outcome.map(|()| Value::Bool(true))
    }

    async fn start_recording(&self, args: RecordingArgs) -> Result<Value, BridgeError> {
        let active = ActiveRecording {
            store_thumbnail: args.store_thumbnail,
            thumbnail_dir: args.thumbnail_path,
            stop_waiter: None,
        };
        let request = RecordingRequest::new(args.file, args.max_duration);
        self.record(MethodKind::StartRecording, request, args.video_size.as_deref(), active)
            .await
    }

    async fn take_snapshot(&self, args: SnapshotArgs) -> Result<Value, BridgeError> {
        let active = ActiveRecording {
            store_thumbnail: false,
            thumbnail_dir: None,
            stop_waiter: None,
        };
        let request = RecordingRequest {
            max_width: args.max_width,
            max_height: args.max_height,
            ..RecordingRequest::new(args.file, args.max_duration)
        };
        self.record(MethodKind::TakeSnapshot, request, None, active).await
    }

    async fn record(
        &self,
        kind: MethodKind,
        request: RecordingRequest,
        video_size: Option<&str>,
        active: ActiveRecording,
    ) -> Result<Value, BridgeError> {
        self.shared.session().try_begin_video(kind.preconditions())?;
        if let Err(err) = ensure_absent(&request.file).await {
            self.shared.session().end_video();
            return Err(err);
        }

        if let Some(label) = video_size {
            let mut library = self.shared.library();
            let size = SizeSelector::from_label(label, |preset| library.supports_preset(preset));
            library.set_video_size(size);
        }

        *self.shared.recording() = Some(active);
        let started = self.shared.library().start_recording(&request);
        if let Err(err) = started {
            self.shared.recording().take();
            self.shared.session().end_video();
            return Err(BridgeError::Recorded(err.to_string()));
        }

        info!(
            view_id = self.shared.view_id,
            method = kind.name(),
            file = %request.file.display(),
            "recording requested"
        );
        Ok(Value::Bool(true))
    }

    async fn stop_recording(&self) -> Result<Value, BridgeError> {
        let (waiter, finished) = oneshot::channel();
        {
            let mut recording = self.shared.recording();
            let Some(active) = recording.as_mut() else {
                debug!(view_id = self.shared.view_id, "stopRecording with nothing recording");
                return Ok(Value::Bool(true));
            };
            active.stop_waiter = Some(waiter);
        }

        self.shared.library().stop_recording();
        match finished.await {
            Ok(outcome) => outcome.map(|()| Value::Bool(true)),
            Err(_) => Err(BridgeError::Recorded("Recording was abandoned.".to_owned())),
        }
    }

    fn set_facing(&self, facing: Facing) -> Result<Value, BridgeError> {
        {
            let mut library = self.shared.library();
            library.set_facing(facing).map_err(BridgeError::Library)?;
            library.set_zoom(0.0);
        }
        self.shared.session().set_facing(facing);
        Ok(Value::Bool(true))
    }

    fn set_flash(&self, flash: Flash) -> Result<Value, BridgeError> {
        self.shared
            .library()
            .set_flash(flash)
            .map_err(BridgeError::Library)?;
        self.shared.session().set_flash(flash);
        Ok(Value::Bool(true))
    }

    fn set_zoom(&self, zoom: f32) -> Result<Value, BridgeError> {
        self.shared.library().set_zoom(zoom);
        self.shared.session().set_zoom(zoom);
        Ok(Value::Bool(true))
    }

    /// Tear the view down. Later calls are no-ops.
    pub fn dispose(&self) {
        if !self.shared.session().dispose() {
            return;
        }
        {
            let mut library = self.shared.library();
            library.close();
            library.destroy();
        }
        self.pump.abort();
        self.shared.recording().take();
        info!(view_id = self.shared.view_id, "camera view disposed");
    }
}

impl<L: CaptureLibrary> Drop for BridgeAdapter<L> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl<L: CaptureLibrary> Shared<L> {
    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    fn library(&self) -> MutexGuard<'_, L> {
        lock(&self.library)
    }

    fn recording(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        lock(&self.recording)
    }

    /// Closed → Opening, then ask the library to open.
    fn open(&self) {
        if !self.session().begin_opening() {
            return;
        }
        let opened = self.library().open();
        if let Err(err) = opened {
            warn!(view_id = self.view_id, %err, "camera failed to open");
            self.session().closed();
            self.events.emit(Event::CameraError(err.to_string()));
        }
    }

    async fn on_library_event(&self, event: LibraryEvent) {
        debug!(view_id = self.view_id, ?event, "library event");
        match event {
            LibraryEvent::Opened => {
                if self.session().opened() {
                    info!(view_id = self.view_id, "camera opened");
                    self.events.emit(Event::CameraOpened);
                }
            }
            LibraryEvent::Closed => {
                {
                    let mut session = self.session();
                    if session.is_disposed() {
                        return;
                    }
                    session.closed();
                }
                self.events.emit(Event::CameraClosed);
            }
            LibraryEvent::Error { message, fatal } => {
                warn!(view_id = self.view_id, fatal, %message, "camera error");
                {
                    let mut session = self.session();
                    if fatal || session.is_opening() {
                        session.closed();
                    }
                }
                self.events.emit(Event::CameraError(message));
            }
            LibraryEvent::RecordingStarted => self.events.emit(Event::VideoRecordingStart),
            LibraryEvent::RecordingFinished(outcome) => self.finish_recording(outcome).await,
        }
    }

    async fn finish_recording(&self, outcome: crate::traits::Result<VideoResult>) {
        let active = self.recording().take();
        self.session().end_video();
        let (store_thumbnail, thumbnail_dir, stop_waiter) = match active {
            Some(active) => (active.store_thumbnail, active.thumbnail_dir, active.stop_waiter),
            None => (false, None, None),
        };

        let video = match outcome {
            Ok(video) => video,
            Err(err) => {
                warn!(view_id = self.view_id, %err, "recording failed");
                match stop_waiter {
                    Some(waiter) => {
                        let _ = waiter.send(Err(BridgeError::Recorded(err.to_string())));
                    }
                    None => self.events.emit(Event::CameraError(err.to_string())),
                }
                return;
            }
        };

        self.events.emit(Event::VideoRecordingEnd);

        let file_size = tokio::fs::metadata(&video.path)
            .await
            .map(|meta| meta.len())
            .unwrap_or_default();
        self.register_media(
            &video.path,
            MediaKind::Video {
                duration: video.duration,
            },
        );
        if store_thumbnail {
            self.store_thumbnail(&video.path, thumbnail_dir).await;
        }

        if let Some(waiter) = stop_waiter {
            let _ = waiter.send(Ok(()));
        }
        info!(view_id = self.view_id, file = %video.path.display(), file_size, "video taken");
        self.events.emit(Event::VideoTaken(VideoTaken {
            file: video.path,
            file_size,
            width: video.width,
            height: video.height,
        }));
    }

    async fn store_thumbnail(&self, video: &Path, configured: Option<PathBuf>) {
        let frames = Arc::clone(&self.services.frames);
        let video = video.to_path_buf();
        let stored = tokio::task::spawn_blocking(move || {
            thumbnail::store_thumbnail(frames.as_ref(), &video, configured.as_deref())
        })
        .await;

        match stored {
            Ok(Ok(path)) => debug!(view_id = self.view_id, path = %path.display(), "thumbnail stored"),
            Ok(Err(err)) => warn!(view_id = self.view_id, %err, "failed to store thumbnail"),
            Err(err) => warn!(view_id = self.view_id, %err, "thumbnail task failed"),
        }
    }

    fn register_media(&self, path: &Path, kind: MediaKind) {
        let registered = MediaEntry::for_file(path, kind)
            .map_err(MediaError::from)
            .and_then(|entry| self.services.media.insert(&entry));
        if let Err(err) = registered {
            warn!(view_id = self.view_id, path = %path.display(), %err, "media index registration failed");
        }
    }
}

async fn pump_library_events<L: CaptureLibrary>(
    shared: Arc<Shared<L>>,
    mut events: mpsc::UnboundedReceiver<LibraryEvent>,
) {
    while let Some(event) = events.recv().await {
        shared.on_library_event(event).await;
    }
    debug!(view_id = shared.view_id, "library listener closed");
}

async fn ensure_absent(file: &Path) -> Result<(), BridgeError> {
    if matches!(tokio::fs::try_exists(file).await, Ok(true)) {
        return Err(BridgeError::FileExists(file.to_path_buf()));
    }
    Ok(())
}

/// Write a capture without ever replacing an existing file.
async fn save_picture(file: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(file)
        .await?;
    out.write_all(data).await?;
    out.flush().await
}
