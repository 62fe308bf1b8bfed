//! Creates one [`BridgeAdapter`] per embedded view and routes calls to it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bridge::{BridgeAdapter, Services};
use crate::command::{MethodCall, MethodKind};
use crate::config::ViewOptions;
use crate::error::{BridgeError, Reply};
use crate::event::{EventSink, ViewEvent, ViewId};
use crate::traits::{self, CaptureLibrary};

/// Registry of live camera views.
///
/// `B` builds a fresh capture library for each view. All views share one
/// outbound event stream, returned from [`ViewFactory::new`].
pub struct ViewFactory<L, B>
where
    L: CaptureLibrary,
    B: FnMut(ViewId, &ViewOptions) -> traits::Result<L>,
{
    builder: B,
    services: Services,
    events: mpsc::UnboundedSender<ViewEvent>,
    views: HashMap<ViewId, Arc<BridgeAdapter<L>>>,
}

impl<L, B> ViewFactory<L, B>
where
    L: CaptureLibrary,
    B: FnMut(ViewId, &ViewOptions) -> traits::Result<L>,
{
    /// Create an empty registry and the stream its views report on.
    pub fn new(builder: B, services: Services) -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let factory = Self {
            builder,
            services,
            events,
            views: HashMap::new(),
        };
        (factory, rx)
    }

    /// Create the view `view_id` from its creation params and start opening
    /// its camera.
    ///
    /// Must be called within a tokio runtime.
    pub fn create(&mut self, view_id: ViewId, params: &Value) -> Result<(), BridgeError> {
        if self.views.contains_key(&view_id) {
            return Err(BridgeError::ViewExists(view_id));
        }
        let options = ViewOptions::from_creation_params(params)?;
        let library = (self.builder)(view_id, &options).map_err(BridgeError::Library)?;

        let sink = EventSink::new(view_id, self.events.clone());
        let adapter = BridgeAdapter::new(library, &options, self.services.clone(), sink);
        self.views.insert(view_id, Arc::new(adapter));
        info!(view_id, facing = %options.facing, preset = %options.resolution_preset, "camera view created");
        Ok(())
    }

    /// The adapter serving `view_id`.
    #[must_use]
    pub fn view(&self, view_id: ViewId) -> Option<Arc<BridgeAdapter<L>>> {
        self.views.get(&view_id).cloned()
    }

    /// Route a call to its view, returning a future that owns everything it
    /// needs so the caller can run it alongside other calls.
    ///
    /// A `dispose` call also forgets the view.
    pub fn call(
        &mut self,
        view_id: ViewId,
        call: MethodCall,
    ) -> Result<impl Future<Output = Reply> + Send + 'static, BridgeError> {
        let adapter = if MethodKind::from_name(&call.method) == Some(MethodKind::Dispose) {
            self.views.remove(&view_id)
        } else {
            self.view(view_id)
        }
        .ok_or(BridgeError::UnknownView(view_id))?;

        Ok(async move { adapter.handle(call).await })
    }

    /// Route a call and wait for its reply.
    pub async fn dispatch(&mut self, view_id: ViewId, call: MethodCall) -> Reply {
        match self.call(view_id, call) {
            Ok(reply) => reply.await,
            Err(err) => Reply::from(Err(err)),
        }
    }

    /// Tear down and forget one view.
    pub fn dispose(&mut self, view_id: ViewId) -> Result<(), BridgeError> {
        let adapter = self
            .views
            .remove(&view_id)
            .ok_or(BridgeError::UnknownView(view_id))?;
        adapter.dispose();
        Ok(())
    }

    /// Tear down every view.
    pub fn dispose_all(&mut self) {
        for (view_id, adapter) in self.views.drain() {
            debug!(view_id, "disposing on shutdown");
            adapter.dispose();
        }
    }

    /// Number of live views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether no view is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MethodError, CAMERA_ERROR};
    use crate::event::Event;
    use crate::mock::{MockHandle, MockLibrary};
    use crate::session::SessionState;
    use crate::traits::{CaptureError, Facing};
    use serde_json::json;
    use std::time::Duration;

    type Builder = Box<dyn FnMut(ViewId, &ViewOptions) -> traits::Result<MockLibrary> + Send>;

    fn factory() -> (
        ViewFactory<MockLibrary, Builder>,
        mpsc::UnboundedReceiver<ViewEvent>,
        Arc<std::sync::Mutex<Vec<MockHandle>>>,
    ) {
        let handles = Arc::new(std::sync::Mutex::new(Vec::new()));
        let built = Arc::clone(&handles);
        let builder: Builder = Box::new(move |_view_id, _options| {
            let (library, handle) = MockLibrary::new();
            built.lock().expect("handles").push(handle);
            Ok(library)
        });
        let (factory, events) = ViewFactory::new(builder, Services::default());
        (factory, events, handles)
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<ViewEvent>) -> ViewEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out")
            .expect("stream open")
    }

    #[tokio::test]
    async fn test_create_opens_with_params() {
        let (mut factory, mut events, _handles) = factory();
        factory
            .create(1, &json!({"facing": "BACK", "resolutionPreset": "720p"}))
            .expect("created");

        assert_eq!(
            next(&mut events).await,
            ViewEvent {
                view_id: 1,
                event: Event::CameraOpened,
            }
        );
        let adapter = factory.view(1).expect("view exists");
        assert_eq!(adapter.session().facing(), Facing::Back);
        assert_eq!(adapter.session().state(), SessionState::Open);
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_views() {
        let (mut factory, _events, _handles) = factory();
        factory.create(1, &Value::Null).expect("created");

        assert!(matches!(
            factory.create(1, &Value::Null),
            Err(BridgeError::ViewExists(1))
        ));
        assert_eq!(factory.len(), 1);

        let reply = factory
            .dispatch(9, MethodCall::new("startPreview", Value::Null))
            .await;
        assert_eq!(
            reply,
            Reply::Error(MethodError::new(CAMERA_ERROR, "No camera view with id 9."))
        );
        assert!(matches!(factory.dispose(9), Err(BridgeError::UnknownView(9))));
    }

    #[tokio::test]
    async fn test_bad_params_create_nothing() {
        let (mut factory, _events, handles) = factory();
        let err = factory
            .create(2, &json!({"facing": "SIDEWAYS"}))
            .expect_err("invalid facing");
        assert!(err.to_string().starts_with("invalid creation params"));
        assert!(factory.is_empty());
        assert!(handles.lock().expect("handles").is_empty());
    }

    #[tokio::test]
    async fn test_builder_failure() {
        let builder = |_view_id: ViewId, _options: &ViewOptions| -> traits::Result<MockLibrary> {
            Err(CaptureError::OpenFailed("no camera".to_owned()))
        };
        let (mut factory, _events) = ViewFactory::new(builder, Services::default());
        let err = factory.create(1, &Value::Null).expect_err("builder fails");
        assert_eq!(err.to_string(), "failed to open camera: no camera");
        assert!(factory.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_tagged_per_view() {
        let (mut factory, mut events, _handles) = factory();
        factory.create(1, &Value::Null).expect("created");
        factory.create(2, &Value::Null).expect("created");

        let mut opened = vec![next(&mut events).await.view_id, next(&mut events).await.view_id];
        opened.sort_unstable();
        assert_eq!(opened, vec![1, 2]);

        let reply = factory
            .dispatch(2, MethodCall::new("setZoom", json!({"zoom": 0.5})))
            .await;
        assert!(reply.is_success());
        assert!(factory.view(1).expect("view").session().zoom().abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_dispose_call_forgets_view() {
        let (mut factory, _events, handles) = factory();
        factory.create(4, &Value::Null).expect("created");

        let reply = factory
            .dispatch(4, MethodCall::new("dispose", Value::Null))
            .await;
        assert_eq!(reply, Reply::Success(Value::Null));
        assert!(factory.is_empty());

        let handle = handles.lock().expect("handles").first().cloned().expect("built");
        assert!(handle.called("destroy"));
    }

    #[tokio::test]
    async fn test_dispose_all() {
        let (mut factory, _events, handles) = factory();
        factory.create(1, &Value::Null).expect("created");
        factory.create(2, &Value::Null).expect("created");

        factory.dispose_all();
        assert!(factory.is_empty());
        assert!(handles
            .lock()
            .expect("handles")
            .iter()
            .all(|handle| handle.called("destroy")));
    }
}
