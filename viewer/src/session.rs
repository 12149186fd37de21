use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use app::app::App;
use bevy_ecs::prelude::*;
use crossbeam::channel::Receiver;
use futures::future::{self, FutureExt, LocalBoxFuture};
use loader::error::DecodeError;
use loader::format::{extension_of, ModelFormat};
use loader::registry::{DecodeRequest, LoaderRegistry, ModelDecoder};
use loader::source::{AssetFetcher, FileSystemFetcher, ModelSource, ProgressTracker};
use math::bounding_box::BoundingBox;
use nalgebra::Vector3;
use scene::light::{LightName, LightingRig};
use scene::material::CpuMaterial;
use time::time::{FrameStats, Time};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{RenderBackend, SurfaceSize};
use crate::camera::{fit_position, Camera};
use crate::commands::ViewerCommand;
use crate::config::{CameraConfig, ViewerConfiguration};
use crate::controls::{OrbitControls, OrbitInput};
use crate::error::{BackendError, InitError, LoadError, LoadFailureKind, LoadResult};
use crate::events::{EventChannel, ViewerEvent};
use crate::gpu_resources::{create_gpu_meshes, release_gpu_assets};
use crate::helpers::SceneHelpers;
use crate::host::{Container, ViewerHost};
use crate::model::{self, despawn_model, install_model, LoadedModel, ModelInfo};
use crate::plugin::ViewerPlugin;
use crate::render::render_frame;

struct SessionState {
    app: App,
    backend: Box<dyn RenderBackend>,
    container: Rc<dyn Container>,
    surface_size: SurfaceSize,
}

/// Shows one model inside one container. Everything runs on the thread that owns
/// the session: the host calls `frame` once per display refresh and polls load
/// futures on its own executor.
pub struct ModelViewerSession {
    config: ViewerConfiguration,
    /// `None` once disposed.
    state: RefCell<Option<SessionState>>,
    registry: RefCell<LoaderRegistry>,
    fetcher: Rc<dyn AssetFetcher>,
    loading: Cell<bool>,
    wireframe: Cell<bool>,
    events: EventChannel,
}

pub struct SessionBuilder {
    config: ViewerConfiguration,
    fetcher: Rc<dyn AssetFetcher>,
    default_decoders: bool,
    decoders: Vec<(ModelFormat, Rc<dyn ModelDecoder>)>,
}

impl SessionBuilder {
    /// Replaces the file system fetcher used for URL sources.
    pub fn with_fetcher(mut self, fetcher: Rc<dyn AssetFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Starts with an empty registry. Loads of formats without a decoder wait
    /// until one is registered.
    pub fn without_default_decoders(mut self) -> Self {
        self.default_decoders = false;
        self
    }

    /// Adds or overrides the decoder of a format.
    pub fn with_decoder(mut self, format: ModelFormat, decoder: Rc<dyn ModelDecoder>) -> Self {
        self.decoders.push((format, decoder));
        self
    }

    pub fn initialize(
        self,
        host: &dyn ViewerHost,
        mut backend: Box<dyn RenderBackend>,
    ) -> Result<ModelViewerSession, InitError> {
        let config = self.config;
        config.validate()?;

        let container = host
            .find_container(&config.container_id)
            .ok_or_else(|| InitError::ContainerMissing(config.container_id.clone()))?;
        let (width, height) = container.client_size();
        let surface_size = SurfaceSize::new(width, height);
        backend.create_surface(surface_size)?;

        let mut app = App::new();
        app.with_plugin(ViewerPlugin {
            config: config.clone(),
            aspect_ratio: surface_size.aspect_ratio(),
        });

        let accepted = config.accepted_formats.iter().copied();
        let mut registry = if self.default_decoders {
            LoaderRegistry::with_default_decoders(accepted)
        } else {
            LoaderRegistry::new(accepted)
        };
        for (format, decoder) in self.decoders {
            registry.register(format, decoder);
        }

        info!(
            container = %config.container_id,
            width, height, "initialized model viewer"
        );
        Ok(ModelViewerSession {
            config,
            state: RefCell::new(Some(SessionState {
                app,
                backend,
                container,
                surface_size,
            })),
            registry: RefCell::new(registry),
            fetcher: self.fetcher,
            loading: Cell::new(false),
            wireframe: Cell::new(false),
            events: EventChannel::new(),
        })
    }
}

/// Clears the pending flag when a load finishes or its future is dropped.
struct LoadingGuard<'a> {
    loading: &'a Cell<bool>,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(loading: &'a Cell<bool>) -> Option<Self> {
        if loading.replace(true) {
            return None;
        }
        Some(Self { loading })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading.set(false);
    }
}

impl ModelViewerSession {
    pub fn builder(config: ViewerConfiguration) -> SessionBuilder {
        SessionBuilder {
            config,
            fetcher: Rc::new(FileSystemFetcher::default()),
            default_decoders: true,
            decoders: Vec::new(),
        }
    }

    pub fn initialize(
        config: ViewerConfiguration,
        host: &dyn ViewerHost,
        backend: Box<dyn RenderBackend>,
    ) -> Result<ModelViewerSession, InitError> {
        Self::builder(config).initialize(host, backend)
    }

    /// Starts loading a model. The checks that need no I/O run right away, so a
    /// rejected load resolves immediately and never touches the current model.
    pub fn load(&self, source: ModelSource) -> LocalBoxFuture<'_, LoadResult> {
        let checked = self.check_load(&source);
        let (format, guard) = match checked {
            Ok(accepted) => accepted,
            Err(error) => {
                self.report_failure(&source, &error);
                return future::ready(Err(error)).boxed_local();
            }
        };

        async move {
            let _guard = guard;
            self.events.send(ViewerEvent::LoadStarted {
                name: source.name().to_string(),
            });

            let result = self.run_load(&source, format).await;
            match &result {
                Ok(info) => self.events.send(ViewerEvent::Loaded(info.clone())),
                Err(error) => self.report_failure(&source, error),
            }
            result
        }
        .boxed_local()
    }

    fn check_load(&self, source: &ModelSource) -> Result<(ModelFormat, LoadingGuard<'_>), LoadError> {
        if self.is_disposed() {
            return Err(LoadError::Disposed);
        }
        let guard = LoadingGuard::acquire(&self.loading).ok_or(LoadError::AlreadyLoading)?;

        let extension = extension_of(source.name());
        let format = ModelFormat::from_extension(&extension)
            .filter(|format| self.config.accepts(*format))
            .ok_or(LoadError::UnsupportedFormat(extension))?;

        if let ModelSource::File(file) = source {
            self.check_size(file.size)?;
        }
        Ok((format, guard))
    }

    fn check_size(&self, actual: u64) -> Result<(), LoadError> {
        let max = self.config.max_file_size;
        if actual > max {
            return Err(LoadError::FileTooLarge { actual, max });
        }
        Ok(())
    }

    #[instrument(skip_all, fields(name = source.name()))]
    async fn run_load(&self, source: &ModelSource, format: ModelFormat) -> LoadResult {
        let mut tracker = ProgressTracker::default();
        let events = &self.events;
        let mut progress = |loaded: u64, total: Option<u64>| {
            if let Some(percent) = tracker.update(loaded, total) {
                events.send(ViewerEvent::Progress(percent));
            }
        };

        let bytes = match source {
            ModelSource::Url(location) => {
                let fetcher = self.fetcher.clone();
                let bytes = fetcher
                    .fetch(location, &mut progress)
                    .await
                    .map_err(|err| LoadError::failed(LoadFailureKind::Fetch, err))?;
                if self.config.enforce_size_limit_for_urls {
                    self.check_size(bytes.len() as u64)?;
                }
                bytes
            }
            ModelSource::File(file) => file
                .read(FileSystemFetcher::DEFAULT_CHUNK_SIZE, &mut progress)
                .await
                .map_err(|err| LoadError::failed(LoadFailureKind::Fetch, err))?,
        };
        debug!(bytes = bytes.len(), "fetched model");

        let decoder = self.decoder_for(format).await?;
        let base_path = source.base_path();
        let model = decoder
            .decode(&DecodeRequest {
                name: source.name(),
                bytes: &bytes,
                base_path: base_path.as_deref(),
            })
            .map_err(|err| LoadError::failed(LoadFailureKind::Decode, err))?;
        if model.parts.is_empty() {
            return Err(LoadError::failed(LoadFailureKind::Decode, DecodeError::Empty));
        }

        let mut state = self.state.borrow_mut();
        let state = state.as_mut().ok_or(LoadError::Disposed)?;
        let world = &mut state.app.world;

        // The old model leaves the GPU before the new one is spawned
        let released = release_gpu_assets(world, state.backend.as_mut());
        let despawned = despawn_model(world);
        debug!(released, despawned, "removed previous model");

        let info = install_model(world, model, format, self.config.model.max_dimension);
        self.wireframe.set(false);
        fit_camera(world, &self.config.camera);

        info!(
            meshes = info.mesh_count,
            triangles = info.triangle_count,
            size = ?info.size,
            "loaded model"
        );
        Ok(info)
    }

    async fn decoder_for(&self, format: ModelFormat) -> Result<Rc<dyn ModelDecoder>, LoadError> {
        if let Some(decoder) = self.registry.borrow().decoder(format) {
            return Ok(decoder);
        }

        let ready = self.registry.borrow_mut().decoder_ready(format);
        debug!(format = format.extension(), "waiting for a decoder");
        ready.await;
        self.registry.borrow().decoder(format).ok_or_else(|| {
            LoadError::failed(
                LoadFailureKind::Decode,
                format!("no decoder for the {} format", format.extension()),
            )
        })
    }

    fn report_failure(&self, source: &ModelSource, error: &LoadError) {
        let message = error.user_message(&self.config.accepted_extensions());
        match error {
            LoadError::LoadFailed { .. } => error!(name = source.name(), %error, "model load failed"),
            _ => warn!(name = source.name(), %error, "model load rejected"),
        }
        self.events.send(ViewerEvent::LoadFailed {
            error: error.clone(),
            message,
        });
    }

    /// Frames the current model, or goes back to the default pose without one.
    pub fn fit_camera_to_model(&self) {
        self.with_world(|world| fit_camera(world, &self.config.camera));
    }

    /// Returns the wireframe state after the call.
    pub fn toggle_wireframe(&self) -> bool {
        let toggled = self.with_world(|world| {
            if world.get_resource::<LoadedModel>().is_none() {
                return false;
            }
            let wireframe = !self.wireframe.get();
            model::set_wireframe(world, wireframe);
            self.wireframe.set(wireframe);
            true
        });

        let wireframe = self.wireframe.get();
        if toggled == Some(true) {
            debug!(wireframe, "toggled wireframe");
            self.events.send(ViewerEvent::WireframeToggled(wireframe));
        }
        wireframe
    }

    /// Returns false when the rig has no light of that name.
    pub fn set_light_intensity(&self, which: LightName, intensity: f32) -> bool {
        self.with_world(|world| {
            world
                .resource_mut::<LightingRig>()
                .set_intensity(which, intensity)
        })
        .unwrap_or(false)
    }

    /// Follows the container to its current size. Zero-area sizes, e.g. while the
    /// container is hidden, are skipped.
    pub fn on_resize(&self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let Some(state) = state.as_mut() else {
            return Ok(());
        };

        let (width, height) = state.container.client_size();
        let size = SurfaceSize::new(width, height);
        if size.is_zero_area() {
            debug!(width, height, "ignoring resize to an empty container");
            return Ok(());
        }
        if size == state.surface_size {
            return Ok(());
        }

        state.backend.resize_surface(size)?;
        state.surface_size = size;
        state
            .app
            .world
            .resource_mut::<Camera>()
            .update_aspect_ratio(size.aspect_ratio());
        info!(width, height, "resized");
        Ok(())
    }

    /// Releases the model and the surface and stops rendering. Later calls do nothing.
    pub fn dispose(&self) {
        let Some(mut state) = self.state.borrow_mut().take() else {
            return;
        };

        let world = &mut state.app.world;
        let released = release_gpu_assets(world, state.backend.as_mut());
        despawn_model(world);
        state.backend.release_surface();
        self.wireframe.set(false);

        info!(released, "disposed model viewer");
        self.events.send(ViewerEvent::Disposed);
    }

    /// Camera back on the model, lights as configured and wireframe off.
    pub fn reset_view(&self) {
        self.with_world(|world| {
            fit_camera(world, &self.config.camera);
            world.insert_resource(self.config.lighting.clone());
            model::set_wireframe(world, false);
        });
        self.wireframe.set(false);
    }

    /// Runs a command from the page controls. File drops return the load they started.
    pub fn apply(&self, command: ViewerCommand) -> Option<LocalBoxFuture<'_, LoadResult>> {
        match command {
            ViewerCommand::SetLightIntensity { light, intensity } => {
                self.set_light_intensity(light, intensity);
            }
            ViewerCommand::ToggleWireframe => {
                self.toggle_wireframe();
            }
            ViewerCommand::ResetCamera => self.reset_view(),
            ViewerCommand::SetAutoRotate(enabled) => {
                self.with_controls(|controls| controls.auto_rotate = enabled);
            }
            ViewerCommand::SetRotationSpeed(speed) => {
                self.with_controls(|controls| controls.auto_rotate_speed = speed);
            }
            ViewerCommand::SetGridVisible(visible) => {
                self.with_helpers(|helpers| helpers.show_grid = visible);
            }
            ViewerCommand::SetAxesVisible(visible) => {
                self.with_helpers(|helpers| helpers.show_axes = visible);
            }
            ViewerCommand::SetStatsVisible(visible) => {
                self.with_helpers(|helpers| helpers.show_stats = visible);
            }
            ViewerCommand::LoadFile(file) => return Some(self.load(ModelSource::File(file))),
        }
        None
    }

    pub fn handle_input(&self, input: OrbitInput) {
        self.with_controls(|controls| controls.handle_input(input));
    }

    /// One tick of the render loop, timed by the wall clock.
    pub fn frame(&self) -> Result<(), BackendError> {
        self.run_frame(|time| time.update())
    }

    /// One tick of the render loop at a host supplied timestamp.
    pub fn frame_at(&self, timestamp: Duration) -> Result<(), BackendError> {
        self.run_frame(|time| time.advance_to(timestamp))
    }

    fn run_frame(&self, advance: impl FnOnce(&mut Time)) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let Some(state) = state.as_mut() else {
            return Ok(());
        };

        advance(&mut state.app.world.resource_mut::<Time>());
        state.app.update();
        create_gpu_meshes(&mut state.app.world, state.backend.as_mut())?;
        render_frame(&mut state.app.world, state.backend.as_mut())
    }

    /// Resolves once every accepted format has a decoder.
    pub fn loaders_ready(&self) -> LocalBoxFuture<'static, bool> {
        self.registry.borrow_mut().ready()
    }

    pub fn register_decoder(
        &self,
        format: ModelFormat,
        decoder: Rc<dyn ModelDecoder>,
    ) -> Option<Rc<dyn ModelDecoder>> {
        self.registry.borrow_mut().register(format, decoder)
    }

    /// Subscribes to events sent from now on. Each receiver gets its own copy.
    pub fn events(&self) -> Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.with_world(|world| {
            world
                .get_resource::<LoadedModel>()
                .map(|loaded| loaded.info.clone())
        })
        .flatten()
    }

    pub fn camera(&self) -> Option<Camera> {
        self.resource::<Camera>()
    }

    pub fn controls(&self) -> Option<OrbitControls> {
        self.resource::<OrbitControls>()
    }

    pub fn lighting(&self) -> Option<LightingRig> {
        self.resource::<LightingRig>()
    }

    pub fn helpers(&self) -> Option<SceneHelpers> {
        self.resource::<SceneHelpers>()
    }

    pub fn frame_stats(&self) -> Option<FrameStats> {
        self.resource::<FrameStats>()
    }

    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.state
            .borrow()
            .as_ref()
            .map(|state| state.surface_size)
    }

    /// Materials of every part of the current model.
    pub fn materials(&self) -> Vec<Arc<CpuMaterial>> {
        self.with_world(model::materials).unwrap_or_default()
    }

    pub fn model_bounds(&self) -> BoundingBox<Vector3<f32>> {
        self.with_world(model::model_bounds)
            .unwrap_or_else(BoundingBox::empty)
    }

    pub fn is_wireframe(&self) -> bool {
        self.wireframe.get()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().is_none()
    }

    pub fn config(&self) -> &ViewerConfiguration {
        &self.config
    }

    fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        state.as_mut().map(|state| f(&mut state.app.world))
    }

    fn resource<R: Resource + Clone>(&self) -> Option<R> {
        self.with_world(|world| world.get_resource::<R>().cloned())
            .flatten()
    }

    fn with_controls(&self, f: impl FnOnce(&mut OrbitControls)) {
        self.with_world(|world| f(&mut world.resource_mut::<OrbitControls>()));
    }

    fn with_helpers(&self, f: impl FnOnce(&mut SceneHelpers)) {
        self.with_world(|world| f(&mut world.resource_mut::<SceneHelpers>()));
    }
}

/// Aims the camera and the orbit target at the model. Returns false when there is
/// no model and the default pose was used instead.
fn fit_camera(world: &mut World, config: &CameraConfig) -> bool {
    let bounds = model::model_bounds(world);
    let fit = fit_position(
        world.resource::<Camera>(),
        &bounds,
        config.fit_elevation,
        config.fit_padding,
    );
    let (position, target) = fit.unwrap_or((config.default_position, config.default_target));

    let distance = (position - target).norm();
    {
        let mut controls = world.resource_mut::<OrbitControls>();
        controls.stop();
        controls.target = target;
        if distance > controls.max_distance {
            controls.max_distance = distance;
        }
    }

    world.resource_mut::<Camera>().look_at(position, target);
    debug!(?position, ?target, fitted = fit.is_some(), "fit camera");
    fit.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::host::{FixedContainer, HostPage};
    use loader::source::FileHandle;

    fn session() -> ModelViewerSession {
        let host = HostPage::new().with_container("viewer3D", Rc::new(FixedContainer::new(800, 600)));
        ModelViewerSession::initialize(
            ViewerConfiguration::default(),
            &host,
            Box::new(HeadlessBackend::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_loading_guard_clears_on_drop() {
        let loading = Cell::new(false);
        let guard = LoadingGuard::acquire(&loading).unwrap();
        assert!(loading.get());
        assert!(LoadingGuard::acquire(&loading).is_none());
        drop(guard);
        assert!(!loading.get());
    }

    #[test]
    fn test_dropped_load_can_be_retried() {
        let session = session();
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let pending = session.load(ModelSource::File(FileHandle::from_bytes(
            "tri.obj",
            obj.as_bytes().to_vec(),
        )));
        assert!(session.is_loading());
        drop(pending);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_fit_without_model_uses_default_pose() {
        let session = session();
        session.handle_input(OrbitInput::Rotate { left: 1.0, up: 0.0 });
        session.fit_camera_to_model();

        let camera = session.camera().unwrap();
        let config = CameraConfig::default();
        assert_eq!(camera.position, config.default_position);
        assert_eq!(camera.target, config.default_target);
    }

    #[test]
    fn test_commands_update_controls_and_helpers() {
        let session = session();
        assert!(session.apply(ViewerCommand::SetAutoRotate(true)).is_none());
        session.apply(ViewerCommand::SetRotationSpeed(4.0));
        session.apply(ViewerCommand::SetGridVisible(false));
        session.apply(ViewerCommand::SetStatsVisible(true));

        let controls = session.controls().unwrap();
        assert!(controls.auto_rotate);
        assert_eq!(controls.auto_rotate_speed, 4.0);
        let helpers = session.helpers().unwrap();
        assert!(!helpers.show_grid);
        assert!(helpers.show_stats);
    }
}
