use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use nalgebra::{Matrix4, Point3, Vector3};
use scene::asset::{Asset, AssetId};
use scene::light::LightingRig;
use scene::material::CpuMaterial;
use scene::mesh::CpuMesh;
use time::time::FrameStats;
use tracing::trace;

use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Refers to a mesh or material that lives on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandle(pub AssetId);

#[derive(Debug, Clone, PartialEq)]
pub struct DrawMaterial {
    pub handle: GpuHandle,
    pub wireframe: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub mesh: GpuHandle,
    pub materials: Vec<DrawMaterial>,
    pub world_matrix: Matrix4<f32>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescription {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub camera_position: Point3<f32>,
    pub lights: LightingRig,
    pub background: Vector3<f32>,
    pub show_grid: bool,
    pub show_axes: bool,
    pub stats: Option<FrameStats>,
    pub items: Vec<DrawItem>,
}

/// The GPU renderer a session draws with.
pub trait RenderBackend {
    fn create_surface(&mut self, size: SurfaceSize) -> Result<(), BackendError>;

    fn resize_surface(&mut self, size: SurfaceSize) -> Result<(), BackendError>;

    fn release_surface(&mut self);

    fn upload_mesh(&mut self, mesh: &CpuMesh) -> Result<GpuHandle, BackendError>;

    fn upload_material(&mut self, material: &CpuMaterial) -> Result<GpuHandle, BackendError>;

    fn release(&mut self, handle: GpuHandle);

    fn render(&mut self, frame: &FrameDescription) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
pub struct HeadlessStats {
    pub surface: Option<SurfaceSize>,
    pub live_handles: HashSet<GpuHandle>,
    pub meshes_uploaded: usize,
    pub materials_uploaded: usize,
    pub released: usize,
    pub frames_rendered: u64,
    pub last_frame: Option<FrameDescription>,
}

/// Keeps track of what would be on the GPU without drawing anything.
/// Clone the stats handle before boxing the backend to inspect it later.
#[derive(Default)]
pub struct HeadlessBackend {
    stats: Rc<RefCell<HeadlessStats>>,
    max_surface_size: Option<u32>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses surfaces larger than `max` along either side.
    pub fn with_max_surface_size(mut self, max: u32) -> Self {
        self.max_surface_size = Some(max);
        self
    }

    pub fn stats(&self) -> Rc<RefCell<HeadlessStats>> {
        self.stats.clone()
    }

    fn check_size(&self, size: SurfaceSize) -> Result<(), BackendError> {
        let too_large = self
            .max_surface_size
            .map_or(false, |max| size.width > max || size.height > max);
        if size.is_zero_area() || too_large {
            return Err(BackendError::UnsupportedSurface {
                width: size.width,
                height: size.height,
            });
        }
        Ok(())
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_surface(&mut self, size: SurfaceSize) -> Result<(), BackendError> {
        self.check_size(size)?;
        self.stats.borrow_mut().surface = Some(size);
        Ok(())
    }

    fn resize_surface(&mut self, size: SurfaceSize) -> Result<(), BackendError> {
        self.check_size(size)?;
        let mut stats = self.stats.borrow_mut();
        match stats.surface.as_mut() {
            Some(surface) => *surface = size,
            None => return Err(BackendError::NoSurface),
        }
        Ok(())
    }

    fn release_surface(&mut self) {
        self.stats.borrow_mut().surface = None;
    }

    fn upload_mesh(&mut self, mesh: &CpuMesh) -> Result<GpuHandle, BackendError> {
        let handle = GpuHandle(mesh.id());
        let mut stats = self.stats.borrow_mut();
        stats.live_handles.insert(handle);
        stats.meshes_uploaded += 1;
        trace!(vertices = mesh.vertices.len(), "uploaded mesh");
        Ok(handle)
    }

    fn upload_material(&mut self, material: &CpuMaterial) -> Result<GpuHandle, BackendError> {
        let handle = GpuHandle(material.id());
        let mut stats = self.stats.borrow_mut();
        stats.live_handles.insert(handle);
        stats.materials_uploaded += 1;
        Ok(handle)
    }

    fn release(&mut self, handle: GpuHandle) {
        let mut stats = self.stats.borrow_mut();
        if stats.live_handles.remove(&handle) {
            stats.released += 1;
        }
    }

    fn render(&mut self, frame: &FrameDescription) -> Result<(), BackendError> {
        let mut stats = self.stats.borrow_mut();
        if stats.surface.is_none() {
            return Err(BackendError::NoSurface);
        }
        stats.frames_rendered += 1;
        stats.last_frame = Some(frame.clone());
        Ok(())
    }
}
