pub mod backend;
pub mod camera;
pub mod commands;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod gpu_resources;
pub mod helpers;
pub mod host;
pub mod model;
pub mod plugin;
pub mod render;
pub mod session;

pub use config::ViewerConfiguration;
pub use error::{InitError, LoadError, LoadFailureKind, LoadResult};
pub use session::ModelViewerSession;
