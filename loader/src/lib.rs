pub mod collada_loader;
pub mod config_loader;
pub mod error;
pub mod fbx_loader;
pub mod format;
pub mod gltf_loader;
pub mod obj_loader;
pub mod registry;
pub mod source;
