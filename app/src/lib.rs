pub mod app;
pub mod core_stage;
pub mod plugin;
