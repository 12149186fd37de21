use loader::source::FileHandle;
use scene::light::LightName;

/// What the optional page controls can ask for: sliders, buttons, checkboxes,
/// and files from drag and drop or a file picker.
#[derive(Debug, Clone)]
pub enum ViewerCommand {
    SetLightIntensity { light: LightName, intensity: f32 },
    ToggleWireframe,
    ResetCamera,
    SetAutoRotate(bool),
    SetRotationSpeed(f32),
    SetGridVisible(bool),
    SetAxesVisible(bool),
    SetStatsVisible(bool),
    LoadFile(FileHandle),
}
