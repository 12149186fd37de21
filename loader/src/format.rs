use serde::{Deserialize, Serialize};

/// The model file types a viewer can decode, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFormat {
    #[serde(rename = ".glb")]
    Glb,
    #[serde(rename = ".gltf")]
    Gltf,
    #[serde(rename = ".obj")]
    Obj,
    #[serde(rename = ".fbx")]
    Fbx,
    #[serde(rename = ".dae")]
    Dae,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 5] = [
        ModelFormat::Glb,
        ModelFormat::Gltf,
        ModelFormat::Obj,
        ModelFormat::Fbx,
        ModelFormat::Dae,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Glb => ".glb",
            ModelFormat::Gltf => ".gltf",
            ModelFormat::Obj => ".obj",
            ModelFormat::Fbx => ".fbx",
            ModelFormat::Dae => ".dae",
        }
    }

    /// Case-insensitive, with or without the leading dot.
    pub fn from_extension(extension: &str) -> Option<ModelFormat> {
        let extension = extension.trim_start_matches('.');
        ModelFormat::ALL
            .into_iter()
            .find(|format| format.extension()[1..].eq_ignore_ascii_case(extension))
    }
}

/// Lowercased extension of a file name or URL, including the dot.
/// Query strings and fragments are ignored. Empty when there is none.
pub fn extension_of(name: &str) -> String {
    let name = name.split(['?', '#']).next().unwrap_or_default();
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or_default();

    match file_name.rfind('.') {
        Some(dot) if dot + 1 < file_name.len() => file_name[dot..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of_ignores_case_and_query() {
        assert_eq!(extension_of("models/Ship.GLB"), ".glb");
        assert_eq!(extension_of("https://host/a/model.gltf?v=3#top"), ".gltf");
        assert_eq!(extension_of("C:\\models\\part.Obj"), ".obj");
        assert_eq!(extension_of("archive.tar.dae"), ".dae");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("dir.v2/file"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(ModelFormat::from_extension(".FBX"), Some(ModelFormat::Fbx));
        assert_eq!(ModelFormat::from_extension("dae"), Some(ModelFormat::Dae));
        assert_eq!(ModelFormat::from_extension(".bmp"), None);
        assert_eq!(ModelFormat::from_extension(""), None);
    }

    #[test]
    fn test_serializes_as_extension() {
        let json = serde_json::to_string(&ModelFormat::ALL).unwrap();
        assert_eq!(json, r#"[".glb",".gltf",".obj",".fbx",".dae"]"#);
        let parsed: Vec<ModelFormat> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ModelFormat::ALL);
    }
}
