use std::sync::Arc;

use nalgebra::Vector3;

use crate::asset::{Asset, AssetId};

#[derive(Clone, Debug)]
pub struct CpuMaterial {
    pub id: AssetId,
    pub name: Option<String>,
    pub base_color: Vector3<f32>,
    pub roughness_factor: f32,
    pub metallic_factor: f32,
    pub emissivity: Vector3<f32>,
    pub double_sided: bool,
    pub wireframe: bool,
}

impl CpuMaterial {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Default for CpuMaterial {
    fn default() -> Self {
        Self {
            id: AssetId::new_v4(),
            name: None,
            base_color: Vector3::new(0.8, 0.8, 0.8),
            roughness_factor: 1.0,
            metallic_factor: 0.0,
            emissivity: Vector3::new(0.0, 0.0, 0.0),
            double_sided: false,
            wireframe: false,
        }
    }
}

impl Asset for CpuMaterial {
    fn id(&self) -> AssetId {
        self.id
    }
}

/// A mesh part carries either one material or one per mesh group.
#[derive(Clone, Debug)]
pub enum MaterialSlot {
    Single(Arc<CpuMaterial>),
    Multiple(Vec<Arc<CpuMaterial>>),
}

impl MaterialSlot {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CpuMaterial>> {
        let materials: &[Arc<CpuMaterial>] = match self {
            MaterialSlot::Single(material) => std::slice::from_ref(material),
            MaterialSlot::Multiple(materials) => materials,
        };
        materials.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Arc<CpuMaterial>> {
        let materials: &mut [Arc<CpuMaterial>] = match self {
            MaterialSlot::Single(material) => std::slice::from_mut(material),
            MaterialSlot::Multiple(materials) => materials,
        };
        materials.iter_mut()
    }

    pub fn len(&self) -> usize {
        match self {
            MaterialSlot::Single(_) => 1,
            MaterialSlot::Multiple(materials) => materials.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materials shared with other parts are copied before being changed,
    /// the asset id stays the same.
    pub fn set_wireframe(&mut self, wireframe: bool) {
        for material in self.iter_mut() {
            if material.wireframe != wireframe {
                Arc::make_mut(material).wireframe = wireframe;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wireframe_applies_to_every_material() {
        let shared = Arc::new(CpuMaterial::default());
        let mut single = MaterialSlot::Single(shared.clone());
        let mut multiple = MaterialSlot::Multiple(vec![shared.clone(), Arc::new(CpuMaterial::named("glass"))]);

        single.set_wireframe(true);
        multiple.set_wireframe(true);

        assert!(single.iter().all(|material| material.wireframe));
        assert!(multiple.iter().all(|material| material.wireframe));
        assert!(!shared.wireframe);
        assert_eq!(multiple.len(), 2);
    }
}
