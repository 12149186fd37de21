use std::collections::HashMap;

pub trait Asset {
    fn id(&self) -> AssetId;
}

pub type AssetId = uuid::Uuid;

/// Maps CPU-side assets to whatever handle the owner keeps for them.
pub struct AssetMap<T> {
    pub entries: HashMap<AssetId, T>,
}

impl<T> AssetMap<T> {
    pub fn get(&self, id: &AssetId) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: AssetId, value: T) -> Option<T> {
        self.entries.insert(id, value)
    }

    pub fn contains(&self, id: &AssetId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, handing them back.
    pub fn drain(&mut self) -> impl Iterator<Item = (AssetId, T)> + '_ {
        self.entries.drain()
    }
}

impl<T> Default for AssetMap<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}
