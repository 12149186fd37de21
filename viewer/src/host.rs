use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// The page region a viewer draws into.
pub trait Container {
    /// Current size in pixels.
    fn client_size(&self) -> (u32, u32);
}

/// Whatever embeds the viewer. Containers are looked up by id.
pub trait ViewerHost {
    fn find_container(&self, id: &str) -> Option<Rc<dyn Container>>;
}

/// A container whose size the host sets directly, e.g. from window resize events.
#[derive(Debug)]
pub struct FixedContainer {
    size: Cell<(u32, u32)>,
}

impl FixedContainer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new((width, height)),
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

impl Container for FixedContainer {
    fn client_size(&self) -> (u32, u32) {
        self.size.get()
    }
}

#[derive(Default)]
pub struct HostPage {
    containers: HashMap<String, Rc<dyn Container>>,
}

impl HostPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, id: impl Into<String>, container: Rc<dyn Container>) -> Self {
        self.containers.insert(id.into(), container);
        self
    }
}

impl ViewerHost for HostPage {
    fn find_container(&self, id: &str) -> Option<Rc<dyn Container>> {
        self.containers.get(id).cloned()
    }
}
