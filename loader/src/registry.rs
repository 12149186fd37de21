use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use scene::model::Model;

use crate::collada_loader::ColladaDecoder;
use crate::error::DecodeError;
use crate::fbx_loader::FbxDecoder;
use crate::format::ModelFormat;
use crate::gltf_loader::GltfDecoder;
use crate::obj_loader::ObjDecoder;

pub struct DecodeRequest<'a> {
    /// File name or URL, used for naming and log output.
    pub name: &'a str,
    pub bytes: &'a [u8],
    /// Directory for resolving external buffers.
    pub base_path: Option<&'a Path>,
}

pub trait ModelDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<Model, DecodeError>;
}

/// Decoders by format, plus signals that resolve once a format, or every required
/// format, has one.
pub struct LoaderRegistry {
    decoders: HashMap<ModelFormat, Rc<dyn ModelDecoder>>,
    required: HashSet<ModelFormat>,
    /// `None` waits for every required format.
    waiting: Vec<(Option<ModelFormat>, oneshot::Sender<()>)>,
}

impl LoaderRegistry {
    pub fn new(required: impl IntoIterator<Item = ModelFormat>) -> Self {
        Self {
            decoders: HashMap::new(),
            required: required.into_iter().collect(),
            waiting: Vec::new(),
        }
    }

    pub fn with_default_decoders(required: impl IntoIterator<Item = ModelFormat>) -> Self {
        let mut registry = Self::new(required);
        let gltf: Rc<dyn ModelDecoder> = Rc::new(GltfDecoder);
        registry.register(ModelFormat::Glb, gltf.clone());
        registry.register(ModelFormat::Gltf, gltf);
        registry.register(ModelFormat::Obj, Rc::new(ObjDecoder));
        registry.register(ModelFormat::Fbx, Rc::new(FbxDecoder));
        registry.register(ModelFormat::Dae, Rc::new(ColladaDecoder));
        registry
    }

    /// Returns the decoder that was replaced, if any.
    pub fn register(
        &mut self,
        format: ModelFormat,
        decoder: Rc<dyn ModelDecoder>,
    ) -> Option<Rc<dyn ModelDecoder>> {
        let previous = self.decoders.insert(format, decoder);

        let (satisfied, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiting)
            .into_iter()
            .partition(|(waiting_for, _)| self.has_decoders_for(*waiting_for));
        self.waiting = pending;
        for (_, sender) in satisfied {
            let _ = sender.send(());
        }
        previous
    }

    pub fn decoder(&self, format: ModelFormat) -> Option<Rc<dyn ModelDecoder>> {
        self.decoders.get(&format).cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.required
            .iter()
            .all(|format| self.decoders.contains_key(format))
    }

    pub fn missing(&self) -> Vec<ModelFormat> {
        let mut missing: Vec<_> = self
            .required
            .iter()
            .filter(|format| !self.decoders.contains_key(format))
            .copied()
            .collect();
        missing.sort_by_key(|format| format.extension());
        missing
    }

    /// Resolves to `true` once ready, or to `false` if the registry is dropped first.
    pub fn ready(&mut self) -> LocalBoxFuture<'static, bool> {
        self.wait_for(None)
    }

    /// Like `ready`, for a single format.
    pub fn decoder_ready(&mut self, format: ModelFormat) -> LocalBoxFuture<'static, bool> {
        self.wait_for(Some(format))
    }

    fn has_decoders_for(&self, format: Option<ModelFormat>) -> bool {
        match format {
            Some(format) => self.decoders.contains_key(&format),
            None => self.is_ready(),
        }
    }

    fn wait_for(&mut self, format: Option<ModelFormat>) -> LocalBoxFuture<'static, bool> {
        if self.has_decoders_for(format) {
            return future::ready(true).boxed_local();
        }

        let (sender, receiver) = oneshot::channel();
        self.waiting.push((format, sender));
        receiver.map(|result| result.is_ok()).boxed_local()
    }
}
