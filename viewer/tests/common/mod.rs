#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::json;
use viewer::backend::{HeadlessBackend, HeadlessStats};
use viewer::host::{FixedContainer, HostPage};
use viewer::{ModelViewerSession, ViewerConfiguration};

pub struct TestViewer {
    pub session: ModelViewerSession,
    pub container: Rc<FixedContainer>,
    pub stats: Rc<RefCell<HeadlessStats>>,
}

pub fn viewer() -> TestViewer {
    viewer_with(ViewerConfiguration::default())
}

pub fn viewer_with(config: ViewerConfiguration) -> TestViewer {
    let container = Rc::new(FixedContainer::new(800, 600));
    let host = HostPage::new().with_container(config.container_id.clone(), container.clone());
    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let session = ModelViewerSession::initialize(config, &host, Box::new(backend)).unwrap();

    TestViewer {
        session,
        container,
        stats,
    }
}

/// A binary glTF box of edge `size` placed at `center`. The buffer is padded with
/// zeros until the file is at least `min_len` bytes long.
pub fn box_glb(center: [f32; 3], size: f32, min_len: usize) -> Vec<u8> {
    let h = size / 2.0;
    let positions: [[f32; 3]; 8] = [
        [-h, -h, h],
        [h, -h, h],
        [h, h, h],
        [-h, h, h],
        [-h, -h, -h],
        [h, -h, -h],
        [h, h, -h],
        [-h, h, -h],
    ];
    let indices: [u16; 36] = [
        0, 1, 2, 2, 3, 0, 5, 4, 7, 7, 6, 5, 1, 5, 6, 6, 2, 1, 4, 0, 3, 3, 7, 4, 3, 2, 6, 6, 7, 3,
        1, 0, 4, 4, 5, 1,
    ];

    let mut bin = Vec::new();
    for position in positions {
        for value in position {
            bin.extend_from_slice(&value.to_le_bytes());
        }
    }
    for index in indices {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    while bin.len() < min_len || bin.len() % 4 != 0 {
        bin.push(0);
    }

    let document = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "box", "mesh": 0, "translation": center }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
        "materials": [{ "name": "paint" }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 96 },
            { "buffer": 0, "byteOffset": 96, "byteLength": 72 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
                "min": [-h, -h, -h], "max": [h, h, h]
            },
            { "bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR" }
        ]
    });

    pack_glb(&document, &bin)
}

/// A glTF whose only primitive draws points, so nothing can be shown.
pub fn points_glb() -> Vec<u8> {
    let mut bin = Vec::new();
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bin.extend_from_slice(&value.to_le_bytes());
    }

    let document = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "cloud", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 0 }] }],
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
        }]
    });
    pack_glb(&document, &bin)
}

fn pack_glb(document: &serde_json::Value, bin: &[u8]) -> Vec<u8> {
    let mut json_chunk = serde_json::to_vec(document).unwrap();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json_chunk);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(bin);
    glb
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
