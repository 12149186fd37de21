use std::io::Read;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use scene::material::{CpuMaterial, MaterialSlot};
use scene::mesh::{flat_normals, CpuMesh, CpuMeshVertex};
use scene::model::{Model, ModelPart};
use scene::transform::Transform;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::registry::{DecodeRequest, ModelDecoder};

const FORMAT: &str = "FBX";
const MAGIC: &[u8] = b"Kaydara FBX Binary  \0\x1a\0";
const HEADER_LEN: usize = 27;
/// From this version on, record headers use 64 bit fields.
const WIDE_HEADER_VERSION: u32 = 7500;
const MAX_NODE_DEPTH: usize = 64;
/// Upper bound of what deflate can expand one stored byte into.
const MAX_INFLATE_RATIO: usize = 1032;

/// Binary FBX 7.x. Every `Geometry` object becomes one part, scene graph
/// transforms and materials are not read.
pub struct FbxDecoder;

impl ModelDecoder for FbxDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<Model, DecodeError> {
        let nodes = parse_document(request.bytes)?;

        let geometries = nodes
            .iter()
            .filter(|node| node.name == "Objects")
            .flat_map(|objects| objects.children_named("Geometry"));

        let mut parts = Vec::new();
        for geometry in geometries {
            match read_geometry(geometry)? {
                Some(part) => parts.push(part),
                None => warn!(name = ?geometry.object_name(), "skipping geometry without polygons"),
            }
        }
        if parts.is_empty() {
            return Err(DecodeError::Empty);
        }

        debug!(name = request.name, parts = parts.len(), "decoded FBX");
        Ok(Model {
            name: Some(request.name.to_string()),
            parts,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Property {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Integers(Vec<i64>),
    Floats(Vec<f64>),
    Bools(Vec<bool>),
    String(String),
    Raw(Vec<u8>),
}

impl Property {
    fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Property::Floats(values) => Some(values),
            _ => None,
        }
    }

    fn as_integers(&self) -> Option<&[i64]> {
        match self {
            Property::Integers(values) => Some(values),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    properties: Vec<Property>,
    children: Vec<Node>,
}

impl Node {
    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    fn first_property(&self) -> Option<&Property> {
        self.properties.first()
    }

    /// Object names are stored as `Name\0\x01Class`.
    fn object_name(&self) -> Option<&str> {
        let name = self.properties.get(1)?.as_str()?;
        let name = name.split("\0\u{1}").next().unwrap_or(name);
        (!name.is_empty()).then_some(name)
    }
}

fn parse_document(bytes: &[u8]) -> Result<Vec<Node>, DecodeError> {
    if !bytes.starts_with(MAGIC) {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
        if head.contains("FBXHeaderExtension") || head.trim_start().starts_with(';') {
            return Err(DecodeError::unsupported(FORMAT, "ASCII FBX files are not supported"));
        }
        return Err(DecodeError::malformed(FORMAT, "missing binary FBX header"));
    }

    let mut reader = Reader::new(bytes, MAGIC.len());
    let version = reader.u32()?;
    debug_assert_eq!(reader.position, HEADER_LEN);

    let mut nodes = Vec::new();
    while let Some(node) = read_node(&mut reader, version, 0)? {
        nodes.push(node);
    }
    Ok(nodes)
}

/// `None` for the null record that ends a list of nodes.
fn read_node(reader: &mut Reader, version: u32, depth: usize) -> Result<Option<Node>, DecodeError> {
    if reader.remaining() == 0 {
        return Ok(None);
    }
    if depth >= MAX_NODE_DEPTH {
        return Err(DecodeError::malformed(FORMAT, "records are nested too deeply"));
    }

    let (end_offset, property_count, _property_list_len) = if version >= WIDE_HEADER_VERSION {
        (reader.u64()?, reader.u64()?, reader.u64()?)
    } else {
        (
            reader.u32()? as u64,
            reader.u32()? as u64,
            reader.u32()? as u64,
        )
    };
    let name_len = reader.u8()? as usize;

    if end_offset == 0 {
        return Ok(None);
    }
    let end_offset = usize::try_from(end_offset)
        .ok()
        .filter(|end| *end <= reader.data.len() && *end >= reader.position)
        .ok_or_else(|| DecodeError::malformed(FORMAT, "record ends outside the file"))?;

    let name = String::from_utf8_lossy(reader.bytes(name_len)?).into_owned();

    let mut properties = Vec::new();
    for _ in 0..property_count {
        properties.push(read_property(reader)?);
    }

    let mut children = Vec::new();
    while reader.position < end_offset {
        match read_node(reader, version, depth + 1)? {
            Some(child) => children.push(child),
            None => break,
        }
    }
    reader.position = end_offset;

    Ok(Some(Node {
        name,
        properties,
        children,
    }))
}

fn read_property(reader: &mut Reader) -> Result<Property, DecodeError> {
    let type_code = reader.u8()?;
    let property = match type_code {
        b'C' => Property::Bool(reader.u8()? != 0),
        b'Y' => Property::Integer(i16::from_le_bytes(reader.array()?) as i64),
        b'I' => Property::Integer(i32::from_le_bytes(reader.array()?) as i64),
        b'L' => Property::Integer(i64::from_le_bytes(reader.array()?)),
        b'F' => Property::Float(f32::from_le_bytes(reader.array()?) as f64),
        b'D' => Property::Float(f64::from_le_bytes(reader.array()?)),
        b'f' => Property::Floats(read_array(reader, 4, |b| {
            f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64
        })?),
        b'd' => Property::Floats(read_array(reader, 8, |b| {
            f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })?),
        b'i' => Property::Integers(read_array(reader, 4, |b| {
            i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64
        })?),
        b'l' => Property::Integers(read_array(reader, 8, |b| {
            i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })?),
        b'b' => Property::Bools(read_array(reader, 1, |b| b[0] != 0)?),
        b'S' => {
            let len = reader.u32()? as usize;
            Property::String(String::from_utf8_lossy(reader.bytes(len)?).into_owned())
        }
        b'R' => {
            let len = reader.u32()? as usize;
            Property::Raw(reader.bytes(len)?.to_vec())
        }
        other => {
            return Err(DecodeError::malformed(
                FORMAT,
                format!("unknown property type {:?}", other as char),
            ))
        }
    };
    Ok(property)
}

fn read_array<T>(
    reader: &mut Reader,
    element_size: usize,
    convert: impl Fn(&[u8]) -> T,
) -> Result<Vec<T>, DecodeError> {
    let count = reader.u32()? as usize;
    let encoding = reader.u32()?;
    let stored_len = reader.u32()? as usize;
    let stored = reader.bytes(stored_len)?;

    let expected_len = count
        .checked_mul(element_size)
        .ok_or_else(|| DecodeError::malformed(FORMAT, "array too large"))?;
    let max_len = match encoding {
        0 => stored_len,
        _ => stored_len.saturating_mul(MAX_INFLATE_RATIO),
    };
    if expected_len > max_len {
        return Err(DecodeError::malformed(FORMAT, "array longer than its stored data"));
    }

    let decoded;
    let raw = match encoding {
        0 => stored,
        1 => {
            let mut inflated = Vec::with_capacity(expected_len);
            ZlibDecoder::new(stored)
                .take(expected_len as u64)
                .read_to_end(&mut inflated)
                .map_err(|err| DecodeError::malformed(FORMAT, format!("bad zlib array: {err}")))?;
            decoded = inflated;
            &decoded[..]
        }
        other => {
            return Err(DecodeError::unsupported(
                FORMAT,
                format!("array encoding {other}"),
            ))
        }
    };

    if raw.len() < expected_len {
        return Err(DecodeError::malformed(FORMAT, "array shorter than its length"));
    }
    Ok(raw[..expected_len].chunks_exact(element_size).map(convert).collect())
}

fn read_geometry(geometry: &Node) -> Result<Option<ModelPart>, DecodeError> {
    let (Some(vertices), Some(polygons)) = (
        geometry
            .child("Vertices")
            .and_then(Node::first_property)
            .and_then(Property::as_floats),
        geometry
            .child("PolygonVertexIndex")
            .and_then(Node::first_property)
            .and_then(Property::as_integers),
    ) else {
        return Ok(None);
    };

    let control_points: Vec<[f32; 3]> = vertices
        .chunks_exact(3)
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();
    let normals = LayerNormals::read(geometry);

    let mut mesh_vertices = Vec::new();
    let mut indices = Vec::new();
    let mut polygon: Vec<u32> = Vec::new();

    for (polygon_vertex, &raw_index) in polygons.iter().enumerate() {
        // A negative index closes the polygon, stored as -(index + 1)
        let (control_point, closes_polygon) = if raw_index < 0 {
            (!raw_index, true)
        } else {
            (raw_index, false)
        };
        let position = usize::try_from(control_point)
            .ok()
            .and_then(|index| control_points.get(index))
            .ok_or_else(|| DecodeError::malformed(FORMAT, "polygon index out of range"))?;

        polygon.push(mesh_vertices.len() as u32);
        mesh_vertices.push(CpuMeshVertex {
            position: *position,
            normal: normals
                .as_ref()
                .and_then(|normals| normals.get(polygon_vertex, control_point as usize))
                .unwrap_or_default(),
            uv: [0.0, 0.0],
        });

        if closes_polygon {
            for i in 1..polygon.len().saturating_sub(1) {
                indices.extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
            }
            polygon.clear();
        }
    }

    if indices.is_empty() {
        return Ok(None);
    }

    if normals.is_none() {
        let positions: Vec<[f32; 3]> = mesh_vertices.iter().map(|v| v.position).collect();
        for (vertex, normal) in mesh_vertices.iter_mut().zip(flat_normals(&positions, &indices)) {
            vertex.normal = normal;
        }
    }

    let name = geometry.object_name().map(str::to_string);
    let material = match &name {
        Some(name) => CpuMaterial::named(name.clone()),
        None => CpuMaterial::default(),
    };

    Ok(Some(ModelPart {
        name,
        transform: Transform::default(),
        mesh: CpuMesh::from_vertices(mesh_vertices, indices, Vec::new()),
        materials: MaterialSlot::Single(Arc::new(material)),
    }))
}

/// Normals stored directly, either per polygon corner or per control point.
struct LayerNormals<'a> {
    values: &'a [f64],
    by_polygon_vertex: bool,
}

impl<'a> LayerNormals<'a> {
    fn read(geometry: &'a Node) -> Option<LayerNormals<'a>> {
        let layer = geometry.child("LayerElementNormal")?;
        let values = layer.child("Normals")?.first_property()?.as_floats()?;

        let reference = layer
            .child("ReferenceInformationType")
            .and_then(Node::first_property)
            .and_then(Property::as_str)
            .unwrap_or("Direct");
        if reference != "Direct" {
            return None;
        }

        let mapping = layer
            .child("MappingInformationType")
            .and_then(Node::first_property)
            .and_then(Property::as_str)
            .unwrap_or("ByPolygonVertex");
        let by_polygon_vertex = match mapping {
            "ByPolygonVertex" => true,
            "ByVertice" | "ByVertex" | "ByControlPoint" => false,
            _ => return None,
        };

        Some(LayerNormals {
            values,
            by_polygon_vertex,
        })
    }

    fn get(&self, polygon_vertex: usize, control_point: usize) -> Option<[f32; 3]> {
        let index = if self.by_polygon_vertex {
            polygon_vertex
        } else {
            control_point
        };
        let n = self.values.get(index * 3..index * 3 + 3)?;
        Some([n[0] as f32, n[1] as f32, n[2] as f32])
    }
}

struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| DecodeError::malformed(FORMAT, "unexpected end of file"))?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}
