use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{Matrix3, Matrix4, Point3, Unit, Vector3};
use roxmltree::{Document, Node, NodeId};
use scene::material::{CpuMaterial, MaterialSlot};
use scene::mesh::{flat_normals, CpuMesh, CpuMeshVertex, MeshGroup};
use scene::model::{Model, ModelPart};
use scene::transform::Transform;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::registry::{DecodeRequest, ModelDecoder};

const FORMAT: &str = "COLLADA";
/// Deepest node nesting followed, counting `instance_node` hops.
const MAX_NODE_DEPTH: usize = 128;

/// COLLADA `.dae`: triangle and polylist meshes placed by the visual scene.
pub struct ColladaDecoder;

impl ModelDecoder for ColladaDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<Model, DecodeError> {
        let text = std::str::from_utf8(request.bytes)
            .map_err(|_| DecodeError::malformed(FORMAT, "file is not UTF-8 text"))?;
        let document = Document::parse(text)?;
        let root = document.root_element();
        if !root.has_tag_name("COLLADA") {
            return Err(DecodeError::malformed(FORMAT, "missing COLLADA root element"));
        }

        let mut scene_loading_data = SceneLoadingData {
            root,
            geometries: HashMap::new(),
            ancestors: Vec::new(),
        };
        let root_matrix = asset_matrix(root);
        let mut parts = Vec::new();

        match visual_scene(root) {
            Some(scene) => {
                for node in scene.children().filter(|n| n.has_tag_name("node")) {
                    read_node(node, &mut scene_loading_data, &mut parts, &root_matrix)?;
                }
            }
            None => {
                // No scene, show every geometry where it was modelled
                let geometries = child(root, "library_geometries")
                    .into_iter()
                    .flat_map(|library| library.children().filter(|n| n.has_tag_name("geometry")));
                for geometry in geometries {
                    if let Some(id) = geometry.attribute("id") {
                        add_instance(id, None, &root_matrix, &mut scene_loading_data, &mut parts)?;
                    }
                }
            }
        }

        if parts.is_empty() {
            return Err(DecodeError::Empty);
        }
        debug!(name = request.name, parts = parts.len(), "decoded COLLADA");
        Ok(Model {
            name: Some(request.name.to_string()),
            parts,
        })
    }
}

struct SceneLoadingData<'a, 'input> {
    root: Node<'a, 'input>,
    geometries: HashMap<String, Option<(Arc<CpuMesh>, MaterialSlot)>>,
    /// Nodes being read, outermost first.
    ancestors: Vec<NodeId>,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn find_by_id<'a, 'input>(root: Node<'a, 'input>, id: &str) -> Option<Node<'a, 'input>> {
    root.descendants().find(|n| n.attribute("id") == Some(id))
}

fn parse_floats(node: Node) -> Result<Vec<f32>, DecodeError> {
    node.text()
        .unwrap_or_default()
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f32>()
                .map_err(|_| DecodeError::malformed(FORMAT, format!("bad number {token:?}")))
        })
        .collect()
}

fn parse_indices(node: Node) -> Result<Vec<usize>, DecodeError> {
    node.text()
        .unwrap_or_default()
        .split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| DecodeError::malformed(FORMAT, format!("bad index {token:?}")))
        })
        .collect()
}

/// Converts Z-up documents to Y-up and applies the unit scale.
fn asset_matrix(root: Node) -> Matrix4<f32> {
    let asset = child(root, "asset");

    let up_axis = asset
        .and_then(|asset| child(asset, "up_axis"))
        .and_then(|n| n.text())
        .map(str::trim)
        .unwrap_or("Y_UP");
    let rotation = match up_axis {
        "Z_UP" => Matrix4::from_axis_angle(&Vector3::x_axis(), -std::f32::consts::FRAC_PI_2),
        "X_UP" => Matrix4::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
        _ => Matrix4::identity(),
    };

    let meter = asset
        .and_then(|asset| child(asset, "unit"))
        .and_then(|unit| unit.attribute("meter"))
        .and_then(|meter| meter.parse::<f32>().ok())
        .filter(|meter| *meter > 0.0)
        .unwrap_or(1.0);

    rotation * Matrix4::new_scaling(meter)
}

fn visual_scene<'a, 'input>(root: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let instanced = child(root, "scene")
        .and_then(|scene| child(scene, "instance_visual_scene"))
        .and_then(|instance| instance.attribute("url"))
        .and_then(|url| find_by_id(root, url.trim_start_matches('#')));

    instanced.or_else(|| {
        child(root, "library_visual_scenes")
            .and_then(|library| child(library, "visual_scene"))
    })
}

fn node_matrix(node: Node) -> Result<Matrix4<f32>, DecodeError> {
    let mut matrix = Matrix4::identity();

    for element in node.children().filter(Node::is_element) {
        let values = match element.tag_name().name() {
            "matrix" | "translate" | "rotate" | "scale" => parse_floats(element)?,
            _ => continue,
        };
        let local = match (element.tag_name().name(), values.as_slice()) {
            ("matrix", values) if values.len() == 16 => Matrix4::from_row_slice(values),
            ("translate", [x, y, z]) => Matrix4::new_translation(&Vector3::new(*x, *y, *z)),
            ("rotate", [x, y, z, degrees]) => {
                let axis = Unit::try_new(Vector3::new(*x, *y, *z), f32::EPSILON)
                    .unwrap_or_else(Vector3::y_axis);
                Matrix4::from_axis_angle(&axis, degrees.to_radians())
            }
            ("scale", [x, y, z]) => Matrix4::new_nonuniform_scaling(&Vector3::new(*x, *y, *z)),
            (name, _) => {
                return Err(DecodeError::malformed(
                    FORMAT,
                    format!("<{name}> has the wrong number of values"),
                ))
            }
        };
        matrix *= local;
    }

    Ok(matrix)
}

fn read_node(
    node: Node,
    scene_loading_data: &mut SceneLoadingData,
    parts: &mut Vec<ModelPart>,
    parent_matrix: &Matrix4<f32>,
) -> Result<(), DecodeError> {
    if scene_loading_data.ancestors.contains(&node.id()) {
        return Err(DecodeError::malformed(FORMAT, "node instances itself"));
    }
    if scene_loading_data.ancestors.len() >= MAX_NODE_DEPTH {
        return Err(DecodeError::malformed(FORMAT, "nodes are nested too deeply"));
    }

    scene_loading_data.ancestors.push(node.id());
    let result = read_node_contents(node, scene_loading_data, parts, parent_matrix);
    scene_loading_data.ancestors.pop();
    result
}

fn read_node_contents(
    node: Node,
    scene_loading_data: &mut SceneLoadingData,
    parts: &mut Vec<ModelPart>,
    parent_matrix: &Matrix4<f32>,
) -> Result<(), DecodeError> {
    let global_matrix = parent_matrix * node_matrix(node)?;
    let name = node.attribute("name").or(node.attribute("id"));

    for element in node.children().filter(Node::is_element) {
        match element.tag_name().name() {
            "node" => read_node(element, scene_loading_data, parts, &global_matrix)?,
            "instance_geometry" => {
                if let Some(url) = element.attribute("url") {
                    add_instance(
                        url.trim_start_matches('#'),
                        name,
                        &global_matrix,
                        scene_loading_data,
                        parts,
                    )?;
                }
            }
            "instance_node" => {
                let target = element
                    .attribute("url")
                    .and_then(|url| find_by_id(scene_loading_data.root, url.trim_start_matches('#')));
                if let Some(target) = target {
                    read_node(target, scene_loading_data, parts, &global_matrix)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn add_instance(
    geometry_id: &str,
    name: Option<&str>,
    matrix: &Matrix4<f32>,
    scene_loading_data: &mut SceneLoadingData,
    parts: &mut Vec<ModelPart>,
) -> Result<(), DecodeError> {
    if !scene_loading_data.geometries.contains_key(geometry_id) {
        let geometry = match find_by_id(scene_loading_data.root, geometry_id) {
            Some(geometry) => read_geometry(geometry)?,
            None => {
                warn!(geometry_id, "instance of a missing geometry");
                None
            }
        };
        scene_loading_data
            .geometries
            .insert(geometry_id.to_string(), geometry);
    }

    if let Some(Some((mesh, materials))) = scene_loading_data.geometries.get(geometry_id) {
        let (transform, mesh) = match Transform::try_from_matrix(matrix) {
            Some(transform) => (transform, mesh.clone()),
            None => {
                debug!(geometry_id, "baking sheared instance into its vertices");
                (Transform::default(), bake_matrix(mesh, matrix))
            }
        };
        parts.push(ModelPart {
            name: name.or(Some(geometry_id)).map(str::to_string),
            transform,
            mesh,
            materials: materials.clone(),
        });
    }
    Ok(())
}

/// Copies `mesh` with `matrix` applied to every vertex.
fn bake_matrix(mesh: &CpuMesh, matrix: &Matrix4<f32>) -> Arc<CpuMesh> {
    let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let normal_matrix = linear
        .try_inverse()
        .map(|inverse| inverse.transpose())
        .unwrap_or(linear);

    let vertices = mesh
        .vertices
        .iter()
        .map(|vertex| {
            let position = matrix.transform_point(&Point3::from(vertex.position));
            let normal = (normal_matrix * Vector3::from(vertex.normal))
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::y);
            CpuMeshVertex {
                position: position.into(),
                normal: normal.into(),
                uv: vertex.uv,
            }
        })
        .collect();

    let mut indices = mesh.indices.clone();
    if linear.determinant() < 0.0 {
        // mirrored, keep the triangles facing outwards
        for triangle in indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
    }

    CpuMesh::from_vertices(vertices, indices, mesh.groups.clone())
}

/// Float source with its accessor stride.
struct Source {
    values: Vec<f32>,
    stride: usize,
}

impl Source {
    fn read(node: Node) -> Result<Source, DecodeError> {
        let values = child(node, "float_array")
            .map(parse_floats)
            .transpose()?
            .unwrap_or_default();
        let stride = child(node, "technique_common")
            .and_then(|technique| child(technique, "accessor"))
            .and_then(|accessor| accessor.attribute("stride"))
            .and_then(|stride| stride.parse::<usize>().ok())
            .filter(|stride| *stride > 0)
            .unwrap_or(3);
        Ok(Source { values, stride })
    }

    fn get<const N: usize>(&self, index: usize) -> Option<[f32; N]> {
        let start = index.checked_mul(self.stride)?;
        let values = self.values.get(start..start.checked_add(N)?)?;
        let mut out = [0.0; N];
        out.copy_from_slice(values);
        Some(out)
    }
}

#[derive(Default)]
struct PrimitiveInputs {
    positions: Option<(usize, Source)>,
    normals: Option<(usize, Source)>,
    uvs: Option<(usize, Source)>,
}

fn read_inputs(primitive: Node, mesh: Node) -> Result<(PrimitiveInputs, usize), DecodeError> {
    let mut inputs = PrimitiveInputs::default();
    let mut stride = 1;

    let source_node = |url: &str| {
        mesh.children()
            .find(|n| n.attribute("id") == Some(url.trim_start_matches('#')))
    };

    for input in primitive.children().filter(|n| n.has_tag_name("input")) {
        let offset = input
            .attribute("offset")
            .and_then(|offset| offset.parse::<usize>().ok())
            .unwrap_or(0);
        stride = stride.max(offset + 1);

        let Some(target) = input.attribute("source").and_then(source_node) else {
            continue;
        };

        match input.attribute("semantic") {
            Some("VERTEX") => {
                // <vertices> forwards to the actual sources
                for forwarded in target.children().filter(|n| n.has_tag_name("input")) {
                    let Some(source) = forwarded.attribute("source").and_then(source_node) else {
                        continue;
                    };
                    match forwarded.attribute("semantic") {
                        Some("POSITION") => inputs.positions = Some((offset, Source::read(source)?)),
                        Some("NORMAL") => inputs.normals = Some((offset, Source::read(source)?)),
                        Some("TEXCOORD") => inputs.uvs = Some((offset, Source::read(source)?)),
                        _ => {}
                    }
                }
            }
            Some("NORMAL") => inputs.normals = Some((offset, Source::read(target)?)),
            Some("TEXCOORD") if inputs.uvs.is_none() => {
                inputs.uvs = Some((offset, Source::read(target)?))
            }
            _ => {}
        }
    }

    Ok((inputs, stride))
}

fn read_geometry(geometry: Node) -> Result<Option<(Arc<CpuMesh>, MaterialSlot)>, DecodeError> {
    let Some(mesh) = child(geometry, "mesh") else {
        return Ok(None);
    };

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut groups = Vec::new();
    let mut material_names: Vec<String> = Vec::new();
    let mut missing_normals = false;

    for primitive in mesh.children().filter(Node::is_element) {
        let kind = primitive.tag_name().name();
        if !matches!(kind, "triangles" | "polylist") {
            if matches!(kind, "lines" | "linestrips" | "polygons" | "trifans" | "tristrips") {
                warn!(kind, "skipping unsupported COLLADA primitive");
            }
            continue;
        }

        let (inputs, stride) = read_inputs(primitive, mesh)?;
        let Some((position_offset, positions)) = &inputs.positions else {
            warn!("skipping primitive without positions");
            continue;
        };
        let p = child(primitive, "p").map(parse_indices).transpose()?.unwrap_or_default();

        let corner_count = p.len() / stride;
        let polygon_sizes: Vec<usize> = if kind == "polylist" {
            child(primitive, "vcount")
                .map(parse_indices)
                .transpose()?
                .unwrap_or_default()
        } else {
            vec![3; corner_count / 3]
        };
        let needed = polygon_sizes
            .iter()
            .try_fold(0usize, |total, size| total.checked_add(*size));
        if needed.map_or(true, |needed| needed > corner_count) {
            return Err(DecodeError::malformed(FORMAT, "<p> has fewer indices than polygons need"));
        }

        let start = indices.len();
        let mut corner = 0;
        for size in polygon_sizes {
            let first = vertices.len() as u32;
            for _ in 0..size {
                let base = corner * stride;
                let position = positions
                    .get::<3>(p[base + position_offset])
                    .ok_or_else(|| DecodeError::malformed(FORMAT, "position index out of range"))?;
                let normal = match &inputs.normals {
                    Some((offset, normals)) => normals.get::<3>(p[base + offset]),
                    None => None,
                };
                missing_normals |= normal.is_none();
                let uv = inputs
                    .uvs
                    .as_ref()
                    .and_then(|(offset, uvs)| uvs.get::<2>(p[base + offset]))
                    .map(|[u, v]| [u, 1.0 - v])
                    .unwrap_or_default();

                vertices.push(CpuMeshVertex {
                    position,
                    normal: normal.unwrap_or_default(),
                    uv,
                });
                corner += 1;
            }
            for i in 1..(size as u32).saturating_sub(1) {
                indices.extend_from_slice(&[first, first + i, first + i + 1]);
            }
        }

        let material = primitive.attribute("material").unwrap_or("default");
        let material_index = match material_names.iter().position(|name| name == material) {
            Some(index) => index,
            None => {
                material_names.push(material.to_string());
                material_names.len() - 1
            }
        };
        groups.push(MeshGroup {
            start,
            count: indices.len() - start,
            material_index,
        });
    }

    if indices.is_empty() {
        return Ok(None);
    }

    if missing_normals {
        let positions: Vec<[f32; 3]> = vertices.iter().map(|v: &CpuMeshVertex| v.position).collect();
        for (vertex, normal) in vertices.iter_mut().zip(flat_normals(&positions, &indices)) {
            vertex.normal = normal;
        }
    }

    let materials = if material_names.len() == 1 {
        groups.clear();
        MaterialSlot::Single(Arc::new(CpuMaterial::named(material_names.remove(0))))
    } else {
        MaterialSlot::Multiple(
            material_names
                .into_iter()
                .map(|name| Arc::new(CpuMaterial::named(name)))
                .collect(),
        )
    };

    Ok(Some((CpuMesh::from_vertices(vertices, indices, groups), materials)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_Z_UP: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="meter" meter="1"/><up_axis>Z_UP</up_axis></asset>
  <library_geometries>
    <geometry id="plane-mesh" name="Plane">
      <mesh>
        <source id="plane-positions">
          <float_array id="plane-positions-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common><accessor source="#plane-positions-array" count="4" stride="3"/></technique_common>
        </source>
        <vertices id="plane-vertices"><input semantic="POSITION" source="#plane-positions"/></vertices>
        <polylist material="steel" count="1">
          <input semantic="VERTEX" source="#plane-vertices" offset="0"/>
          <vcount>4</vcount>
          <p>0 1 2 3</p>
        </polylist>
        <triangles material="glass" count="1">
          <input semantic="VERTEX" source="#plane-vertices" offset="0"/>
          <p>0 2 3</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene">
      <node id="Plane" name="Plane">
        <translate>0 0 2</translate>
        <instance_geometry url="#plane-mesh"/>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##;

    fn decode(text: &str) -> Result<Model, DecodeError> {
        ColladaDecoder.decode(&DecodeRequest {
            name: "plane.dae",
            bytes: text.as_bytes(),
            base_path: None,
        })
    }

    #[test]
    fn test_z_up_scene_is_rotated_to_y_up() {
        let model = decode(QUAD_Z_UP).unwrap();
        assert_eq!(model.mesh_count(), 1);

        let part = &model.parts[0];
        assert_eq!(part.name.as_deref(), Some("Plane"));
        assert_eq!(part.mesh.triangle_count(), 3);
        assert_eq!(part.materials.len(), 2);
        assert_eq!(part.mesh.groups.len(), 2);

        // z = 2 in the file ends up as y = 2
        let bounds = model.bounding_box();
        assert!((bounds.min.y - 2.0).abs() < 1e-5);
        assert!((bounds.max.y - 2.0).abs() < 1e-5);
        assert!((bounds.max.x - 1.0).abs() < 1e-5);
        assert!((bounds.min.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_bad_documents() {
        assert!(matches!(decode("<COLLADA"), Err(DecodeError::Xml(_))));
        assert!(matches!(decode("<scene/>"), Err(DecodeError::Malformed { .. })));
        assert!(matches!(
            decode(r#"<COLLADA><library_geometries/></COLLADA>"#),
            Err(DecodeError::Empty)
        ));
    }

    fn with_scene(nodes: &str) -> String {
        let geometries_start = QUAD_Z_UP.find("<library_geometries>").unwrap();
        let geometries_end = QUAD_Z_UP.find("<library_visual_scenes>").unwrap();
        format!(
            r##"<COLLADA>{}<library_visual_scenes><visual_scene id="Scene">{nodes}</visual_scene></library_visual_scenes></COLLADA>"##,
            &QUAD_Z_UP[geometries_start..geometries_end]
        )
    }

    #[test]
    fn test_self_instancing_node_is_malformed() {
        let document = with_scene(
            r##"<node id="a"><instance_geometry url="#plane-mesh"/><instance_node url="#a"/></node>"##,
        );
        assert!(matches!(decode(&document), Err(DecodeError::Malformed { .. })));

        let document = with_scene(
            r##"<node id="a"><instance_node url="#b"/></node><node id="b"><instance_node url="#a"/></node>"##,
        );
        assert!(matches!(decode(&document), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_shared_node_instanced_twice_is_fine() {
        let document = with_scene(
            r##"<node id="shared"><instance_geometry url="#plane-mesh"/></node>
                <node id="a"><instance_node url="#shared"/></node>
                <node id="b"><translate>5 0 0</translate><instance_node url="#shared"/></node>"##,
        );
        // shared itself plus one instance under each of a and b
        assert_eq!(decode(&document).unwrap().mesh_count(), 3);
    }

    #[test]
    fn test_sheared_instance_is_baked() {
        let document = with_scene(
            r##"<node id="parent"><scale>2 1 1</scale>
                  <node id="child"><rotate>0 0 1 45</rotate><instance_geometry url="#plane-mesh"/></node>
                </node>"##,
        );
        let model = decode(&document).unwrap();
        let part = &model.parts[0];
        assert_eq!(part.transform, Transform::default());

        let matrix = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 1.0))
            * Matrix4::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_4);
        let expected = matrix.transform_point(&Point3::new(1.0, 1.0, 0.0));
        assert!((Vector3::from(part.mesh.vertices[2].position) - expected.coords).norm() < 1e-5);
    }

    #[test]
    fn test_huge_polygon_counts_are_malformed() {
        let document = QUAD_Z_UP.replace(
            "<vcount>4</vcount>",
            &format!("<vcount>{} 4</vcount>", usize::MAX),
        );
        assert!(matches!(decode(&document), Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_node_matrix_applies_in_document_order() {
        let document = Document::parse(
            r#"<node><translate>1 0 0</translate><rotate>0 0 1 90</rotate><scale>2 2 2</scale></node>"#,
        )
        .unwrap();
        let matrix = node_matrix(document.root_element()).unwrap();
        let point = matrix.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert!((point - nalgebra::Point3::new(1.0, 2.0, 0.0)).norm() < 1e-5);
    }
}
