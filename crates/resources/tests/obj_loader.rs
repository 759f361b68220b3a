//! Integration tests for OBJ loading.

use std::path::PathBuf;

use glam::Vec3;
use orbit_resources::{MeshBuilder, ResourceError};

/// A unit cube with shared corner positions and one normal per face.
const CUBE_OBJ: &str = "\
o cube
v -0.5 -0.5 -0.5
v  0.5 -0.5 -0.5
v  0.5  0.5 -0.5
v -0.5  0.5 -0.5
v -0.5 -0.5  0.5
v  0.5 -0.5  0.5
v  0.5  0.5  0.5
v -0.5  0.5  0.5
vn 0 0 -1
vn 0 0 1
vn -1 0 0
vn 1 0 0
vn 0 -1 0
vn 0 1 0
f 1//1 2//1 3//1 4//1
f 5//2 8//2 7//2 6//2
f 1//3 4//3 8//3 5//3
f 2//4 6//4 7//4 3//4
f 1//5 5//5 6//5 2//5
f 4//6 3//6 7//6 8//6
";

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).expect("write temp OBJ");
    path
}

#[test]
fn test_load_obj_cube() {
    let path = write_temp("orbit_cube_test.obj", CUBE_OBJ);
    let builder = MeshBuilder::from_file(&path).expect("Failed to load OBJ cube");
    let _ = std::fs::remove_file(&path);

    // Quads are triangulated: 6 faces x 2 triangles x 3 indices.
    assert_eq!(builder.indices.len(), 36);
    // Each corner appears once per adjacent face normal.
    assert_eq!(builder.vertices.len(), 24);
    assert!(
        builder
            .indices
            .iter()
            .all(|&i| (i as usize) < builder.vertices.len())
    );

    // The +Y (file up) face ends up on the -Y (world up) side.
    let top_normal = Vec3::new(0.0, -1.0, 0.0);
    let top: Vec<_> = builder
        .vertices
        .iter()
        .filter(|v| v.normal == top_normal)
        .collect();
    assert_eq!(top.len(), 4);
    assert!(top.iter().all(|v| v.position.y == -0.5));
}

#[test]
fn test_load_obj_triangle_without_normals() {
    let path = write_temp(
        "orbit_triangle_test.obj",
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nf 1/1 2/2 3/3\n",
    );
    let builder = MeshBuilder::from_file(&path).expect("Failed to load OBJ triangle");
    let _ = std::fs::remove_file(&path);

    assert_eq!(builder.vertices.len(), 3);
    assert_eq!(builder.indices, vec![0, 1, 2]);
    assert!(builder.vertices.iter().all(|v| v.color == Vec3::ONE));
}

#[test]
fn test_load_obj_missing_file() {
    let result = MeshBuilder::load_obj("does/not/exist.obj");
    assert!(matches!(result, Err(ResourceError::ObjLoad { .. })));
}
