use std::f32::consts::PI;

use crate::renderer::vertex::{v, Vertex};

pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();
            let u = segment as f32 / segments as f32;
            let tex_v = ring as f32 / rings as f32;
            // Unit sphere: the position is the normal.
            vertices.push(v([x * 0.5, y * 0.5, z * 0.5], [x, y, z], [u, tex_v]));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }

    (vertices, indices)
}

/// Sphere with inward-facing winding and normals, for the sky.
pub fn sky_sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let (mut vertices, mut indices) = sphere_mesh(segments, rings);
    for vertex in &mut vertices {
        vertex.normal = vertex.normal.map(|n| -n);
    }
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
    (vertices, indices)
}

pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis) per face.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

    let mut verts = Vec::with_capacity(24);
    for (normal, u_axis, v_axis) in FACES {
        for (cu, cv) in CORNERS {
            let pos = [0, 1, 2].map(|i| normal[i] * 0.5 + u_axis[i] * cu + v_axis[i] * cv);
            verts.push(v(pos, normal, [cu + 0.5, 0.5 - cv]));
        }
    }

    let idx = (0..6u32)
        .flat_map(|f| {
            let o = f * 4;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect::<Vec<_>>();

    (verts, idx)
}

/// Flat grid in the XZ plane centred on the origin, `size` units wide.
pub fn plane_mesh(size: f32, subdivisions: u32) -> (Vec<Vertex>, Vec<u32>) {
    grid_mesh(size, subdivisions, |_, _| 0.0)
}

/// Grid displaced by `height(x, z)`, with normals from central differences.
pub fn terrain_mesh(
    size: f32,
    subdivisions: u32,
    height: impl Fn(f32, f32) -> f32,
) -> (Vec<Vertex>, Vec<u32>) {
    grid_mesh(size, subdivisions, height)
}

fn grid_mesh(
    size: f32,
    subdivisions: u32,
    height: impl Fn(f32, f32) -> f32,
) -> (Vec<Vertex>, Vec<u32>) {
    let n = subdivisions.max(1);
    let step = size / n as f32;
    let half = size * 0.5;
    let eps = step * 0.5;

    let mut vertices = Vec::with_capacity(((n + 1) * (n + 1)) as usize);
    for row in 0..=n {
        for col in 0..=n {
            let x = -half + col as f32 * step;
            let z = -half + row as f32 * step;
            let y = height(x, z);
            let dx = height(x + eps, z) - height(x - eps, z);
            let dz = height(x, z + eps) - height(x, z - eps);
            let normal = glam::Vec3::new(-dx, 2.0 * eps, -dz).normalize_or(glam::Vec3::Y);
            vertices.push(v(
                [x, y, z],
                normal.to_array(),
                [col as f32 / n as f32, row as f32 / n as f32],
            ));
        }
    }

    let mut indices = Vec::with_capacity((n * n * 6) as usize);
    for row in 0..n {
        for col in 0..n {
            let i = row * (n + 1) + col;
            let below = i + n + 1;
            indices.extend_from_slice(&[i, below, i + 1, i + 1, below, below + 1]);
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn face_normal(vertices: &[Vertex], tri: &[u32]) -> Vec3 {
        let p = |i: u32| Vec3::from_array(vertices[i as usize].pos);
        (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]))
    }

    #[test]
    fn cube_counts_look_right() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
    }

    #[test]
    fn cube_winding_is_counter_clockwise_from_outside() {
        let (vertices, indices) = cube_mesh();
        for tri in indices.chunks_exact(3) {
            let normal = Vec3::from_array(vertices[tri[0] as usize].normal);
            assert!(face_normal(&vertices, tri).dot(normal) > 0.0);
        }
    }

    #[test]
    fn plane_faces_up() {
        let (vertices, indices) = plane_mesh(10.0, 4);
        assert_eq!(vertices.len(), 25);
        assert_eq!(indices.len(), 4 * 4 * 6);
        for tri in indices.chunks_exact(3) {
            assert!(face_normal(&vertices, tri).y > 0.0);
        }
    }

    #[test]
    fn terrain_normals_follow_slope() {
        let (vertices, _) = terrain_mesh(4.0, 4, |x, _| x);
        let normal = Vec3::from_array(vertices[12].normal);
        assert!(normal.x < 0.0 && normal.y > 0.0);
    }

    #[test]
    fn sky_sphere_faces_inward() {
        let (vertices, indices) = sky_sphere_mesh(8, 6);
        let tri = &indices[indices.len() / 2..indices.len() / 2 + 3];
        let centroid = tri
            .iter()
            .map(|&i| Vec3::from_array(vertices[i as usize].pos))
            .sum::<Vec3>()
            / 3.0;
        assert!(face_normal(&vertices, tri).dot(centroid) < 0.0);
    }
}
