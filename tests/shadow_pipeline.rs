use glam::{Mat4, Vec3};
use hybrid_renderer::renderer::lights::{
    build_directional_shadow, build_point_shadow, POINT_SHADOW_FACES,
};

const EPSILON: f32 = 1e-4;

/// Same mapping the lit shaders use to turn a light-space position into
/// shadow-map coordinates.
fn project_shadow_cpu(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    if clip.w <= 0.0 {
        return Vec3::splat(-1.0);
    }
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5, ndc.z)
}

fn compute_ndc(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    clip.truncate() / clip.w
}

/// Face selection of the point-shadow lookup, +X, -X, +Y, -Y, +Z, -Z.
fn cube_face(direction: Vec3) -> usize {
    let a = direction.abs();
    if a.x >= a.y && a.x >= a.z {
        return if direction.x > 0.0 { 0 } else { 1 };
    }
    if a.y >= a.z {
        return if direction.y > 0.0 { 2 } else { 3 };
    }
    if direction.z > 0.0 {
        4
    } else {
        5
    }
}

fn in_unit_range(v: Vec3) -> bool {
    (-EPSILON..=1.0 + EPSILON).contains(&v.x)
        && (-EPSILON..=1.0 + EPSILON).contains(&v.y)
        && (-EPSILON..=1.0 + EPSILON).contains(&v.z)
}

#[test]
fn directional_shadow_covers_points_around_the_focus() {
    let focus = Vec3::new(2.0, 0.0, -1.0);
    let view_proj = build_directional_shadow(focus, Vec3::new(0.4, -1.0, 0.2), 15.0);

    for offset in [
        Vec3::new(-3.5, 0.0, -2.0),
        Vec3::new(2.0, 1.0, 4.0),
        Vec3::new(4.5, -0.5, -3.0),
    ] {
        let world = focus + offset;
        let projected = project_shadow_cpu(view_proj, world);
        let ndc = compute_ndc(view_proj, world);
        assert!(in_unit_range(projected), "{world:?} -> {projected:?}");
        assert!((projected.z - ndc.z).abs() < EPSILON);
    }
}

#[test]
fn directional_shadow_texture_axis_is_flipped_from_clip_space() {
    let view_proj = build_directional_shadow(Vec3::ZERO, Vec3::NEG_Y, 10.0);

    // Straight down uses +Z as the light's up.
    let top_world = Vec3::Z * 5.0;
    let bottom_world = Vec3::NEG_Z * 5.0;

    let ndc_top = compute_ndc(view_proj, top_world);
    let ndc_bottom = compute_ndc(view_proj, bottom_world);
    assert!(ndc_top.y > ndc_bottom.y);

    let tex_top = project_shadow_cpu(view_proj, top_world);
    let tex_bottom = project_shadow_cpu(view_proj, bottom_world);
    assert!(tex_top.y < tex_bottom.y);
}

#[test]
fn closer_casters_have_smaller_directional_depth() {
    let view_proj = build_directional_shadow(Vec3::ZERO, Vec3::NEG_Y, 10.0);
    let high = project_shadow_cpu(view_proj, Vec3::new(0.0, 3.0, 0.0));
    let low = project_shadow_cpu(view_proj, Vec3::new(0.0, -3.0, 0.0));
    assert!(high.z < low.z);
}

#[test]
fn every_point_shadow_face_sees_its_own_axis() {
    let position = Vec3::new(1.0, 2.0, 3.0);
    let shadow = build_point_shadow(1, position, 10.0);
    assert_eq!(shadow.slot, 1);

    let axes = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for (face, axis) in axes.into_iter().enumerate() {
        // Slightly off-axis so the lookup is not on a face boundary.
        let direction = axis * 4.0 + Vec3::new(0.3, 0.2, 0.1) * (1.0 - axis.abs());
        let world = position + direction;
        assert_eq!(cube_face(direction), face);

        let projected = project_shadow_cpu(shadow.view_proj[face], world);
        assert!(in_unit_range(projected), "face {face}: {projected:?}");
    }
}

#[test]
fn point_shadow_rejects_points_behind_a_face() {
    let shadow = build_point_shadow(0, Vec3::ZERO, 20.0);
    assert_eq!(shadow.view_proj.len(), POINT_SHADOW_FACES);

    // +X face, point on the -X side.
    let behind = project_shadow_cpu(shadow.view_proj[0], Vec3::new(-5.0, 0.0, 0.0));
    assert_eq!(behind, Vec3::splat(-1.0));
}

#[test]
fn point_shadow_range_sets_the_far_plane() {
    let shadow = build_point_shadow(0, Vec3::ZERO, 8.0);
    assert!((shadow.far - 8.0).abs() < EPSILON);

    let inside = project_shadow_cpu(shadow.view_proj[4], Vec3::new(0.0, 0.0, 7.5));
    let outside = project_shadow_cpu(shadow.view_proj[4], Vec3::new(0.0, 0.0, 9.0));
    assert!(inside.z <= 1.0);
    assert!(outside.z > 1.0);
}
