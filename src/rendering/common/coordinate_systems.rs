use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// glTF is RH, Y Up, +Z Forward. We are LH, Y Up: mirror along X.
pub const CONVERSION_SCALE: Vec3 = Vec3::new(-1.0, 1.0, 1.0);
/// Mirroring flips the handedness of the bitangent as well.
pub const TANGENT_CONVERSION_SCALE: Vec4 = Vec4::new(-1.0, 1.0, 1.0, -1.0);

#[inline]
pub fn convert_vec3(source: Vec3) -> Vec3 {
    source * CONVERSION_SCALE
}

#[inline]
pub fn convert_tangent(source: Vec4) -> Vec4 {
    source * TANGENT_CONVERSION_SCALE
}

#[inline]
pub fn convert_rotation(source: Quat) -> Quat {
    Quat::from_xyzw(source.x, -source.y, -source.z, source.w)
}

#[inline]
pub fn convert_matrix(source: Mat4) -> Mat4 {
    let mirror = Mat4::from_scale(CONVERSION_SCALE);
    mirror * source * mirror
}

/// glTF has its texture origin top left, we have it bottom left.
#[inline]
pub fn flip_tex_coord(source: Vec2) -> Vec2 {
    Vec2::new(source.x, 1.0 - source.y)
}

pub fn convert_vec3_slice(values: &mut [Vec3]) {
    values.iter_mut().for_each(|v| *v = convert_vec3(*v));
}

pub fn convert_tangent_slice(values: &mut [Vec4]) {
    values.iter_mut().for_each(|v| *v = convert_tangent(*v));
}

pub fn flip_tex_coord_slice(values: &mut [Vec2]) {
    values.iter_mut().for_each(|v| *v = flip_tex_coord(*v));
}

/// Mirroring turns counter-clockwise triangles into clockwise ones, so swap the first and last corner.
pub fn flip_winding(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(0, 2);
    }
}

/// Smooth vertex normals from the final (already converted) positions and indices.
pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let face = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        normals[i0] += face;
        normals[i1] += face;
        normals[i2] += face;
    }

    normals.iter().map(|n| n.normalize_or_zero()).collect()
}
