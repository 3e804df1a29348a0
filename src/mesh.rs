// CPU-side mesh building
//
// Vertex format shared with the pipeline's input layout, indexed-mesh
// construction with exact-equality vertex dedup, and the demo assets the
// binary renders when no external loader is wired up.

use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Interleaved vertex: position, color, texcoord.
/// Layout must match `pipeline::vertex_input_info` (stride 32, offsets
/// 0/12/24).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { pos, color, uv }
    }

    fn bits(&self) -> [u32; 8] {
        [
            self.pos[0].to_bits(),
            self.pos[1].to_bits(),
            self.pos[2].to_bits(),
            self.color[0].to_bits(),
            self.color[1].to_bits(),
            self.color[2].to_bits(),
            self.uv[0].to_bits(),
            self.uv[1].to_bits(),
        ]
    }
}

// Exact attribute equality, bit for bit. Loaders hand us duplicated corner
// vertices; anything not bit-identical is a distinct vertex.
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// An indexed triangle mesh ready for upload
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Build an indexed mesh from a flat triangle list, deduplicating
    /// vertices by exact attribute equality.
    pub fn from_triangles(triangle_vertices: &[Vertex]) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(triangle_vertices.len());
        let mut unique: HashMap<Vertex, u32> = HashMap::new();

        for vertex in triangle_vertices {
            let index = *unique.entry(*vertex).or_insert_with(|| {
                vertices.push(*vertex);
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }

        Mesh { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Two textured quads at different depths, enough to exercise the depth
    /// buffer and the sampler.
    pub fn demo_quads() -> Self {
        fn quad(z: f32, color: [f32; 3]) -> [Vertex; 6] {
            let bl = Vertex::new([-0.5, -0.5, z], color, [0.0, 1.0]);
            let br = Vertex::new([0.5, -0.5, z], color, [1.0, 1.0]);
            let tr = Vertex::new([0.5, 0.5, z], color, [1.0, 0.0]);
            let tl = Vertex::new([-0.5, 0.5, z], color, [0.0, 0.0]);
            [bl, br, tr, tr, tl, bl]
        }

        let mut triangles = Vec::new();
        triangles.extend_from_slice(&quad(0.0, [1.0, 1.0, 1.0]));
        triangles.extend_from_slice(&quad(-0.5, [0.4, 0.6, 1.0]));
        Self::from_triangles(&triangles)
    }
}

/// Procedural RGBA8 checkerboard, `size` x `size` pixels
pub fn checkerboard_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let cell = ((x / 8) + (y / 8)) % 2;
            let v = if cell == 0 { 230 } else { 60 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

/// Per-frame transform data, written into the image-indexed uniform buffer.
/// Matches the std140 layout of the vertex shader's block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Transforms {
    /// Slow spin around Z, camera above and behind, Vulkan clip-space Y flip
    pub fn spinning(elapsed_secs: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(elapsed_secs * std::f32::consts::FRAC_PI_4);
        let view = Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;
        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_collapses_identical_vertices() {
        let v = Vertex::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.0, 0.0]);
        let w = Vertex::new([1.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0]);
        let mesh = Mesh::from_triangles(&[v, w, v, v, w, v]);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 0, 0, 1, 0]);
    }

    #[test]
    fn dedup_is_exact_not_approximate() {
        let v = Vertex::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.0, 0.0]);
        let almost = Vertex::new([0.0, 0.0, 1e-7], [1.0, 1.0, 1.0], [0.0, 0.0]);
        let mesh = Mesh::from_triangles(&[v, almost, v]);
        assert_eq!(mesh.vertices.len(), 2);
    }

    #[test]
    fn indices_reference_valid_vertices() {
        let mesh = Mesh::demo_quads();
        assert_eq!(mesh.indices.len() % 3, 0);
        for &index in &mesh.indices {
            assert!((index as usize) < mesh.vertices.len());
        }
        // Two quads of 6 corners each share 2 vertices per quad
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.index_count(), 12);
    }

    #[test]
    fn checkerboard_is_full_rgba() {
        let pixels = checkerboard_pixels(64);
        assert_eq!(pixels.len(), 64 * 64 * 4);
        assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    }
}
