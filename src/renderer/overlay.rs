use glam::{Vec2, Vec3, Vec4};

use super::vertex::{CanvasVertex, LineVertex};

/// Screen rectangle in pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const UNIT: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    fn corners(&self) -> [Vec2; 4] {
        let min = Vec2::new(self.x, self.y);
        let max = min + Vec2::new(self.width, self.height);
        [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasQuad {
    pub rect: Rect,
    pub color: Vec4,
    /// Region of the canvas texture, in normalized coordinates.
    pub uv: Option<Rect>,
}

/// Immediate-mode 2D quads, drawn over the scene and drained every frame.
#[derive(Debug, Default)]
pub struct Canvas {
    quads: Vec<CanvasQuad>,
    texture: Option<u32>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quad(&mut self, rect: Rect, color: Vec4) {
        self.quads.push(CanvasQuad {
            rect,
            color,
            uv: None,
        });
    }

    /// A quad sampling `uv` of the canvas texture, tinted by `color`.
    pub fn textured_quad(&mut self, rect: Rect, uv: Rect, color: Vec4) {
        self.quads.push(CanvasQuad {
            rect,
            color,
            uv: Some(uv),
        });
    }

    /// Scene texture sampled by textured quads.
    pub fn set_texture(&mut self, index: Option<u32>) {
        self.texture = index;
    }

    pub fn texture(&self) -> Option<u32> {
        self.texture
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn clear(&mut self) {
        self.quads.clear();
    }

    /// Empties the queue into one vertex/index list.
    pub fn drain_geometry(&mut self) -> (Vec<CanvasVertex>, Vec<u32>) {
        let mut vertices = Vec::with_capacity(self.quads.len() * 4);
        let mut indices = Vec::with_capacity(self.quads.len() * 6);
        for quad in self.quads.drain(..) {
            let base = vertices.len() as u32;
            let uvs = quad.uv.unwrap_or(Rect::UNIT).corners();
            let textured = if quad.uv.is_some() { 1.0 } else { 0.0 };
            for (pos, uv) in quad.rect.corners().into_iter().zip(uvs) {
                vertices.push(CanvasVertex {
                    pos: pos.to_array(),
                    uv: uv.to_array(),
                    color: quad.color.to_array(),
                    textured,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        (vertices, indices)
    }
}

/// World-space line segments drawn after the opaque geometry.
#[derive(Debug, Default)]
pub struct DebugLines {
    vertices: Vec<LineVertex>,
}

impl DebugLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, a: Vec3, b: Vec3, color: Vec4) {
        let color = color.to_array();
        self.vertices.push(LineVertex {
            pos: a.to_array(),
            color,
        });
        self.vertices.push(LineVertex {
            pos: b.to_array(),
            color,
        });
    }

    pub fn len(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    pub fn drain_vertices(&mut self) -> Vec<LineVertex> {
        std::mem::take(&mut self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quads_become_one_indexed_list() {
        let mut canvas = Canvas::new();
        canvas.quad(Rect::new(10.0, 20.0, 30.0, 40.0), Vec4::ONE);
        canvas.textured_quad(Rect::new(0.0, 0.0, 8.0, 8.0), Rect::new(0.5, 0.0, 0.5, 0.5), Vec4::ONE);

        let (vertices, indices) = canvas.drain_geometry();
        assert!(canvas.is_empty());
        assert_eq!(vertices.len(), 8);
        assert_eq!(indices.len(), 12);
        assert_eq!(vertices[2].pos, [40.0, 60.0]);
        assert_eq!(vertices[0].textured, 0.0);
        assert_eq!(vertices[4].textured, 1.0);
        assert_eq!(vertices[4].uv, [0.5, 0.0]);
        assert_eq!(indices[6], 4);
    }

    #[test]
    fn lines_are_counted_as_segments() {
        let mut lines = DebugLines::new();
        lines.line(Vec3::ZERO, Vec3::X, Vec4::ONE);
        lines.line(Vec3::ZERO, Vec3::Y, Vec4::ONE);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.drain_vertices().len(), 4);
        assert!(lines.is_empty());
    }
}
