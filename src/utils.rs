use bytemuck::NoUninit;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, NoUninit)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl Mesh {
    /// Unit quad centered on the origin, uv origin in the top left
    pub fn quad() -> Self {
        Self {
            vertices: vec![
                Vertex { pos: [-0.5, -0.5], uv: [0.0, 1.0] },
                Vertex { pos: [0.5, -0.5], uv: [1.0, 1.0] },
                Vertex { pos: [0.5, 0.5], uv: [1.0, 0.0] },
                Vertex { pos: [-0.5, 0.5], uv: [0.0, 0.0] },
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.indices.is_empty()
    }

    pub fn upload(&self, device: &wgpu::Device) -> MeshBuffer {
        let vertices = bytemuck::cast_slice(&self.vertices);
        let indices = bytemuck::cast_slice(&self.indices);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: indices,
            usage: wgpu::BufferUsages::INDEX,
        });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
        }
    }
}

/// Grid dimensions that fit `count` equal cells into a roughly square texture
pub fn grid_for(count: usize, cell_width: u32, cell_height: u32) -> (u32, u32) {
    let count = count.max(1) as u32;
    let mut columns = 1;
    while columns * cell_width < count.div_ceil(columns) * cell_height {
        columns += 1;
    }
    (columns, count.div_ceil(columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_two_triangles() {
        let quad = Mesh::quad();
        assert!(!quad.is_empty());
        assert_eq!(quad.indices.len(), 6);
        assert!(quad.indices.iter().all(|&i| (i as usize) < quad.vertices.len()));
    }

    #[test]
    fn grid_holds_every_cell() {
        for count in [1, 7, 48, 100] {
            let (columns, rows) = grid_for(count, 64, 32);
            assert!((columns * rows) as usize >= count);
            assert!(((columns - 1) * rows) < count as u32 || columns == 1);
        }
        assert_eq!(grid_for(48, 64, 32), (5, 10));
    }
}
