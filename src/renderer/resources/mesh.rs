use std::path::Path;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use glam::{Vec2, Vec3};
use crate::renderer::error::RenderError;
use crate::renderer::resources::vertex::Vertex;

const FIELD_NAMES: [&str; 8] = ["x", "y", "z", "tu", "tv", "nx", "ny", "nz"];

/// CPU-side geometry. Immutable once built.
#[derive(Debug)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    /// Every vertex is referenced once, in order.
    pub fn from_vertices(vertices: Vec<Vertex>) -> Result<Self> {
        let count = u32::try_from(vertices.len())
            .map_err(|_| RenderError::invalid(format!("{} vertices do not fit 32-bit indices", vertices.len())))?;
        Ok(Self {
            vertices,
            indices: (0..count).collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| RenderError::FileNotFound(path.to_path_buf()))?;
        let mesh = Self::parse(&text)
            .wrap_err_with(|| format!("Malformed model file {}", path.display()))?;
        log::info!("Loaded model {} ({} vertices)", path.display(), mesh.vertices.len());
        Ok(mesh)
    }

    /// Parses the text model format:
    ///
    /// ```text
    /// Vertex Count: 3
    ///
    /// Data:
    ///
    /// -1.0 -1.0 0.0 0.0 1.0 0.0 0.0 -1.0
    /// ...
    /// ```
    ///
    /// Everything between the count and the second `:` is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let (_, after_count_delimiter) = text
            .split_once(':')
            .ok_or_else(|| RenderError::invalid("missing ':' before the vertex count"))?;
        let (header, body) = after_count_delimiter
            .split_once(':')
            .ok_or_else(|| RenderError::invalid("missing ':' before the vertex data"))?;

        let count_token = header
            .split_whitespace()
            .next()
            .ok_or_else(|| RenderError::invalid("missing vertex count"))?;
        let count = count_token
            .parse::<usize>()
            .map_err(|_| RenderError::invalid(format!("vertex count {:?} is not a number", count_token)))?;

        let mut tokens = body.split_whitespace();
        // Capacity is bounded by the text, not by the declared count
        let mut vertices = Vec::with_capacity(count.min(body.len() / 16));
        for row in 0..count {
            let mut fields = [0.0f32; 8];
            for (column, field) in fields.iter_mut().enumerate() {
                let token = tokens.next().ok_or_else(|| {
                    RenderError::invalid(format!(
                        "expected {} vertices but data ends at vertex {} (field {})",
                        count, row, FIELD_NAMES[column],
                    ))
                })?;
                *field = token.parse::<f32>().map_err(|_| {
                    RenderError::invalid(format!(
                        "vertex {} field {} is not a number: {:?}",
                        row, FIELD_NAMES[column], token,
                    ))
                })?;
            }
            let [x, y, z, tu, tv, nx, ny, nz] = fields;
            vertices.push(Vertex::new(
                Vec3::new(x, y, z),
                Vec2::new(tu, tv),
                Vec3::new(nx, ny, nz),
            ));
        }

        if let Some(extra) = tokens.next() {
            return Err(RenderError::invalid(format!(
                "unexpected data after {} vertices: {:?}",
                count, extra,
            )).into());
        }

        Self::from_vertices(vertices)
    }

    /// Two clockwise triangles facing -Z, each vertex with its own normal
    pub fn new_quad() -> Self {
        let normal = Vec3::new(0.0, 0.0, -1.0);
        let vertices = vec![
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0), normal), // Bottom left
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 0.0), normal),  // Top left
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0), normal),   // Top right
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 1.0), normal),  // Bottom right
        ];

        let indices = vec![
            0, 1, 2, // Top left triangle
            0, 2, 3, // Bottom right triangle
        ];

        Self { vertices, indices }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    const TRIANGLE: &str = "Vertex Count: 3\n\
        \n\
        Data:\n\
        \n\
        -1.0 -1.0 0.0 0.0 1.0 0.0 0.0 -1.0\n\
        0.0 1.0 0.0 0.5 0.0 0.0 0.0 -1.0\n\
        1.0 -1.0 0.0 1.0 1.0 0.0 0.0 -1.0\n";

    fn error_of(result: Result<Mesh>) -> String {
        let report = result.expect_err("parse should fail");
        assert!(
            report.downcast_ref::<RenderError>().is_some(),
            "not a RenderError: {:?}", report,
        );
        report.to_string()
    }

    #[test]
    fn parses_rows_in_order() {
        let mesh = Mesh::parse(TRIANGLE).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices(), &[0, 1, 2]);

        let top = mesh.vertices()[1];
        assert_eq!(top.position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(top.texcoord, Vec2::new(0.5, 0.0));
        assert_eq!(top.normal, Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn empty_model_is_valid() {
        let mesh = Mesh::parse("Vertex Count: 0\nData:\n").unwrap();
        assert_eq!(mesh.vertex_count(), 0);
        assert!(mesh.indices().is_empty());
    }

    #[test]
    fn rejects_missing_delimiters() {
        assert!(error_of(Mesh::parse("Vertex Count 3")).contains("vertex count"));
        assert!(error_of(Mesh::parse("Vertex Count: 3\nData\n1 2 3")).contains("vertex data"));
    }

    #[test]
    fn rejects_bad_count() {
        assert!(error_of(Mesh::parse("Vertex Count: three\nData:\n")).contains("three"));
        assert!(error_of(Mesh::parse("Vertex Count: -1\nData:\n")).contains("-1"));
    }

    #[test]
    fn rejects_short_data() {
        let text = TRIANGLE.replace("Count: 3", "Count: 4");
        let message = error_of(Mesh::parse(&text));
        assert!(message.contains("expected 4 vertices"), "{}", message);
    }

    #[test]
    fn huge_declared_count_is_invalid_data() {
        for count in ["18446744073709551615", "100000000"] {
            let text = format!("Vertex Count: {}\nData:\n1 2 3", count);
            let message = error_of(Mesh::parse(&text));
            assert!(message.contains(&format!("expected {} vertices", count)), "{}", message);
        }
    }

    #[test]
    fn rejects_non_numeric_field() {
        let text = TRIANGLE.replace("0.5 0.0", "0.5 oops");
        let message = error_of(Mesh::parse(&text));
        assert!(message.contains("vertex 1 field tv"), "{}", message);
    }

    #[test]
    fn rejects_trailing_data() {
        let text = TRIANGLE.replace("Count: 3", "Count: 2");
        let message = error_of(Mesh::parse(&text));
        assert!(message.contains("after 2 vertices"), "{}", message);
    }

    #[test]
    fn quad_gives_every_vertex_a_normal() {
        let quad = Mesh::new_quad();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_count(), 6);
        assert!(quad.vertices().iter().all(|v| v.normal == Vec3::new(0.0, 0.0, -1.0)));
        assert!(quad.indices().iter().all(|&i| i < 4));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TRIANGLE.as_bytes()).unwrap();
        let mesh = Mesh::load(file.path()).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let report = Mesh::load(&path).unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::FileNotFound(p)) if *p == path
        ));
    }

    #[test]
    fn shipped_cube_faces_outward() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/cube.txt");
        let mesh = Mesh::load(&path).unwrap();
        assert_eq!(mesh.vertex_count(), 36);
        for triangle in mesh.vertices().chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]];
            // Clockwise seen from outside, so the left-handed face normal points out
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
            assert!(a.normal == b.normal && b.normal == c.normal);
        }
    }

    fn row() -> impl Strategy<Value = [f32; 8]> {
        prop::array::uniform8(-1000.0f32..1000.0)
    }

    proptest! {
        #[test]
        fn n_rows_make_n_sequential_indices(rows in prop::collection::vec(row(), 0..64)) {
            let mut text = format!("Vertex Count: {}\n\nData:\n\n", rows.len());
            for r in &rows {
                let line = r.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(" ");
                text.push_str(&line);
                text.push('\n');
            }

            let mesh = Mesh::parse(&text).unwrap();
            prop_assert_eq!(mesh.vertex_count() as usize, rows.len());
            prop_assert_eq!(mesh.indices().to_vec(), (0..rows.len() as u32).collect::<Vec<_>>());
            for (vertex, r) in mesh.vertices().iter().zip(&rows) {
                prop_assert_eq!(vertex.position, Vec3::new(r[0], r[1], r[2]));
                prop_assert_eq!(vertex.normal, Vec3::new(r[5], r[6], r[7]));
            }
        }
    }
}
