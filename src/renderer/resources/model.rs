use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use super::buffer::Buffer;
use super::mesh::Mesh;
use super::texture::ColorTexture;
use crate::renderer::device::RenderDevice;
use crate::renderer::error::RenderError;

/// A mesh uploaded into immutable vertex and index buffers, plus its texture
pub struct Model {
    inner: Option<ModelInner>,
}

struct ModelInner {
    mesh: Mesh,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    texture: ColorTexture,
    device: Arc<ash::Device>,
}

impl Model {
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Loads `model_path`, or the built-in quad when it is `None`
    pub fn initialize(
        &mut self,
        device: &RenderDevice,
        texture_path: &Path,
        model_path: Option<&Path>,
    ) -> Result<()> {
        let mesh = match model_path {
            Some(path) => Mesh::load(path)?,
            None => {
                log::info!("No model file configured, using the built-in quad");
                Mesh::new_quad()
            }
        };

        let memory_allocator = device.memory_allocator()?;
        let logical = device.device()?;
        let transfer_context = device.transfer_context()?;

        let vertex_buffer = Buffer::new_immutable(
            mesh.vertices(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Vertex buffer",
            memory_allocator.clone(),
            logical.clone(),
            transfer_context,
        )?;
        let index_buffer = Buffer::new_immutable(
            mesh.indices(),
            vk::BufferUsageFlags::INDEX_BUFFER,
            "Index buffer",
            memory_allocator,
            logical.clone(),
            transfer_context,
        )?;

        let mut texture = ColorTexture::new();
        texture.initialize(device, texture_path)
            .wrap_err("Could not initialize the texture")?;

        self.inner = Some(ModelInner {
            mesh,
            vertex_buffer,
            index_buffer,
            texture,
            device: logical,
        });
        Ok(())
    }

    /// Binds the buffers and primitive topology for the next indexed draw
    pub fn render(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let inner = self.inner()?;
        unsafe {
            inner.device.cmd_bind_vertex_buffers(cmd, 0, &[inner.vertex_buffer.buffer], &[0]);
            inner.device.cmd_bind_index_buffer(cmd, inner.index_buffer.buffer, 0, vk::IndexType::UINT32);
            inner.device.cmd_set_primitive_topology(cmd, vk::PrimitiveTopology::TRIANGLE_LIST);
        }
        Ok(())
    }

    pub fn index_count(&self) -> u32 {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.mesh.index_count())
    }

    pub fn texture(&self) -> Option<&ColorTexture> {
        self.inner.as_ref().map(|inner| &inner.texture)
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.inner.as_ref().map(|inner| &inner.mesh)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn shutdown(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.texture.shutdown();
            drop(inner.index_buffer);
            drop(inner.vertex_buffer);
        }
    }

    fn inner(&self) -> Result<&ModelInner> {
        Ok(self.inner
            .as_ref()
            .ok_or(RenderError::NotInitialized("model"))?)
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_twice_without_initialize() {
        let mut model = Model::new();
        model.shutdown();
        model.shutdown();
        assert!(!model.is_initialized());
        assert_eq!(model.index_count(), 0);
        assert!(model.texture().is_none());
    }

    #[test]
    fn render_before_initialize_fails() {
        let model = Model::new();
        let report = model.render(vk::CommandBuffer::null()).unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::NotInitialized("model"))
        ));
    }

    #[test]
    fn malformed_model_fails_before_device_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "Vertex Count: 2\nData:\n1 2 3").unwrap();

        let device = RenderDevice::new();
        let mut model = Model::new();
        let report = model
            .initialize(&device, Path::new("unused.tga"), Some(&path))
            .unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::InvalidData(_))
        ));
        assert!(!model.is_initialized());
    }
}
