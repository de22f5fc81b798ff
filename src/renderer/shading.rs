use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use glam::Mat4;
use gpu_allocator::MemoryLocation;
use crate::renderer::device::RenderDevice;
use crate::renderer::error::{RenderError, ResourceResultExt};
use crate::renderer::light::Light;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::descriptor::DescriptorSetLayoutBuilder;
use crate::renderer::resources::material::{GraphicsMaterialBuilder, Material};
use crate::renderer::resources::shader::{compile_wgsl_file, GraphicsShader};
use crate::renderer::resources::texture::ColorTexture;
use crate::renderer::resources::vertex::VertexInputDescription;
use crate::renderer::shader_data::{constant_buffer_size, LightBufferData, MatrixBufferData};

const MATRIX_BINDING: u32 = 0;
const TEXTURE_BINDING: u32 = 1;
const SAMPLER_BINDING: u32 = 2;
const LIGHT_BINDING: u32 = 3;

/// What a [`ShaderPipeline`] does with each fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadingCapabilities {
    pub texturing: bool,
    pub lighting: bool,
}

impl ShadingCapabilities {
    pub const TEXTURED: Self = Self { texturing: true, lighting: false };
    pub const LIT_TEXTURED: Self = Self { texturing: true, lighting: true };

    fn program(&self) -> Result<ShaderProgram> {
        match (self.texturing, self.lighting) {
            (true, false) => Ok(ShaderProgram {
                file: "texture.wgsl",
                vertex_entry: "texture_vertex",
                fragment_entry: "texture_fragment",
            }),
            (true, true) => Ok(ShaderProgram {
                file: "light.wgsl",
                vertex_entry: "light_vertex",
                fragment_entry: "light_fragment",
            }),
            (false, true) => Err(RenderError::invalid("lighting requires texturing").into()),
            (false, false) => Err(RenderError::invalid("no shading capabilities requested").into()),
        }
    }

    fn vertex_input(&self) -> VertexInputDescription {
        if self.lighting {
            VertexInputDescription::lit()
        } else {
            VertexInputDescription::textured()
        }
    }

    fn descriptor_layout(&self) -> DescriptorSetLayoutBuilder<'static> {
        let mut builder = DescriptorSetLayoutBuilder::new()
            .add_binding(MATRIX_BINDING, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX);
        if self.texturing {
            builder = builder
                .add_binding(TEXTURE_BINDING, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT)
                .add_binding(SAMPLER_BINDING, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT);
        }
        if self.lighting {
            builder = builder
                .add_binding(LIGHT_BINDING, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT);
        }
        builder
    }
}

struct ShaderProgram {
    file: &'static str,
    vertex_entry: &'static str,
    fragment_entry: &'static str,
}

/// Compiled shaders, uniform buffers, descriptors and the graphics pipeline
/// for one set of [`ShadingCapabilities`].
pub struct ShaderPipeline {
    inner: Option<PipelineInner>,
}

// Field order is drop order: the pipeline goes before the descriptors it references
struct PipelineInner {
    capabilities: ShadingCapabilities,
    material: Material,
    descriptors: Descriptors,
    matrix_buffer: Buffer,
    light_buffer: Option<Buffer>,
    device: Arc<ash::Device>,
}

/// Raw descriptor handles, filled in as they are created.
/// Null handles are skipped on destruction.
struct Descriptors {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees the set
            if self.pool != vk::DescriptorPool::null() {
                self.device.destroy_descriptor_pool(self.pool, None);
            }
            if self.layout != vk::DescriptorSetLayout::null() {
                self.device.destroy_descriptor_set_layout(self.layout, None);
            }
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
        }
    }
}

impl ShaderPipeline {
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Compiles the shader for `capabilities` from `shader_dir` and builds everything
    /// needed to draw with it. Compiler output is written to `diagnostics_path` on failure.
    pub fn initialize(
        &mut self,
        device: &RenderDevice,
        capabilities: ShadingCapabilities,
        shader_dir: &Path,
        diagnostics_path: &Path,
    ) -> Result<()> {
        let program = capabilities.program()?;
        let compiled = compile_wgsl_file(
            &shader_dir.join(program.file),
            program.vertex_entry,
            program.fragment_entry,
            diagnostics_path,
        )?;

        let logical = device.device()?;
        let memory_allocator = device.memory_allocator()?;
        let color_format = device.color_format()?;
        let depth_format = device.depth_format()?;

        let shader = GraphicsShader::new(
            &compiled,
            program.vertex_entry,
            program.fragment_entry,
            logical.clone(),
        )?;

        let matrix_buffer = Buffer::new(
            constant_buffer_size::<MatrixBufferData>(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Matrix buffer",
            MemoryLocation::CpuToGpu,
            memory_allocator.clone(),
            logical.clone(),
        )?;
        let light_buffer = if capabilities.lighting {
            Some(Buffer::new(
                constant_buffer_size::<LightBufferData>(),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                "Light buffer",
                MemoryLocation::CpuToGpu,
                memory_allocator,
                logical.clone(),
            )?)
        } else {
            None
        };

        let descriptors = Self::create_descriptors(capabilities, &logical)?;

        let set_layouts = [descriptors.layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts);
        let pipeline_layout = unsafe {
            logical.create_pipeline_layout(&pipeline_layout_info, None)
        }.or_resource("pipeline layout")?;

        let material = GraphicsMaterialBuilder::new(logical.clone())
            .with_shader(shader)
            .with_pipeline_layout(pipeline_layout)
            .with_vertex_input(capabilities.vertex_input())
            .with_fixed_state(*device.fixed_state())
            .with_blending_disabled()
            .with_color_attachment_format(color_format)
            .with_depth_stencil_format(depth_format)
            .build()?;

        log::debug!("Created shading pipeline from {}", program.file);

        self.inner = Some(PipelineInner {
            capabilities,
            material,
            descriptors,
            matrix_buffer,
            light_buffer,
            device: logical,
        });
        Ok(())
    }

    fn create_descriptors(
        capabilities: ShadingCapabilities,
        device: &Arc<ash::Device>,
    ) -> Result<Descriptors> {
        let mut descriptors = Descriptors {
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
            sampler: vk::Sampler::null(),
            device: device.clone(),
        };

        if capabilities.texturing {
            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .mip_lod_bias(0.0)
                .anisotropy_enable(false)
                .max_anisotropy(1.0)
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS)
                .min_lod(0.0)
                .max_lod(vk::LOD_CLAMP_NONE)
                .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
            descriptors.sampler = unsafe {
                device.create_sampler(&sampler_info, None)
            }.or_resource("texture sampler")?;
        }

        let layout_builder = capabilities.descriptor_layout();
        descriptors.layout = layout_builder.build(device)?;

        let pool_sizes = layout_builder.pool_sizes(1);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        descriptors.pool = unsafe {
            device.create_descriptor_pool(&pool_info, None)
        }.or_resource("descriptor pool")?;

        let set_layouts = [descriptors.layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptors.pool)
            .set_layouts(&set_layouts);
        descriptors.set = unsafe {
            device.allocate_descriptor_sets(&alloc_info)
        }.or_resource("descriptor set")?[0];

        Ok(descriptors)
    }

    /// Uploads the per-draw parameters, binds the pipeline and records one indexed draw.
    /// The model's buffers must already be bound on `cmd`.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        world: Mat4,
        view: Mat4,
        projection: Mat4,
        texture: Option<&ColorTexture>,
        light: Option<&Light>,
    ) -> Result<()> {
        let inner = self.inner
            .as_mut()
            .ok_or(RenderError::NotInitialized("shader pipeline"))?;

        let texture_view = match (inner.capabilities.texturing, texture) {
            (true, Some(texture)) => Some(texture.view()?),
            (true, None) => return Err(RenderError::MissingInput("texture").into()),
            (false, _) => None,
        };
        let light_data = match (inner.capabilities.lighting, light) {
            (true, Some(light)) => Some(light.buffer_data()),
            (true, None) => return Err(RenderError::MissingInput("light").into()),
            (false, _) => None,
        };

        inner.matrix_buffer.write(&[MatrixBufferData::new(world, view, projection)], 0)?;
        if let (Some(buffer), Some(data)) = (inner.light_buffer.as_mut(), light_data) {
            buffer.write(&[data], 0)?;
        }

        inner.update_descriptors(texture_view);

        inner.material.bind_pipeline(cmd);
        inner.material.bind_descriptor_sets(cmd, 0, &[inner.descriptors.set]);
        unsafe {
            inner.device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
        }
        Ok(())
    }

    pub fn capabilities(&self) -> Option<ShadingCapabilities> {
        self.inner.as_ref().map(|inner| inner.capabilities)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn shutdown(&mut self) {
        self.inner = None;
    }
}

impl PipelineInner {
    fn update_descriptors(&self, texture_view: Option<vk::ImageView>) {
        let set = self.descriptors.set;
        let matrix_info = [self.matrix_buffer.descriptor_info()];
        let light_info = self.light_buffer
            .as_ref()
            .map(|buffer| [buffer.descriptor_info()]);
        let image_info = texture_view.map(|view| {
            [vk::DescriptorImageInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)]
        });
        let sampler_info = [vk::DescriptorImageInfo::default()
            .sampler(self.descriptors.sampler)];

        let mut writes = vec![
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(MATRIX_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&matrix_info),
        ];
        if let Some(image_info) = &image_info {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(TEXTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(image_info),
            );
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(&sampler_info),
            );
        }
        if let Some(light_info) = &light_info {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(LIGHT_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(light_info),
            );
        }

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }
}

impl Default for ShaderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShaderPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    trait AmbiguousIfClone<A> {
        fn some_item() {}
    }
    impl<T: ?Sized> AmbiguousIfClone<()> for T {}
    impl<T: ?Sized + Clone> AmbiguousIfClone<u8> for T {}

    fn shader_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders")
    }

    #[test]
    fn pipeline_is_not_clone() {
        let _ = <ShaderPipeline as AmbiguousIfClone<_>>::some_item;
    }

    #[test]
    fn shutdown_twice_without_initialize() {
        let mut pipeline = ShaderPipeline::new();
        pipeline.shutdown();
        pipeline.shutdown();
        assert!(!pipeline.is_initialized());
        assert_eq!(pipeline.capabilities(), None);
    }

    #[test]
    fn lighting_without_texturing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = RenderDevice::new();
        let mut pipeline = ShaderPipeline::new();

        for capabilities in [
            ShadingCapabilities { texturing: false, lighting: true },
            ShadingCapabilities { texturing: false, lighting: false },
        ] {
            let report = pipeline
                .initialize(&device, capabilities, &shader_dir(), &dir.path().join("err.txt"))
                .unwrap_err();
            assert!(matches!(
                report.downcast_ref::<RenderError>(),
                Some(RenderError::InvalidData(_))
            ));
        }
        assert!(!pipeline.is_initialized());
    }

    #[test]
    fn missing_shader_directory_fails_before_device_work() {
        let dir = tempfile::tempdir().unwrap();
        let device = RenderDevice::new();
        let mut pipeline = ShaderPipeline::new();

        let report = pipeline
            .initialize(&device, ShadingCapabilities::LIT_TEXTURED, dir.path(), &dir.path().join("err.txt"))
            .unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::FileNotFound(p)) if p.ends_with("light.wgsl")
        ));
    }

    #[test]
    fn shipped_shaders_need_an_initialized_device() {
        let dir = tempfile::tempdir().unwrap();
        let device = RenderDevice::new();
        let mut pipeline = ShaderPipeline::new();

        for capabilities in [ShadingCapabilities::TEXTURED, ShadingCapabilities::LIT_TEXTURED] {
            let report = pipeline
                .initialize(&device, capabilities, &shader_dir(), &dir.path().join("err.txt"))
                .unwrap_err();
            assert!(matches!(
                report.downcast_ref::<RenderError>(),
                Some(RenderError::NotInitialized(_))
            ));
        }
        assert!(!dir.path().join("err.txt").exists());
    }

    #[test]
    fn render_before_initialize_fails() {
        let mut pipeline = ShaderPipeline::new();
        let report = pipeline
            .render(
                vk::CommandBuffer::null(),
                6,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                Mat4::IDENTITY,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::NotInitialized("shader pipeline"))
        ));
    }

    #[test]
    fn layouts_follow_capabilities() {
        let textured = ShadingCapabilities::TEXTURED.descriptor_layout().pool_sizes(1);
        let lit = ShadingCapabilities::LIT_TEXTURED.descriptor_layout().pool_sizes(1);

        let uniform_count = |sizes: &[vk::DescriptorPoolSize]| {
            sizes
                .iter()
                .find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER)
                .map_or(0, |s| s.descriptor_count)
        };
        assert_eq!(uniform_count(&textured), 1);
        assert_eq!(uniform_count(&lit), 2);

        assert_eq!(ShadingCapabilities::TEXTURED.vertex_input().attributes.len(), 2);
        assert_eq!(ShadingCapabilities::LIT_TEXTURED.vertex_input().attributes.len(), 3);
    }
}
