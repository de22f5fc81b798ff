use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use naga::back::spv;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use crate::renderer::error::{RenderError, ResourceResultExt};

/// SPIR-V version every shader is compiled for
pub const SPIRV_VERSION: (u8, u8) = (1, 3);

/// SPIR-V words for one vertex and one fragment entry point of a WGSL file
#[derive(Debug)]
pub struct CompiledShader {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Reads and compiles `path`. Compiler output goes to `diagnostics_path` on failure.
pub fn compile_wgsl_file(
    path: &Path,
    vertex_entry: &str,
    fragment_entry: &str,
    diagnostics_path: &Path,
) -> Result<CompiledShader> {
    let source = std::fs::read_to_string(path).map_err(|_| {
        log::error!("Missing shader file {}", path.display());
        RenderError::FileNotFound(path.to_path_buf())
    })?;

    compile_wgsl(&source, vertex_entry, fragment_entry).map_err(|diagnostics| {
        log::error!("Error compiling shader {}:\n{}", path.display(), diagnostics);
        if let Err(e) = std::fs::write(diagnostics_path, &diagnostics) {
            log::warn!("Could not write {}: {}", diagnostics_path.display(), e);
        }
        RenderError::ShaderCompile {
            shader: path.to_path_buf(),
            diagnostics: diagnostics_path.to_path_buf(),
        }.into()
    })
}

/// Parses and validates the module once, then emits each entry point on its own.
/// Errors are the human-readable compiler diagnostics.
pub fn compile_wgsl(
    source: &str,
    vertex_entry: &str,
    fragment_entry: &str,
) -> std::result::Result<CompiledShader, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| e.emit_to_string(source))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let mut options = spv::Options {
        lang_version: SPIRV_VERSION,
        ..Default::default()
    };
    // The device flips the viewport instead
    options.flags.remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);

    let write_entry = |stage: ShaderStage, entry_point: &str| {
        let found = module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == stage);
        if !found {
            return Err(format!("no {:?} entry point named `{}`", stage, entry_point));
        }
        let pipeline_options = spv::PipelineOptions {
            shader_stage: stage,
            entry_point: entry_point.to_owned(),
        };
        spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| format!("{:?} entry point `{}`: {}", stage, entry_point, e))
    };

    Ok(CompiledShader {
        vertex: write_entry(ShaderStage::Vertex, vertex_entry)?,
        fragment: write_entry(ShaderStage::Fragment, fragment_entry)?,
    })
}

/// Vertex and fragment modules with their entry point names
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    vertex_entry: CString,
    fragment_entry: CString,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(
        compiled: &CompiledShader,
        vertex_entry: &str,
        fragment_entry: &str,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let vertex_entry = CString::new(vertex_entry).map_err(|e| eyre!(e))?;
        let fragment_entry = CString::new(fragment_entry).map_err(|e| eyre!(e))?;

        let vert_mod = create_shader_module(&compiled.vertex, &device)
            .or_resource("vertex shader module")?;
        let frag_mod = match create_shader_module(&compiled.fragment, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e).or_resource("fragment shader module");
            }
        };

        Ok(Self {
            vert_mod,
            frag_mod,
            vertex_entry,
            fragment_entry,
            device,
        })
    }

    pub fn vertex_entry(&self) -> &CStr {
        &self.vertex_entry
    }

    pub fn fragment_entry(&self) -> &CStr {
        &self.fragment_entry
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(code: &[u32], device: &ash::Device) -> ash::prelude::VkResult<vk::ShaderModule> {
    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(code);

    unsafe {
        device.create_shader_module(&shader_module_info, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shader_path(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders").join(name)
    }

    #[test]
    fn shipped_shaders_compile() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = dir.path().join("shader-error.txt");

        for (file, vertex, fragment) in [
            ("texture.wgsl", "texture_vertex", "texture_fragment"),
            ("light.wgsl", "light_vertex", "light_fragment"),
        ] {
            let compiled = compile_wgsl_file(&shader_path(file), vertex, fragment, &diagnostics)
                .unwrap_or_else(|e| panic!("{}: {:?}", file, e));
            // SPIR-V magic number
            assert_eq!(compiled.vertex[0], 0x0723_0203);
            assert_eq!(compiled.fragment[0], 0x0723_0203);
        }
        assert!(!diagnostics.exists());
    }

    #[test]
    fn syntax_errors_go_to_the_diagnostics_file() {
        let dir = tempfile::tempdir().unwrap();
        let shader = dir.path().join("broken.wgsl");
        let diagnostics = dir.path().join("shader-error.txt");
        std::fs::write(&shader, "@vertex fn main( -> @builtin(position) vec4<f32> {}").unwrap();

        let report = compile_wgsl_file(&shader, "main", "main", &diagnostics).unwrap_err();
        match report.downcast_ref::<RenderError>() {
            Some(RenderError::ShaderCompile { shader: s, diagnostics: d }) => {
                assert_eq!(s, &shader);
                assert_eq!(d, &diagnostics);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let written = std::fs::read_to_string(&diagnostics).unwrap();
        assert!(!written.is_empty());
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let source = std::fs::read_to_string(shader_path("texture.wgsl")).unwrap();
        let message = compile_wgsl(&source, "texture_vertex", "no_such_fragment").unwrap_err();
        assert!(message.contains("no_such_fragment"), "{}", message);

        // Right name, wrong stage
        let message = compile_wgsl(&source, "texture_fragment", "texture_fragment").unwrap_err();
        assert!(message.contains("Vertex"), "{}", message);
    }

    #[test]
    fn missing_shader_file() {
        let dir = tempfile::tempdir().unwrap();
        let shader = dir.path().join("absent.wgsl");
        let report = compile_wgsl_file(&shader, "a", "b", &dir.path().join("err.txt")).unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::FileNotFound(p)) if *p == shader
        ));
    }
}
