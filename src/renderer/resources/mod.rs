//! "Resources" are the GPU objects created from a `RenderDevice`.
//! Each one owns its Vulkan handles and releases them when dropped or shut down.

pub mod buffer;
pub mod descriptor;
pub mod image;
pub mod material;
pub mod mesh;
pub mod model;
pub mod shader;
pub mod targa;
pub mod texture;
pub mod vertex;
