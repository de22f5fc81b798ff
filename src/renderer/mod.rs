pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod light;
pub mod resources;
pub mod scene;
pub mod shader_data;
pub mod shading;

pub use config::RenderConfig;
pub use error::RenderError;
pub use scene::Scene;
