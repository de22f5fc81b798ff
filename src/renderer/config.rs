use std::path::PathBuf;

pub const VSYNC_ENABLED: bool = true;
pub const FULL_SCREEN: bool = false;
pub const SCREEN_DEPTH: f32 = 1000.0;
pub const SCREEN_NEAR: f32 = 0.1;

/// Contains configuration options for the renderer like the resolution, vsync, and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
    pub screen_depth: f32,
    pub screen_near: f32,
    pub clear_color: [f32; 4],

    pub texture_path: PathBuf,
    /// `None` renders the built-in quad.
    pub model_path: Option<PathBuf>,
    pub shader_dir: PathBuf,

    pub video_card_info_path: PathBuf,
    pub shader_error_path: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            vsync: VSYNC_ENABLED,
            fullscreen: FULL_SCREEN,
            screen_depth: SCREEN_DEPTH,
            screen_near: SCREEN_NEAR,
            clear_color: [0.0, 0.0, 0.0, 1.0],

            texture_path: PathBuf::from("assets/uv_checker.tga"),
            model_path: Some(PathBuf::from("assets/cube.txt")),
            shader_dir: PathBuf::from("shaders"),

            video_card_info_path: PathBuf::from("VideoCard.txt"),
            shader_error_path: PathBuf::from("shader-error.txt"),
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}
