use std::sync::Arc;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use glam::Mat4;
use winit::window::Window;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::device::RenderDevice;
use crate::renderer::error::RenderError;
use crate::renderer::light::Light;
use crate::renderer::resources::model::Model;
use crate::renderer::shading::{ShaderPipeline, ShadingCapabilities};

/// Model spin per frame, a hundredth of a half turn
pub const ROTATION_STEP_DEGREES: f32 = 1.8;

/// Spin angle of the model in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAccumulator {
    angle: f32,
    step: f32,
}

impl RotationAccumulator {
    pub fn new(step: f32) -> Self {
        Self { angle: 0.0, step }
    }

    /// Steps the angle and returns it. Once it passes 360 it drops back by a full turn.
    pub fn advance(&mut self) -> f32 {
        self.angle += self.step;
        if self.angle > 360.0 {
            self.angle -= 360.0;
        }
        self.angle
    }

    pub fn degrees(&self) -> f32 {
        self.angle
    }

    pub fn radians(&self) -> f32 {
        self.angle.to_radians()
    }
}

impl Default for RotationAccumulator {
    fn default() -> Self {
        Self::new(ROTATION_STEP_DEGREES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Uninitialized,
    Running,
}

/// Owns every rendering component and drives one frame at a time.
///
/// Components are created in order (device, camera, model, shading pipeline, light)
/// and released in reverse, either by [`Scene::shutdown`] or on drop.
pub struct Scene {
    state: SceneState,
    clear_color: [f32; 4],

    device: RenderDevice,
    camera: Camera,
    model: Model,
    shader: ShaderPipeline,
    light: Option<Light>,
    rotation: RotationAccumulator,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            state: SceneState::Uninitialized,
            clear_color: [0.0, 0.0, 0.0, 1.0],

            device: RenderDevice::new(),
            camera: Camera::new(),
            model: Model::new(),
            shader: ShaderPipeline::new(),
            light: None,
            rotation: RotationAccumulator::default(),
        }
    }

    pub fn initialize(&mut self, config: &RenderConfig, window: Arc<Window>) -> Result<()> {
        if self.state == SceneState::Running {
            return Ok(());
        }

        if let Err(e) = self.create_components(config, window) {
            log::error!("{:#}", e);
            self.shutdown();
            return Err(e);
        }

        self.state = SceneState::Running;
        log::info!("Scene running");
        Ok(())
    }

    fn create_components(&mut self, config: &RenderConfig, window: Arc<Window>) -> Result<()> {
        self.device
            .initialize(config, window)
            .wrap_err("Could not initialize the render device")?;

        self.camera.set_position(0.0, 0.0, -5.0);
        self.camera.set_rotation(0.0, 0.0, 0.0);

        self.model
            .initialize(&self.device, &config.texture_path, config.model_path.as_deref())
            .wrap_err("Could not initialize the model object")?;

        self.shader
            .initialize(
                &self.device,
                ShadingCapabilities::LIT_TEXTURED,
                &config.shader_dir,
                &config.shader_error_path,
            )
            .wrap_err("Could not initialize the light shader object")?;

        let mut light = Light::new();
        light.set_diffuse_color(1.0, 0.0, 1.0, 1.0);
        light.set_direction(0.0, 0.0, 1.0);
        self.light = Some(light);

        self.clear_color = config.clear_color;
        self.rotation = RotationAccumulator::default();
        Ok(())
    }

    /// Advances the spin and renders one frame
    pub fn frame(&mut self) -> Result<()> {
        if self.state != SceneState::Running {
            return Err(RenderError::NotRunning.into());
        }

        let angle = self.rotation.advance();
        self.render(angle)
    }

    fn render(&mut self, angle_degrees: f32) -> Result<()> {
        let [red, green, blue, alpha] = self.clear_color;
        self.device.begin_frame(red, green, blue, alpha)?;

        // The frame is submitted even if recording failed, so the fence is signaled again
        let drawn = self.draw(angle_degrees);
        let presented = self.device.end_frame();
        drawn.and(presented)
    }

    fn draw(&mut self, angle_degrees: f32) -> Result<()> {
        self.camera.render();

        let world = self.device.world_matrix() * Mat4::from_rotation_y(angle_degrees.to_radians());
        let view = self.camera.view_matrix();
        let projection = self.device.projection_matrix();

        let cmd = self.device.command_buffer()?;
        self.model.render(cmd)?;
        self.shader.render(
            cmd,
            self.model.index_count(),
            world,
            view,
            projection,
            self.model.texture(),
            self.light.as_ref(),
        )
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn rotation(&self) -> &RotationAccumulator {
        &self.rotation
    }

    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    pub fn shutdown(&mut self) {
        self.light = None;
        self.shader.shutdown();
        self.model.shutdown();
        self.camera = Camera::new();
        self.device.shutdown();
        self.state = SceneState::Uninitialized;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    trait AmbiguousIfClone<A> {
        fn some_item() {}
    }
    impl<T: ?Sized> AmbiguousIfClone<()> for T {}
    impl<T: ?Sized + Clone> AmbiguousIfClone<u8> for T {}

    fn advance_times(rotation: &mut RotationAccumulator, times: usize) -> f32 {
        let mut angle = rotation.degrees();
        for _ in 0..times {
            angle = rotation.advance();
        }
        angle
    }

    #[test]
    fn rotation_wraps_after_passing_a_full_turn() {
        assert_eq!(advance_times(&mut RotationAccumulator::new(7.0), 51), 357.0);
        assert_eq!(advance_times(&mut RotationAccumulator::new(7.0), 52), 4.0);
        assert_eq!(advance_times(&mut RotationAccumulator::new(11.0), 33), 3.0);
        assert_eq!(advance_times(&mut RotationAccumulator::new(1.75), 206), 0.5);
    }

    #[test]
    fn rotation_of_exactly_360_is_kept() {
        let mut rotation = RotationAccumulator::new(10.0);
        assert_eq!(advance_times(&mut rotation, 36), 360.0);
        assert_eq!(rotation.advance(), 10.0);
    }

    #[test]
    fn default_step_is_a_hundredth_of_pi() {
        let mut rotation = RotationAccumulator::default();
        rotation.advance();
        assert!((rotation.radians() - std::f32::consts::PI * 0.01).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn rotation_never_exceeds_a_full_turn(step in 0.01f32..90.0, frames in 1usize..2000) {
            let mut rotation = RotationAccumulator::new(step);
            for _ in 0..frames {
                let angle = rotation.advance();
                prop_assert!(angle > 0.0 && angle <= 360.0, "angle {}", angle);
            }
        }
    }

    #[test]
    fn scene_is_not_clone() {
        let _ = <Scene as AmbiguousIfClone<_>>::some_item;
    }

    #[test]
    fn frame_before_initialize_is_rejected() {
        let mut scene = Scene::new();
        let report = scene.frame().unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::NotRunning)
        ));
        // A rejected frame does not advance the spin
        assert_eq!(scene.rotation().degrees(), 0.0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut scene = Scene::new();
        scene.shutdown();
        scene.shutdown();
        assert_eq!(scene.state(), SceneState::Uninitialized);
        assert!(!scene.device().is_initialized());
    }
}
