use std::path::Path;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use crate::renderer::device::RenderDevice;
use crate::renderer::error::RenderError;
use crate::renderer::resources::image::Image;
use crate::renderer::resources::targa;

/// A mipmapped, shader-readable texture loaded from a 32-bit Targa file
pub struct ColorTexture {
    image: Option<Image>,
}

impl ColorTexture {
    pub fn new() -> Self {
        Self { image: None }
    }

    pub fn initialize(&mut self, device: &RenderDevice, path: &Path) -> Result<()> {
        // Decode first so a bad file never touches the device
        let decoded = targa::load(path)?;

        let image = Image::new_color_image(
            &decoded.pixels,
            decoded.width,
            decoded.height,
            device.memory_allocator()?,
            device.device()?,
            device.transfer_context()?,
        ).wrap_err_with(|| format!("Failed to create texture from {}", path.display()))?;

        log::debug!(
            "Uploaded texture {} with {} mip levels",
            path.display(),
            image.mip_levels,
        );
        self.image = Some(image);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        // Image releases its view before the image itself
        self.image = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.image.is_some()
    }

    /// View over every mip level, for binding to the fragment stage
    pub fn view(&self) -> Result<vk::ImageView> {
        self.image
            .as_ref()
            .map(|image| image.view)
            .ok_or_else(|| RenderError::NotInitialized("texture").into())
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.image
            .as_ref()
            .map(|image| (image.extent.width, image.extent.height))
    }
}

impl Default for ColorTexture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ColorTexture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_twice_without_initialize() {
        let mut texture = ColorTexture::new();
        texture.shutdown();
        texture.shutdown();
        assert!(!texture.is_initialized());
        assert!(texture.view().is_err());
        assert_eq!(texture.size(), None);
    }

    #[test]
    fn bad_file_fails_before_device_work() {
        // The device is never initialized, so reaching it would report NotInitialized
        let device = RenderDevice::new();
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("missing.tga");
        let mut texture = ColorTexture::new();
        let report = texture.initialize(&device, &path).unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::FileNotFound(_))
        ));

        let path = dir.path().join("rgb.tga");
        let mut bytes = vec![0u8; 12];
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&[24, 0, 1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();
        let report = texture.initialize(&device, &path).unwrap_err();
        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::UnsupportedFormat { bits_per_pixel: 24 })
        ));
        assert!(!texture.is_initialized());
    }
}
