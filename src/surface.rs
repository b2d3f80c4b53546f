//! Surface support queries.
use crate::{
    bounded::{enumerate_into, BoundedVec, DEFAULT_MAX_SURFACE_FORMATS, PRESENT_MODE_COUNT},
    dispatch::InstanceDispatch,
    swapchain::SwapchainError,
};
use ash::vk;

/// Everything a surface reports about swapchain support on a physical device.
///
/// `MAX_FORMATS` bounds the number of formats the query accepts.
#[derive(Debug, Clone)]
pub struct SurfaceSupportDetails<const MAX_FORMATS: usize = DEFAULT_MAX_SURFACE_FORMATS> {
    /// Image count, extent, transform, usage and composite alpha limits.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs.
    pub formats: BoundedVec<vk::SurfaceFormatKHR, MAX_FORMATS>,
    /// Supported present modes.
    pub present_modes: BoundedVec<vk::PresentModeKHR, PRESENT_MODE_COUNT>,
}

impl<const MAX_FORMATS: usize> SurfaceSupportDetails<MAX_FORMATS> {
    /// Query `surface` support on `physical_device`.
    pub unsafe fn query(
        instance: &InstanceDispatch,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, SwapchainError> {
        let capabilities = instance.surface_capabilities(physical_device, surface)?;

        let mut formats = BoundedVec::new();
        enumerate_into(&mut formats, |count, data| {
            instance.surface_formats_raw(physical_device, surface, count, data)
        })
        .map_err(|err| {
            SwapchainError::from_enumerate(err, SwapchainError::SurfaceFormatCountQuery)
        })?;

        let mut present_modes = BoundedVec::new();
        enumerate_into(&mut present_modes, |count, data| {
            instance.surface_present_modes_raw(physical_device, surface, count, data)
        })
        .map_err(|err| SwapchainError::from_enumerate(err, SwapchainError::PresentModeCountQuery))?;

        tracing::debug!(
            formats = formats.len(),
            present_modes = ?&*present_modes,
            "queried surface support"
        );
        Ok(SurfaceSupportDetails {
            capabilities,
            formats,
            present_modes,
        })
    }
}
