//! Swapchain parameter selection.
//!
//! Pure functions picking swapchain parameters from what the surface supports
//! and what the caller asked for.
use ash::vk;

/// `current_extent.width` value meaning the surface size is determined by
/// the swapchain.
pub const UNDEFINED_EXTENT: u32 = u32::MAX;

/// Minimum image count to request.
///
/// Without a `desired` count this is one more than the surface minimum,
/// capped at the maximum, if the surface has a maximum; otherwise the
/// surface minimum. A `desired` count is clamped into the supported range.
/// A `max_image_count` of zero means there is no maximum.
pub fn select_min_image_count(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: Option<u32>,
) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    let has_max = max > 0;

    match desired {
        Some(desired) => {
            let count = desired.max(min);
            if has_max {
                count.min(max)
            } else {
                count
            }
        }
        None if has_max => min.saturating_add(1).min(max),
        None => min,
    }
}

#[inline]
fn same_surface_format(a: &vk::SurfaceFormatKHR, b: &vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// The first entry of `desired` the surface supports, or the first
/// `available` format if none is.
///
/// # Panics
///
/// If `available` is empty. Surfaces always report at least one format.
pub fn pick_surface_format(
    available: &[vk::SurfaceFormatKHR],
    desired: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    assert!(!available.is_empty(), "surface reported no formats");

    let preferred = desired.iter().find(|desired| {
        available
            .iter()
            .any(|available| same_surface_format(available, desired))
    });

    match preferred {
        Some(&format) => format,
        None => {
            let fallback = available[0];
            tracing::warn!(
                ?fallback,
                "no desired surface format is supported, using the first available"
            );
            fallback
        }
    }
}

/// The first entry of `desired` the surface supports, or
/// [`vk::PresentModeKHR::FIFO`], which every surface supports.
pub fn pick_present_mode(
    available: &[vk::PresentModeKHR],
    desired: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    match desired.iter().find(|desired| available.contains(desired)) {
        Some(&mode) => mode,
        None => {
            tracing::warn!("no desired present mode is supported, using FIFO");
            vk::PresentModeKHR::FIFO
        }
    }
}

/// Image extent: the surface's current extent if it dictates one,
/// otherwise `desired` clamped into the supported range.
pub fn pick_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != UNDEFINED_EXTENT {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: desired.width.max(min.width).min(max.width),
        height: desired.height.max(min.height).min(max.height),
    }
}

/// Number of array layers, capped at the surface maximum.
#[inline]
pub fn select_array_layers(capabilities: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
    desired.min(capabilities.max_image_array_layers)
}

/// Returns true for the shared present modes of `VK_KHR_shared_presentable_image`.
#[inline]
pub fn is_shared_present_mode(present_mode: vk::PresentModeKHR) -> bool {
    matches!(
        present_mode,
        vk::PresentModeKHR::SHARED_DEMAND_REFRESH | vk::PresentModeKHR::SHARED_CONTINUOUS_REFRESH
    )
}

/// Returns true if `usage` is acceptable under `present_mode`.
///
/// Shared present modes report their supported usage through
/// `VkSharedPresentSurfaceCapabilitiesKHR`, which is not queried, so they are
/// always accepted.
pub fn usage_supported(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    present_mode: vk::PresentModeKHR,
    usage: vk::ImageUsageFlags,
) -> bool {
    is_shared_present_mode(present_mode) || capabilities.supported_usage_flags.intersects(usage)
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageSharing {
    /// Both roles use the same family.
    Exclusive,
    /// Graphics and present family indices, in that order.
    Concurrent([u32; 2]),
}

impl ImageSharing {
    /// Exclusive if both roles share a family, concurrent otherwise.
    #[inline]
    pub fn select(graphics_queue_index: u32, present_queue_index: u32) -> ImageSharing {
        if graphics_queue_index == present_queue_index {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([graphics_queue_index, present_queue_index])
        }
    }

    /// The Vulkan sharing mode.
    #[inline]
    pub fn mode(&self) -> vk::SharingMode {
        match self {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Queue family indices to pass along with [`mode`](Self::mode).
    #[inline]
    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            ImageSharing::Exclusive => &[],
            ImageSharing::Concurrent(indices) => &indices[..],
        }
    }
}
