//! Swapchain creation utils.
use crate::{
    bounded::{enumerate_into_vec, is_out_of_memory, CapacityError, EnumerateError},
    dispatch::{DeviceDispatch, InstanceDispatch},
    selection::{
        is_shared_present_mode, pick_extent, pick_present_mode, pick_surface_format,
        select_array_layers, select_min_image_count, usage_supported, ImageSharing,
    },
    surface::SurfaceSupportDetails,
};
use ash::vk;
use std::{os::raw::c_void, ptr};
use thiserror::Error;

/// Errors that can occur during swapchain creation and image retrieval.
#[derive(Debug, Error)]
pub enum SwapchainError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// Querying the number of surface formats failed.
    #[error("failed to query the surface format count: {0}")]
    SurfaceFormatCountQuery(vk::Result),
    /// Querying the number of present modes failed.
    #[error("failed to query the present mode count: {0}")]
    PresentModeCountQuery(vk::Result),
    /// Querying the number of swapchain images failed.
    #[error("failed to query the swapchain image count: {0}")]
    ImageCountQuery(vk::Result),
    /// The surface supports none of the requested image usage flags.
    #[error("image usage {requested:?} not supported by the surface (supports {supported:?})")]
    UnsupportedUsageFlags {
        /// Usage flags that were requested.
        requested: vk::ImageUsageFlags,
        /// Usage flags the surface supports.
        supported: vk::ImageUsageFlags,
    },
    /// The driver reported more elements than a fixed-size buffer holds.
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityError),
    /// Allocating an owned image or view array failed.
    #[error("out of host memory")]
    OutOfHostMemory,
}

impl SwapchainError {
    /// Map an enumeration failure, turning a failed initial count query into
    /// `count_failed` unless the driver ran out of memory.
    pub(crate) fn from_enumerate(
        err: EnumerateError,
        count_failed: fn(vk::Result) -> SwapchainError,
    ) -> SwapchainError {
        match err {
            EnumerateError::Count(result) if is_out_of_memory(result) => {
                SwapchainError::VulkanError(result)
            }
            EnumerateError::Count(result) => count_failed(result),
            EnumerateError::Fill(result) => SwapchainError::VulkanError(result),
            EnumerateError::Capacity(err) => SwapchainError::CapacityExceeded(err),
            EnumerateError::OutOfHostMemory => SwapchainError::OutOfHostMemory,
        }
    }

    fn image_count_query(result: vk::Result) -> SwapchainError {
        if is_out_of_memory(result) {
            SwapchainError::VulkanError(result)
        } else {
            SwapchainError::ImageCountQuery(result)
        }
    }
}

const DEFAULT_FORMAT_PREFERENCE: [vk::SurfaceFormatKHR; 2] = [
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

const DEFAULT_PRESENT_MODE_PREFERENCE: [vk::PresentModeKHR; 1] = [vk::PresentModeKHR::FIFO];

/// [`Swapchain`] configuration. The preference lists are borrowed and
/// ordered from most to least preferred.
#[derive(Debug, Copy, Clone)]
pub struct SwapchainOptions<'a> {
    graphics_queue_index: u32,
    present_queue_index: u32,
    extent: vk::Extent2D,
    flags: vk::SwapchainCreateFlagsKHR,
    min_image_count: Option<u32>,
    format_preference: &'a [vk::SurfaceFormatKHR],
    present_mode_preference: &'a [vk::PresentModeKHR],
    array_layers: u32,
    usage: vk::ImageUsageFlags,
    pre_transform: Option<vk::SurfaceTransformFlagsKHR>,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
    clipped: bool,
    old_swapchain: vk::SwapchainKHR,
    extension_chain: *const c_void,
}

impl<'a> SwapchainOptions<'a> {
    /// Options for a swapchain presenting from `present_queue_index` images
    /// rendered on `graphics_queue_index`, preferably sized `extent`. Uses
    /// the default values for everything else.
    pub fn new(graphics_queue_index: u32, present_queue_index: u32, extent: vk::Extent2D) -> Self {
        SwapchainOptions {
            graphics_queue_index,
            present_queue_index,
            extent,
            flags: vk::SwapchainCreateFlagsKHR::empty(),
            min_image_count: None,
            format_preference: &DEFAULT_FORMAT_PREFERENCE,
            present_mode_preference: &DEFAULT_PRESENT_MODE_PREFERENCE,
            array_layers: 1,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            pre_transform: None,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            clipped: true,
            old_swapchain: vk::SwapchainKHR::null(),
            extension_chain: ptr::null(),
        }
    }

    /// Desired image extent. Only used if the surface leaves the size up to
    /// the swapchain.
    pub fn extent(&mut self, extent: vk::Extent2D) -> &mut Self {
        self.extent = extent;
        self
    }

    /// Swapchain creation flags. Defaults to none.
    pub fn flags(&mut self, flags: vk::SwapchainCreateFlagsKHR) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Desired minimum image count, clamped to what the surface supports.
    /// Defaults to one more than the surface minimum.
    pub fn min_image_count(&mut self, count: u32) -> &mut Self {
        self.min_image_count = Some(count);
        self
    }

    /// Preference-ordered list of image formats and color spaces. Defaults to 8-bit sRGB.
    pub fn format_preference(&mut self, formats: &'a [vk::SurfaceFormatKHR]) -> &mut Self {
        self.format_preference = formats;
        self
    }

    /// Preference-ordered list of presentation modes. Defaults to [`vk::PresentModeKHR::FIFO`].
    pub fn present_mode_preference(&mut self, modes: &'a [vk::PresentModeKHR]) -> &mut Self {
        self.present_mode_preference = modes;
        self
    }

    /// Number of views in each image, capped at the surface maximum.
    /// Defaults to 1.
    pub fn array_layers(&mut self, layers: u32) -> &mut Self {
        self.array_layers = layers;
        self
    }

    /// Required swapchain image usage flags. Defaults to [`vk::ImageUsageFlags::COLOR_ATTACHMENT`].
    pub fn usage(&mut self, usage: vk::ImageUsageFlags) -> &mut Self {
        self.usage = usage;
        self
    }

    /// Transform applied before presentation. Defaults to the surface's
    /// current transform.
    pub fn pre_transform(&mut self, transform: vk::SurfaceTransformFlagsKHR) -> &mut Self {
        self.pre_transform = Some(transform);
        self
    }

    /// Requires swapchain image composite alpha.
    /// Defaults to [`vk::CompositeAlphaFlagsKHR::OPAQUE`].
    pub fn composite_alpha(&mut self, value: vk::CompositeAlphaFlagsKHR) -> &mut Self {
        self.composite_alpha = value;
        self
    }

    /// Whether obscured pixels may be discarded. Defaults to `true`.
    pub fn clipped(&mut self, clipped: bool) -> &mut Self {
        self.clipped = clipped;
        self
    }

    /// Swapchain being replaced, for resizing. Defaults to none.
    pub fn old_swapchain(&mut self, swapchain: vk::SwapchainKHR) -> &mut Self {
        self.old_swapchain = swapchain;
        self
    }

    /// Extension structures passed through unchanged as the create info's
    /// `pNext`. Must stay valid until [`Swapchain::new`] returns.
    pub fn extension_chain(&mut self, chain: *const c_void) -> &mut Self {
        self.extension_chain = chain;
        self
    }
}

/// A swapchain and the parameters it was created with.
///
/// The handle is not destroyed on drop; call [`destroy`](Self::destroy).
#[derive(Debug, Copy, Clone)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    device: vk::Device,
    surface: vk::SurfaceKHR,
    image_count: u32,
    requested_min_image_count: u32,
    image_format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    image_usage: vk::ImageUsageFlags,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    array_layers: u32,
}

impl Swapchain {
    /// Create a swapchain for `surface`.
    ///
    /// Queries surface support, resolves every parameter from `options`, and
    /// creates the swapchain. The returned [`image_count`](Self::image_count)
    /// is the number of images the driver actually created, which may exceed
    /// the requested minimum.
    ///
    /// # Panics
    ///
    /// If the device, physical device or surface handle is null, or if the
    /// surface reports no formats.
    pub unsafe fn new(
        instance: &InstanceDispatch,
        device: &DeviceDispatch,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        options: &SwapchainOptions,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> Result<Swapchain, SwapchainError> {
        assert_ne!(device.handle(), vk::Device::null());
        assert_ne!(physical_device, vk::PhysicalDevice::null());
        assert_ne!(surface, vk::SurfaceKHR::null());

        let support: SurfaceSupportDetails =
            SurfaceSupportDetails::query(instance, physical_device, surface)?;
        let capabilities = &support.capabilities;

        let min_image_count = select_min_image_count(capabilities, options.min_image_count);
        let format = pick_surface_format(&support.formats, options.format_preference);
        let present_mode =
            pick_present_mode(&support.present_modes, options.present_mode_preference);
        let extent = pick_extent(capabilities, options.extent);
        let array_layers = select_array_layers(capabilities, options.array_layers);

        if is_shared_present_mode(present_mode) {
            tracing::warn!(
                ?present_mode,
                "image usage is not validated for shared present modes"
            );
        } else if !usage_supported(capabilities, present_mode, options.usage) {
            return Err(SwapchainError::UnsupportedUsageFlags {
                requested: options.usage,
                supported: capabilities.supported_usage_flags,
            });
        }

        let sharing =
            ImageSharing::select(options.graphics_queue_index, options.present_queue_index);
        let pre_transform = options
            .pre_transform
            .unwrap_or(capabilities.current_transform);

        tracing::debug!(
            min_image_count,
            ?format,
            ?present_mode,
            ?extent,
            array_layers,
            ?sharing,
            "creating swapchain"
        );

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .flags(options.flags)
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(array_layers)
            .image_usage(options.usage)
            .image_sharing_mode(sharing.mode())
            .queue_family_indices(sharing.queue_family_indices())
            .pre_transform(pre_transform)
            .composite_alpha(options.composite_alpha)
            .present_mode(present_mode)
            .clipped(options.clipped)
            .old_swapchain(options.old_swapchain)
            .build();
        create_info.p_next = options.extension_chain;

        let handle = device.create_swapchain(&create_info, allocation_callbacks)?;
        let mut swapchain = Swapchain {
            handle,
            device: device.handle(),
            surface,
            image_count: 0,
            requested_min_image_count: min_image_count,
            image_format: format.format,
            color_space: format.color_space,
            image_usage: options.usage,
            extent,
            present_mode,
            array_layers,
        };

        match swapchain.query_image_count(device) {
            Ok(image_count) => swapchain.image_count = image_count,
            Err(err) => {
                tracing::warn!("destroying swapchain after failed image count query");
                swapchain.destroy(device, allocation_callbacks);
                return Err(err);
            }
        }

        Ok(swapchain)
    }

    /// Create a replacement for this swapchain, e.g. after the surface was
    /// resized. This swapchain is passed as the old swapchain and must still
    /// be destroyed by the caller.
    pub unsafe fn recreate(
        &self,
        instance: &InstanceDispatch,
        device: &DeviceDispatch,
        physical_device: vk::PhysicalDevice,
        options: &SwapchainOptions,
        extent: vk::Extent2D,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> Result<Swapchain, SwapchainError> {
        let mut options = *options;
        options.extent(extent).old_swapchain(self.handle);
        Swapchain::new(
            instance,
            device,
            physical_device,
            self.surface,
            &options,
            allocation_callbacks,
        )
    }

    /// Destroy the swapchain. Views created from its images must be
    /// destroyed first.
    pub unsafe fn destroy(
        self,
        device: &DeviceDispatch,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) {
        assert_eq!(device.handle(), self.device);
        device.destroy_swapchain(self.handle, allocation_callbacks);
    }

    unsafe fn query_image_count(&self, device: &DeviceDispatch) -> Result<u32, SwapchainError> {
        let mut count = 0;
        match device.swapchain_images_raw(self.handle, &mut count, ptr::null_mut()) {
            vk::Result::SUCCESS => Ok(count),
            err => Err(SwapchainError::image_count_query(err)),
        }
    }

    /// Write the swapchain's images into `images`.
    ///
    /// # Panics
    ///
    /// If `images.len()` differs from the image count the driver reports.
    pub unsafe fn get_images(
        &self,
        device: &DeviceDispatch,
        images: &mut [vk::Image],
    ) -> Result<(), SwapchainError> {
        let count = self.query_image_count(device)?;
        assert_eq!(
            images.len(),
            count as usize,
            "image buffer does not match the swapchain image count"
        );

        loop {
            let mut filled = count;
            match device.swapchain_images_raw(self.handle, &mut filled, images.as_mut_ptr()) {
                vk::Result::SUCCESS => return Ok(()),
                vk::Result::INCOMPLETE => tracing::trace!(count, "swapchain images incomplete"),
                err => return Err(err.into()),
            }
        }
    }

    /// The swapchain's images, in a newly allocated vector.
    pub unsafe fn get_images_alloc(
        &self,
        device: &DeviceDispatch,
    ) -> Result<Vec<vk::Image>, SwapchainError> {
        let mut images = Vec::new();
        enumerate_into_vec(&mut images, |count, data| {
            device.swapchain_images_raw(self.handle, count, data)
        })
        .map_err(|err| SwapchainError::from_enumerate(err, SwapchainError::ImageCountQuery))?;

        Ok(images)
    }

    fn view_create_info(&self, image: vk::Image) -> vk::ImageViewCreateInfo {
        vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.image_format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build()
    }

    /// Create a 2D color view for each of `images`, writing them into
    /// `views`. If any creation fails, the views created by this call are
    /// destroyed before the error is returned.
    ///
    /// # Panics
    ///
    /// If `images` and `views` differ in length.
    pub unsafe fn get_image_views(
        &self,
        device: &DeviceDispatch,
        images: &[vk::Image],
        views: &mut [vk::ImageView],
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> Result<(), SwapchainError> {
        assert_eq!(images.len(), views.len());

        for (i, &image) in images.iter().enumerate() {
            match device.create_image_view(&self.view_create_info(image), allocation_callbacks) {
                Ok(view) => views[i] = view,
                Err(err) => {
                    tracing::warn!(created = i, "image view creation failed, rolling back");
                    destroy_image_views(device, &views[..i], allocation_callbacks);
                    views[..i].fill(vk::ImageView::null());
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    /// Same as [`get_image_views`](Self::get_image_views), but returns the
    /// views in a newly allocated vector.
    pub unsafe fn get_image_views_alloc(
        &self,
        device: &DeviceDispatch,
        images: &[vk::Image],
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> Result<Vec<vk::ImageView>, SwapchainError> {
        let mut views = Vec::new();
        views
            .try_reserve_exact(images.len())
            .map_err(|_| SwapchainError::OutOfHostMemory)?;

        for &image in images {
            match device.create_image_view(&self.view_create_info(image), allocation_callbacks) {
                Ok(view) => views.push(view),
                Err(err) => {
                    tracing::warn!(
                        created = views.len(),
                        "image view creation failed, rolling back"
                    );
                    destroy_image_views(device, &views, allocation_callbacks);
                    return Err(err.into());
                }
            }
        }

        Ok(views)
    }

    /// The swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// The device the swapchain was created on.
    #[inline]
    pub fn device(&self) -> vk::Device {
        self.device
    }

    /// The surface the swapchain presents to.
    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Number of images the driver created. Size image buffers with this.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Minimum image count that was requested at creation.
    #[inline]
    pub fn requested_min_image_count(&self) -> u32 {
        self.requested_min_image_count
    }

    /// Format of the images.
    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    /// Color space the images are presented in.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Usage the images were created with.
    #[inline]
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        self.image_usage
    }

    /// Dimensions of the images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Present mode in use.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of array layers per image.
    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }
}

/// Destroy `views`, e.g. the ones returned by
/// [`Swapchain::get_image_views_alloc`].
pub unsafe fn destroy_image_views(
    device: &DeviceDispatch,
    views: &[vk::ImageView],
    allocation_callbacks: Option<&vk::AllocationCallbacks>,
) {
    for &view in views {
        device.destroy_image_view(view, allocation_callbacks);
    }
}
