//! Dispatch tables for the entry points the bootstrap calls.
//!
//! Instead of a process-wide table these are plain values: an
//! [`InstanceDispatch`] is built once from the instance, and a
//! [`DeviceDispatch`] is produced by a successful device creation and passed
//! explicitly to every device-level call afterwards.
use ash::{extensions::khr, prelude::VkResult, vk};
use cstr::cstr;
use std::{ffi::CStr, fmt, os::raw::c_void, ptr};

#[inline]
pub(crate) fn allocation_callbacks_ptr(
    allocation_callbacks: Option<&vk::AllocationCallbacks>,
) -> *const vk::AllocationCallbacks {
    allocation_callbacks.map_or(ptr::null(), |callbacks| callbacks as *const _)
}

/// Instance-level entry points.
#[derive(Clone)]
pub struct InstanceDispatch {
    handle: vk::Instance,
    pub(crate) fp_v1_0: vk::InstanceFnV1_0,
    pub(crate) khr_surface: vk::KhrSurfaceFn,
}

impl InstanceDispatch {
    /// Take the entry points from an already loaded [`ash::Instance`].
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Self {
        InstanceDispatch {
            handle: instance.handle(),
            fp_v1_0: instance.fp_v1_0().clone(),
            khr_surface: khr::Surface::new(entry, instance).fp().clone(),
        }
    }

    /// Load the entry points through `symbol`, usually a wrapper around
    /// `vkGetInstanceProcAddr`. Unresolved entry points panic when called.
    pub fn load(handle: vk::Instance, mut symbol: impl FnMut(&CStr) -> *const c_void) -> Self {
        InstanceDispatch {
            handle,
            fp_v1_0: vk::InstanceFnV1_0::load(&mut symbol),
            khr_surface: vk::KhrSurfaceFn::load(&mut symbol),
        }
    }

    /// The instance these entry points belong to.
    #[inline]
    pub fn handle(&self) -> vk::Instance {
        self.handle
    }

    /// Core 1.0 instance entry points.
    #[inline]
    pub fn fp_v1_0(&self) -> &vk::InstanceFnV1_0 {
        &self.fp_v1_0
    }

    /// `VK_KHR_surface` entry points.
    #[inline]
    pub fn khr_surface(&self) -> &vk::KhrSurfaceFn {
        &self.khr_surface
    }

    /// `vkGetPhysicalDeviceSurfaceCapabilitiesKHR`
    pub unsafe fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();
        (self.khr_surface.get_physical_device_surface_capabilities_khr)(
            physical_device,
            surface,
            &mut capabilities,
        )
        .result_with_success(capabilities)
    }

    /// `vkGetPhysicalDeviceSurfaceFormatsKHR`, without any count handling.
    pub unsafe fn surface_formats_raw(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormatKHR,
    ) -> vk::Result {
        (self.khr_surface.get_physical_device_surface_formats_khr)(
            physical_device,
            surface,
            count,
            formats,
        )
    }

    /// `vkGetPhysicalDeviceSurfacePresentModesKHR`, without any count handling.
    pub unsafe fn surface_present_modes_raw(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        count: &mut u32,
        present_modes: *mut vk::PresentModeKHR,
    ) -> vk::Result {
        (self.khr_surface.get_physical_device_surface_present_modes_khr)(
            physical_device,
            surface,
            count,
            present_modes,
        )
    }

    /// `vkGetDeviceProcAddr`
    pub unsafe fn device_proc_addr(
        &self,
        device: vk::Device,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction {
        (self.fp_v1_0.get_device_proc_addr)(device, name.as_ptr())
    }
}

impl fmt::Debug for InstanceDispatch {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstanceDispatch")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Device-level entry points the bootstrap calls, resolved through the
/// device's own `vkGetDeviceProcAddr`.
#[derive(Clone)]
pub struct DeviceDispatch {
    handle: vk::Device,
    pub(crate) fp_v1_0: vk::DeviceFnV1_0,
    pub(crate) khr_swapchain: vk::KhrSwapchainFn,
}

const CORE_ENTRY_POINTS: usize = 4;

/// Entry points this crate calls, core ones first, then `VK_KHR_swapchain`.
fn required_entry_points() -> [&'static CStr; 7] {
    [
        cstr!("vkDestroyDevice"),
        cstr!("vkGetDeviceQueue"),
        cstr!("vkCreateImageView"),
        cstr!("vkDestroyImageView"),
        cstr!("vkCreateSwapchainKHR"),
        cstr!("vkDestroySwapchainKHR"),
        cstr!("vkGetSwapchainImagesKHR"),
    ]
}

impl DeviceDispatch {
    /// Resolve the device-level entry points through `symbol`.
    ///
    /// Returns the table together with the first required entry point that
    /// did not resolve, if any. The swapchain entry points are only required
    /// when `swapchain_enabled` is set.
    pub(crate) fn load(
        handle: vk::Device,
        swapchain_enabled: bool,
        mut symbol: impl FnMut(&CStr) -> vk::PFN_vkVoidFunction,
    ) -> (DeviceDispatch, Option<&'static CStr>) {
        let all = required_entry_points();
        let required = if swapchain_enabled {
            &all[..]
        } else {
            &all[..CORE_ENTRY_POINTS]
        };
        let mut missing = None;
        let mut resolve = |name: &CStr| {
            let function = symbol(name);
            if function.is_none() && missing.is_none() {
                missing = required.iter().copied().find(|&required| required == name);
            }

            function.map_or(ptr::null(), |function| function as *const c_void)
        };

        let dispatch = DeviceDispatch {
            handle,
            fp_v1_0: vk::DeviceFnV1_0::load(&mut resolve),
            khr_swapchain: vk::KhrSwapchainFn::load(&mut resolve),
        };

        (dispatch, missing)
    }

    /// The device these entry points belong to.
    #[inline]
    pub fn handle(&self) -> vk::Device {
        self.handle
    }

    /// Core 1.0 device entry points.
    #[inline]
    pub fn fp_v1_0(&self) -> &vk::DeviceFnV1_0 {
        &self.fp_v1_0
    }

    /// `VK_KHR_swapchain` entry points.
    #[inline]
    pub fn khr_swapchain(&self) -> &vk::KhrSwapchainFn {
        &self.khr_swapchain
    }

    /// Destroy the device. Every object created from it must already be
    /// destroyed.
    pub unsafe fn destroy_device(&self, allocation_callbacks: Option<&vk::AllocationCallbacks>) {
        (self.fp_v1_0.destroy_device)(self.handle, allocation_callbacks_ptr(allocation_callbacks));
    }

    /// `vkGetDeviceQueue`
    pub unsafe fn get_device_queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue {
        let mut queue = vk::Queue::null();
        (self.fp_v1_0.get_device_queue)(self.handle, queue_family_index, queue_index, &mut queue);
        queue
    }

    /// `vkCreateSwapchainKHR`
    pub unsafe fn create_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut swapchain = vk::SwapchainKHR::null();
        (self.khr_swapchain.create_swapchain_khr)(
            self.handle,
            create_info,
            allocation_callbacks_ptr(allocation_callbacks),
            &mut swapchain,
        )
        .result_with_success(swapchain)
    }

    /// `vkDestroySwapchainKHR`
    pub unsafe fn destroy_swapchain(
        &self,
        swapchain: vk::SwapchainKHR,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) {
        (self.khr_swapchain.destroy_swapchain_khr)(
            self.handle,
            swapchain,
            allocation_callbacks_ptr(allocation_callbacks),
        );
    }

    /// `vkGetSwapchainImagesKHR`, without any count handling.
    pub unsafe fn swapchain_images_raw(
        &self,
        swapchain: vk::SwapchainKHR,
        count: &mut u32,
        images: *mut vk::Image,
    ) -> vk::Result {
        (self.khr_swapchain.get_swapchain_images_khr)(self.handle, swapchain, count, images)
    }

    /// `vkCreateImageView`
    pub unsafe fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::ImageView> {
        let mut view = vk::ImageView::null();
        (self.fp_v1_0.create_image_view)(
            self.handle,
            create_info,
            allocation_callbacks_ptr(allocation_callbacks),
            &mut view,
        )
        .result_with_success(view)
    }

    /// `vkDestroyImageView`
    pub unsafe fn destroy_image_view(
        &self,
        view: vk::ImageView,
        allocation_callbacks: Option<&vk::AllocationCallbacks>,
    ) {
        (self.fp_v1_0.destroy_image_view)(
            self.handle,
            view,
            allocation_callbacks_ptr(allocation_callbacks),
        );
    }
}

impl fmt::Debug for DeviceDispatch {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DeviceDispatch")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
