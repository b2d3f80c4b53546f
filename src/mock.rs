//! A scripted in-process driver for tests.
//!
//! Each test thread owns one [`MockDriver`]. The `extern "system"` entry
//! points below read and record through it, and are handed to the dispatch
//! tables by [`instance_symbol`] and [`device_symbol`].
use crate::{
    dispatch::{DeviceDispatch, InstanceDispatch},
    selection::UNDEFINED_EXTENT,
};
use ash::vk::{self, Handle};
use std::{
    cell::RefCell,
    ffi::{CStr, CString},
    mem,
    os::raw::{c_char, c_void},
    ptr, slice,
};

const DEVICE: u64 = 0xde71ce;

/// Device creation parameters as the driver saw them.
#[derive(Debug, Clone)]
pub struct RecordedDevice {
    pub chain: Vec<vk::StructureType>,
    pub enabled_features: bool,
    pub queue_families: Vec<u32>,
    pub queue_counts: Vec<u32>,
    pub extensions: Vec<CString>,
}

/// Swapchain creation parameters as the driver saw them.
#[derive(Debug, Clone)]
pub struct RecordedSwapchain {
    pub min_image_count: u32,
    pub image_array_layers: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub clipped: vk::Bool32,
    pub old_swapchain: vk::SwapchainKHR,
    pub p_next: *const c_void,
}

#[derive(Debug)]
pub struct MockDriver {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Formats that replace `formats` during the first fill, which then
    /// reports `VK_INCOMPLETE`.
    pub grown_formats: Option<Vec<vk::SurfaceFormatKHR>>,
    pub format_count_result: vk::Result,
    pub format_fill_calls: usize,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub present_mode_count_result: vk::Result,

    pub device_create_result: vk::Result,
    pub device_info: Option<RecordedDevice>,
    pub devices_created: usize,
    pub devices_destroyed: usize,
    pub missing_entry_points: Vec<&'static CStr>,

    pub swapchain_create_result: vk::Result,
    pub swapchain_info: Option<RecordedSwapchain>,
    pub swapchains_created: usize,
    pub swapchains_destroyed: usize,

    pub image_count: u32,
    pub image_count_result: vk::Result,
    /// Number of image fills answered with `VK_INCOMPLETE` first.
    pub incomplete_image_fills: usize,
    pub image_fill_calls: usize,

    /// Zero-based view creation attempt that fails.
    pub fail_view_at: Option<usize>,
    pub view_attempts: usize,
    pub view_info: Option<vk::ImageViewCreateInfo>,
    pub views_created: usize,
    pub views_destroyed: usize,
    pub live_views: Vec<vk::ImageView>,

    /// Allocation callbacks passed to each create/destroy call, in call order.
    pub allocators: Vec<(&'static str, *const vk::AllocationCallbacks)>,
}

impl Default for MockDriver {
    fn default() -> Self {
        MockDriver {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: UNDEFINED_EXTENT,
                    height: UNDEFINED_EXTENT,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            grown_formats: None,
            format_count_result: vk::Result::SUCCESS,
            format_fill_calls: 0,
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            present_mode_count_result: vk::Result::SUCCESS,
            device_create_result: vk::Result::SUCCESS,
            device_info: None,
            devices_created: 0,
            devices_destroyed: 0,
            missing_entry_points: Vec::new(),
            swapchain_create_result: vk::Result::SUCCESS,
            swapchain_info: None,
            swapchains_created: 0,
            swapchains_destroyed: 0,
            image_count: 3,
            image_count_result: vk::Result::SUCCESS,
            incomplete_image_fills: 0,
            image_fill_calls: 0,
            fail_view_at: None,
            view_attempts: 0,
            view_info: None,
            views_created: 0,
            views_destroyed: 0,
            live_views: Vec::new(),
            allocators: Vec::new(),
        }
    }
}

thread_local! {
    static DRIVER: RefCell<MockDriver> = RefCell::new(MockDriver::default());
}

impl MockDriver {
    /// Allocation callbacks `entry_point` was called with, one per call.
    pub fn allocators_for(&self, entry_point: &str) -> Vec<*const vk::AllocationCallbacks> {
        self.allocators
            .iter()
            .filter(|(name, _)| *name == entry_point)
            .map(|&(_, allocator)| allocator)
            .collect()
    }

    fn record_allocator(
        &mut self,
        entry_point: &'static str,
        allocator: *const vk::AllocationCallbacks,
    ) {
        self.allocators.push((entry_point, allocator));
    }
}

/// Replace this thread's driver.
pub fn install(driver: MockDriver) {
    DRIVER.with(|cell| *cell.borrow_mut() = driver);
}

/// Access this thread's driver.
pub fn with<R>(f: impl FnOnce(&mut MockDriver) -> R) -> R {
    DRIVER.with(|cell| f(&mut cell.borrow_mut()))
}

pub fn physical_device() -> vk::PhysicalDevice {
    vk::PhysicalDevice::from_raw(0x10)
}

pub fn surface() -> vk::SurfaceKHR {
    vk::SurfaceKHR::from_raw(0x20)
}

pub fn queue_handle(queue_family_index: u32, queue_index: u32) -> vk::Queue {
    vk::Queue::from_raw(0x100 + ((queue_family_index as u64) << 8) + queue_index as u64)
}

pub fn image_handles(count: u32) -> Vec<vk::Image> {
    (0..count as u64)
        .map(|i| vk::Image::from_raw(0x1000 + i))
        .collect()
}

pub fn instance_dispatch() -> InstanceDispatch {
    InstanceDispatch::load(vk::Instance::from_raw(1), instance_symbol)
}

pub fn device_dispatch() -> DeviceDispatch {
    DeviceDispatch::load(vk::Device::from_raw(DEVICE), true, device_symbol).0
}

pub fn instance_symbol(name: &CStr) -> *const c_void {
    match name.to_bytes() {
        b"vkGetPhysicalDeviceSurfaceCapabilitiesKHR" => surface_capabilities as *const c_void,
        b"vkGetPhysicalDeviceSurfaceFormatsKHR" => surface_formats as *const c_void,
        b"vkGetPhysicalDeviceSurfacePresentModesKHR" => surface_present_modes as *const c_void,
        b"vkCreateDevice" => create_device as *const c_void,
        b"vkGetDeviceProcAddr" => get_device_proc_addr as *const c_void,
        _ => ptr::null(),
    }
}

pub fn device_symbol(name: &CStr) -> vk::PFN_vkVoidFunction {
    if with(|driver| driver.missing_entry_points.iter().any(|&missing| missing == name)) {
        return None;
    }

    let function = match name.to_bytes() {
        b"vkDestroyDevice" => destroy_device as *const c_void,
        b"vkGetDeviceQueue" => get_device_queue as *const c_void,
        b"vkCreateImageView" => create_image_view as *const c_void,
        b"vkDestroyImageView" => destroy_image_view as *const c_void,
        b"vkCreateSwapchainKHR" => create_swapchain as *const c_void,
        b"vkDestroySwapchainKHR" => destroy_swapchain as *const c_void,
        b"vkGetSwapchainImagesKHR" => get_swapchain_images as *const c_void,
        _ => return None,
    };

    Some(unsafe { mem::transmute::<*const c_void, unsafe extern "system" fn()>(function) })
}

unsafe fn write_out<T: Copy>(items: &[T], count: *mut u32, data: *mut T) -> vk::Result {
    if data.is_null() {
        *count = items.len() as u32;
        return vk::Result::SUCCESS;
    }

    let written = (*count as usize).min(items.len());
    ptr::copy_nonoverlapping(items.as_ptr(), data, written);
    *count = written as u32;
    if written < items.len() {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

unsafe fn slice_or_empty<'a, T>(data: *const T, len: u32) -> &'a [T] {
    if data.is_null() {
        &[]
    } else {
        slice::from_raw_parts(data, len as usize)
    }
}

unsafe extern "system" fn surface_capabilities(
    _: vk::PhysicalDevice,
    _: vk::SurfaceKHR,
    capabilities: *mut vk::SurfaceCapabilitiesKHR,
) -> vk::Result {
    *capabilities = with(|driver| driver.capabilities);
    vk::Result::SUCCESS
}

unsafe extern "system" fn surface_formats(
    _: vk::PhysicalDevice,
    _: vk::SurfaceKHR,
    count: *mut u32,
    formats: *mut vk::SurfaceFormatKHR,
) -> vk::Result {
    with(|driver| {
        if formats.is_null() {
            if driver.format_count_result != vk::Result::SUCCESS {
                return driver.format_count_result;
            }
            return write_out(&driver.formats, count, formats);
        }

        driver.format_fill_calls += 1;
        if let Some(grown) = driver.grown_formats.take() {
            let _ = write_out(&driver.formats, count, formats);
            driver.formats = grown;
            return vk::Result::INCOMPLETE;
        }

        write_out(&driver.formats, count, formats)
    })
}

unsafe extern "system" fn surface_present_modes(
    _: vk::PhysicalDevice,
    _: vk::SurfaceKHR,
    count: *mut u32,
    present_modes: *mut vk::PresentModeKHR,
) -> vk::Result {
    with(|driver| {
        if present_modes.is_null() && driver.present_mode_count_result != vk::Result::SUCCESS {
            return driver.present_mode_count_result;
        }

        write_out(&driver.present_modes, count, present_modes)
    })
}

unsafe extern "system" fn create_device(
    _: vk::PhysicalDevice,
    create_info: *const vk::DeviceCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    device: *mut vk::Device,
) -> vk::Result {
    let info = &*create_info;
    let mut chain = Vec::new();
    let mut next = info.p_next as *const vk::BaseInStructure;
    while !next.is_null() {
        chain.push((*next).s_type);
        next = (*next).p_next;
    }

    let queue_infos = slice_or_empty(info.p_queue_create_infos, info.queue_create_info_count);
    let extensions = slice_or_empty(
        info.pp_enabled_extension_names,
        info.enabled_extension_count,
    );
    let recorded = RecordedDevice {
        chain,
        enabled_features: !info.p_enabled_features.is_null(),
        queue_families: queue_infos.iter().map(|q| q.queue_family_index).collect(),
        queue_counts: queue_infos.iter().map(|q| q.queue_count).collect(),
        extensions: extensions
            .iter()
            .map(|&name| CStr::from_ptr(name).to_owned())
            .collect(),
    };

    with(|driver| {
        driver.device_info = Some(recorded);
        driver.record_allocator("vkCreateDevice", allocator);
        if driver.device_create_result != vk::Result::SUCCESS {
            return driver.device_create_result;
        }

        driver.devices_created += 1;
        *device = vk::Device::from_raw(DEVICE);
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn get_device_proc_addr(
    _: vk::Device,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    device_symbol(CStr::from_ptr(name))
}

unsafe extern "system" fn destroy_device(_: vk::Device, allocator: *const vk::AllocationCallbacks) {
    with(|driver| {
        driver.record_allocator("vkDestroyDevice", allocator);
        driver.devices_destroyed += 1;
    });
}

unsafe extern "system" fn get_device_queue(
    _: vk::Device,
    queue_family_index: u32,
    queue_index: u32,
    queue: *mut vk::Queue,
) {
    *queue = queue_handle(queue_family_index, queue_index);
}

unsafe extern "system" fn create_swapchain(
    _: vk::Device,
    create_info: *const vk::SwapchainCreateInfoKHR,
    allocator: *const vk::AllocationCallbacks,
    swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    let info = &*create_info;
    let recorded = RecordedSwapchain {
        min_image_count: info.min_image_count,
        image_array_layers: info.image_array_layers,
        sharing_mode: info.image_sharing_mode,
        queue_family_indices: slice_or_empty(
            info.p_queue_family_indices,
            info.queue_family_index_count,
        )
        .to_vec(),
        pre_transform: info.pre_transform,
        clipped: info.clipped,
        old_swapchain: info.old_swapchain,
        p_next: info.p_next,
    };

    with(|driver| {
        driver.swapchain_info = Some(recorded);
        driver.record_allocator("vkCreateSwapchainKHR", allocator);
        if driver.swapchain_create_result != vk::Result::SUCCESS {
            return driver.swapchain_create_result;
        }

        driver.swapchains_created += 1;
        *swapchain = vk::SwapchainKHR::from_raw(0x3000 + driver.swapchains_created as u64);
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn destroy_swapchain(
    _: vk::Device,
    _: vk::SwapchainKHR,
    allocator: *const vk::AllocationCallbacks,
) {
    with(|driver| {
        driver.record_allocator("vkDestroySwapchainKHR", allocator);
        driver.swapchains_destroyed += 1;
    });
}

unsafe extern "system" fn get_swapchain_images(
    _: vk::Device,
    _: vk::SwapchainKHR,
    count: *mut u32,
    images: *mut vk::Image,
) -> vk::Result {
    with(|driver| {
        if images.is_null() {
            if driver.image_count_result != vk::Result::SUCCESS {
                return driver.image_count_result;
            }
            *count = driver.image_count;
            return vk::Result::SUCCESS;
        }

        driver.image_fill_calls += 1;
        if driver.incomplete_image_fills > 0 {
            driver.incomplete_image_fills -= 1;
            *count = 0;
            return vk::Result::INCOMPLETE;
        }

        write_out(&image_handles(driver.image_count), count, images)
    })
}

unsafe extern "system" fn create_image_view(
    _: vk::Device,
    create_info: *const vk::ImageViewCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    view: *mut vk::ImageView,
) -> vk::Result {
    with(|driver| {
        driver.record_allocator("vkCreateImageView", allocator);
        let attempt = driver.view_attempts;
        driver.view_attempts += 1;
        if driver.fail_view_at == Some(attempt) {
            return vk::Result::ERROR_OUT_OF_DEVICE_MEMORY;
        }

        let handle = vk::ImageView::from_raw(0x2000 + attempt as u64 + 1);
        driver.view_info = Some(*create_info);
        driver.views_created += 1;
        driver.live_views.push(handle);
        *view = handle;
        vk::Result::SUCCESS
    })
}

unsafe extern "system" fn destroy_image_view(
    _: vk::Device,
    view: vk::ImageView,
    allocator: *const vk::AllocationCallbacks,
) {
    with(|driver| {
        driver.record_allocator("vkDestroyImageView", allocator);
        driver.views_destroyed += 1;
        driver.live_views.retain(|&live| live != view);
    });
}
