//! Device creation utils.
use crate::{
    bounded::{BoundedVec, CapacityError, MAX_DEVICE_EXTENSIONS, MAX_UNIQUE_QUEUES},
    dispatch::{allocation_callbacks_ptr, DeviceDispatch, InstanceDispatch},
    features::FeatureChain,
    physical_device::{PhysicalDevice, QueueFamilyIndices, QueueRole},
};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use cstr::cstr;
use std::{
    ffi::{CStr, CString},
    hash::{Hash, Hasher},
    os::raw::{c_char, c_float, c_void},
    ptr,
};
use thiserror::Error;

/// Errors that can occur during device creation.
#[derive(Debug, Error)]
pub enum DeviceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// A fixed-size buffer used to build the create info overflowed.
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityError),
    /// The device did not resolve an entry point the bootstrap calls.
    #[error("device entry point {0:?} could not be loaded")]
    MissingEntryPoint(&'static CStr),
}

static QUEUE_PRIORITIES: [c_float; 1] = [1.0];

/// Setup for [`vk::Queue`] creation: a single queue at priority 1.0.
/// The [`Hash`] and [`PartialEq`] implementations on this struct **only**
/// compare `queue_family_index`.
#[derive(Debug, Copy, Clone)]
pub struct QueueSetup {
    /// Flags used to specify usage behavior of the queue.
    pub flags: vk::DeviceQueueCreateFlags,
    /// Index of the queue family in the queue family array.
    pub queue_family_index: u32,
}

impl QueueSetup {
    /// Create a new queue setup with empty flags.
    #[inline]
    pub fn simple(queue_family_index: u32) -> QueueSetup {
        QueueSetup {
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index,
        }
    }

    /// Number of queues created from this setup.
    #[inline]
    pub fn queue_count(&self) -> u32 {
        QUEUE_PRIORITIES.len() as u32
    }

    #[inline]
    fn as_vulkan(&self) -> vk::DeviceQueueCreateInfo {
        vk::DeviceQueueCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(self.queue_family_index)
            .queue_priorities(&QUEUE_PRIORITIES)
            .build()
    }
}

impl PartialEq for QueueSetup {
    fn eq(&self, rhs: &Self) -> bool {
        self.queue_family_index == rhs.queue_family_index
    }
}

impl Eq for QueueSetup {}

impl Hash for QueueSetup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.queue_family_index.hash(state);
    }
}

/// The distinct queue families a device is created with.
#[derive(Debug, Clone, Default)]
pub struct QueueRequests {
    setups: BoundedVec<QueueSetup, MAX_UNIQUE_QUEUES>,
}

impl QueueRequests {
    /// One request per distinct family among the roles of `indices`, in
    /// order of first appearance.
    pub fn from_indices(indices: &QueueFamilyIndices) -> Result<QueueRequests, CapacityError> {
        let mut requests = QueueRequests::default();
        for queue_family_index in indices.roles().into_iter().flatten() {
            requests.insert(queue_family_index)?;
        }

        Ok(requests)
    }

    /// Request `queue_family_index`. Returns `false` if it already was.
    pub fn insert(&mut self, queue_family_index: u32) -> Result<bool, CapacityError> {
        let setup = QueueSetup::simple(queue_family_index);
        if self.setups.contains(&setup) {
            return Ok(false);
        }

        self.setups.try_push(setup)?;
        Ok(true)
    }

    /// The requested setups.
    #[inline]
    pub fn setups(&self) -> &[QueueSetup] {
        &self.setups
    }

    /// The requests as Vulkan create infos. They point at static priorities
    /// and can outlive `self`.
    pub fn create_infos(&self) -> BoundedVec<vk::DeviceQueueCreateInfo, MAX_UNIQUE_QUEUES> {
        self.setups.map(QueueSetup::as_vulkan)
    }
}

/// Metadata for after device creation.
#[derive(Debug, Clone)]
pub struct DeviceMetadata {
    device_handle: vk::Device,
    physical_device: vk::PhysicalDevice,
    api_version: u32,
    queue_setups: BoundedVec<QueueSetup, MAX_UNIQUE_QUEUES>,
    queue_families: QueueFamilyIndices,
    enabled_extensions: BoundedVec<CString, MAX_DEVICE_EXTENSIONS>,
}

impl DeviceMetadata {
    /// The device this metadata belongs to.
    #[inline]
    pub fn device_handle(&self) -> vk::Device {
        self.device_handle
    }

    /// The physical device this device belongs to.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// API version reported by the physical device.
    #[inline]
    pub fn api_version_raw(&self) -> u32 {
        self.api_version
    }

    /// API major version reported by the physical device.
    #[inline]
    pub fn api_version_major(&self) -> u32 {
        vk::api_version_major(self.api_version)
    }

    /// API minor version reported by the physical device.
    #[inline]
    pub fn api_version_minor(&self) -> u32 {
        vk::api_version_minor(self.api_version)
    }

    /// The queue setups which are in use.
    #[inline]
    pub fn queue_setups(&self) -> &[QueueSetup] {
        &self.queue_setups
    }

    /// Queue family indices for each role.
    #[inline]
    pub fn queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the first queue of the family serving `role`, together with
    /// the family index. `None` if no family was selected for `role`.
    pub unsafe fn device_queue(
        &self,
        device: &DeviceDispatch,
        role: QueueRole,
    ) -> Option<(vk::Queue, u32)> {
        assert_eq!(device.handle(), self.device_handle);

        let idx = self.queue_families.get(role)?;
        let handle = device.get_device_queue(idx, 0);
        (handle != vk::Queue::null()).then_some((handle, idx))
    }

    /// List of all enabled extensions in the device.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Returns true if `extension` is enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.enabled_extensions
            .iter()
            .any(|i| i.as_c_str() == extension)
    }
}

/// Builder for a [`DeviceDispatch`].
pub struct DeviceLoaderBuilder<'a> {
    create_device_fn: Option<
        &'a mut dyn FnMut(
            vk::PhysicalDevice,
            &vk::DeviceCreateInfo,
            Option<&vk::AllocationCallbacks>,
        ) -> VkResult<vk::Device>,
    >,
    symbol_fn: Option<&'a mut dyn FnMut(vk::Device, &CStr) -> vk::PFN_vkVoidFunction>,
    allocation_callbacks: Option<&'a vk::AllocationCallbacks>,
}

impl<'a> DeviceLoaderBuilder<'a> {
    /// Create a new device loader builder.
    pub fn new() -> Self {
        DeviceLoaderBuilder {
            create_device_fn: None,
            symbol_fn: None,
            allocation_callbacks: None,
        }
    }

    /// Specify a custom device creation function, to use in place of the
    /// default.
    ///
    /// This may be useful when creating the device using e.g. OpenXR.
    pub fn create_device_fn(
        mut self,
        create_device: &'a mut dyn FnMut(
            vk::PhysicalDevice,
            &vk::DeviceCreateInfo,
            Option<&vk::AllocationCallbacks>,
        ) -> VkResult<vk::Device>,
    ) -> Self {
        self.create_device_fn = Some(create_device);
        self
    }

    /// Specify a custom symbol function, called to get device function
    /// pointers, to use in place of the instance's `vkGetDeviceProcAddr`.
    pub fn symbol_fn(
        mut self,
        symbol: &'a mut dyn FnMut(vk::Device, &CStr) -> vk::PFN_vkVoidFunction,
    ) -> Self {
        self.symbol_fn = Some(symbol);
        self
    }

    /// Specify custom allocation callback functions.
    pub fn allocation_callbacks(mut self, allocator: &'a vk::AllocationCallbacks) -> Self {
        self.allocation_callbacks = Some(allocator);
        self
    }

    /// Load the entry points of a device that was created elsewhere.
    /// `swapchain_enabled` must match whether
    /// `VK_KHR_swapchain` was enabled on `device`.
    pub unsafe fn build_with_existing_device(
        &mut self,
        instance: &InstanceDispatch,
        device: vk::Device,
        swapchain_enabled: bool,
    ) -> Result<DeviceDispatch, DeviceCreationError> {
        match self.rebind(instance, device, swapchain_enabled) {
            (dispatch, None) => Ok(dispatch),
            (_, Some(name)) => Err(DeviceCreationError::MissingEntryPoint(name)),
        }
    }

    unsafe fn rebind(
        &mut self,
        instance: &InstanceDispatch,
        device: vk::Device,
        swapchain_enabled: bool,
    ) -> (DeviceDispatch, Option<&'static CStr>) {
        match &mut self.symbol_fn {
            Some(symbol) => DeviceDispatch::load(device, swapchain_enabled, |name| {
                symbol(device, name)
            }),
            None => DeviceDispatch::load(device, swapchain_enabled, |name| {
                instance.device_proc_addr(device, name)
            }),
        }
    }

    /// Create the device. If you want to entirely create the device
    /// yourself, use [`DeviceLoaderBuilder::build_with_existing_device`].
    pub unsafe fn build(
        &mut self,
        instance: &InstanceDispatch,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo,
    ) -> VkResult<vk::Device> {
        match &mut self.create_device_fn {
            Some(create_device) => {
                create_device(physical_device, create_info, self.allocation_callbacks)
            }
            None => {
                let mut device = vk::Device::null();
                (instance.fp_v1_0.create_device)(
                    physical_device,
                    create_info,
                    allocation_callbacks_ptr(self.allocation_callbacks),
                    &mut device,
                )
                .result_with_success(device)
            }
        }
    }
}

/// Allows to easily create a logical device and its [`DeviceDispatch`] for an
/// already selected [`PhysicalDevice`].
pub struct DeviceBuilder<'a> {
    loader_builder: DeviceLoaderBuilder<'a>,
    physical_device: &'a PhysicalDevice,
    extension_chain: *mut c_void,
}

impl<'a> DeviceBuilder<'a> {
    /// Create a new device builder.
    #[inline]
    pub fn new(physical_device: &'a PhysicalDevice) -> Self {
        DeviceBuilder::with_loader_builder(physical_device, DeviceLoaderBuilder::new())
    }

    /// Create a new device builder with a custom [`DeviceLoaderBuilder`].
    pub fn with_loader_builder(
        physical_device: &'a PhysicalDevice,
        loader_builder: DeviceLoaderBuilder<'a>,
    ) -> Self {
        DeviceBuilder {
            loader_builder,
            physical_device,
            extension_chain: ptr::null_mut(),
        }
    }

    /// Structures to append to the feature chain, e.g. extension feature
    /// structures. The chain is passed through unchanged and must stay
    /// valid until [`build`](Self::build) returns.
    #[inline]
    pub fn extension_chain(mut self, chain: *mut c_void) -> Self {
        self.extension_chain = chain;
        self
    }

    /// Allocation callback to use for internal Vulkan calls in the builder.
    #[inline]
    pub fn allocation_callbacks(mut self, allocator: &'a vk::AllocationCallbacks) -> Self {
        self.loader_builder = self.loader_builder.allocation_callbacks(allocator);
        self
    }

    /// Create the device and load its entry points.
    ///
    /// Returns the [`DeviceDispatch`] that every later device-level call
    /// goes through, and [`DeviceMetadata`] describing the used queue setups
    /// and enabled extensions.
    pub unsafe fn build(
        mut self,
        instance: &InstanceDispatch,
    ) -> Result<(DeviceDispatch, DeviceMetadata), DeviceCreationError> {
        let physical_device = self.physical_device;
        assert_ne!(physical_device.handle, vk::PhysicalDevice::null());

        let queue_requests = QueueRequests::from_indices(&physical_device.queue_families)?;
        let queue_create_infos = queue_requests.create_infos();
        tracing::debug!(queue_setups = ?queue_requests.setups(), "requesting device queues");

        let mut extension_names: BoundedVec<*const c_char, MAX_DEVICE_EXTENSIONS> =
            BoundedVec::new();
        for extension in physical_device.extensions.iter() {
            extension_names.try_push(extension.as_ptr())?;
        }

        let api_version = physical_device.api_version();
        let mut feature_chain = FeatureChain::new(&physical_device.features);
        let mut device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .build();

        if api_version >= vk::API_VERSION_1_1 {
            let features2 = feature_chain.link(api_version, self.extension_chain);
            device_info.p_next = features2 as *mut vk::PhysicalDeviceFeatures2 as *const c_void;
        } else {
            device_info.p_next = self.extension_chain;
            device_info.p_enabled_features = feature_chain.base();
        }

        let device_handle =
            self.loader_builder
                .build(instance, physical_device.handle, &device_info)?;

        let swapchain_enabled = physical_device.is_extension_enabled(khr::Swapchain::name());
        let (device, missing) = self
            .loader_builder
            .rebind(instance, device_handle, swapchain_enabled);
        if let Some(name) = missing {
            if name != cstr!("vkDestroyDevice") {
                tracing::warn!(?name, "destroying device with unresolved entry point");
                device.destroy_device(self.loader_builder.allocation_callbacks);
            }

            return Err(DeviceCreationError::MissingEntryPoint(name));
        }

        tracing::debug!(
            device = ?device_handle,
            major = vk::api_version_major(api_version),
            minor = vk::api_version_minor(api_version),
            "created device"
        );
        let device_metadata = DeviceMetadata {
            device_handle,
            physical_device: physical_device.handle,
            api_version,
            queue_setups: queue_requests.setups,
            queue_families: physical_device.queue_families,
            enabled_extensions: physical_device.extensions.clone(),
        };

        Ok((device, device_metadata))
    }
}

impl<'a> Default for DeviceLoaderBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}
