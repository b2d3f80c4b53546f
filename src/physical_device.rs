//! The selected physical device a logical device gets created for.
//!
//! Enumerating and scoring physical devices happens before the bootstrap; this
//! module only describes the outcome of that selection.
use crate::bounded::{BoundedVec, CapacityError, MAX_DEVICE_EXTENSIONS};
use ash::vk;
use std::ffi::{CStr, CString};

/// The purpose a queue family was selected for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Graphics command submission.
    Graphics,
    /// Presentation to the surface.
    Present,
    /// Transfer operations.
    Transfer,
    /// Compute dispatches.
    Compute,
}

/// Queue family indices resolved for each [`QueueRole`]. Several roles may
/// share a family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct QueueFamilyIndices {
    /// Family used for graphics.
    pub graphics: u32,
    /// Family used for presentation.
    pub present: u32,
    /// Family used for transfers, if one was selected.
    pub transfer: Option<u32>,
    /// Family used for compute, if one was selected.
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics and present roles only.
    #[inline]
    pub fn new(graphics: u32, present: u32) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics,
            present,
            transfer: None,
            compute: None,
        }
    }

    /// Family index for `role`.
    #[inline]
    pub fn get(&self, role: QueueRole) -> Option<u32> {
        match role {
            QueueRole::Graphics => Some(self.graphics),
            QueueRole::Present => Some(self.present),
            QueueRole::Transfer => self.transfer,
            QueueRole::Compute => self.compute,
        }
    }

    /// Indices for every role, in graphics, present, transfer, compute order.
    #[inline]
    pub fn roles(&self) -> [Option<u32>; 4] {
        [
            Some(self.graphics),
            Some(self.present),
            self.transfer,
            self.compute,
        ]
    }
}

/// Features to enable on the device, split by the API version that
/// introduced their structure. `p_next` of each member is ignored.
#[derive(Debug, Copy, Clone, Default)]
pub struct FeatureSet {
    /// Vulkan 1.0 features.
    pub base: vk::PhysicalDeviceFeatures,
    /// Vulkan 1.1 features, only used on 1.1+ devices.
    pub vulkan_11: vk::PhysicalDeviceVulkan11Features,
    /// Vulkan 1.2 features, only used on 1.2+ devices.
    pub vulkan_12: vk::PhysicalDeviceVulkan12Features,
    /// Vulkan 1.3 features, only used on 1.3+ devices.
    pub vulkan_13: vk::PhysicalDeviceVulkan13Features,
}

/// A physical device with everything selection resolved about it.
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    /// Handle of the physical device.
    pub handle: vk::PhysicalDevice,
    /// Properties as reported by the driver; `api_version` gates the
    /// feature chain.
    pub properties: vk::PhysicalDeviceProperties,
    /// Features that will be enabled.
    pub features: FeatureSet,
    /// Extensions that will be enabled.
    pub extensions: BoundedVec<CString, MAX_DEVICE_EXTENSIONS>,
    /// Queue family indices for each role.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDevice {
    /// Describe `handle` with no features or extensions enabled.
    pub fn new(
        handle: vk::PhysicalDevice,
        properties: vk::PhysicalDeviceProperties,
        queue_families: QueueFamilyIndices,
    ) -> PhysicalDevice {
        PhysicalDevice {
            handle,
            properties,
            features: FeatureSet::default(),
            extensions: BoundedVec::new(),
            queue_families,
        }
    }

    /// Enable these features.
    #[inline]
    pub fn with_features(mut self, features: FeatureSet) -> PhysicalDevice {
        self.features = features;
        self
    }

    /// Enable `extension`. Enabling an extension twice has no effect.
    pub fn enable_extension(&mut self, extension: &CStr) -> Result<(), CapacityError> {
        if self.is_extension_enabled(extension) {
            return Ok(());
        }

        self.extensions.try_push(extension.to_owned())
    }

    /// Returns true if `extension` will be enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == extension)
    }

    /// The API version the device reports.
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.properties.api_version
    }
}
