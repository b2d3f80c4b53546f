//! Version-gated device feature chains.
use crate::physical_device::FeatureSet;
use ash::vk;
use std::{os::raw::c_void, ptr};

/// A feature structure that can be linked into a `pNext` chain.
pub trait FeatureBlock {
    /// The lowest device API version that accepts this structure.
    fn required_version(&self) -> u32;

    /// Point this structure's `pNext` at `next`.
    fn set_next(&mut self, next: *mut c_void);

    /// This structure as a `pNext` pointer.
    fn as_next(&mut self) -> *mut c_void;
}

macro_rules! feature_block {
    ($($ty:ty => $version:expr,)+) => {$(
        impl FeatureBlock for $ty {
            #[inline]
            fn required_version(&self) -> u32 {
                $version
            }

            #[inline]
            fn set_next(&mut self, next: *mut c_void) {
                self.p_next = next;
            }

            #[inline]
            fn as_next(&mut self) -> *mut c_void {
                self as *mut Self as *mut c_void
            }
        }
    )+};
}

feature_block! {
    vk::PhysicalDeviceFeatures2 => vk::API_VERSION_1_0,
    vk::PhysicalDeviceVulkan11Features => vk::API_VERSION_1_1,
    vk::PhysicalDeviceVulkan12Features => vk::API_VERSION_1_2,
    vk::PhysicalDeviceVulkan13Features => vk::API_VERSION_1_3,
}

/// Link `blocks`, in order, in front of `tail`, leaving out every block the
/// device version `api_version` does not accept. Returns the new head of the
/// chain, which is `tail` if no block qualifies.
pub fn link_blocks(
    blocks: &mut [&mut dyn FeatureBlock],
    api_version: u32,
    tail: *mut c_void,
) -> *mut c_void {
    let mut next = tail;
    for block in blocks.iter_mut().rev() {
        if api_version >= block.required_version() {
            block.set_next(next);
            next = block.as_next();
        }
    }

    next
}

/// Owned copies of the feature structures of a [`FeatureSet`], ready to be
/// linked for one device creation.
#[derive(Debug, Clone)]
pub struct FeatureChain {
    features2: vk::PhysicalDeviceFeatures2,
    vulkan_11: vk::PhysicalDeviceVulkan11Features,
    vulkan_12: vk::PhysicalDeviceVulkan12Features,
    vulkan_13: vk::PhysicalDeviceVulkan13Features,
}

impl FeatureChain {
    /// Copy `features`, dropping whatever their `p_next` pointed at.
    pub fn new(features: &FeatureSet) -> FeatureChain {
        FeatureChain {
            features2: vk::PhysicalDeviceFeatures2 {
                features: features.base,
                ..Default::default()
            },
            vulkan_11: vk::PhysicalDeviceVulkan11Features {
                p_next: ptr::null_mut(),
                ..features.vulkan_11
            },
            vulkan_12: vk::PhysicalDeviceVulkan12Features {
                p_next: ptr::null_mut(),
                ..features.vulkan_12
            },
            vulkan_13: vk::PhysicalDeviceVulkan13Features {
                p_next: ptr::null_mut(),
                ..features.vulkan_13
            },
        }
    }

    /// The Vulkan 1.0 features.
    #[inline]
    pub fn base(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features2.features
    }

    /// Link the chain `features2 -> 1.1 -> 1.2 -> 1.3 -> tail`, leaving out the
    /// structures newer than `api_version`. The returned head stays valid for
    /// as long as `self` is borrowed.
    pub fn link(
        &mut self,
        api_version: u32,
        tail: *mut c_void,
    ) -> &mut vk::PhysicalDeviceFeatures2 {
        link_blocks(
            &mut [
                &mut self.features2,
                &mut self.vulkan_11,
                &mut self.vulkan_12,
                &mut self.vulkan_13,
            ],
            api_version,
            tail,
        );

        tracing::debug!(
            major = vk::api_version_major(api_version),
            minor = vk::api_version_minor(api_version),
            "linked device feature chain"
        );
        &mut self.features2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr<T>(value: &mut T) -> *mut c_void {
        value as *mut T as *mut c_void
    }

    #[test]
    fn version_1_1_ends_at_the_caller_chain() {
        let mut tail = vk::PhysicalDeviceRobustness2FeaturesEXT::default();
        let tail_ptr = addr(&mut tail);
        let mut chain = FeatureChain::new(&FeatureSet::default());
        let head: *mut vk::PhysicalDeviceFeatures2 =
            chain.link(vk::make_api_version(0, 1, 1, 120), tail_ptr);

        assert_eq!(unsafe { (*head).p_next }, addr(&mut chain.vulkan_11));
        assert_eq!(chain.vulkan_11.p_next, tail_ptr);
        assert!(chain.vulkan_12.p_next.is_null());
        assert!(chain.vulkan_13.p_next.is_null());
    }

    #[test]
    fn version_1_3_links_every_block() {
        let mut chain = FeatureChain::new(&FeatureSet::default());
        chain.link(vk::API_VERSION_1_3, ptr::null_mut());

        assert_eq!(chain.features2.p_next, addr(&mut chain.vulkan_11));
        assert_eq!(chain.vulkan_11.p_next, addr(&mut chain.vulkan_12));
        assert_eq!(chain.vulkan_12.p_next, addr(&mut chain.vulkan_13));
        assert!(chain.vulkan_13.p_next.is_null());
    }

    #[test]
    fn version_1_0_links_only_the_tail() {
        let mut tail = vk::PhysicalDeviceRobustness2FeaturesEXT::default();
        let tail_ptr = addr(&mut tail);
        let mut chain = FeatureChain::new(&FeatureSet::default());
        chain.link(vk::API_VERSION_1_0, tail_ptr);

        assert_eq!(chain.features2.p_next, tail_ptr);
    }

    #[test]
    fn link_blocks_returns_the_first_accepted_block() {
        let mut features2 = vk::PhysicalDeviceFeatures2::default();
        let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut tail = vk::PhysicalDeviceRobustness2FeaturesEXT::default();
        let tail_ptr = addr(&mut tail);

        let head = link_blocks(
            &mut [&mut features2, &mut vulkan_12],
            vk::API_VERSION_1_1,
            tail_ptr,
        );
        assert_eq!(head, addr(&mut features2));
        assert_eq!(features2.p_next, tail_ptr);
        assert!(vulkan_12.p_next.is_null());

        let head = link_blocks(&mut [&mut vulkan_12], vk::API_VERSION_1_1, tail_ptr);
        assert_eq!(head, tail_ptr);
    }

    #[test]
    fn copies_requested_features() {
        let mut features = FeatureSet::default();
        features.base.sampler_anisotropy = vk::TRUE;
        features.vulkan_12.timeline_semaphore = vk::TRUE;
        features.vulkan_13.dynamic_rendering = vk::TRUE;

        let chain = FeatureChain::new(&features);
        assert_eq!(chain.base().sampler_anisotropy, vk::TRUE);
        assert_eq!(chain.vulkan_12.timeline_semaphore, vk::TRUE);
        assert_eq!(chain.vulkan_13.dynamic_rendering, vk::TRUE);
        assert_eq!(
            chain.vulkan_13.s_type,
            vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES
        );
    }
}
