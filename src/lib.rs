#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
Logical device and swapchain bootstrapping for [`ash`], inspired by [`vk-bootstrap`].

Picks up where instance creation and physical device selection end:

- ✅ Device creation with a version-gated feature chain
- ✅ Loading device-level entry points into an explicit dispatch table
- ✅ Getting queues
- ✅ Swapchain creation/recreation
- ✅ Swapchain images and image views, without heap allocation if desired

No dispatch table is global. An [`InstanceDispatch`] is built from the
instance once, and device creation returns the [`DeviceDispatch`] that every
later device-level call takes as an argument.

## Example

```rust,ignore
let instance = InstanceDispatch::new(&entry, &ash_instance);

let mut physical_device = PhysicalDevice::new(
    physical_device_handle,
    properties,
    QueueFamilyIndices::new(graphics_family, present_family),
);
physical_device.enable_extension(ash::extensions::khr::Swapchain::name())?;

let (device, device_metadata) =
    unsafe { DeviceBuilder::new(&physical_device).build(&instance) }?;
let (graphics, _) =
    unsafe { device_metadata.device_queue(&device, QueueRole::Graphics) }.unwrap();

let options = SwapchainOptions::new(graphics_family, present_family, window_extent);
let swapchain = unsafe {
    Swapchain::new(&instance, &device, physical_device.handle, surface, &options, None)
}?;

let mut images = vec![vk::Image::null(); swapchain.image_count() as usize];
unsafe { swapchain.get_images(&device, &mut images) }?;
let views = unsafe { swapchain.get_image_views_alloc(&device, &images, None) }?;
```

## Licensing

This project is licensed under the [zlib License].

`vk-bootstrap`, the inspiration of this project, is licensed under the [MIT license].

[zlib License]: https://gitlab.com/Friz64/erupt-bootstrap/-/blob/main/LICENSE
[MIT license]: https://gitlab.com/Friz64/erupt-bootstrap/-/blob/main/LICENSE-vk-bootstrap
[`vk-bootstrap`]: https://github.com/charles-lunarg/vk-bootstrap
*/

pub mod bounded;
pub mod device;
pub mod dispatch;
pub mod features;
pub mod physical_device;
pub mod selection;
pub mod surface;
pub mod swapchain;

#[cfg(test)]
mod mock;

pub use bounded::*;
pub use device::*;
pub use dispatch::*;
pub use features::*;
pub use physical_device::*;
pub use selection::*;
pub use surface::*;
pub use swapchain::*;
