//! Fixed-capacity storage for driver query results.
use ash::vk;
use smallvec::SmallVec;
use std::{
    collections::TryReserveError,
    fmt,
    ops::{Deref, DerefMut},
    ptr,
};
use thiserror::Error;

/// Number of distinct [`vk::PresentModeKHR`] values a driver can report:
/// `IMMEDIATE`, `MAILBOX`, `FIFO`, `FIFO_RELAXED`, `SHARED_DEMAND_REFRESH` and
/// `SHARED_CONTINUOUS_REFRESH`.
///
/// This covers the modes known to the Vulkan headers `ash` 0.37 is built
/// from. A driver that also reports a newer mode, such as
/// `VK_PRESENT_MODE_FIFO_LATEST_READY_EXT`, makes the present mode query fail
/// with [`CapacityError`] instead of dropping the extra mode.
pub const PRESENT_MODE_COUNT: usize = 6;

/// Default ceiling on the number of surface formats a query may return.
pub const DEFAULT_MAX_SURFACE_FORMATS: usize = 32;

/// Upper bound on distinct queue families requested by a device: one per
/// [`QueueRole`](crate::QueueRole).
pub const MAX_UNIQUE_QUEUES: usize = 4;

/// Upper bound on the number of enabled device extensions.
pub const MAX_DEVICE_EXTENSIONS: usize = 32;

/// A [`BoundedVec`] would have grown past its capacity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("bounded buffer with capacity {capacity} cannot hold {requested} elements")]
pub struct CapacityError {
    /// Capacity of the buffer.
    pub capacity: usize,
    /// Number of elements that were requested.
    pub requested: usize,
}

/// A vector with a capacity of exactly `N` elements, stored inline.
///
/// Unlike a plain [`SmallVec`] this never spills onto the heap; operations that
/// would exceed `N` return a [`CapacityError`] instead.
#[derive(Clone, PartialEq, Eq)]
pub struct BoundedVec<T, const N: usize> {
    inner: SmallVec<[T; N]>,
}

impl<T, const N: usize> BoundedVec<T, N> {
    /// Maximum number of elements.
    pub const CAPACITY: usize = N;

    /// Create an empty vector.
    #[inline]
    pub fn new() -> Self {
        BoundedVec {
            inner: SmallVec::new(),
        }
    }

    /// Maximum number of elements, same as [`Self::CAPACITY`].
    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Append `value`, failing if the vector is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), CapacityError> {
        if self.inner.len() == N {
            return Err(CapacityError {
                capacity: N,
                requested: N + 1,
            });
        }

        self.inner.push(value);
        Ok(())
    }

    /// Shorten the vector to `len` elements. Has no effect if `len` is
    /// greater than the current length.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Remove all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Apply `f` to every element. The result has the same capacity, so
    /// this cannot fail.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> BoundedVec<U, N> {
        BoundedVec {
            inner: self.inner.iter().map(f).collect(),
        }
    }
}

impl<T: Clone + Default, const N: usize> BoundedVec<T, N> {
    /// Resize to `len` elements, filling new slots with `T::default()`.
    pub fn try_resize(&mut self, len: usize) -> Result<(), CapacityError> {
        if len > N {
            return Err(CapacityError {
                capacity: N,
                requested: len,
            });
        }

        self.inner.resize(len, T::default());
        Ok(())
    }
}

impl<T, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for BoundedVec<T, N> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        &self.inner
    }
}

impl<T, const N: usize> DerefMut for BoundedVec<T, N> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.inner
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for BoundedVec<T, N> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_list().entries(self.iter()).finish()
    }
}

impl<T, const N: usize> TryFrom<&[T]> for BoundedVec<T, N>
where
    T: Clone,
{
    type Error = CapacityError;

    fn try_from(values: &[T]) -> Result<Self, CapacityError> {
        if values.len() > N {
            return Err(CapacityError {
                capacity: N,
                requested: values.len(),
            });
        }

        Ok(BoundedVec {
            inner: values.iter().cloned().collect(),
        })
    }
}

/// Failure of a count-then-fill enumeration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum EnumerateError {
    /// The initial count query did not report success.
    Count(vk::Result),
    /// A fill call, or a count call after `VK_INCOMPLETE`, failed.
    Fill(vk::Result),
    /// The driver reported more elements than the buffer can hold.
    Capacity(CapacityError),
    /// Growing an owned buffer failed.
    OutOfHostMemory,
}

impl From<CapacityError> for EnumerateError {
    fn from(err: CapacityError) -> Self {
        EnumerateError::Capacity(err)
    }
}

impl From<TryReserveError> for EnumerateError {
    fn from(_: TryReserveError) -> Self {
        EnumerateError::OutOfHostMemory
    }
}

/// Returns true for the statuses that mean the driver ran out of memory.
#[inline]
pub(crate) fn is_out_of_memory(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
    )
}

/// Run the two-call enumeration idiom into `buffer`.
///
/// `call` is invoked with a null data pointer to read the element count, and
/// with a pointer to `count` writable elements to fill them in. The fill is
/// repeated as long as the driver answers `VK_INCOMPLETE` (the set changed size
/// between the two calls), re-reading the count each time.
///
/// # Safety
///
/// `call` must write at most `*count` elements through the data pointer.
pub(crate) unsafe fn enumerate_into<T, const N: usize>(
    buffer: &mut BoundedVec<T, N>,
    mut call: impl FnMut(&mut u32, *mut T) -> vk::Result,
) -> Result<(), EnumerateError>
where
    T: Clone + Default,
{
    let mut count = 0;
    match call(&mut count, ptr::null_mut()) {
        vk::Result::SUCCESS => (),
        err => return Err(EnumerateError::Count(err)),
    }

    loop {
        buffer.try_resize(count as usize)?;
        if count == 0 {
            return Ok(());
        }

        let mut filled = count;
        match call(&mut filled, buffer.as_mut_ptr()) {
            vk::Result::SUCCESS => {
                buffer.truncate(filled as usize);
                return Ok(());
            }
            vk::Result::INCOMPLETE => {
                tracing::trace!(count, "enumeration incomplete, querying again");
                count = 0;
                call(&mut count, ptr::null_mut())
                    .result()
                    .map_err(EnumerateError::Fill)?;
            }
            err => return Err(EnumerateError::Fill(err)),
        }
    }
}

/// Same as [`enumerate_into`], but into an owned, heap allocated vector.
/// Allocation failure is reported instead of aborting.
///
/// # Safety
///
/// `call` must write at most `*count` elements through the data pointer.
pub(crate) unsafe fn enumerate_into_vec<T>(
    buffer: &mut Vec<T>,
    mut call: impl FnMut(&mut u32, *mut T) -> vk::Result,
) -> Result<(), EnumerateError>
where
    T: Clone + Default,
{
    let mut count = 0;
    match call(&mut count, ptr::null_mut()) {
        vk::Result::SUCCESS => (),
        err => return Err(EnumerateError::Count(err)),
    }

    loop {
        let len = count as usize;
        if len > buffer.len() {
            buffer.try_reserve_exact(len - buffer.len())?;
        }
        buffer.resize(len, T::default());
        if count == 0 {
            return Ok(());
        }

        let mut filled = count;
        match call(&mut filled, buffer.as_mut_ptr()) {
            vk::Result::SUCCESS => {
                buffer.truncate(filled as usize);
                return Ok(());
            }
            vk::Result::INCOMPLETE => {
                tracing::trace!(count, "enumeration incomplete, querying again");
                count = 0;
                call(&mut count, ptr::null_mut())
                    .result()
                    .map_err(EnumerateError::Fill)?;
            }
            err => return Err(EnumerateError::Fill(err)),
        }
    }
}
