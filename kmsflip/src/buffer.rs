//! Dumb buffer lifecycle
//!
//! A [`PixelBuffer`] is built in three driver steps and torn down in the
//! reverse three:
//!
//! ```text
//! allocate ─► bind framebuffer ─► map + zero        (allocate_buffer)
//! free     ◄─ unbind          ◄─ unmap              (destroy_buffer)
//! ```
//!
//! A failure at any build step undoes exactly the steps that completed before
//! the error is returned. Each completed step is recorded in the buffer itself
//! (`framebuffer` and `mapping` are `Some` once done), which is what lets
//! [`destroy_buffer`] handle a half-built buffer.

use tracing::{debug, warn};

use crate::driver::{
    AllocationHandle, FramebufferId, KmsDriver, BITS_PER_PIXEL, COLOR_DEPTH,
};
use crate::error::KmsError;
use crate::tracy_span;

/// Driver-allocated pixel memory usable as a scan-out surface.
///
/// Must be released with [`destroy_buffer`]; dropping it leaks the driver
/// resources and logs a warning.
#[derive(Debug)]
pub struct PixelBuffer<M> {
    width: u32,
    height: u32,
    stride: u32,
    size: u64,
    handle: AllocationHandle,
    framebuffer: Option<FramebufferId>,
    mapping: Option<M>,
    released: bool,
}

impl<M> PixelBuffer<M>
where
    M: std::ops::DerefMut<Target = [u8]>,
{
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per scanline; may exceed `width * 4`.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn handle(&self) -> AllocationHandle {
        self.handle
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn pixels(&self) -> &[u8] {
        self.mapping.as_deref().unwrap_or(&[])
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.mapping.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<M> Drop for PixelBuffer<M> {
    fn drop(&mut self) {
        if !self.released {
            warn!(handle = %self.handle, "Dumb buffer dropped without being destroyed");
        }
    }
}

/// Allocate, bind and map a zeroed `width`x`height` XRGB8888 buffer.
pub fn allocate_buffer<D: KmsDriver>(
    driver: &mut D,
    width: u32,
    height: u32,
) -> Result<PixelBuffer<D::Mapping>, KmsError> {
    tracy_span!("allocate_buffer");

    let allocation = driver
        .allocate_pixel_surface(width, height, BITS_PER_PIXEL)
        .map_err(|source| KmsError::AllocationFailed {
            width,
            height,
            source,
        })?;
    let handle = allocation.handle;

    let mut buffer = PixelBuffer {
        width,
        height,
        stride: allocation.stride,
        size: allocation.size,
        handle,
        framebuffer: None,
        mapping: None,
        released: false,
    };

    match driver.bind_framebuffer(
        width,
        height,
        COLOR_DEPTH,
        BITS_PER_PIXEL,
        allocation.stride,
        handle,
    ) {
        Ok(fb) => buffer.framebuffer = Some(fb),
        Err(source) => {
            destroy_buffer(driver, buffer);
            return Err(KmsError::BindFailed {
                handle: handle.0,
                source,
            });
        }
    }

    let mapped = driver
        .map_offset(handle)
        .and_then(|offset| driver.map_memory(offset, allocation.size));
    match mapped {
        Ok(mut mapping) => {
            mapping.fill(0);
            buffer.mapping = Some(mapping);
        }
        Err(source) => {
            destroy_buffer(driver, buffer);
            return Err(KmsError::MapFailed {
                handle: handle.0,
                source,
            });
        }
    }

    debug!(
        %handle,
        fb = ?buffer.framebuffer,
        stride = buffer.stride,
        size = buffer.size,
        "Created {}x{} dumb buffer",
        width,
        height
    );
    Ok(buffer)
}

/// Unmap, unbind and free `buffer`, skipping steps that never happened.
///
/// Failures are logged and do not stop the remaining steps.
pub fn destroy_buffer<D: KmsDriver>(driver: &mut D, mut buffer: PixelBuffer<D::Mapping>) {
    let handle = buffer.handle;

    if let Some(mapping) = buffer.mapping.take() {
        if let Err(err) = driver.unmap_memory(mapping) {
            warn!(%handle, "Cannot unmap dumb buffer: {}", err);
        }
    }

    if let Some(fb) = buffer.framebuffer.take() {
        if let Err(err) = driver.unbind_framebuffer(fb) {
            warn!(%handle, %fb, "Cannot remove framebuffer: {}", err);
        }
    }

    if let Err(err) = driver.free_pixel_surface(handle) {
        warn!(%handle, "Cannot destroy dumb buffer: {}", err);
    }

    buffer.released = true;
}
