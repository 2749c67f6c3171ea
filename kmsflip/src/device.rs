//! One configured output: connector, CRTC, mode and two pixel buffers
//!
//! # Design Invariants
//!
//! 1. **Drawing never touches the scan-out buffer**: [`Device::back_buffer`]
//!    always hands out buffer `visible ^ 1`. The canvas borrows the device
//!    mutably, so a flip cannot happen while it is alive.
//!
//! 2. **Visible index follows the hardware**: `visible` only changes after
//!    the CRTC accepted the other framebuffer. A failed flip leaves both the
//!    index and the screen as they were.
//!
//! 3. **Lifecycle**: `Configured` → `Presenting` → `TornDown`. A device whose
//!    modeset failed stays `Configured`; it is never drawn to but is still
//!    torn down with the others. `TornDown` is final: the device owns no
//!    buffers and refuses to present or flip.

use tracing::{debug, trace, warn};

use crate::allocator::CrtcAssignment;
use crate::buffer::{destroy_buffer, PixelBuffer};
use crate::driver::{ConnectorId, ControllerState, CrtcId, DisplayMode, EncoderId, KmsDriver};
use crate::error::KmsError;
use crate::raster::Canvas;
use crate::{tracy_frame_mark, tracy_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// CRTC claimed and buffers allocated, nothing on screen yet
    Configured,
    /// CRTC programmed with one of our buffers
    Presenting,
    /// Prior CRTC state restored and buffers released
    TornDown,
}

#[derive(Debug)]
pub struct Device<M> {
    connector: ConnectorId,
    encoder: EncoderId,
    crtc: CrtcId,
    mode: DisplayMode,
    buffers: Vec<PixelBuffer<M>>,
    visible: usize,
    saved: Option<ControllerState>,
    state: DeviceState,
}

impl<M> Device<M>
where
    M: std::ops::DerefMut<Target = [u8]>,
{
    pub fn new(
        connector: ConnectorId,
        assignment: CrtcAssignment,
        mode: DisplayMode,
        buffers: [PixelBuffer<M>; 2],
    ) -> Self {
        Self {
            connector,
            encoder: assignment.encoder,
            crtc: assignment.crtc,
            mode,
            buffers: buffers.into(),
            visible: 0,
            saved: None,
            state: DeviceState::Configured,
        }
    }

    pub fn connector(&self) -> ConnectorId {
        self.connector
    }

    pub fn encoder(&self) -> EncoderId {
        self.encoder
    }

    pub fn crtc(&self) -> CrtcId {
        self.crtc
    }

    pub fn mode(&self) -> &DisplayMode {
        &self.mode
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_presenting(&self) -> bool {
        self.state == DeviceState::Presenting
    }

    /// Index of the buffer currently scanned out.
    pub fn visible_index(&self) -> usize {
        self.visible
    }

    /// Both buffers, or none once torn down.
    pub fn buffers(&self) -> &[PixelBuffer<M>] {
        &self.buffers
    }

    /// CRTC state found before this device took the CRTC over.
    pub fn saved_state(&self) -> Option<&ControllerState> {
        self.saved.as_ref()
    }

    /// Save the CRTC's current state and show the visible buffer.
    ///
    /// On failure the device stays `Configured`.
    pub fn present<D>(&mut self, driver: &mut D) -> Result<(), KmsError>
    where
        D: KmsDriver<Mapping = M>,
    {
        match self.state {
            DeviceState::Presenting => return Ok(()),
            DeviceState::TornDown => return Err(KmsError::NotPresenting(self.connector)),
            DeviceState::Configured => {}
        }

        match driver.get_controller_state(self.crtc) {
            Ok(state) => self.saved = Some(state),
            Err(err) => warn!(
                connector = %self.connector,
                crtc = %self.crtc,
                "Cannot save CRTC state, it will not be restored: {}",
                err
            ),
        }

        driver
            .set_controller_state(
                self.crtc,
                self.buffers[self.visible].framebuffer(),
                (0, 0),
                &[self.connector],
                Some(&self.mode),
            )
            .map_err(|source| KmsError::ModesetFailed {
                connector: self.connector,
                crtc: self.crtc,
                source,
            })?;

        self.state = DeviceState::Presenting;
        debug!(
            connector = %self.connector,
            crtc = %self.crtc,
            "Presenting {}",
            self.mode.name
        );
        Ok(())
    }

    /// Canvas over the buffer that is not on screen.
    pub fn back_buffer(&mut self) -> Result<Canvas<'_>, KmsError> {
        if !self.is_presenting() {
            return Err(KmsError::NotPresenting(self.connector));
        }
        let back = &mut self.buffers[self.visible ^ 1];
        let (width, height, stride) = (back.width(), back.height(), back.stride());
        Ok(Canvas::new(back.pixels_mut(), width, height, stride))
    }

    /// Put the back buffer on screen.
    pub fn flip<D>(&mut self, driver: &mut D) -> Result<(), KmsError>
    where
        D: KmsDriver<Mapping = M>,
    {
        tracy_span!("Device::flip", self.connector);

        if !self.is_presenting() {
            return Err(KmsError::NotPresenting(self.connector));
        }

        let back = self.visible ^ 1;
        driver
            .set_controller_state(
                self.crtc,
                self.buffers[back].framebuffer(),
                (0, 0),
                &[self.connector],
                Some(&self.mode),
            )
            .map_err(|source| KmsError::FlipFailed {
                connector: self.connector,
                crtc: self.crtc,
                source,
            })?;

        self.visible = back;
        trace!(connector = %self.connector, visible = back, "Flipped");
        tracy_frame_mark!("flip");
        Ok(())
    }

    /// Restore the saved CRTC state and release both buffers, leaving the
    /// device `TornDown`.
    ///
    /// Every step is attempted; failures are only logged. Tearing down twice
    /// does nothing.
    pub fn teardown<D>(&mut self, driver: &mut D)
    where
        D: KmsDriver<Mapping = M>,
    {
        if self.state == DeviceState::TornDown {
            return;
        }

        if let Some(saved) = self.saved.take() {
            if let Err(err) = driver.set_controller_state(
                saved.crtc,
                saved.framebuffer,
                saved.position,
                &[self.connector],
                saved.mode.as_ref(),
            ) {
                warn!(
                    connector = %self.connector,
                    crtc = %self.crtc,
                    "Cannot restore CRTC state: {}",
                    err
                );
            }
        }

        for buffer in self.buffers.drain(..) {
            destroy_buffer(driver, buffer);
        }
        self.state = DeviceState::TornDown;
        debug!(connector = %self.connector, "Released device");
    }
}
