//! Per-frame command batch construction

use super::PumpSettings;
use crate::pixel::RenderTarget;
use crate::protocol::{Command, DeviceCaps, SettingUpdate};

type RenderFn = Box<dyn FnMut(&mut RenderTarget) + Send>;
type FrameReadyFn = Box<dyn FnMut(&RenderTarget) + Send>;
type CommandsFn = Box<dyn FnMut(&mut Vec<u8>) + Send>;
type ReadyToSendFn = Box<dyn FnMut(&[u8]) + Send>;

/// Callbacks run on the pump thread, once per frame
///
/// All are optional. `render` and `frame_ready` only run in frame buffer
/// mode once the badge geometry is known; `generate_commands` only runs
/// when the frame buffer is off.
#[derive(Default)]
pub struct FrameHooks {
    render: Option<RenderFn>,
    frame_ready: Option<FrameReadyFn>,
    generate_commands: Option<CommandsFn>,
    ready_to_send: Option<ReadyToSendFn>,
}

impl FrameHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next frame into the gray buffer
    pub fn on_render(mut self, f: impl FnMut(&mut RenderTarget) + Send + 'static) -> Self {
        self.render = Some(Box::new(f));
        self
    }

    /// Inspect the frame after dithering and packing
    pub fn on_frame_ready(mut self, f: impl FnMut(&RenderTarget) + Send + 'static) -> Self {
        self.frame_ready = Some(Box::new(f));
        self
    }

    /// Append raw commands when not using the frame buffer
    pub fn on_generate_commands(mut self, f: impl FnMut(&mut Vec<u8>) + Send + 'static) -> Self {
        self.generate_commands = Some(Box::new(f));
        self
    }

    /// See the finished batch just before it is sent
    pub fn on_ready_to_send(mut self, f: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.ready_to_send = Some(Box::new(f));
        self
    }
}

/// State carried from one frame to the next
#[derive(Default)]
pub(super) struct FrameBuilder {
    target: Option<RenderTarget>,
    sent_brightness: Option<u8>,
    /// Last geometry too large for one WriteRect, already warned about
    oversized: Option<DeviceCaps>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the brightness into the next batch
    pub fn forget_brightness(&mut self) {
        self.sent_brightness = None;
    }

    /// Build one frame's batch
    pub fn build(
        &mut self,
        settings: &PumpSettings,
        caps: Option<&DeviceCaps>,
        hooks: &mut FrameHooks,
    ) -> Vec<u8> {
        let mut batch = Vec::new();

        if self.sent_brightness != Some(settings.brightness) {
            self.sent_brightness = Some(settings.brightness);
            Command::UpdateSetting(SettingUpdate::Brightness(settings.brightness)).encode(&mut batch);
        }

        if settings.use_frame_buffer {
            self.render_frame(settings, caps, hooks, &mut batch);
        } else if let Some(generate) = hooks.generate_commands.as_mut() {
            generate(&mut batch);
        }

        if let Some(ready) = hooks.ready_to_send.as_mut() {
            ready(&batch);
        }
        batch
    }

    fn render_frame(
        &mut self,
        settings: &PumpSettings,
        caps: Option<&DeviceCaps>,
        hooks: &mut FrameHooks,
        batch: &mut Vec<u8>,
    ) {
        if let Some(caps) = caps {
            if !caps.fits_write_rect() {
                if self.oversized != Some(*caps) {
                    log::warn!(
                        "Badge geometry {}x{} exceeds one WriteRect, frames skipped",
                        caps.width,
                        caps.height
                    );
                    self.oversized = Some(*caps);
                }
                self.target = None;
                return;
            }
            if !self.target.as_ref().is_some_and(|t| t.same_dimensions(caps)) {
                log::debug!(
                    "Render target {}x{} {:?}",
                    caps.width,
                    caps.height,
                    caps.pixel_format()
                );
                self.target = Some(RenderTarget::for_caps(caps));
            }
        }
        // Without caps there is no geometry yet; keep the last target if any
        let Some(target) = self.target.as_mut() else {
            return;
        };

        if let Some(render) = hooks.render.as_mut() {
            render(target);
        }
        if settings.dither {
            target.dither();
        }
        target.pack(settings.rotate);
        if let Some(ready) = hooks.frame_ready.as_mut() {
            ready(target);
        }

        Command::write_frame(
            target.format(),
            target.width_in_blocks() as u8,
            target.height() as u8,
            target.packed().to_vec(),
        )
        .encode(batch);
        Command::Swap {
            bookmark: false,
            hold_frames: 0,
        }
        .encode(batch);
    }

    #[cfg(test)]
    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }
}
