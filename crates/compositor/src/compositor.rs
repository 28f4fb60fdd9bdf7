//! Software compositor — renders decoded frames plus edit layers into a
//! single owned target.

use tracing::{debug, trace};

use rf_common::{
    DecodedFrame, FrameCompositor, ImageBuffer, RenderConfig, RenderError, Resolution,
};

use crate::geometry::{content_rect, sample_window, PixelRect};

/// Wallpaper used when the edit layers don't specify one.
const DEFAULT_WALLPAPER: [u8; 4] = [16, 16, 20, 255];

struct State {
    config: RenderConfig,
    target: ImageBuffer,
    content: PixelRect,
    frames_rendered: u64,
}

/// CPU implementation of the `FrameCompositor` contract.
///
/// Owns exactly one output-resolution target; every `render` overwrites
/// it. No state is carried between frames beyond the target allocation.
#[derive(Default)]
pub struct SoftwareCompositor {
    state: Option<State>,
}

impl SoftwareCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<&State, RenderError> {
        self.state
            .as_ref()
            .ok_or_else(|| RenderError::Init("compositor not initialized".to_string()))
    }
}

impl FrameCompositor for SoftwareCompositor {
    fn init(&mut self, config: &RenderConfig) -> Result<(), RenderError> {
        if !config.output.is_encoder_aligned() {
            return Err(RenderError::Init(format!(
                "output resolution {} is not encoder-aligned",
                config.output
            )));
        }
        if config.source.width == 0 || config.source.height == 0 {
            return Err(RenderError::Init(format!(
                "source resolution {} is empty",
                config.source
            )));
        }

        let content = content_rect(config.layers.crop, config.source, config.output);
        debug!(
            output = %config.output,
            source = %config.source,
            ?content,
            "Compositor initialized"
        );
        self.state = Some(State {
            target: ImageBuffer::new(config.output),
            content,
            config: config.clone(),
            frames_rendered: 0,
        });
        Ok(())
    }

    fn render(&mut self, frame: &DecodedFrame, src_ts_us: u64) -> Result<(), RenderError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| RenderError::Init("compositor not initialized".to_string()))?;

        let src_res = frame.image().resolution();
        if src_res != state.config.source {
            return Err(RenderError::RenderFailed {
                src_ts_us,
                reason: format!(
                    "frame is {src_res}, compositor configured for {}",
                    state.config.source
                ),
            });
        }

        let layers = &state.config.layers;
        let out = state.config.output;
        let content = state.content;

        // Background.
        let wallpaper = layers.wallpaper.map(|w| w.rgba).unwrap_or(DEFAULT_WALLPAPER);
        state.target.fill(wallpaper);

        // Drop shadow behind the content rectangle.
        if let Some(shadow) = layers.shadow {
            let off = shadow.spread_px as i64;
            fill_rect_blend(
                &mut state.target,
                out,
                PixelRect {
                    x: content.x + off,
                    y: content.y + off,
                    w: content.w,
                    h: content.h,
                },
                shadow.rgba,
            );
        }

        // Sample the (cropped, zoomed) source window into the content rect.
        let win = sample_window(state.config.source, layers.crop, &layers.zooms, src_ts_us);
        let x0 = content.x.max(0);
        let y0 = content.y.max(0);
        let x1 = (content.x + content.w).min(out.width as i64);
        let y1 = (content.y + content.h).min(out.height as i64);
        for oy in y0..y1 {
            let v = (oy - content.y) as f32 / content.h as f32;
            let sy = (win.y + v * win.h) as u32;
            let sy = sy.min(src_res.height - 1);
            for ox in x0..x1 {
                let u = (ox - content.x) as f32 / content.w as f32;
                let sx = (win.x + u * win.w) as u32;
                let sx = sx.min(src_res.width - 1);
                state
                    .target
                    .put_pixel(ox as u32, oy as u32, frame.image().get_pixel(sx, sy));
            }
        }

        // Annotations active at this source time, in declaration order.
        for ann in layers.annotations.iter().filter(|a| a.contains(src_ts_us)) {
            let rect = PixelRect {
                x: (ann.rect[0] * out.width as f32) as i64,
                y: (ann.rect[1] * out.height as f32) as i64,
                w: (ann.rect[2] * out.width as f32) as i64,
                h: (ann.rect[3] * out.height as f32) as i64,
            };
            fill_rect_blend(&mut state.target, out, rect, ann.rgba);
        }

        state.frames_rendered += 1;
        trace!(src_ts_us, frame = state.frames_rendered, "Frame composited");
        Ok(())
    }

    fn target(&self) -> Result<&ImageBuffer, RenderError> {
        Ok(&self.state()?.target)
    }

    fn destroy(&mut self) {
        if let Some(state) = self.state.take() {
            debug!(frames = state.frames_rendered, "Compositor destroyed");
        }
    }
}

/// Blend a solid rectangle onto the target, clipped to the output bounds.
fn fill_rect_blend(target: &mut ImageBuffer, out: Resolution, rect: PixelRect, rgba: [u8; 4]) {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.w).min(out.width as i64);
    let y1 = (rect.y + rect.h).min(out.height as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            target.blend_pixel(x as u32, y as u32, rgba);
        }
    }
}
