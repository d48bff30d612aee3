//! The diagnostic overlay: FPS readout, shortcuts legend, and a toggle.
//! Built on `egui`/`egui-wgpu`/`egui-winit` when a live window is
//! present; a `fontdue`-rasterized fallback renders the same numbers
//! directly into the frame for headless/no-window runs where there is no
//! `egui::Context` event pump to drive.

use crate::modules::Frametimer;
use std::sync::OnceLock;

/// Owns the egui renderer state tied to one window/device pair.
pub struct EguiOverlay {
    pub context: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
}

impl EguiOverlay {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, window: &winit::window::Window) -> Self {
        let context = egui::Context::default();
        let state = egui_winit::State::new(context.clone(), egui::ViewportId::ROOT, window, None, None, None);
        let renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1, false);
        Self { context, state, renderer }
    }

    pub fn on_window_event(&mut self, window: &winit::window::Window, event: &winit::event::WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// Builds the overlay window for this frame: FPS readout and the fixed
    /// shortcuts legend (`O`/`R`/`Tab`/`F1`/`F2`/`F11`).
    pub fn build(&mut self, window: &winit::window::Window, frametimer: &Frametimer, visible: bool) -> egui::FullOutput {
        let raw_input = self.state.take_egui_input(window);
        self.context.run(raw_input, |ctx| {
            if !visible {
                return;
            }
            egui::Window::new("lumenforge").show(ctx, |ui| {
                ui.label(format!("fps: {:.1}", frametimer.fps()));
                ui.separator();
                ui.label("O  reset clock");
                ui.label("R  recompile shader");
                ui.label("Tab  toggle this panel");
                ui.label("F1 / F2  module overlays");
                ui.label("F11  toggle exclusive fullscreen");
            });
        })
    }

    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        window: &winit::window::Window,
        output: egui::FullOutput,
    ) {
        let pixels_per_point = window.scale_factor() as f32;
        let clipped_primitives = self.context.tessellate(output.shapes, pixels_per_point);
        for (id, delta) in &output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        let size = window.inner_size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor { size_in_pixels: [size.width, size.height], pixels_per_point };
        self.renderer.update_buffers(device, queue, encoder, &clipped_primitives, &screen_descriptor);

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui-overlay"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.renderer.render(&mut pass, &clipped_primitives, &screen_descriptor);
        drop(pass);

        for id in &output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}

/// Common installed-font locations checked in order; the first one that
/// parses is used. There is no bundled font: a headless box with none of
/// these installed simply renders no fallback text, which is preferable to
/// vendoring a binary font file into the source tree.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn fallback_font() -> Option<&'static fontdue::Font> {
    static FONT: OnceLock<Option<fontdue::Font>> = OnceLock::new();
    FONT.get_or_init(|| {
        for path in SYSTEM_FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(font) = fontdue::Font::from_bytes(bytes.as_slice(), fontdue::FontSettings::default()) {
                    return Some(font);
                }
            }
        }
        log::debug!("no system font found for the headless fallback HUD; text overlay disabled");
        None
    })
    .as_ref()
}

/// Rasterizes `text` at `px` and blits it into `rgba` (tightly packed,
/// `width*height*4` bytes) at `(x, y)`, used when there is no window/egui
/// context to drive (headless runs still want an FPS readout burned into
/// the exported frame for debugging). A no-op if no system font was found.
pub fn draw_fallback_text(rgba: &mut [u8], width: u32, height: u32, x: i32, y: i32, px: f32, text: &str, color: [u8; 4]) {
    let Some(font) = fallback_font() else { return };
    let mut pen_x = x;
    for ch in text.chars() {
        let (metrics, bitmap) = font.rasterize(ch, px);
        for row in 0..metrics.height {
            for col in 0..metrics.width {
                let coverage = bitmap[row * metrics.width + col];
                if coverage == 0 {
                    continue;
                }
                let px_x = pen_x + col as i32 + metrics.xmin;
                let px_y = y + row as i32 - metrics.ymin;
                if px_x < 0 || px_y < 0 || px_x as u32 >= width || px_y as u32 >= height {
                    continue;
                }
                let idx = (px_y as u32 * width + px_x as u32) as usize * 4;
                let alpha = coverage as f32 / 255.0;
                for c in 0..3 {
                    let existing = rgba[idx + c] as f32;
                    rgba[idx + c] = (existing * (1.0 - alpha) + color[c] as f32 * alpha) as u8;
                }
                rgba[idx + 3] = 255;
            }
        }
        pen_x += metrics.advance_width.round() as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_text_writes_pixels_when_a_system_font_is_available() {
        let (w, h) = (64u32, 16u32);
        let mut buf = vec![0u8; (w * h * 4) as usize];
        draw_fallback_text(&mut buf, w, h, 2, 12, 12.0, "42", [255, 255, 255, 255]);
        if fallback_font().is_some() {
            assert!(buf.chunks(4).any(|px| px[3] == 255 && (px[0] > 0 || px[1] > 0 || px[2] > 0)));
        }
    }
}
