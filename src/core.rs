//! The GPU context every module renders through: device, queue, and either
//! a live window surface (realtime) or an off-screen render target
//! (headless/export). Owns nothing GL/wgpu may touch off the scene thread.

use anyhow::{Context, Result};
use std::sync::Arc;

/// Selects how the engine obtains pixels: a live OS window, or headless
/// rendering into an off-screen texture (export/benchmark mode). Overridden
/// by the `WINDOW_BACKEND` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBackend {
    Headless,
    Winit,
}

impl WindowBackend {
    pub fn from_env(headless_requested: bool) -> Self {
        match std::env::var("WINDOW_BACKEND").ok().as_deref() {
            Some("headless") => WindowBackend::Headless,
            Some("glfw") | Some("winit") => WindowBackend::Winit,
            _ => {
                if headless_requested {
                    WindowBackend::Headless
                } else {
                    WindowBackend::Winit
                }
            }
        }
    }
}

/// Shared GPU state. A live `winit::window::Window` is only present when
/// [`WindowBackend::Winit`] was selected; headless mode renders exclusively
/// into matrix-owned textures and never creates a surface.
pub struct Core {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: Option<wgpu::Surface<'static>>,
    pub surface_format: wgpu::TextureFormat,
    pub size: (u32, u32),
    pub window: Option<Arc<winit::window::Window>>,
    pub backend: WindowBackend,
}

impl Core {
    pub async fn new_windowed(window: Arc<winit::window::Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface from window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable wgpu adapter found")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumenforge-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to request wgpu device")?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);

        let mut core = Self {
            instance,
            adapter,
            device,
            queue,
            surface: Some(surface),
            surface_format,
            size: (size.width.max(1), size.height.max(1)),
            window: Some(window),
            backend: WindowBackend::Winit,
        };
        core.configure_surface();
        Ok(core)
    }

    pub async fn new_headless(width: u32, height: u32) -> Result<Self> {
        let backends = if std::env::var("EGL").ok().as_deref() == Some("1") {
            wgpu::Backends::GL
        } else {
            wgpu::Backends::all()
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor { backends, ..Default::default() });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable wgpu adapter found for headless rendering")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumenforge-headless-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to request headless wgpu device")?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface: None,
            surface_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            size: (width.max(1), height.max(1)),
            window: None,
            backend: WindowBackend::Headless,
        })
    }

    fn configure_surface(&mut self) {
        let Some(surface) = &self.surface else { return };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: self.surface_format,
            width: self.size.0,
            height: self.size.1,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&self.device, &config);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
        self.configure_surface();
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_defaults_to_headless_when_requested() {
        std::env::remove_var("WINDOW_BACKEND");
        assert_eq!(WindowBackend::from_env(true), WindowBackend::Headless);
        assert_eq!(WindowBackend::from_env(false), WindowBackend::Winit);
    }

    #[test]
    fn env_override_wins_over_request() {
        std::env::set_var("WINDOW_BACKEND", "headless");
        assert_eq!(WindowBackend::from_env(false), WindowBackend::Headless);
        std::env::remove_var("WINDOW_BACKEND");
    }
}
