//! Offline / locked-framerate export, built around an in-process
//! `gstreamer` `appsrc` pipeline instead of shelling out to an external
//! encoder process — this crate's actual media stack (see `Cargo.toml`'s
//! `media` feature and `build.rs`). Raw frame format, vertical flip,
//! ring-buffered decoupling from the GPU readback, error draining, and
//! final statistics all flow through that pipeline.

use crate::error::EngineError;
use anyhow::{Context, Result};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use std::path::Path;
use std::time::Instant;

/// Container/codec pair. The pipeline string is assembled from these, the
/// way `gst::parse::launch` expects.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub container: String,
    pub bitrate_kbps: u32,
    pub vflip: bool,
    /// `None` means "pipe raw output back to the caller"; `Some(path)`
    /// writes a file via a muxer+filesink.
    pub output_path: Option<std::path::PathBuf>,
}

/// One GPU-mapped readback target. At least two are kept in flight so the
/// GPU never blocks waiting for the encoder to drain the previous frame.
struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: (u32, u32),
    bytes_per_row: u32,
}

impl StagingBuffer {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let bytes_per_row = align_to(width * 4, 256);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("export-staging"),
            size: (bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self { buffer, size: (width, height), bytes_per_row }
    }
}

fn align_to(v: u32, alignment: u32) -> u32 {
    (v + alignment - 1) / alignment * alignment
}

/// A running export, encapsulating the gstreamer pipeline and the ring of
/// staging buffers that decouple GPU readback from the `appsrc` push.
pub struct ExportPipeline {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    app_sink: Option<gst_app::AppSink>,
    bus: gst::Bus,
    ring: Vec<StagingBuffer>,
    next_ring_slot: usize,
    settings: ExportSettings,
    frames_pushed: u64,
    piped: Vec<u8>,
    started_at: Instant,
}

impl ExportPipeline {
    pub fn new(device: &wgpu::Device, settings: ExportSettings) -> Result<Self> {
        gst::init().context("gstreamer init failed")?;

        let sink_desc = match &settings.output_path {
            Some(path) => format!(
                "{muxer} ! filesink location={location}",
                muxer = muxer_for(&settings.container),
                location = escape_location(path),
            ),
            None => "appsink name=out_sink".to_string(),
        };

        let flip = if settings.vflip { "videoflip method=vertical-flip ! " } else { "" };
        let description = format!(
            "appsrc name=in_src format=time is-live=true block=true \
             caps=video/x-raw,format=RGBA,width={w},height={h},framerate={fps}/1 \
             ! videoconvert ! {flip}{encoder} ! {sink}",
            w = settings.width,
            h = settings.height,
            fps = settings.fps,
            encoder = encoder_for(&settings.codec, settings.bitrate_kbps),
            sink = sink_desc,
        );

        let pipeline = gst::parse::launch(&description)
            .context("failed to build export pipeline")?
            .downcast::<gst::Pipeline>()
            .map_err(|_| anyhow::anyhow!("parsed export graph is not a gst::Pipeline"))?;

        let appsrc = pipeline
            .by_name("in_src")
            .context("appsrc element missing from export pipeline")?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| anyhow::anyhow!("in_src is not an AppSrc"))?;

        let app_sink = match &settings.output_path {
            Some(_) => None,
            None => {
                let sink = pipeline
                    .by_name("out_sink")
                    .context("appsink element missing from export pipeline")?
                    .downcast::<gst_app::AppSink>()
                    .map_err(|_| anyhow::anyhow!("out_sink is not an AppSink"))?;
                sink.set_property("sync", false);
                Some(sink)
            }
        };

        let bus = pipeline.bus().context("export pipeline has no bus")?;
        pipeline.set_state(gst::State::Playing).context("failed to start export pipeline")?;

        let ring = (0..3).map(|_| StagingBuffer::new(device, settings.width, settings.height)).collect();

        Ok(Self {
            pipeline,
            appsrc,
            app_sink,
            bus,
            ring,
            next_ring_slot: 0,
            settings,
            frames_pushed: 0,
            piped: Vec::new(),
            started_at: Instant::now(),
        })
    }

    /// Pulls every sample currently buffered in the appsink (non-blocking)
    /// and appends its bytes to `piped`. Called after every pushed frame so
    /// the sink's internal queue never grows unbounded over a long export.
    fn drain_piped_samples(&mut self) -> Result<()> {
        let Some(sink) = &self.app_sink else { return Ok(()) };
        while let Some(sample) = sink.try_pull_sample(gst::ClockTime::ZERO) {
            if let Some(buffer) = sample.buffer() {
                let map = buffer.map_readable().context("failed to map piped sample buffer")?;
                self.piped.extend_from_slice(&map);
            }
        }
        Ok(())
    }

    /// Copies `src` (the frame's full-resolution color target) into the
    /// next free ring slot, maps it, and pushes it into `appsrc` as a
    /// timed `gst::Buffer`. Drains bus errors before returning so a dead
    /// encoder is reported as soon as possible rather than at `finish()`.
    pub fn push_frame(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, src: &wgpu::Texture) -> Result<()> {
        self.drain_bus_errors()?;
        self.drain_piped_samples()?;

        let slot = self.next_ring_slot;
        self.next_ring_slot = (self.next_ring_slot + 1) % self.ring.len();
        let staging = &self.ring[slot];

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("export-copy") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo { texture: src, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging.buffer,
                layout: wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(staging.bytes_per_row), rows_per_image: Some(staging.size.1) },
            },
            wgpu::Extent3d { width: staging.size.0, height: staging.size.1, depth_or_array_layers: 1 },
        );
        queue.submit(Some(encoder.finish()));

        let slice = staging.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv().context("staging buffer map channel closed")?.context("staging buffer map failed")?;

        let pts = gst::ClockTime::from_nseconds(
            (self.frames_pushed * 1_000_000_000 / self.settings.fps.max(1) as u64) as u64,
        );
        let row_bytes = (self.settings.width * 4) as usize;
        let mut packed = Vec::with_capacity(row_bytes * self.settings.height as usize);
        {
            let data = slice.get_mapped_range();
            for row in 0..self.settings.height as usize {
                let start = row * staging.bytes_per_row as usize;
                packed.extend_from_slice(&data[start..start + row_bytes]);
            }
        }
        staging.buffer.unmap();

        let mut buffer = gst::Buffer::from_mut_slice(packed);
        {
            let buffer_ref = buffer.get_mut().context("unique buffer handle expected")?;
            buffer_ref.set_pts(pts);
        }

        self.appsrc.push_buffer(buffer).map_err(|e| {
            anyhow::Error::new(EngineError::EncoderDied { tail: format!("appsrc push failed: {e:?}") })
        })?;
        self.frames_pushed += 1;
        Ok(())
    }

    fn drain_bus_errors(&self) -> Result<()> {
        while let Some(msg) = self.bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
            if let gst::MessageView::Error(err) = msg.view() {
                return Err(anyhow::Error::new(EngineError::EncoderDied {
                    tail: format!("{} ({:?})", err.error(), err.debug()),
                }));
            }
        }
        Ok(())
    }

    /// Sends end-of-stream, waits for the pipeline to drain, and returns
    /// final statistics (wall time, media time, realtime ratio) together
    /// with the piped output bytes when `output_path` was `None`.
    pub fn finish(mut self) -> Result<(ExportStats, Option<Vec<u8>>)> {
        self.appsrc.end_of_stream().context("failed to send EOS to export pipeline")?;
        let timeout = gst::ClockTime::from_seconds(30);
        for msg in self.bus.iter_timed(timeout) {
            match msg.view() {
                gst::MessageView::Eos(_) => break,
                gst::MessageView::Error(err) => {
                    return Err(anyhow::Error::new(EngineError::EncoderDied {
                        tail: format!("{} ({:?})", err.error(), err.debug()),
                    }))
                }
                _ => {}
            }
        }
        self.drain_piped_samples()?;
        self.pipeline.set_state(gst::State::Null).context("failed to stop export pipeline")?;

        let wall = self.started_at.elapsed().as_secs_f64();
        let media_seconds = self.frames_pushed as f64 / self.settings.fps.max(1) as f64;
        let stats = ExportStats {
            total_frames: self.frames_pushed,
            wall_seconds: wall,
            media_seconds,
            realtime_ratio: if wall > 0.0 { media_seconds / wall } else { 0.0 },
        };
        let piped = self.app_sink.is_some().then(|| std::mem::take(&mut self.piped));
        Ok((stats, piped))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExportStats {
    pub total_frames: u64,
    pub wall_seconds: f64,
    pub media_seconds: f64,
    /// `> 1.0` means the export ran faster than realtime.
    pub realtime_ratio: f64,
}

fn encoder_for(codec: &str, bitrate_kbps: u32) -> String {
    match codec {
        "h264" => format!("x264enc bitrate={bitrate_kbps} speed-preset=fast ! h264parse"),
        "vp9" => format!("vp9enc target-bitrate={}", bitrate_kbps * 1000),
        "prores" => "avenc_prores_ks".to_string(),
        other => format!("{other}enc bitrate={bitrate_kbps}"),
    }
}

fn muxer_for(container: &str) -> &'static str {
    match container {
        "mp4" => "mp4mux",
        "mkv" => "matroskamux",
        "webm" => "webmmux",
        _ => "mp4mux",
    }
}

fn escape_location(path: &Path) -> String {
    path.to_string_lossy().replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_multiple() {
        assert_eq!(align_to(320 * 4, 256), 1280);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn encoder_strings_are_well_formed() {
        assert!(encoder_for("h264", 4000).contains("x264enc"));
        assert!(encoder_for("vp9", 4000).contains("vp9enc"));
    }

    #[test]
    fn muxer_defaults_to_mp4() {
        assert_eq!(muxer_for("unknown-container"), "mp4mux");
        assert_eq!(muxer_for("webm"), "webmmux");
    }
}
