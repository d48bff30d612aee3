//! The per-shader `temporal × layers` ring of framebuffer-backed textures:
//! `matrix[t][l]` where `t` indexes history (0 = most recent) and `l`
//! indexes a multi-pass layer rendered within one frame.

use std::collections::VecDeque;
use wgpu::util::DeviceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

impl Filter {
    fn wgpu_filter(&self) -> wgpu::FilterMode {
        match self {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    U16,
    F16,
    F32,
}

impl DataType {
    fn wgpu_format(&self, components: u8) -> wgpu::TextureFormat {
        use wgpu::TextureFormat::*;
        match (self, components.clamp(1, 4)) {
            (DataType::U8, 1) => R8Unorm,
            (DataType::U8, 2) => Rg8Unorm,
            (DataType::U8, _) => Rgba8Unorm,
            (DataType::U16, 1) => R16Unorm,
            (DataType::U16, 2) => Rg16Unorm,
            (DataType::U16, _) => Rgba16Unorm,
            (DataType::F16, 1) => R16Float,
            (DataType::F16, 2) => Rg16Float,
            (DataType::F16, _) => Rgba16Float,
            (DataType::F32, 1) => R32Float,
            (DataType::F32, 2) => Rg32Float,
            (DataType::F32, _) => Rgba32Float,
        }
    }

    fn bytes_per_component(&self) -> u32 {
        match self {
            DataType::U8 => 1,
            DataType::U16 | DataType::F16 => 2,
            DataType::F32 => 4,
        }
    }
}

/// Sizing policy: either honor an explicit `width`/`height`, or `track` the
/// scene's render resolution scaled by a factor.
#[derive(Debug, Clone, Copy)]
pub enum Sizing {
    Fixed { width: u32, height: u32 },
    Track { factor: f32 },
}

/// Attributes shared by every box in a [`TextureMatrix`].
#[derive(Debug, Clone)]
pub struct TextureMatrixDesc {
    pub name: String,
    pub temporal: usize,
    pub layers: usize,
    pub sizing: Sizing,
    pub components: u8,
    pub dtype: DataType,
    pub filter: Filter,
    pub mipmaps: bool,
    pub anisotropy: u8,
    pub repeat_x: bool,
    pub repeat_y: bool,
    /// Marks the texture that renders into the window framebuffer (the
    /// `final` shader's source texture).
    pub is_final: bool,
}

impl Default for TextureMatrixDesc {
    fn default() -> Self {
        Self {
            name: "iChannel".into(),
            temporal: 1,
            layers: 1,
            sizing: Sizing::Track { factor: 1.0 },
            components: 4,
            dtype: DataType::U8,
            filter: Filter::Linear,
            mipmaps: false,
            anisotropy: 1,
            repeat_x: false,
            repeat_y: false,
            is_final: false,
        }
    }
}

/// An owning (texture, view) pair used as a render-pass color attachment,
/// plus a shadow copy of the last write for resize preservation.
pub struct TextureBox {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    /// Last bytes written, kept so a resize to a texture of the same byte
    /// length can restore content instead of clearing it.
    pub last_write: Option<Vec<u8>>,
    pub clear: bool,
}

impl TextureBox {
    fn new(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, width, height, last_write: None, clear: true }
    }
}

/// The `temporal × layers` ring of [`TextureBox`]es owned by one
/// [`crate::shader::ShaderProgram`]. Row 0 is always the current frame;
/// `roll(1)` after a render rotates so the just-written content becomes
/// history for the next frame.
pub struct TextureMatrix {
    pub desc: TextureMatrixDesc,
    /// `rows[t][l]`.
    rows: VecDeque<Vec<TextureBox>>,
    format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
}

impl TextureMatrix {
    pub fn new(device: &wgpu::Device, desc: TextureMatrixDesc, scene_width: u32, scene_height: u32) -> anyhow::Result<Self> {
        let (width, height) = Self::resolve_size(&desc, scene_width, scene_height);
        Self::check_limits(device, width, height)?;

        let format = desc.dtype.wgpu_format(desc.components);
        let mut rows = VecDeque::with_capacity(desc.temporal);
        for t in 0..desc.temporal {
            let mut layer_row = Vec::with_capacity(desc.layers);
            for l in 0..desc.layers {
                layer_row.push(TextureBox::new(device, width, height, format, &format!("{}-t{t}-l{l}", desc.name)));
            }
            rows.push_back(layer_row);
        }

        let filter_mode = desc.filter.wgpu_filter();
        let mipmap_filter = if desc.mipmaps && desc.filter == Filter::Linear {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let address = |repeat: bool| if repeat { wgpu::AddressMode::Repeat } else { wgpu::AddressMode::ClampToEdge };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{}-sampler", desc.name)),
            address_mode_u: address(desc.repeat_x),
            address_mode_v: address(desc.repeat_y),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter,
            anisotropy_clamp: desc.anisotropy.max(1) as u16,
            ..Default::default()
        });

        Ok(Self { desc, rows, format, sampler })
    }

    fn resolve_size(desc: &TextureMatrixDesc, scene_width: u32, scene_height: u32) -> (u32, u32) {
        match desc.sizing {
            Sizing::Fixed { width, height } => (width, height),
            Sizing::Track { factor } => (
                round_even((scene_width as f32 * factor) as u32),
                round_even((scene_height as f32 * factor) as u32),
            ),
        }
    }

    fn check_limits(device: &wgpu::Device, width: u32, height: u32) -> anyhow::Result<()> {
        let max = device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            anyhow::bail!(
                "texture {width}x{height} exceeds the device's max_texture_dimension_2d ({max})"
            );
        }
        Ok(())
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn temporal(&self) -> usize {
        self.desc.temporal
    }

    pub fn layers(&self) -> usize {
        self.desc.layers
    }

    /// `matrix[t][l]`.
    pub fn get(&self, t: usize, l: usize) -> &TextureBox {
        &self.rows[t][l]
    }

    pub fn get_mut(&mut self, t: usize, l: usize) -> &mut TextureBox {
        &mut self.rows[t][l]
    }

    pub fn row_mut(&mut self, t: usize) -> &mut Vec<TextureBox> {
        &mut self.rows[t]
    }

    /// Rotates the temporal axis by `n` (positive rolls forward: what was
    /// row 0 becomes row 1, etc; negative is the inverse). Used after a
    /// shader render so writes always target row 0 on the next frame.
    pub fn roll(&mut self, n: i64) {
        let len = self.rows.len() as i64;
        if len == 0 {
            return;
        }
        let n = ((n % len) + len) % len;
        self.rows.rotate_right(n as usize);
    }

    /// Rebuilds every box at the current tracked size, preserving content
    /// whose byte length is unchanged. Called in response to a
    /// `RecreateTextures` message.
    pub fn recreate(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene_width: u32, scene_height: u32) -> anyhow::Result<()> {
        let (width, height) = Self::resolve_size(&self.desc, scene_width, scene_height);
        Self::check_limits(device, width, height)?;

        for t in 0..self.rows.len() {
            for l in 0..self.rows[t].len() {
                let old = &self.rows[t][l];
                if old.width == width && old.height == height {
                    continue;
                }
                let preserved = old.last_write.clone();
                let mut new_box = TextureBox::new(device, width, height, self.format, &format!("{}-t{t}-l{l}", self.desc.name));
                if let Some(bytes) = preserved {
                    let expected = (width as u32 * height as u32
                        * self.desc.components as u32
                        * self.desc.dtype.bytes_per_component()) as usize;
                    if bytes.len() == expected {
                        Self::upload(queue, &new_box.texture, width, height, self.desc.components, self.desc.dtype, &bytes);
                        new_box.last_write = Some(bytes);
                    }
                }
                self.rows[t][l] = new_box;
            }
        }
        Ok(())
    }

    fn upload(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, components: u8, dtype: DataType, data: &[u8]) {
        let bytes_per_pixel = components.clamp(1, 4) as u32 * dtype.bytes_per_component();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }

    /// The temporal rows a sampling shader is allowed to see. A shader
    /// reading its *own* matrix must never see row 0 — it is the render
    /// target of the pass currently in flight — so it only gets history
    /// (`t >= 1`). A shader reading a matrix it doesn't own has no such
    /// hazard and may see every row, `t = 0` included.
    fn visible_rows(&self, include_current: bool) -> std::ops::Range<usize> {
        if include_current {
            0..self.desc.temporal
        } else {
            1.min(self.desc.temporal)..self.desc.temporal
        }
    }

    /// Emits the WGSL binding declarations, `N{t}` history shortcuts and
    /// the `N_Texture(t, l, uv)` helper for this matrix. `group`/
    /// `binding_start` let the shader assembler place this matrix's
    /// textures at a specific bind group without colliding with other
    /// matrices' or modules' bindings; `include_current` selects whether
    /// row 0 is bindable (see [`Self::visible_rows`]).
    pub fn wgsl_bindings(&self, group: u32, binding_start: u32, include_current: bool) -> String {
        let name = &self.desc.name;
        let rows = self.visible_rows(include_current);
        let mut out = String::new();
        let mut binding = binding_start;
        let sampler_binding = binding_start + (rows.len() * self.desc.layers) as u32;

        for t in rows.clone() {
            for l in 0..self.desc.layers {
                out.push_str(&format!(
                    "@group({group}) @binding({binding}) var {name}{t}x{l}: texture_2d<f32>;\n"
                ));
                binding += 1;
            }
        }
        out.push_str(&format!(
            "@group({group}) @binding({sampler_binding}) var {name}_sampler: sampler;\n"
        ));

        let last_layer = self.desc.layers.saturating_sub(1);
        for t in rows.clone() {
            let shortcut = if t == 0 { name.clone() } else { format!("{name}{t}") };
            out.push_str(&format!("// {shortcut} = {name}{t}x{last_layer}\n"));
        }

        out.push_str(&format!(
            "fn {name}_Texture(t: i32, l: i32, uv: vec2<f32>) -> vec4<f32> {{\n"
        ));
        out.push_str("    switch (t * 100 + l) {\n");
        for t in rows.clone() {
            for l in 0..self.desc.layers {
                out.push_str(&format!(
                    "        case {}: {{ return textureSample({name}{t}x{l}, {name}_sampler, uv); }}\n",
                    t as i32 * 100 + l as i32
                ));
            }
        }
        out.push_str("        default: { return vec4<f32>(0.0, 0.0, 0.0, 1.0); }\n");
        out.push_str("    }\n}\n");

        out.push_str(&format!("const {name}_Layers: i32 = {};\n", self.desc.layers));
        out.push_str(&format!("const {name}_Temporal: i32 = {};\n", self.desc.temporal));

        out
    }

    /// Number of distinct binding slots (visible textures + one shared
    /// sampler) this matrix occupies at a given `include_current` policy,
    /// for bind-group-layout bookkeeping.
    pub fn binding_span(&self, include_current: bool) -> u32 {
        (self.visible_rows(include_current).len() * self.desc.layers) as u32 + 1
    }

    /// `wgpu::BindGroupLayoutEntry`s for this matrix's visible rows plus
    /// its sampler, starting at `binding_start`. Returns the entries and
    /// the next free binding index, so multiple matrices can be packed
    /// into one bind group layout.
    pub fn layout_entries(&self, binding_start: u32, include_current: bool) -> (Vec<wgpu::BindGroupLayoutEntry>, u32) {
        let rows = self.visible_rows(include_current);
        let mut binding = binding_start;
        let mut entries = Vec::with_capacity(rows.len() * self.desc.layers + 1);
        for _t in rows {
            for _l in 0..self.desc.layers {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
                binding += 1;
            }
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        binding += 1;
        (entries, binding)
    }

    /// `wgpu::BindGroupEntry`s for this matrix's visible rows plus its
    /// sampler, mirroring [`Self::layout_entries`]. Rebuilt every render
    /// call since the bound views rotate with [`Self::roll`].
    pub fn bind_entries(&self, binding_start: u32, include_current: bool) -> (Vec<wgpu::BindGroupEntry<'_>>, u32) {
        let rows = self.visible_rows(include_current);
        let mut binding = binding_start;
        let mut entries = Vec::with_capacity(rows.len() * self.desc.layers + 1);
        for t in rows {
            for l in 0..self.desc.layers {
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: wgpu::BindingResource::TextureView(&self.get(t, l).view),
                });
                binding += 1;
            }
        }
        entries.push(wgpu::BindGroupEntry { binding, resource: wgpu::BindingResource::Sampler(&self.sampler) });
        binding += 1;
        (entries, binding)
    }

    pub fn width(&self) -> u32 {
        self.rows.front().and_then(|r| r.first()).map(|b| b.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.rows.front().and_then(|r| r.first()).map(|b| b.height).unwrap_or(0)
    }
}

/// Rounds to the nearest even integer. Render resolutions are always
/// rounded to even integers so chroma-subsampled export codecs don't choke.
pub fn round_even(v: u32) -> u32 {
    if v % 2 == 0 {
        v
    } else {
        v + 1
    }
}

/// Creates a tiny staging buffer filled with `data`, useful for uploading a
/// known-good "missing texture" placeholder without an explicit queue write
/// (mirrors the `device.create_buffer_init` idiom used throughout the
/// teacher's compute modules).
pub fn staging_buffer_init(device: &wgpu::Device, label: &str, data: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: data,
        usage: wgpu::BufferUsages::COPY_SRC,
    })
}

#[cfg(test)]
mod tests {
    use super::round_even;

    #[test]
    fn round_even_rounds_up_odd() {
        assert_eq!(round_even(319), 320);
        assert_eq!(round_even(320), 320);
    }

    // Ring rotation arithmetic is exercised indirectly through
    // `TextureMatrix::roll`, which wraps `VecDeque::rotate_right`; the
    // round-trip law (roll(k) then roll(-k) restores identity) holds
    // structurally because `rotate_right`/`rotate_left` are exact inverses
    // modulo length, verified here against the raw deque primitive used
    // internally (a live `TextureMatrix` needs a `wgpu::Device`, exercised
    // in the ignored GPU tests in `shader.rs`).
    #[test]
    fn roll_round_trip_on_raw_deque() {
        use std::collections::VecDeque;
        let mut d: VecDeque<i32> = (0..4).collect();
        let original = d.clone();
        d.rotate_right(3);
        d.rotate_left(3);
        assert_eq!(d, original);
    }
}
