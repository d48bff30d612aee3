//! Shader metaprogramming, compilation with error recovery, and execution
//! against a [`TextureMatrix`]. Targets WGSL/wgpu rather than GLSL/GL: one
//! assembled WGSL module carries both `vs_main` and `fs_main`.

use crate::core::Core;
use crate::error::EngineError;
use crate::module::{Module, ModuleUuid, PipelineContribution};
use crate::texture::{Sizing, TextureMatrix, TextureMatrixDesc};
use crate::variable::{ShaderVariable, VarType, VariablePipeline};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// The built-in traverse (vertex→fragment) variables, always present
/// regardless of user declarations.
const TRAVERSE_FIELDS: &[(&str, VarType)] = &[
    ("fragCoord", VarType::Vec2),
    ("stxy", VarType::Vec2),
    ("glxy", VarType::Vec2),
    ("stuv", VarType::Vec2),
    ("astuv", VarType::Vec2),
    ("gluv", VarType::Vec2),
    ("agluv", VarType::Vec2),
];

/// The fixed two-triangle-strip geometry covering `[-1, 1]^2`: `(position,
/// uv)` pairs, the default vertex buffer layout every shader gets.
pub const DEFAULT_QUAD: [[f32; 4]; 4] = [
    [-1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 1.0, 1.0],
    [-1.0, 1.0, 0.0, 0.0],
    [1.0, 1.0, 1.0, 0.0],
];

/// Math helpers and UV-convention glue spliced into every assembled
/// shader, ahead of module `defines()`/`includes()` and the user body.
const PREAMBLE: &str = r#"
fn lf_rot2(a: f32) -> mat2x2<f32> {
    let s = sin(a);
    let c = cos(a);
    return mat2x2<f32>(c, -s, s, c);
}

fn lf_hash21(p: vec2<f32>) -> f32 {
    var p3 = fract(vec3<f32>(p.x, p.y, p.x) * 0.1031);
    p3 += dot(p3, p3.yzx + 33.33);
    return fract((p3.x + p3.y) * p3.z);
}

fn lf_aspect(resolution: vec2<f32>) -> f32 {
    return resolution.x / max(resolution.y, 1.0);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    /// A user-facing shader owning its own [`TextureMatrix`].
    User,
    /// The built-in downsample shader: samples the scene's `shader`
    /// texture and writes directly to the window framebuffer.
    Final,
}

/// Where the user's fragment source comes from. A `Path` is registered
/// with the hot-reload watcher.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    Inline(String),
    Path(PathBuf),
}

impl ShaderSource {
    pub fn load(&self) -> Result<String> {
        match self {
            ShaderSource::Inline(s) => Ok(s.clone()),
            ShaderSource::Path(p) => {
                std::fs::read_to_string(p).with_context(|| format!("reading shader source {p:?}"))
            }
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ShaderSource::Path(p) => Some(p),
            ShaderSource::Inline(_) => None,
        }
    }
}

/// Resolves `#include "..."` directives against a configured search path.
/// Missing includes fail the compile (and are reported by the usual
/// diagnostic path); a watch path that can't be registered is swallowed
/// rather than treated as fatal.
pub struct IncludeResolver {
    pub search_paths: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn resolve(&self, name: &str) -> Result<(PathBuf, String)> {
        for base in &self.search_paths {
            let candidate = base.join(name);
            if candidate.exists() {
                let text = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading include {candidate:?}"))?;
                return Ok((candidate, text));
            }
        }
        anyhow::bail!("include {name:?} not found in configured search paths")
    }

    /// Replaces every `#include "name"` line with the resolved file's
    /// contents, returning the substituted source and the set of paths
    /// that should additionally be watched for hot reload.
    pub fn substitute(&self, source: &str) -> Result<(String, Vec<PathBuf>)> {
        let mut out = String::with_capacity(source.len());
        let mut watched = Vec::new();
        for line in source.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("#include") {
                let name = rest.trim().trim_matches('"');
                let (path, text) = self.resolve(name)?;
                out.push_str(&text);
                out.push('\n');
                watched.push(path);
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        Ok((out, watched))
    }
}

/// Metaprogrammed GLSL→WGSL assembly: concatenates the uniform struct, the
/// traverse (varying) struct, the preamble, every module's `defines()`/
/// `includes()`, and the user body, in that fixed order.
pub struct ShaderAssembler;

impl ShaderAssembler {
    pub fn assemble(
        pipeline: &VariablePipeline,
        texture_matrices: &[(&str, String)],
        module_defines: &[String],
        module_includes: &[String],
        user_vertex: &str,
        user_fragment: &str,
    ) -> String {
        let mut out = String::new();

        out.push_str("// === uniforms ===\n");
        out.push_str("struct Uniforms {\n");
        for var in pipeline.non_samplers() {
            out.push_str(&var.uniform_field());
        }
        out.push_str("};\n");
        out.push_str("@group(0) @binding(0) var<uniform> u: Uniforms;\n\n");

        if pipeline.samplers().next().is_some() {
            out.push_str("// === sampler pipeline ===\n");
            let mut binding = 0u32;
            for var in pipeline.samplers() {
                out.push_str(&format!(
                    "@group(1) @binding({binding}) var t_{name}: texture_2d<f32>;\n",
                    name = var.name
                ));
                binding += 1;
                out.push_str(&format!(
                    "@group(1) @binding({binding}) var s_{name}: sampler;\n",
                    name = var.name
                ));
                binding += 1;
            }
            out.push('\n');
        }

        out.push_str("// === texture matrices ===\n");
        for (_name, bindings) in texture_matrices {
            out.push_str(bindings);
            out.push('\n');
        }

        out.push_str("// === traverse (vertex -> fragment) ===\n");
        out.push_str("struct VertexOutput {\n    @builtin(position) clip_position: vec4<f32>,\n");
        for (i, (name, ty)) in TRAVERSE_FIELDS.iter().enumerate() {
            out.push_str(&format!("    @location({i}) {name}: {},\n", ty.wgsl_type()));
        }
        out.push_str(&format!(
            "    @location({}) @interpolate(flat) instance: i32,\n",
            TRAVERSE_FIELDS.len()
        ));
        out.push_str("};\n\n");

        out.push_str("// === preamble ===\n");
        out.push_str(PREAMBLE);
        out.push('\n');

        if !module_defines.is_empty() {
            out.push_str("// === module defines ===\n");
            for d in module_defines {
                out.push_str(d);
                out.push('\n');
            }
            out.push('\n');
        }

        if !module_includes.is_empty() {
            out.push_str("// === module includes ===\n");
            for inc in module_includes {
                out.push_str(inc);
                out.push('\n');
            }
            out.push('\n');
        }

        out.push_str("// === vertex stage ===\n");
        out.push_str("struct VertexInput {\n");
        out.push_str("    @location(0) vertex_position: vec2<f32>,\n");
        out.push_str("    @location(1) vertex_gluv: vec2<f32>,\n");
        out.push_str("};\n\n");
        out.push_str("@vertex\nfn vs_main(input: VertexInput, @builtin(instance_index) iid: u32) -> VertexOutput {\n");
        out.push_str("    var out: VertexOutput;\n");
        out.push_str("    out.clip_position = vec4<f32>(input.vertex_position, 0.0, 1.0);\n");
        out.push_str("    let gluv = input.vertex_gluv;\n");
        out.push_str("    let stuv = gluv * 0.5 + vec2<f32>(0.5, 0.5);\n");
        out.push_str("    let aspect = lf_aspect(u.iResolution);\n");
        out.push_str("    let astuv = vec2<f32>(stuv.x * aspect, stuv.y);\n");
        out.push_str("    let agluv = vec2<f32>(gluv.x * aspect, gluv.y);\n");
        out.push_str("    let frag_coord = stuv * u.iResolution;\n");
        out.push_str("    out.gluv = gluv;\n    out.stuv = stuv;\n    out.astuv = astuv;\n    out.agluv = agluv;\n");
        out.push_str("    out.fragCoord = frag_coord;\n    out.stxy = frag_coord;\n    out.glxy = gluv * u.iResolution * 0.5;\n");
        out.push_str("    out.instance = i32(iid);\n");
        out.push_str("    return out;\n}\n\n");
        let _ = user_vertex; // the default vertex stage above is generated; a
                             // user override may append custom attribute
                             // computation here in a future extension point.

        out.push_str("// === fragment stage (user body) ===\n");
        out.push_str("@fragment\nfn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n");
        out.push_str("    var fragColor: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 1.0);\n");
        for (name, ty) in TRAVERSE_FIELDS {
            out.push_str(&format!("    let {name}: {} = in.{name};\n", ty.wgsl_type()));
        }
        out.push_str("    let instance: i32 = in.instance;\n");
        out.push_str(user_fragment);
        out.push_str("\n    return fragColor;\n}\n");

        out
    }
}

/// A compiled GLSL-contract shader with its GPU pipeline state.
pub struct CompiledShader {
    pub module: wgpu::ShaderModule,
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    /// `@group(1)`: arbitrary sampler-pipeline variables. Always bound (even
    /// when empty) so the pipeline layout covers every group index the
    /// assembled WGSL declares up to `@group(2)`.
    pub sampler_bind_group: wgpu::BindGroup,
    /// `@group(2)`'s layout: the shader's own matrix (history rows only,
    /// `t >= 1`) followed by every external matrix passed to `compile()`
    /// (all rows). `None` iff there are no matrix sources at all. The bind
    /// group itself is rebuilt each `render()` call since its bound
    /// texture views rotate with each matrix's temporal axis.
    pub matrix_bind_group_layout: Option<wgpu::BindGroupLayout>,
    pub source: String,
}

/// A `ShaderProgram` is both a [`Module`] and the owner of one
/// [`TextureMatrix`].
pub struct ShaderProgram {
    uuid: ModuleUuid,
    pub name: String,
    pub kind: ShaderKind,
    pub source: ShaderSource,
    pub clear_on_render: bool,
    pub instances: u32,
    pub vertices: Vec<[f32; 4]>,
    pub vertex_variables: VariablePipeline,
    pub fragment_variables: VariablePipeline,
    pub matrix: Option<TextureMatrix>,
    pub includes: IncludeResolver,
    pub watched_paths: Vec<PathBuf>,
    compiled: Option<CompiledShader>,
    skip_gpu: bool,
}

impl ShaderProgram {
    pub fn new(name: impl Into<String>, kind: ShaderKind, source: ShaderSource) -> Self {
        let mut fragment_variables = VariablePipeline::new();
        fragment_variables.push(ShaderVariable::new(VarType::Vec4, "fragColor"));
        let mut vertex_variables = VariablePipeline::new();
        vertex_variables.push(ShaderVariable::new(VarType::Vec2, "vertex_position"));
        vertex_variables.push(ShaderVariable::new(VarType::Vec2, "vertex_gluv"));

        Self {
            uuid: ModuleUuid::next(),
            name: name.into(),
            kind,
            source,
            clear_on_render: true,
            instances: 1,
            vertices: DEFAULT_QUAD.to_vec(),
            vertex_variables,
            fragment_variables,
            matrix: None,
            includes: IncludeResolver::new(Vec::new()),
            watched_paths: Vec::new(),
            compiled: None,
            skip_gpu: std::env::var("SKIP_GPU").ok().as_deref() == Some("1"),
        }
    }

    /// Gives this shader a `temporal × layers` texture matrix. A windowed
    /// `final` shader normally renders straight into the swapchain view
    /// instead (see [`Self::render`]'s `final_target` parameter) and has
    /// no use for this, but a headless/export `final` shader still needs
    /// somewhere to land its output and uses its own one-box matrix for
    /// that.
    pub fn with_matrix(mut self, core: &Core, desc: TextureMatrixDesc) -> Result<Self> {
        let matrix = TextureMatrix::new(&core.device, desc, core.size.0, core.size.1)?;
        self.matrix = Some(matrix);
        Ok(self)
    }

    /// `make_fragment`/`make_vertex` combined: produces the final assembled
    /// WGSL source for this shader given the scene's full pipeline.
    /// `external_matrices` are matrices owned by *other* shaders that this
    /// one may sample (e.g. the `final` shader reading `shader`'s output);
    /// unlike this shader's own matrix, every row of an external matrix is
    /// visible, current frame included, since this shader never writes it.
    pub fn assemble(
        &self,
        full_pipeline: &VariablePipeline,
        module_defines: &[String],
        module_includes: &[String],
        external_matrices: &[(&str, &TextureMatrix)],
    ) -> Result<String> {
        let user_fragment_raw = self.source.load()?;
        let (user_fragment, _watched) = self.includes.substitute(&user_fragment_raw)?;

        let mut pipeline = full_pipeline.clone();
        // `fragColor` is always declared as a local `var` in `fs_main`
        // (see `ShaderAssembler::assemble`), never as a uniform; any other
        // module-declared fragment variable still gets folded into the
        // uniform struct.
        pipeline.extend(self.fragment_variables.iter().cloned().filter(|v| v.name != "fragColor"));

        let mut matrices: Vec<(&str, String)> = Vec::new();
        let mut binding = 0u32;
        if let Some(m) = self.matrix.as_ref() {
            matrices.push((m.desc.name.as_str(), m.wgsl_bindings(2, binding, false)));
            binding += m.binding_span(false);
        }
        for (name, m) in external_matrices {
            matrices.push((*name, m.wgsl_bindings(2, binding, true)));
            binding += m.binding_span(true);
        }

        Ok(ShaderAssembler::assemble(&pipeline, &matrices, module_defines, module_includes, "", &user_fragment))
    }

    /// Compiles the assembled source. On failure, dumps diagnostics and
    /// recompiles with the bundled fallback fragment; a second failure is
    /// fatal.
    pub fn compile(
        &mut self,
        core: &Core,
        full_pipeline: &VariablePipeline,
        module_defines: &[String],
        module_includes: &[String],
        log_dir: &std::path::Path,
        external_matrices: &[(&str, &TextureMatrix)],
    ) -> Result<()> {
        let source = self.assemble(full_pipeline, module_defines, module_includes, external_matrices)?;
        match self.try_compile(core, &source, external_matrices) {
            Ok(compiled) => {
                self.compiled = Some(compiled);
                Ok(())
            }
            Err(e) => {
                self.dump_failure(log_dir, &source, &e.to_string())?;
                log::warn!("shader {} failed to compile, falling back: {e:#}", self.uuid.0);
                let fallback = fallback_fragment_source();
                let fallback_source = ShaderAssembler::assemble(full_pipeline, &[], &[], &[], "", fallback);
                match self.try_compile(core, &fallback_source, external_matrices) {
                    Ok(compiled) => {
                        self.compiled = Some(compiled);
                        Ok(())
                    }
                    Err(fatal) => Err(anyhow::Error::new(EngineError::ShaderCompile {
                        uuid: self.uuid.0,
                        log: format!("{e:#}\n---fallback also failed---\n{fatal:#}"),
                    })),
                }
            }
        }
    }

    fn try_compile(&self, core: &Core, source: &str, external_matrices: &[(&str, &TextureMatrix)]) -> Result<CompiledShader> {
        let module = core.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{}-module", self.name)),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let uniform_size = self.estimate_uniform_size(source);
        let uniform_buffer = core.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}-uniforms", self.name)),
            size: uniform_size.max(16) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = core.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{}-uniform-layout", self.name)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-uniform-bind-group", self.name)),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() }],
        });

        // `@group(1)` carries arbitrary sampler-pipeline variables; no module
        // currently contributes one, so this layout/group is always empty,
        // but it still needs to exist to keep `@group(2)` at the right
        // positional index in `bind_group_layouts`.
        let sampler_bind_group_layout = core.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{}-sampler-layout", self.name)),
            entries: &[],
        });
        let sampler_bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-sampler-bind-group", self.name)),
            layout: &sampler_bind_group_layout,
            entries: &[],
        });

        // The combined group-2 bind group is rebuilt every `render()` call
        // (bound texture views rotate with `TextureMatrix::roll`), but the
        // *layout* is fixed for the life of this compiled shader. Own
        // matrix first (history rows only), then every external matrix
        // (all rows) — the same order `render()` uses to build entries.
        let has_matrix_sources = self.matrix.is_some() || !external_matrices.is_empty();
        let matrix_bind_group_layout = if has_matrix_sources {
            let mut entries = Vec::new();
            let mut binding = 0u32;
            if let Some(matrix) = self.matrix.as_ref() {
                let (mut own, next) = matrix.layout_entries(binding, false);
                entries.append(&mut own);
                binding = next;
            }
            for (_, matrix) in external_matrices {
                let (mut ext, next) = matrix.layout_entries(binding, true);
                entries.append(&mut ext);
                binding = next;
            }
            Some(core.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{}-matrix-layout", self.name)),
                entries: &entries,
            }))
        } else {
            None
        };

        let mut layouts = vec![&bind_group_layout, &sampler_bind_group_layout];
        if let Some(layout) = &matrix_bind_group_layout {
            layouts.push(layout);
        }
        let pipeline_layout = core.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}-pipeline-layout", self.name)),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: 4 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute { format: wgpu::VertexFormat::Float32x2, offset: 0, shader_location: 0 },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 2 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
                    shader_location: 1,
                },
            ],
        };

        let target_format = match self.kind {
            ShaderKind::Final => core.surface_format,
            ShaderKind::User => self.matrix.as_ref().map(|m| m.format()).unwrap_or(core.surface_format),
        };

        let pipeline = core.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{}-pipeline", self.name)),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(CompiledShader {
            module,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            sampler_bind_group,
            matrix_bind_group_layout,
            source: source.to_string(),
        })
    }

    /// Conservative upper bound on the packed uniform-struct size: 16 bytes
    /// (vec4-aligned) per declared uniform field. Good enough for buffer
    /// sizing; exact struct layout is produced by `naga`'s own reflection
    /// at shader-module creation time.
    fn estimate_uniform_size(&self, source: &str) -> usize {
        source.matches(':').count().max(1) * 16
    }

    fn dump_failure(&self, log_dir: &std::path::Path, source: &str, message: &str) -> Result<()> {
        std::fs::create_dir_all(log_dir).ok();
        let uuid = self.uuid.0;
        std::fs::write(log_dir.join(format!("{uuid}.frag")), source).ok();
        let excerpt = excerpt_around_error(source, message);
        std::fs::write(log_dir.join(format!("{uuid}-error.md")), format!("# shader {uuid} compile error\n\n```\n{message}\n```\n\n## context\n\n```wgsl\n{excerpt}\n```\n")).ok();
        Ok(())
    }

    /// Renders every layer of this shader into its texture matrix (or, for
    /// the final shader, directly into the given color attachment), then
    /// rolls the temporal axis. `pipeline` carries this frame's uniform
    /// values (`iTime`, `iResolution`, ...) and is packed into the uniform
    /// buffer before drawing.
    pub fn render(
        &mut self,
        core: &Core,
        final_target: Option<&wgpu::TextureView>,
        pipeline: &VariablePipeline,
        external_matrices: &[(&str, &TextureMatrix)],
    ) -> Result<()> {
        if self.skip_gpu {
            if let Some(matrix) = &mut self.matrix {
                matrix.roll(1);
            }
            return Ok(());
        }
        let compiled = self.compiled.as_ref().context("shader not compiled")?;

        let mut uniform_pipeline = pipeline.clone();
        uniform_pipeline.extend(self.fragment_variables.iter().cloned().filter(|v| v.name != "fragColor"));
        let mut bytes = uniform_pipeline.pack_uniforms();
        bytes.resize(compiled.uniform_buffer.size() as usize, 0u8);
        core.queue.write_buffer(&compiled.uniform_buffer, 0, &bytes);

        // Own matrix contributes only history rows (`t >= 1`): row 0 is
        // the color attachment this same pass writes to, and wgpu rejects
        // a texture bound both as a render target and a sampled texture
        // in one pass. External matrices have no such hazard here.
        let matrix_bind_group = compiled.matrix_bind_group_layout.as_ref().map(|layout| {
            let mut entries = Vec::new();
            let mut binding = 0u32;
            if let Some(matrix) = self.matrix.as_ref() {
                let (mut own, next) = matrix.bind_entries(binding, false);
                entries.append(&mut own);
                binding = next;
            }
            for (_, matrix) in external_matrices {
                let (mut ext, next) = matrix.bind_entries(binding, true);
                entries.append(&mut ext);
                binding = next;
            }
            core.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{}-matrix-bind-group", self.name)),
                layout,
                entries: &entries,
            })
        });

        let vertex_data: Vec<f32> = self.vertices.iter().flatten().copied().collect();
        let vertex_buffer = {
            use wgpu::util::DeviceExt;
            core.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}-vbo", self.name)),
                contents: bytemuck::cast_slice(&vertex_data),
                usage: wgpu::BufferUsages::VERTEX,
            })
        };

        let mut encoder = core.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("{}-encoder", self.name)),
        });

        if self.matrix.is_none() && final_target.is_none() {
            anyhow::bail!("shader has neither a texture matrix nor an explicit render target");
        }
        // `final_target` (the live swapchain view) takes priority when
        // given; otherwise this shader renders into its own matrix, which
        // is how headless/export runs obtain a final-pass color target.
        let layers = if final_target.is_some() { 1 } else { self.matrix.as_ref().map(|m| m.layers()).unwrap_or(1) };
        for layer in 0..layers {
            let view = match final_target {
                Some(target) => target,
                None => &self.matrix.as_ref().expect("checked above").get(0, layer).view,
            };

            let load = if self.clear_on_render {
                wgpu::LoadOp::Clear(wgpu::Color::BLACK)
            } else {
                wgpu::LoadOp::Load
            };

            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(&format!("{}-layer{layer}", self.name)),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&compiled.pipeline);
                pass.set_bind_group(0, &compiled.uniform_bind_group, &[]);
                pass.set_bind_group(1, &compiled.sampler_bind_group, &[]);
                if let Some(group) = &matrix_bind_group {
                    pass.set_bind_group(2, group, &[]);
                }
                pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                pass.draw(0..(self.vertices.len() as u32), 0..self.instances);
            }
        }

        core.queue.submit(Some(encoder.finish()));

        if let Some(matrix) = &mut self.matrix {
            matrix.roll(1);
        }
        Ok(())
    }

    pub fn uuid(&self) -> ModuleUuid {
        self.uuid
    }

    pub fn contribution(&self) -> PipelineContribution {
        PipelineContribution {
            variables: self.fragment_variables.iter().cloned().collect(),
            defines: Vec::new(),
            includes: Vec::new(),
        }
    }
}

impl Module for ShaderProgram {
    fn uuid(&self) -> ModuleUuid {
        self.uuid
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// The bundled "missing texture" / compile-failure fallback fragment. A
/// flat magenta-and-black checker makes compile failures impossible to
/// miss on screen, matching common shader-tool conventions (and the
/// pack's `sh4der-jockey` precedent of a visible fallback rather than a
/// silent black frame).
pub fn fallback_fragment_source() -> &'static str {
    r#"
    let checker = (floor(stuv.x * 8.0) + floor(stuv.y * 8.0)) % 2.0;
    if (checker < 1.0) {
        fragColor = vec4<f32>(1.0, 0.0, 1.0, 1.0);
    } else {
        fragColor = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    "#
}

/// Best-effort `±5` line context window around a wgpu/naga diagnostic's
/// reported `row:col`.
fn excerpt_around_error(source: &str, message: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line_no = parse_error_line(message).unwrap_or(0);
    let start = line_no.saturating_sub(5);
    let end = (line_no + 5).min(lines.len().saturating_sub(1));
    lines
        .iter()
        .enumerate()
        .skip(start)
        .take(end.saturating_sub(start) + 1)
        .map(|(i, l)| format!("{i:>5} | {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the first `row:col` pair out of a wgpu/naga error message.
/// Returns a zero-based line number, or `None` if no such pair is found.
fn parse_error_line(message: &str) -> Option<usize> {
    for (i, c) in message.char_indices() {
        if c == ':' {
            let rest = &message[i + 1..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() && i > 0 {
                let before: String = message[..i].chars().rev().take_while(|c| c.is_ascii_digit()).collect();
                if !before.is_empty() {
                    if let Ok(n) = before.chars().rev().collect::<String>().parse::<usize>() {
                        return Some(n.saturating_sub(1));
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{VarType, VarValue};

    #[test]
    fn assembly_orders_sections_version_defines_vars_preamble_body() {
        let mut pipeline = VariablePipeline::new();
        pipeline.push(ShaderVariable::uniform(VarType::Float, "iTime").with_value(VarValue::Float(0.0)));
        let source = ShaderAssembler::assemble(&pipeline, &[], &["#define FOO 1".into()], &["// include body".into()], "", "fragColor = vec4<f32>(1.0);");

        let uniforms_pos = source.find("struct Uniforms").unwrap();
        let preamble_pos = source.find("lf_rot2").unwrap();
        let defines_pos = source.find("#define FOO").unwrap();
        let includes_pos = source.find("// include body").unwrap();
        let body_pos = source.find("fragColor = vec4<f32>(1.0);").unwrap();

        assert!(uniforms_pos < preamble_pos);
        assert!(preamble_pos < defines_pos);
        assert!(defines_pos < includes_pos);
        assert!(includes_pos < body_pos);
    }

    #[test]
    fn traverse_fields_are_declared_and_aliased() {
        let pipeline = VariablePipeline::new();
        let source = ShaderAssembler::assemble(&pipeline, &[], &[], &[], "", "");
        for (name, _) in TRAVERSE_FIELDS {
            assert!(source.contains(&format!("{name}: vec2<f32> = in.{name};")), "missing alias for {name}");
        }
    }

    #[test]
    fn error_line_parsing_extracts_row() {
        assert_eq!(parse_error_line("error at 12:5: unknown identifier"), Some(11));
        assert_eq!(parse_error_line("no position info here"), None);
    }

    #[test]
    fn include_resolver_substitutes_and_tracks_watch_paths() {
        let dir = std::env::temp_dir().join(format!("lf-include-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lib.wgsl"), "fn helper() -> f32 { return 1.0; }").unwrap();
        let resolver = IncludeResolver::new(vec![dir.clone()]);
        let (substituted, watched) = resolver.substitute("#include \"lib.wgsl\"\nfragColor = vec4<f32>(helper());").unwrap();
        assert!(substituted.contains("fn helper"));
        assert_eq!(watched.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
