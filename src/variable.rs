//! Shader variable descriptors and the order-preserving, dedup-by-name
//! pipeline that every [`crate::module::Module`] contributes to.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// GLSL-flavored value types a [`ShaderVariable`] can declare. The wgpu
/// backend maps each of these onto a WGSL type (see [`VarType::wgsl_type`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl VarType {
    /// The WGSL spelling of this type.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            VarType::Float => "f32",
            VarType::Int => "i32",
            VarType::Bool => "bool",
            VarType::Vec2 => "vec2<f32>",
            VarType::Vec3 => "vec3<f32>",
            VarType::Vec4 => "vec4<f32>",
            VarType::Mat2 => "mat2x2<f32>",
            VarType::Mat3 => "mat3x3<f32>",
            VarType::Mat4 => "mat4x4<f32>",
            VarType::Sampler2D => "texture_2d<f32>",
        }
    }

    /// Size-string used for vertex-array layout (`f`,`i`,`2f`,`3f`,`4f`).
    /// Matrix and sampler types never appear in a vertex layout and return
    /// `None`.
    pub fn size_string(&self) -> Option<&'static str> {
        match self {
            VarType::Float => Some("f"),
            VarType::Int => Some("i"),
            VarType::Bool => Some("f"),
            VarType::Vec2 => Some("2f"),
            VarType::Vec3 => Some("3f"),
            VarType::Vec4 => Some("4f"),
            VarType::Mat2 | VarType::Mat3 | VarType::Mat4 | VarType::Sampler2D => None,
        }
    }

    /// Number of 4-byte components this type occupies in a vertex buffer.
    pub fn components(&self) -> usize {
        match self {
            VarType::Float | VarType::Int | VarType::Bool => 1,
            VarType::Vec2 => 2,
            VarType::Vec3 => 3,
            VarType::Vec4 => 4,
            VarType::Mat2 => 4,
            VarType::Mat3 => 9,
            VarType::Mat4 => 16,
            VarType::Sampler2D => 0,
        }
    }

    pub fn wgpu_vertex_format(&self) -> Option<wgpu::VertexFormat> {
        match self {
            VarType::Float | VarType::Bool => Some(wgpu::VertexFormat::Float32),
            VarType::Int => Some(wgpu::VertexFormat::Sint32),
            VarType::Vec2 => Some(wgpu::VertexFormat::Float32x2),
            VarType::Vec3 => Some(wgpu::VertexFormat::Float32x3),
            VarType::Vec4 => Some(wgpu::VertexFormat::Float32x4),
            _ => None,
        }
    }

    /// `(size, align)` in bytes under WGSL's uniform-address-space layout
    /// rules, used to pack a [`VariablePipeline`] into the bytes the
    /// assembled `Uniforms` struct expects.
    fn uniform_layout(&self) -> (usize, usize) {
        match self {
            VarType::Float | VarType::Int | VarType::Bool => (4, 4),
            VarType::Vec2 => (8, 8),
            VarType::Vec3 => (12, 16),
            VarType::Vec4 => (16, 16),
            VarType::Mat2 => (16, 8),
            VarType::Mat3 => (48, 16),
            VarType::Mat4 => (64, 16),
            VarType::Sampler2D => (0, 1),
        }
    }
}

/// Where a variable sits in the GLSL storage-qualifier model, translated to
/// the WGSL section it lands in during assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Qualifier {
    Uniform,
    Attribute,
    Varying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
    Flat,
    Smooth,
    NoPerspective,
}

impl Interpolation {
    pub fn wgsl_attribute(&self) -> &'static str {
        match self {
            Interpolation::Flat => "@interpolate(flat)",
            Interpolation::Smooth => "@interpolate(perspective)",
            Interpolation::NoPerspective => "@interpolate(linear)",
        }
    }
}

/// A concrete numeric value a [`ShaderVariable`] can carry for upload.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// Texture-unit binding; the payload is the texture's registered name,
    /// resolved to a bind group entry at compile time.
    Texture(String),
}

/// A single GLSL-style declaration: type, name, optional value/qualifier/
/// direction/interpolation. Equality and hashing are by `name` only, so a
/// `HashSet<ShaderVariable>` or the dedup logic in [`VariablePipeline`]
/// collapses two declarations sharing an identifier regardless of any other
/// field — the later declaration always wins.
#[derive(Debug, Clone)]
pub struct ShaderVariable {
    pub var_type: VarType,
    pub name: String,
    pub value: Option<VarValue>,
    pub qualifier: Option<Qualifier>,
    pub direction: Option<Direction>,
    pub interpolation: Option<Interpolation>,
}

impl ShaderVariable {
    pub fn new(var_type: VarType, name: impl Into<String>) -> Self {
        Self {
            var_type,
            name: name.into(),
            value: None,
            qualifier: None,
            direction: None,
            interpolation: None,
        }
    }

    pub fn uniform(var_type: VarType, name: impl Into<String>) -> Self {
        Self::new(var_type, name).with_qualifier(Qualifier::Uniform)
    }

    pub fn with_value(mut self, value: VarValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = Some(interpolation);
        self
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self.var_type, VarType::Sampler2D)
    }

    /// Vertex-array size string (`f`,`i`,`2f`,`3f`,`4f`), `None` for
    /// matrix/sampler variables which never populate a vertex buffer slot.
    pub fn size_string(&self) -> Option<&'static str> {
        self.var_type.size_string()
    }

    /// A single-field line suitable for splicing into the assembled
    /// uniform struct (`name: type,`).
    pub fn uniform_field(&self) -> String {
        format!("    {}: {},\n", self.name, self.var_type.wgsl_type())
    }

    /// Serializes the current value into `size` bytes per WGSL's
    /// uniform-address-space layout, zero-filling an unset value.
    fn packed_bytes(&self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        let Some(value) = &self.value else { return buf };
        let data: Vec<u8> = match value {
            VarValue::Float(v) => v.to_le_bytes().to_vec(),
            VarValue::Int(v) => v.to_le_bytes().to_vec(),
            VarValue::Bool(v) => (*v as i32).to_le_bytes().to_vec(),
            VarValue::Vec2(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            VarValue::Vec3(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            VarValue::Vec4(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            VarValue::Mat2(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            VarValue::Mat3(v) => {
                // Each vec3<f32> column is padded to 16 bytes in WGSL.
                let mut out = Vec::with_capacity(48);
                for col in v.chunks(3) {
                    for f in col {
                        out.extend_from_slice(&f.to_le_bytes());
                    }
                    out.extend_from_slice(&[0u8; 4]);
                }
                out
            }
            VarValue::Mat4(v) => v.iter().flat_map(|f| f.to_le_bytes()).collect(),
            VarValue::Texture(_) => Vec::new(),
        };
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        buf
    }

    /// A `@location(n) name: type,` line used for vertex-output /
    /// fragment-input struct fields (the "traverse" variables: `fragCoord`,
    /// `stxy`, `glxy`, ... plus `instance`).
    pub fn varying_field(&self, location: u32) -> String {
        let interp = self
            .interpolation
            .map(|i| format!("{} ", i.wgsl_attribute()))
            .unwrap_or_default();
        format!(
            "    @location({location}) {interp}{}: {},\n",
            self.name,
            self.var_type.wgsl_type()
        )
    }
}

impl PartialEq for ShaderVariable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for ShaderVariable {}
impl Hash for ShaderVariable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ShaderVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.var_type.wgsl_type())
    }
}

/// An order-preserving set of [`ShaderVariable`]s, deduplicated by name:
/// pushing a variable whose name already exists overwrites the existing
/// entry *in place* (its original position in insertion order is kept) —
/// duplicates are dedup'd by last occurrence.
#[derive(Debug, Clone, Default)]
pub struct VariablePipeline {
    order: Vec<ShaderVariable>,
    index: HashMap<String, usize>,
}

impl VariablePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, var: ShaderVariable) {
        if let Some(&idx) = self.index.get(&var.name) {
            self.order[idx] = var;
        } else {
            self.index.insert(var.name.clone(), self.order.len());
            self.order.push(var);
        }
    }

    pub fn extend(&mut self, vars: impl IntoIterator<Item = ShaderVariable>) {
        for v in vars {
            self.push(v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaderVariable> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ShaderVariable> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    pub fn samplers(&self) -> impl Iterator<Item = &ShaderVariable> {
        self.order.iter().filter(|v| v.is_sampler())
    }

    pub fn non_samplers(&self) -> impl Iterator<Item = &ShaderVariable> {
        self.order.iter().filter(|v| !v.is_sampler())
    }

    /// Packs every non-sampler variable's current value into the byte
    /// layout the assembled `Uniforms` struct expects (same field order as
    /// [`Self::non_samplers`], which is also the order `ShaderAssembler`
    /// uses to emit the struct), padded to a 16-byte stride overall.
    pub fn pack_uniforms(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for var in self.non_samplers() {
            let (size, align) = var.var_type.uniform_layout();
            let pad = (align - (out.len() % align)) % align;
            out.extend(std::iter::repeat(0u8).take(pad));
            out.extend(var.packed_bytes(size));
        }
        let pad = (16 - (out.len() % 16)) % 16;
        out.extend(std::iter::repeat(0u8).take(pad));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_position_last_value() {
        let mut pipeline = VariablePipeline::new();
        pipeline.push(ShaderVariable::uniform(VarType::Float, "iTime").with_value(VarValue::Float(1.0)));
        pipeline.push(ShaderVariable::uniform(VarType::Vec2, "iResolution"));
        pipeline.push(ShaderVariable::uniform(VarType::Float, "iTime").with_value(VarValue::Float(2.0)));

        assert_eq!(pipeline.len(), 2);
        let names: Vec<_> = pipeline.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["iTime", "iResolution"]);
        match pipeline.get("iTime").unwrap().value {
            Some(VarValue::Float(v)) => assert_eq!(v, 2.0),
            _ => panic!("expected overwritten value"),
        }
    }

    #[test]
    fn equality_and_hash_ignore_everything_but_name() {
        let a = ShaderVariable::uniform(VarType::Float, "x").with_value(VarValue::Float(1.0));
        let b = ShaderVariable::uniform(VarType::Vec3, "x").with_value(VarValue::Vec3([0.0; 3]));
        assert_eq!(a, b);
    }

    #[test]
    fn size_strings_match_spec() {
        assert_eq!(VarType::Float.size_string(), Some("f"));
        assert_eq!(VarType::Int.size_string(), Some("i"));
        assert_eq!(VarType::Vec2.size_string(), Some("2f"));
        assert_eq!(VarType::Vec3.size_string(), Some("3f"));
        assert_eq!(VarType::Vec4.size_string(), Some("4f"));
        assert_eq!(VarType::Mat4.size_string(), None);
    }
}
