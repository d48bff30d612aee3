//! Error kinds a caller may want to distinguish, composed under `anyhow`
//! everywhere else.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// A shader failed to compile after the bundled fallback also failed.
    ShaderCompile { uuid: u64, log: String },
    /// A requested texture exceeds the device's maximum 2D dimension.
    TextureOversize { width: u32, height: u32, max: u32 },
    /// The export encoder pipeline died mid-export.
    EncoderDied { tail: String },
    /// A module was constructed without a valid scene reference.
    ModuleMisconfigured { what: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ShaderCompile { uuid, log } => {
                write!(f, "shader {uuid} failed to compile (fallback also failed):\n{log}")
            }
            EngineError::TextureOversize { width, height, max } => {
                write!(f, "texture {width}x{height} exceeds max_texture_dimension_2d ({max})")
            }
            EngineError::EncoderDied { tail } => {
                write!(f, "export encoder exited unexpectedly:\n{tail}")
            }
            EngineError::ModuleMisconfigured { what } => {
                write!(f, "module misconfigured: {what}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = EngineError::TextureOversize { width: 99999, height: 8, max: 16384 };
        assert!(e.to_string().contains("99999"));
    }
}
