//! A real-time shader composition and rendering engine: modules contribute
//! uniforms and `#include`-able WGSL to an assembled shader, a scheduler
//! drives them at a configurable frequency (realtime or freewheel-exported),
//! and a `temporal × layers` texture matrix gives every shader its own
//! feedback/multi-pass history.
//!
//! Start at [`scene::Scene`]; [`shader::ShaderProgram`] and
//! [`module::Module`] are the two extension points most callers touch.

pub mod core;
pub mod dynamics;
pub mod error;
#[cfg(feature = "media")]
pub mod export;
pub mod hotreload;
pub mod message;
pub mod module;
pub mod modules;
pub mod scene;
pub mod scheduler;
pub mod shader;
pub mod texture;
pub mod ui;
pub mod variable;

pub use core::{Core, WindowBackend};
pub use error::EngineError;
pub use message::Message;
pub use module::{Module, ModuleHandle, ModuleUuid};
pub use scene::{Scene, SceneConfig};
pub use shader::{ShaderKind, ShaderProgram, ShaderSource};
pub use texture::{TextureMatrix, TextureMatrixDesc};
pub use variable::{ShaderVariable, VarType, VariablePipeline};

/// Initializes the diagnostic logger the way every built-in example does.
/// Idempotent: safe to call more than once (subsequent calls are no-ops,
/// matching `env_logger::try_init`'s contract).
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// The per-user directory this engine writes shader-compile diagnostics and
/// screenshots into, resolved the way `dirs::data_local_dir` resolves
/// per-platform application data directories.
pub fn default_log_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lumenforge")
        .join("logs")
}
