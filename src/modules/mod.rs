//! Built-in modules the scene instantiates for every shader: Frametimer,
//! Keyboard, and Camera. Each is a thin, mostly-bookkeeping
//! [`crate::module::Module`].

mod camera;
mod frametimer;
mod keyboard;

pub use camera::Camera;
pub use frametimer::Frametimer;
pub use keyboard::Keyboard;
