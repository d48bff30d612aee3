//! The broadcast message bus. `Message` is a tagged variant relayed
//! synchronously to every module in scene insertion order.

/// Pixel-space and screen-center-normalized coordinates carried by every
/// pointer event: origin at screen center, y flipped, so
/// `u = 2*(x/W - 0.5)`, `v = -2*(y/H - 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerCoords {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    pub u: f32,
    pub v: f32,
    pub du: f32,
    pub dv: f32,
}

impl PointerCoords {
    /// Builds normalized coordinates from a pixel position/delta and the
    /// window's current size.
    pub fn from_pixels(x: f32, y: f32, dx: f32, dy: f32, width: f32, height: f32) -> Self {
        let aspect = if height > 0.0 { width / height } else { 1.0 };
        let u = 2.0 * (x / width - 0.5);
        let v = -2.0 * (y / height - 0.5);
        let du = 2.0 * (dx / width) * aspect;
        let dv = -2.0 * (dy / height);
        Self { x, y, dx, dy, u, v, du, dv }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowMessage {
    Resize(u32, u32),
    Close,
    Iconify(bool),
    FileDrop(Vec<std::path::PathBuf>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MouseMessage {
    Position(PointerCoords),
    Press(MouseButton, PointerCoords),
    Release(MouseButton, PointerCoords),
    Drag(MouseButton, PointerCoords),
    Scroll(PointerCoords),
    Enter(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum KeyboardMessage {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    Press(KeyCode),
    Unicode(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderMessage {
    Compile,
    Render,
    RecreateTextures,
}

/// The tagged message variant relayed across the module bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Window(WindowMessage),
    Mouse(MouseMessage),
    Keyboard(KeyboardMessage),
    Shader(ShaderMessage),
}

impl Message {
    pub fn resize(width: u32, height: u32) -> Self {
        Message::Window(WindowMessage::Resize(width, height))
    }

    pub fn close() -> Self {
        Message::Window(WindowMessage::Close)
    }

    pub fn recreate_textures() -> Self {
        Message::Shader(ShaderMessage::RecreateTextures)
    }

    pub fn compile() -> Self {
        Message::Shader(ShaderMessage::Compile)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Message::Window(WindowMessage::Close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_coords_center_is_origin() {
        let c = PointerCoords::from_pixels(160.0, 120.0, 0.0, 0.0, 320.0, 240.0);
        assert!(c.u.abs() < 1e-6);
        assert!(c.v.abs() < 1e-6);
    }

    #[test]
    fn pointer_coords_corner_signs() {
        // top-left pixel -> u negative, v positive (y flipped).
        let c = PointerCoords::from_pixels(0.0, 0.0, 0.0, 0.0, 320.0, 240.0);
        assert_eq!(c.u, -1.0);
        assert_eq!(c.v, 1.0);
        // bottom-right pixel -> u positive, v negative.
        let c = PointerCoords::from_pixels(320.0, 240.0, 0.0, 0.0, 320.0, 240.0);
        assert_eq!(c.u, 1.0);
        assert_eq!(c.v, -1.0);
    }

    #[test]
    fn close_message_detected() {
        assert!(Message::close().is_close());
        assert!(!Message::compile().is_close());
    }
}
