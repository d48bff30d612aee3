//! A contract-only camera stub: a `Dynamics`-smoothed position/zoom pair
//! contributed as `iCameraPosition`/`iCameraZoom` uniforms. Deliberately
//! does not implement `SombreroCamera.py`'s full 2D/3D/VR mode switching.

use crate::dynamics::ShaderDynamics;
use crate::module::{Module, ModuleUuid};
use crate::variable::ShaderVariable;

pub struct Camera {
    uuid: ModuleUuid,
    position: ShaderDynamics<2>,
    zoom: ShaderDynamics<1>,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            uuid: ModuleUuid::next(),
            position: ShaderDynamics::new("iCameraPosition", 4.0, 1.0, 0.0),
            zoom: ShaderDynamics::new("iCameraZoom", 4.0, 1.0, 0.0),
        }
    }

    pub fn set_target(&mut self, position: [f32; 2], zoom: f32) {
        self.position.dynamics.set(position, false);
        self.zoom.dynamics.set([zoom], false);
    }
}

impl Default for Camera {
    fn default() -> Self {
        let mut c = Self::new();
        c.zoom.dynamics.set([1.0], true);
        c
    }
}

impl Module for Camera {
    fn uuid(&self) -> ModuleUuid {
        self.uuid
    }

    fn name(&self) -> Option<&str> {
        Some("camera")
    }

    fn update(&mut self, dt: f64) {
        let dt = dt as f32;
        self.position.advance(self.position.dynamics.target, dt);
        self.zoom.advance(self.zoom.dynamics.target, dt);
    }

    fn pipeline(&self) -> Vec<ShaderVariable> {
        let mut out = self.position.pipeline();
        out.extend(self.zoom.pipeline());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_toward_target() {
        let mut cam = Camera::default();
        cam.set_target([1.0, 2.0], 2.0);
        for _ in 0..600 {
            cam.update(1.0 / 60.0);
        }
        let vars = cam.pipeline();
        assert_eq!(vars[0].name, "iCameraPosition");
        assert_eq!(vars[1].name, "iCameraZoom");
    }
}
