//! A rolling frame-time average for the UI overlay's FPS readout. Pure
//! bookkeeping, no shader pipeline contribution — ported from
//! `ShaderFlow/Modules/Frametimer.py`'s observed behavior.

use crate::module::{Module, ModuleUuid};
use std::collections::VecDeque;

const WINDOW: usize = 120;

pub struct Frametimer {
    uuid: ModuleUuid,
    samples: VecDeque<f64>,
    pub average: f64,
}

impl Frametimer {
    pub fn new() -> Self {
        Self { uuid: ModuleUuid::next(), samples: VecDeque::with_capacity(WINDOW), average: 0.0 }
    }

    pub fn fps(&self) -> f64 {
        if self.average > 0.0 {
            1.0 / self.average
        } else {
            0.0
        }
    }
}

impl Default for Frametimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Frametimer {
    fn uuid(&self) -> ModuleUuid {
        self.uuid
    }

    fn name(&self) -> Option<&str> {
        Some("frametimer")
    }

    fn update(&mut self, dt: f64) {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(dt);
        self.average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_settles_to_constant_dt() {
        let mut t = Frametimer::new();
        for _ in 0..WINDOW * 2 {
            t.update(1.0 / 60.0);
        }
        assert!((t.average - 1.0 / 60.0).abs() < 1e-9);
        assert!((t.fps() - 60.0).abs() < 1e-6);
    }

    #[test]
    fn window_is_bounded() {
        let mut t = Frametimer::new();
        for _ in 0..WINDOW + 10 {
            t.update(1.0 / 30.0);
        }
        assert_eq!(t.samples.len(), WINDOW);
    }
}
