//! The [`Module`] trait and the arena that owns every module in a
//! [`crate::scene::Scene`]. Resolves the Scene↔Module cyclic-ownership
//! problem with an index+generation handle instead of a reference cycle:
//! modules never hold a pointer back to their Scene, they hold a
//! [`ModuleHandle`] and look themselves up through it.

use crate::message::Message;
use crate::variable::ShaderVariable;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UUID: AtomicU64 = AtomicU64::new(1);

/// Monotonic, process-wide module identity: a stable `uuid` from a
/// counter starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleUuid(pub u64);

impl ModuleUuid {
    pub fn next() -> Self {
        Self(NEXT_UUID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A stable index+generation reference to a module living in the scene's
/// arena. Cheap to copy, never dangles silently: looking one up after its
/// slot has been recycled returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle {
    index: usize,
    generation: u32,
}

/// An optional per-module CLI sub-command descriptor, aggregated by the
/// scene for an external CLI parser to register against via the
/// `commands()` hook; the parser itself lives outside this crate.
#[derive(Debug, Clone)]
pub struct ModuleCommand {
    pub name: String,
    pub help: String,
}

/// Everything a module may encode into a compiled shader: its uniform
/// contributions, `#define` lines, and `#include`-able GLSL/WGSL snippets.
#[derive(Debug, Clone, Default)]
pub struct PipelineContribution {
    pub variables: Vec<ShaderVariable>,
    pub defines: Vec<String>,
    pub includes: Vec<String>,
}

/// An abstract participant in the scene. The scene itself is module #1;
/// every other module is appended by its own constructor.
///
/// Every hook has a default no-op body except the ones a module cannot
/// meaningfully skip (`uuid`, `pipeline`/`handle` default to empty/ignore).
pub trait Module: Send {
    fn uuid(&self) -> ModuleUuid;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Runs once at construction time.
    fn build(&mut self) {}

    /// Runs each time the event loop (re)starts, including after an `O`
    /// (reset) shortcut.
    fn setup(&mut self) {}

    /// Runs every frame. `dt` is the scene's current frame delta.
    fn update(&mut self, _dt: f64) {}

    /// Uniforms this module contributes to every compiled shader this
    /// frame.
    fn pipeline(&self) -> Vec<ShaderVariable> {
        Vec::new()
    }

    /// GLSL/WGSL source snippets to splice into the assembled shader.
    fn includes(&self) -> Vec<String> {
        Vec::new()
    }

    /// `#define`-equivalent lines to splice into the assembled shader.
    fn defines(&self) -> Vec<String> {
        Vec::new()
    }

    /// CLI sub-commands this module wants registered (see
    /// [`ModuleCommand`]).
    fn commands(&self) -> Vec<ModuleCommand> {
        Vec::new()
    }

    /// Dispatched for every message relayed on the bus, in module
    /// insertion order. Must never propagate an error across the bus:
    /// swallow and log instead.
    fn handle(&mut self, _message: &Message) {}

    /// Lets an export-aware module (e.g. an audio source) contribute
    /// encoder configuration such as an audio codec.
    fn ffhook(&mut self, _encoder: &mut dyn std::any::Any) {}

    /// Runs once when the module is torn down.
    fn destroy(&mut self) {}
}

/// Owns every module in a scene, contiguous and append-only within a
/// frame.
#[derive(Default)]
pub struct ModuleRegistry {
    slots: Vec<Option<Box<dyn Module>>>,
    generations: Vec<u32>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: Box<dyn Module>) -> ModuleHandle {
        let index = self.slots.len();
        self.slots.push(Some(module));
        self.generations.push(0);
        ModuleHandle { index, generation: 0 }
    }

    pub fn get(&self, handle: ModuleHandle) -> Option<&dyn Module> {
        if self.generations.get(handle.index).copied() != Some(handle.generation) {
            return None;
        }
        self.slots.get(handle.index).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, handle: ModuleHandle) -> Option<&mut (dyn Module + 'static)> {
        if self.generations.get(handle.index).copied() != Some(handle.generation) {
            return None;
        }
        self.slots.get_mut(handle.index).and_then(|s| s.as_deref_mut())
    }

    /// Iterates modules in insertion order — the order `update`, message
    /// delivery and pipeline assembly all require.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Module> {
        self.slots.iter().filter_map(|s| s.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Module + 'static)> {
        self.slots.iter_mut().filter_map(|s| s.as_deref_mut())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        uuid: ModuleUuid,
        label: &'static str,
        updates: u32,
    }

    impl Module for Dummy {
        fn uuid(&self) -> ModuleUuid {
            self.uuid
        }
        fn name(&self) -> Option<&str> {
            Some(self.label)
        }
        fn update(&mut self, _dt: f64) {
            self.updates += 1;
        }
    }

    #[test]
    fn uuids_are_monotonic_and_start_at_one() {
        let a = ModuleUuid::next();
        let b = ModuleUuid::next();
        assert!(a.0 >= 1);
        assert!(b.0 > a.0);
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut reg = ModuleRegistry::new();
        reg.insert(Box::new(Dummy { uuid: ModuleUuid::next(), label: "first", updates: 0 }));
        reg.insert(Box::new(Dummy { uuid: ModuleUuid::next(), label: "second", updates: 0 }));
        let names: Vec<_> = reg.iter().map(|m| m.name().unwrap()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn update_runs_through_mutable_iterator() {
        let mut reg = ModuleRegistry::new();
        reg.insert(Box::new(Dummy { uuid: ModuleUuid::next(), label: "m", updates: 0 }));
        for m in reg.iter_mut() {
            m.update(1.0 / 60.0);
        }
        // Downcasting isn't available through `dyn Module`; instead assert
        // indirectly via a second pass that no panic occurs and the
        // registry still reports one live module.
        assert_eq!(reg.len(), 1);
    }
}
