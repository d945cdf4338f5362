//! Per-thread lifetime counters for runtime and cache objects.
//!
//! The engine is single-threaded, so each OS thread (and each test) sees
//! only its own counts.
use std::cell::Cell;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakStats {
    pub compiled_functions: usize,
    pub closures: usize,
    pub function_objects_created: usize,
    pub function_objects_freed: usize,
    pub function_objects_leaked: usize,
    pub activations_created: usize,
    pub activations_destroyed: usize,
}

impl LeakStats {
    pub fn live_function_objects(&self) -> usize {
        self.function_objects_created
            - self.function_objects_freed
            - self.function_objects_leaked
    }

    pub fn live_activations(&self) -> usize {
        self.activations_created - self.activations_destroyed
    }
}

thread_local! {
    static STATS: Cell<LeakStats> = Cell::new(LeakStats::default());
}

fn bump(update: impl FnOnce(&mut LeakStats)) {
    STATS.with(|stats| {
        let mut current = stats.get();
        update(&mut current);
        stats.set(current);
    });
}

pub fn record_compiled_function() {
    bump(|stats| stats.compiled_functions += 1);
}

pub fn record_closure() {
    bump(|stats| stats.closures += 1);
}

pub fn record_function_object() {
    bump(|stats| stats.function_objects_created += 1);
}

pub fn record_function_object_freed() {
    bump(|stats| stats.function_objects_freed += 1);
}

pub fn record_function_object_leaked() {
    bump(|stats| stats.function_objects_leaked += 1);
}

pub fn record_activation() {
    bump(|stats| stats.activations_created += 1);
}

pub fn record_activation_destroyed() {
    bump(|stats| stats.activations_destroyed += 1);
}

pub fn snapshot() -> LeakStats {
    STATS.with(Cell::get)
}
