//! Scenario declaration and execution.
//!
//! A scenario is an entry unit, loader options, and an ordered list of
//! probes. It comes either from a JSON file or from a built-in preset.
mod config;
mod presets;
mod run;

pub use config::{anchor_paths, load_scenario, validate_scenario, ScenarioSpec};
pub use presets::{find_preset, PresetInputs, PRESETS};
pub use run::run_scenario;
