// src/config/mod.rs
pub mod preferences;
pub mod settings;

pub use preferences::{DisplayMode, Preferences};
pub use settings::Settings;
