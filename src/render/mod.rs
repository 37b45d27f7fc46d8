pub mod hud;

pub use hud::{distance_label, HudRenderer};
