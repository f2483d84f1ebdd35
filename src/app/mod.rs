pub mod presets;
pub mod sow_generator;
