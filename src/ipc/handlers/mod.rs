pub mod calc;
pub mod core;
pub mod datasets;
pub mod reports;
pub mod settings;
