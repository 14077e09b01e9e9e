pub mod queue;
pub mod settings;
