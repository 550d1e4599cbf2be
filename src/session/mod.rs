pub mod defaults;
pub mod knowledge;
pub mod merge;
pub mod types;
