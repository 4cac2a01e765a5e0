pub mod manager;
pub mod types;

pub use manager::PatternMatcher;
pub use types::{compile_pattern, CompiledPattern, CompiledResponse, PatternRecord, ResponseRecord};
