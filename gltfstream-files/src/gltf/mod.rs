pub mod extensions;
pub mod reader;
pub mod types;
