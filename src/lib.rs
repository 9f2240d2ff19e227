pub mod error;
pub mod io;
pub mod rendering;
pub mod settings;
