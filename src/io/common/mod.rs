pub mod loader;
pub mod timeout;
pub mod uri;
