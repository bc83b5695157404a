pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
pub use resilio_common::config::schema::*;
