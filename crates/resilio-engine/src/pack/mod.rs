pub mod definition;
pub mod loader;

pub use definition::SelectorPack;
pub use loader::{PackLoadError, PackLoader};
