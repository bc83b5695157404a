//! Chromium implementation of the engine's `PageDriver`, over CDP.

mod ax;
pub mod cdp;
pub mod page;
mod scripts;

pub use page::HeadlessPage;
