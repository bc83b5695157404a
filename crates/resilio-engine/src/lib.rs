pub mod actions;
pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod fallback;
pub mod pack;
pub mod resolution;
pub mod setup;
pub mod store;

pub use resilio_common::config::schema;
pub use resilio_common::{
    AxNode, DriverError, ElementHandle, ImageFormat, Origin, SelectChoice, SelectorEntry,
};
