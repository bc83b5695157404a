pub mod element;
pub mod entry;

pub mod config {
    pub mod schema;
}

pub mod error {
    pub mod driver_error;
}

pub use element::{AxNode, ElementHandle, ImageFormat, SelectChoice};
pub use entry::{Origin, SelectorEntry};
pub use error::driver_error::DriverError;
