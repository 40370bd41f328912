pub mod image;
pub mod update;

pub use image::*;
pub use update::*;
