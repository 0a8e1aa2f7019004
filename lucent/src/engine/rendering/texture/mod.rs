//! Textures and the views rendered into them.

mod error;
mod params;
mod raw;
mod render_target;
mod uav;

pub use error::*;
pub use params::*;
pub use raw::*;
pub use render_target::*;
pub use uav::*;
