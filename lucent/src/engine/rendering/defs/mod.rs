//! Plain engine-level enums and descriptors shared by every part of the rendering core.
//!
//! None of these talk to the GPU. They are translated into native `wgpu` values by the pipeline
//! and texture code right before a device object gets created.

mod groups;
mod state;
mod texture;
mod vertex;

pub use groups::*;
pub use state::*;
pub use texture::*;
pub use vertex::*;
