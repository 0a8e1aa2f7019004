//! Rendering core built on top of `wgpu`.
//!
//! The pieces stack bottom-up:
//!
//! - [`shader`] compiles and reflects single stages, [`reflection`] merges them per program
//! - [`pipeline`] builds and caches pipeline states from declarative descriptors
//! - [`constant_buffer`] packs shader parameters into uniform buffers
//! - [`texture`] owns GPU textures with their views, resolves and mip chains
//! - [`draw_queue`] records draws by resource name and replays them into a [`device::RenderContext`]
//!
//! Everything talks to the GPU through the [`device::RenderDevice`] trait, so the same code runs
//! against `wgpu` and against the in-memory [`device::HeadlessDevice`].

pub mod constant_buffer;
pub mod defs;
pub mod device;
pub mod draw_queue;
pub mod pipeline;
pub mod reflection;
pub mod shader;
pub mod texture;
pub mod vertex_layout;
