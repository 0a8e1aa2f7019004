//! Pipeline state objects.
//!
//! A [`PipelineStateDesc`] describes a whole graphics or compute pipeline in engine terms. The
//! [`PipelineStateCache`] turns it into a [`PipelineState`]: it corrects the output formats
//! against what is actually bound, resolves the vertex input layout, translates every state enum
//! through the tables in [`translate`] and reflects the shaders into one
//! [`ShaderProgramReflection`](crate::rendering::reflection::ShaderProgramReflection).

mod cache;
mod desc;
mod error;
mod state;
pub mod translate;

pub use cache::*;
pub use desc::*;
pub use error::*;
pub use state::*;
