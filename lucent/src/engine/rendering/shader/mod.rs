//! Shader compilation and per-stage reflection.
//!
//! A [`ShaderCompiler`] turns WGSL or GLSL source (or SPIR-V bytecode) into the form the render
//! device consumes and reflects what the entry point needs: vertex inputs, constant buffers
//! grouped by [`ShaderParameterGroup`], textures mapped to [`TextureUnit`]s and unordered access
//! views. The result is an immutable [`CompiledShader`].
//!
//! Shaders follow a naming convention the reflection depends on:
//!
//! - constant buffers are structs named after a parameter group, optionally suffixed with the
//!   stage (`MaterialPS`), and their members carry a `c` prefix (`cMatDiffColor`)
//! - textures carry an `s` prefix and use one of the known texture names (`sDiffMap`), a separate
//!   sampler for them is named `sDiffMap_sampler` or `sDiffMapSampler`
//! - storage textures carry a `u` prefix (`uOutput`)
//! - vertex inputs are named after their semantic (`iPos`, `iTexCoord1`)
//!
//! ```rust
//! use lucent::rendering::defs::ShaderType;
//! use lucent::rendering::shader::{ShaderCompileOptions, ShaderCompiler, ShaderSource};
//!
//! let source = ShaderSource::Wgsl(
//!     r#"
//!     struct Material { cMatDiffColor: vec4<f32> }
//!     @group(0) @binding(0) var<uniform> material: Material;
//!
//!     @fragment
//!     fn main() -> @location(0) vec4<f32> {
//!         return material.cMatDiffColor;
//!     }
//!     "#
//!     .to_string(),
//! );
//!
//! let options = ShaderCompileOptions::builder()
//!     .name("unlit")
//!     .stage(ShaderType::Pixel)
//!     .build();
//!
//! let shader = ShaderCompiler::new().compile(&source, &options).unwrap();
//! assert!(shader.reflection().parameter("MatDiffColor").is_some());
//! ```
//!
//! [`ShaderParameterGroup`]: crate::rendering::defs::ShaderParameterGroup
//! [`TextureUnit`]: crate::rendering::defs::TextureUnit

mod compiler;
mod convert;
mod error;
pub mod names;
mod preprocessor;
mod reflector;

pub use compiler::*;
pub use error::*;
pub use preprocessor::{PreprocessError, Preprocessor};
pub use reflector::*;

use crate::rendering::defs::ShaderType;
use bon::Builder;
use lucent_utils::{combine_hash, string_hash};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSource {
    Wgsl(String),
    Glsl(String),
    /// Precompiled SPIR-V. Only reflected, never preprocessed.
    SpirV(Vec<u32>),
}

/// Form of the compiled shader handed to the render device.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ShaderTarget {
    #[default]
    Wgsl,
    SpirV,
    /// HLSL shader model 5.0 source, cross-compiled through naga.
    Hlsl5,
}

impl ShaderTarget {
    pub const fn name(self) -> &'static str {
        match self {
            ShaderTarget::Wgsl => "WGSL",
            ShaderTarget::SpirV => "SPIR-V",
            ShaderTarget::Hlsl5 => "HLSL",
        }
    }
}

impl Display for ShaderTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered define name to value map. Ordering keeps the cache hash independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines(BTreeMap<String, String>);

impl ShaderDefines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ShaderDefines {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder)]
pub struct ShaderCompileOptions {
    #[builder(into)]
    pub name: String,
    pub stage: ShaderType,
    #[builder(into, default = String::from("main"))]
    pub entry_point: String,
    #[builder(default)]
    pub defines: ShaderDefines,
    #[builder(default)]
    pub target: ShaderTarget,
    /// Keeps names and debug info in the output. Defaults to on in debug builds.
    #[builder(default = cfg!(debug_assertions))]
    pub debug_info: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderBytecode {
    Wgsl(String),
    SpirV(Vec<u32>),
    Hlsl(String),
}

impl ShaderBytecode {
    pub fn target(&self) -> ShaderTarget {
        match self {
            ShaderBytecode::Wgsl(_) => ShaderTarget::Wgsl,
            ShaderBytecode::SpirV(_) => ShaderTarget::SpirV,
            ShaderBytecode::Hlsl(_) => ShaderTarget::Hlsl5,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ShaderBytecode::Wgsl(text) | ShaderBytecode::Hlsl(text) => Some(text),
            ShaderBytecode::SpirV(_) => None,
        }
    }

    fn content_hash(&self) -> u64 {
        match self {
            ShaderBytecode::Wgsl(text) | ShaderBytecode::Hlsl(text) => string_hash(text),
            ShaderBytecode::SpirV(words) => {
                let mut hash = words.len() as u64;
                for word in words {
                    combine_hash(&mut hash, *word as u64);
                }
                hash
            }
        }
    }
}

/// Immutable compiled form of one shader stage together with its reflection.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    name: String,
    stage: ShaderType,
    entry_point: String,
    bytecode: ShaderBytecode,
    reflection: StageReflection,
    diagnostics: String,
    hash: u64,
}

impl CompiledShader {
    pub(crate) fn new(
        options: &ShaderCompileOptions,
        bytecode: ShaderBytecode,
        reflection: StageReflection,
        diagnostics: String,
    ) -> Self {
        let mut hash = bytecode.content_hash();
        combine_hash(&mut hash, string_hash(&options.entry_point));
        combine_hash(&mut hash, options.stage as u64);

        Self {
            name: options.name.clone(),
            stage: options.stage,
            entry_point: options.entry_point.clone(),
            bytecode,
            reflection,
            diagnostics,
            hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderType {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn bytecode(&self) -> &ShaderBytecode {
        &self.bytecode
    }

    pub fn reflection(&self) -> &StageReflection {
        &self.reflection
    }

    /// Non-fatal compiler output, empty for clean compiles.
    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    /// Hash of the compiled output, entry point and stage. Stable across runs.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}
