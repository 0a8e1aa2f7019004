use crate::rendering::defs::ShaderType;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub(crate)))]
pub enum ShaderCompileError {
    #[snafu(display("Failed to preprocess shader '{name}' at line {line}: {reason}"))]
    Preprocess {
        name: String,
        line: usize,
        reason: String,
    },

    #[snafu(display("Failed to parse shader '{name}':\n{diagnostic}"))]
    Parse { name: String, diagnostic: String },

    #[snafu(display("Shader '{name}' failed validation:\n{diagnostic}"))]
    Validation { name: String, diagnostic: String },

    #[snafu(display("Failed to write {target} output for shader '{name}': {reason}"))]
    Write {
        name: String,
        target: &'static str,
        reason: String,
    },

    #[snafu(display("Shader '{name}' has no {stage} entry point named '{entry_point}'"))]
    MissingEntryPoint {
        name: String,
        stage: ShaderType,
        entry_point: String,
    },

    #[snafu(display("Shader '{name}' targets the {stage} stage, which cannot be compiled"))]
    UnsupportedStage { name: String, stage: ShaderType },

    #[snafu(display(
        "Shader '{name}' declares unknown constant buffer '{buffer}', expected one of Frame, Camera, Zone, Light, Material, Object or Custom"
    ))]
    UnknownConstantBuffer { name: String, buffer: String },

    #[snafu(display("Shader '{name}' samples unknown texture '{texture}'"))]
    UnknownTexture { name: String, texture: String },

    #[snafu(display("Shader '{name}' declares resource '{resource}' of an unsupported kind: {reason}"))]
    UnsupportedResource {
        name: String,
        resource: String,
        reason: &'static str,
    },
}
