//! Text fixups applied to cross-compiled HLSL.

use crate::rendering::shader::names::sampler_texture_name;

const SAMPLER_TYPES: [&str; 2] = ["SamplerState", "SamplerComparisonState"];
const PIXEL_INPUT_STRUCT: &str = "struct FragmentInput_";
const PIXEL_POSITION_MEMBER: &str = "    float4 gl_Position : SV_Position;";

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replaces whole-identifier occurrences of `from` with `to`.
fn replace_identifier(source: &str, from: &str, to: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(pos) = rest.find(from) {
        let before_ok = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !is_identifier_char(c));
        let after = &rest[pos + from.len()..];
        let after_ok = after.chars().next().is_none_or(|c| !is_identifier_char(c));

        result.push_str(&rest[..pos]);
        result.push_str(if before_ok && after_ok { to } else { from });
        rest = after;
    }

    result.push_str(rest);
    result
}

fn declared_samplers(source: &str) -> Vec<&str> {
    source
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let rest = SAMPLER_TYPES
                .iter()
                .find_map(|ty| line.strip_prefix(ty))?
                .trim_start();
            let end = rest.find(|c: char| !is_identifier_char(c)).unwrap_or(rest.len());
            Some(&rest[..end]).filter(|name| !name.is_empty())
        })
        .collect()
}

/// Renames separately declared samplers to `{texture}_sampler`, the combined-sampler name the
/// resource binding expects. Returns the number of renamed samplers.
pub(crate) fn merge_split_samplers(source: &str) -> (String, usize) {
    let mut output = source.to_string();
    let mut renamed = 0;

    for sampler in declared_samplers(source) {
        let Some(texture) = sampler_texture_name(sampler) else {
            continue;
        };
        let combined = format!("{texture}_sampler");
        if combined != sampler {
            output = replace_identifier(&output, sampler, &combined);
            renamed += 1;
        }
    }

    (output, renamed)
}

/// Adds an `SV_Position` member to the generated pixel shader input struct when the cross
/// compiler left it out, so the signature still lines up with the vertex shader output.
pub(crate) fn inject_pixel_position(source: &str) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.trim_start().starts_with(PIXEL_INPUT_STRUCT))?;
    let end = start + lines[start..].iter().position(|line| line.trim() == "};")?;

    if lines[start..end].iter().any(|line| line.contains("SV_Position")) {
        return None;
    }

    let body = if lines[start].contains('{') { start + 1 } else { start + 2 };
    let mut output = String::with_capacity(source.len() + PIXEL_POSITION_MEMBER.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        if i == body {
            output.push_str(PIXEL_POSITION_MEMBER);
            output.push('\n');
        }
        output.push_str(line);
        output.push('\n');
    }

    Some(output)
}
