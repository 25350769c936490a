//! WGSL compilation and uniform-block reflection via naga.
//!
//! Uniforms are addressed by name, GL style. A program's uniform block is the
//! `var<uniform>` at `@group(0) @binding(0)`; each member of its struct is one
//! named uniform. A bare `f32`/`vecN<f32>` at that binding is a single uniform
//! named after the variable.

use std::collections::HashMap;

use naga::valid::{Capabilities, ValidationFlags, Validator};

/// Uniform member placement inside the uniform buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct UniformField {
    pub offset: u32,
    pub components: u8,
}

/// Reflected uniform block of a linked program.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniformBlock {
    /// Size in bytes, rounded up to 16.
    pub size: u32,
    pub fields: HashMap<String, UniformField>,
}

/// Parses and validates WGSL, returning the diagnostic on failure.
pub(crate) fn compile(source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    Ok(module)
}

/// Name of the first entry point for `stage`.
pub(crate) fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> Option<String> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage)
        .map(|ep| ep.name.clone())
}

fn float_components(inner: &naga::TypeInner) -> Option<u8> {
    match *inner {
        naga::TypeInner::Scalar(naga::Scalar {
            kind: naga::ScalarKind::Float,
            width: 4,
        }) => Some(1),
        naga::TypeInner::Vector {
            size,
            scalar:
                naga::Scalar {
                    kind: naga::ScalarKind::Float,
                    width: 4,
                },
        } => Some(size as u8),
        _ => None,
    }
}

/// Reflects the uniform block at group 0, binding 0.
///
/// Members that are not float scalars/vectors are skipped; they can still be
/// declared but never set by name.
pub(crate) fn uniform_block(module: &naga::Module) -> UniformBlock {
    let Some(var) = module.global_variables.iter().map(|(_, v)| v).find(|v| {
        v.space == naga::AddressSpace::Uniform
            && v.binding
                .as_ref()
                .is_some_and(|b| b.group == 0 && b.binding == 0)
    }) else {
        return UniformBlock::default();
    };

    let mut block = UniformBlock::default();
    match &module.types[var.ty].inner {
        naga::TypeInner::Struct { members, span } => {
            for member in members {
                let (Some(name), Some(components)) = (
                    member.name.as_ref(),
                    float_components(&module.types[member.ty].inner),
                ) else {
                    continue;
                };
                block.fields.insert(
                    name.clone(),
                    UniformField {
                        offset: member.offset,
                        components,
                    },
                );
            }
            block.size = *span;
        }
        other => {
            if let (Some(name), Some(components)) = (var.name.as_ref(), float_components(other)) {
                block.fields.insert(
                    name.clone(),
                    UniformField {
                        offset: 0,
                        components,
                    },
                );
                block.size = components as u32 * 4;
            }
        }
    }

    block.size = block.size.max(16).next_multiple_of(16);
    block
}
