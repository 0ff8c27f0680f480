/// Shader node descriptions that can be turned into material parameters, with their ids.
///
/// A visited node is tagged `id * 10 + slot`, so ids have to stay below `u32::MAX / 10`
/// and slots below 10.
pub const SHADER_TYPES: &[(&str, u32)] = &[
    ("max_ei_standard", 1),
    ("max_bitmap", 2),
    ("max_uv_generator", 3),
    ("max_color_correction", 4),
    ("max_mix", 5),
    ("max_normal_bump", 6),
    ("max_falloff", 7),
    ("max_checker", 8),
    ("max_noise", 9),
];

/// Shader nodes can be instantiated at most this often per material.
pub const MAX_SHADER_SLOTS: u32 = 10;

/// Number of dispatched shader nodes, written by the material walker.
pub const SHADER_COUNT_PARAMETER: &str = "ess_shaderCount";
/// `ess_nodeID{i}` holds the id of the i-th dispatched node.
pub const NODE_ID_PREFIX: &str = "ess_nodeID";

pub const BITMAP_SHADER: &str = "max_bitmap";
pub const UV_GENERATOR_SHADER: &str = "max_uv_generator";

pub fn shader_type_id(name: &str) -> Option<u32> {
    SHADER_TYPES
        .iter()
        .find(|(type_name, _)| *type_name == name)
        .map(|(_, id)| *id)
}

/// Prefix of every material parameter generated for a shader type.
pub fn parameter_prefix(type_id: u32) -> String {
    format!("e{}", type_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = SHADER_TYPES.iter().map(|(_, id)| *id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), SHADER_TYPES.len());
    }

    #[test]
    fn lookup() {
        assert_eq!(shader_type_id("max_bitmap"), Some(2));
        assert_eq!(shader_type_id("max_unknown"), None);
        assert_eq!(parameter_prefix(7), "e7");
    }
}
