use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use crate::{
    scene_db::{NodeAccessor, ParamValue, SceneDatabase, SceneNode, Tag},
    shader_types::{
        shader_type_id, BITMAP_SHADER, MAX_SHADER_SLOTS, NODE_ID_PREFIX, SHADER_COUNT_PARAMETER,
        UV_GENERATOR_SHADER,
    },
};

use super::{DynamicMaterialInstance, MaterialError, ParameterRegistry, TextureCache};

/// Applies scene materials to dynamic material instances.
///
/// The parameter layout is taken from the first instance passed in, so every instance
/// has to come from the same material.
#[derive(Default)]
pub struct MaterialImporter {
    registry: Option<ParameterRegistry>,
    textures: TextureCache,
}

impl MaterialImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> Option<&ParameterRegistry> {
        self.registry.as_ref()
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// Walks the shader graph below the material's surface shader.
    ///
    /// Returns the node ids in dispatch order: every node comes after the nodes feeding it,
    /// so the surface shader is last.
    pub fn apply_material(
        &mut self,
        db: &dyn SceneDatabase,
        material_name: &str,
        instance: &mut DynamicMaterialInstance,
    ) -> Result<Vec<u32>, MaterialError> {
        let material = db
            .find_node(material_name)
            .and_then(|tag| NodeAccessor::new(db, tag))
            .ok_or_else(|| MaterialError::MissingMaterial(material_name.to_string()))?;
        let root = match material.find_param("surface_shader") {
            Some(ParamValue::Node(Some(tag))) | Some(ParamValue::Link { node: Some(tag), .. }) => *tag,
            _ => return Err(MaterialError::MissingSurfaceShader(material_name.to_string())),
        };

        let registry = self
            .registry
            .get_or_insert_with(|| ParameterRegistry::from_instance(instance));
        let mut walker = GraphWalker {
            db,
            registry,
            textures: &mut self.textures,
            instance,
            node_ids: HashMap::new(),
            in_progress: HashSet::new(),
            type_counts: HashMap::new(),
            visit_order: Vec::new(),
        };
        walker.visit(root);
        walker.write_dispatch_order();
        Ok(walker.visit_order)
    }
}

struct GraphWalker<'a> {
    db: &'a dyn SceneDatabase,
    registry: &'a ParameterRegistry,
    textures: &'a mut TextureCache,
    instance: &'a mut DynamicMaterialInstance,
    node_ids: HashMap<Tag, u32>,
    in_progress: HashSet<Tag>,
    type_counts: HashMap<u32, u32>,
    visit_order: Vec<u32>,
}

impl GraphWalker<'_> {
    fn visit(&mut self, tag: Tag) -> Option<u32> {
        if let Some(id) = self.node_ids.get(&tag) {
            return Some(*id);
        }
        if !self.in_progress.insert(tag) {
            log::debug!("Shader graph cycle through {:?}", tag);
            return None;
        }
        let id = self.visit_new(tag);
        self.in_progress.remove(&tag);
        id
    }

    fn visit_new(&mut self, tag: Tag) -> Option<u32> {
        let node = NodeAccessor::new(self.db, tag)?;
        let Some(type_id) = shader_type_id(&node.desc) else {
            log::debug!("Skipping shader {} of unknown type {}", node.unique_name, node.desc);
            return None;
        };

        for param in &node.params {
            if let ParamValue::Link {
                node: Some(input), ..
            } = param.value
            {
                self.visit(input);
            }
        }

        let slot = self.type_counts.entry(type_id).or_insert(0);
        if *slot >= MAX_SHADER_SLOTS {
            log::warn!(
                "Too many {} shaders, skipping {}",
                node.desc,
                node.unique_name
            );
            return None;
        }
        let id = type_id * 10 + *slot;
        let slot_index = *slot;
        *slot += 1;
        self.node_ids.insert(tag, id);

        self.write_parameters(&node, type_id, slot_index);
        self.visit_order.push(id);
        Some(id)
    }

    fn write_parameters(&mut self, node: &SceneNode, type_id: u32, slot: u32) {
        for param in &node.params {
            let name = format!("e{}{}{}", type_id, param.name, slot);
            match &param.value {
                ParamValue::Int(value) => self.set_scalar(&name, *value as f32),
                ParamValue::Scalar(value) => self.set_scalar(&name, *value),
                ParamValue::Bool(value) => self.set_scalar(&name, if *value { 1.0 } else { 0.0 }),
                ParamValue::Index(value) => self.set_scalar(&name, *value as f32),
                ParamValue::Vector([x, y, z]) | ParamValue::Color([x, y, z, _]) => {
                    if let Some(vector) = self.registry.vector_mut(self.instance, &name) {
                        vector[..3].copy_from_slice(&[*x, *y, *z]);
                    }
                }
                ParamValue::Link { node: input, output } => {
                    // The encoded link is decoded with `% 10` on the GPU.
                    if *output >= MAX_SHADER_SLOTS {
                        log::warn!(
                            "Output {} of the input to {} is out of range, leaving it unlinked",
                            output,
                            name
                        );
                        continue;
                    }
                    let producer = input.and_then(|input| self.node_ids.get(&input).copied());
                    match (producer, self.registry.vector_mut(self.instance, &name)) {
                        (Some(producer), Some(vector)) => {
                            vector[3] = (producer * 10 + output) as f32;
                        }
                        // An input that is not tagged yet keeps the default.
                        _ => log::debug!("Leaving {} unlinked", name),
                    }
                }
                ParamValue::Token(token) => self.write_token(node, &name, token),
                ParamValue::Matrix(_) | ParamValue::Node(_) | ParamValue::Array(_) => {}
            }
        }
    }

    fn write_token(&mut self, node: &SceneNode, name: &str, token: &str) {
        if node.desc == UV_GENERATOR_SHADER {
            match uv_channel(token) {
                Some(channel) => self.set_scalar(name, channel as f32),
                None => log::warn!("{} is not a texture channel in {}", token, node.unique_name),
            }
        } else if node.desc == BITMAP_SHADER {
            match self.textures.get_or_load(Path::new(token)) {
                Ok(texture) => {
                    if !self.registry.set_texture(self.instance, name, texture) {
                        log::debug!("Material has no texture parameter {}", name);
                    }
                }
                Err(err) => log::warn!("{}", err),
            }
        }
    }

    fn set_scalar(&mut self, name: &str, value: f32) {
        if !self.registry.set_scalar(self.instance, name, value) {
            log::debug!("Material has no scalar parameter {}", name);
        }
    }

    fn write_dispatch_order(&mut self) {
        let count = self.visit_order.len() as f32;
        self.set_scalar(SHADER_COUNT_PARAMETER, count);
        for (index, id) in self.visit_order.clone().into_iter().enumerate() {
            self.set_scalar(&format!("{}{}", NODE_ID_PREFIX, index), id as f32);
        }
    }
}

/// `uv2` and `2` both select channel 2.
fn uv_channel(token: &str) -> Option<u32> {
    let digits = token.trim_start_matches(|c: char| !c.is_ascii_digit());
    digits.parse().ok()
}
