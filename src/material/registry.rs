use std::{collections::HashMap, sync::Arc};

use super::TextureData;

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarParameter {
    pub name: String,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorParameter {
    pub name: String,
    pub value: [f32; 4],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureParameter {
    pub name: String,
    pub texture: Option<Arc<TextureData>>,
}

/// Parameter values of one material instance, laid out like the material it was created from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DynamicMaterialInstance {
    pub scalars: Vec<ScalarParameter>,
    pub vectors: Vec<VectorParameter>,
    pub textures: Vec<TextureParameter>,
}

impl DynamicMaterialInstance {
    pub fn scalar(&self, name: &str) -> Option<f32> {
        self.scalars
            .iter()
            .find(|parameter| parameter.name == name)
            .map(|parameter| parameter.value)
    }

    pub fn vector(&self, name: &str) -> Option<[f32; 4]> {
        self.vectors
            .iter()
            .find(|parameter| parameter.name == name)
            .map(|parameter| parameter.value)
    }

    pub fn texture(&self, name: &str) -> Option<&Arc<TextureData>> {
        self.textures
            .iter()
            .find(|parameter| parameter.name == name)?
            .texture
            .as_ref()
    }
}

/// Parameter name to table index, for instances of one material layout.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    scalars: HashMap<String, usize>,
    vectors: HashMap<String, usize>,
    textures: HashMap<String, usize>,
}

fn index_names<'a>(names: impl Iterator<Item = &'a String>) -> HashMap<String, usize> {
    names
        .enumerate()
        .map(|(index, name)| (name.clone(), index))
        .collect()
}

impl ParameterRegistry {
    pub fn from_instance(instance: &DynamicMaterialInstance) -> Self {
        Self {
            scalars: index_names(instance.scalars.iter().map(|p| &p.name)),
            vectors: index_names(instance.vectors.iter().map(|p| &p.name)),
            textures: index_names(instance.textures.iter().map(|p| &p.name)),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.scalars.len() + self.vectors.len() + self.textures.len()
    }

    /// Returns false if the material has no such parameter.
    pub fn set_scalar(&self, instance: &mut DynamicMaterialInstance, name: &str, value: f32) -> bool {
        match self
            .scalars
            .get(name)
            .and_then(|index| instance.scalars.get_mut(*index))
        {
            Some(parameter) => {
                parameter.value = value;
                true
            }
            None => false,
        }
    }

    pub fn vector_mut<'a>(
        &self,
        instance: &'a mut DynamicMaterialInstance,
        name: &str,
    ) -> Option<&'a mut [f32; 4]> {
        let index = *self.vectors.get(name)?;
        instance
            .vectors
            .get_mut(index)
            .map(|parameter| &mut parameter.value)
    }

    pub fn set_texture(
        &self,
        instance: &mut DynamicMaterialInstance,
        name: &str,
        texture: Arc<TextureData>,
    ) -> bool {
        match self
            .textures
            .get(name)
            .and_then(|index| instance.textures.get_mut(*index))
        {
            Some(parameter) => {
                parameter.texture = Some(texture);
                true
            }
            None => false,
        }
    }
}
