use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use ultraviolet::Vec2;

use crate::{
    config::ImporterConfig,
    shader_types::{parameter_prefix, shader_type_id, NODE_ID_PREFIX, SHADER_COUNT_PARAMETER},
};

use super::{
    parse_signature, CodeIndex, CompileError, Direction, ExpressionId, FragmentError,
    GraphEditor, HlslTranslator, InputShaderInfo, ParameterKind, ParameterNode, ValueType,
    VectorMask, UI_DELTA_X, UI_DELTA_Y,
};

const TEX_ALPHA_PREFIX: &str = "tex_alpha_";
const SAMPLER_POSTFIX: &str = "Sampler";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputType {
    Float1,
    Float2,
    Float3,
    Float4,
}

impl OutputType {
    pub fn value_type(self) -> ValueType {
        match self {
            OutputType::Float1 => ValueType::Float1,
            OutputType::Float2 => ValueType::Float2,
            OutputType::Float3 => ValueType::Float3,
            OutputType::Float4 => ValueType::Float4,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputSlot {
    pub name: String,
    pub output_type: OutputType,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomInput {
    pub name: String,
    pub expression: Option<ExpressionId>,
}

impl CustomInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: None,
        }
    }
}

/// The property that was edited, for [`ShaderFragmentNode::post_edit_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyChange {
    InputName,
    OutputName,
    /// The file path or slot count of an input shader.
    FilePath,
    MaxShaderNodes,
    /// Input shaders were added, removed or reordered.
    InputShaders,
    Inputs,
    OutputSlots,
}

static FRAME_STAMP: AtomicU64 = AtomicU64::new(0);

fn next_frame_stamp() -> String {
    (FRAME_STAMP.fetch_add(1, Ordering::Relaxed) + 1).to_string()
}

struct InParameter {
    name: String,
    alpha_variable: Option<String>,
}

/// Material expression that dispatches between shader fragments at runtime.
#[derive(Clone, Debug)]
pub struct ShaderFragmentNode {
    pub description: String,
    /// Generated body of the implementation function.
    pub code: String,
    pub inputs: Vec<CustomInput>,
    pub output_slots: Vec<OutputSlot>,
    pub input_shaders: Vec<InputShaderInfo>,
    /// How many shader nodes a material can dispatch.
    pub max_shader_nodes: u32,
    /// Searched for fragments whose configured path cannot be read.
    pub fallback_dir: Option<PathBuf>,
    node_declaration: String,
    old_input_shaders: Vec<InputShaderInfo>,
    frame_stamp: Option<String>,
    output_results: Vec<Option<CodeIndex>>,
}

impl Default for ShaderFragmentNode {
    fn default() -> Self {
        let output_slots = [
            ("output_diffuse", OutputType::Float3),
            ("output_specular", OutputType::Float1),
            ("output_emissive", OutputType::Float4),
            ("output_roughness", OutputType::Float1),
        ]
        .into_iter()
        .map(|(name, output_type)| OutputSlot {
            name: name.to_string(),
            output_type,
        })
        .collect();

        Self {
            description: "CustomMultiOut".to_string(),
            code: "1".to_string(),
            inputs: vec![CustomInput::new(SHADER_COUNT_PARAMETER)],
            output_slots,
            input_shaders: Vec::new(),
            max_shader_nodes: 0,
            fallback_dir: None,
            node_declaration: String::new(),
            old_input_shaders: Vec::new(),
            frame_stamp: None,
            output_results: Vec::new(),
        }
    }
}

impl ShaderFragmentNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node that searches the configured fallback directory for missing fragments.
    pub fn from_config(config: &ImporterConfig) -> Self {
        Self {
            fallback_dir: config.fragment_fallback_dir.clone(),
            ..Self::default()
        }
    }

    pub fn node_declaration(&self) -> &str {
        &self.node_declaration
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|input| input.name.as_str())
    }

    /// Applies an edit of the node's properties, regenerating what depends on it.
    pub fn post_edit_change(
        &mut self,
        change: PropertyChange,
        editor: &mut dyn GraphEditor,
    ) -> Result<(), FragmentError> {
        match change {
            PropertyChange::InputName => {
                for input in &mut self.inputs {
                    input.name.retain(|c| c != ' ');
                }
            }
            PropertyChange::OutputName => {
                for slot in &mut self.output_slots {
                    slot.name.retain(|c| c != ' ');
                }
            }
            PropertyChange::FilePath => {
                let changed = (0..self.input_shaders.len()).find(|index| {
                    self.old_input_shaders
                        .get(*index)
                        .map_or(true, |old| !old.same_source(&self.input_shaders[*index]))
                });
                if let Some(index) = changed {
                    let result = self.import_shader(index, editor);
                    if result.is_ok() {
                        self.create_shader_body();
                    }
                    self.old_input_shaders
                        .resize_with(self.input_shaders.len(), Default::default);
                    self.old_input_shaders[index] = self.input_shaders[index].clone();
                    return result;
                }
            }
            PropertyChange::MaxShaderNodes => {
                self.modify_shader_node_inputs(editor);
                self.create_shader_body();
            }
            PropertyChange::InputShaders => {
                self.old_input_shaders = self.input_shaders.clone();
            }
            PropertyChange::Inputs | PropertyChange::OutputSlots => editor.reconstruct(),
        }
        Ok(())
    }

    /// Deletes the contiguous run of inputs whose names match, and their nodes.
    ///
    /// Returns where the next generated node should go.
    fn pre_delete_inputs(
        &mut self,
        matches: impl Fn(&str) -> bool,
        nodes_per_row: u32,
        editor: &mut dyn GraphEditor,
    ) -> Vec2 {
        let start = self.inputs.iter().position(|input| matches(&input.name));
        if let Some(start) = start {
            let end = self.inputs[start..]
                .iter()
                .position(|input| !matches(&input.name))
                .map_or(self.inputs.len(), |length| start + length);
            let removed: Vec<_> = self
                .inputs
                .drain(start..end)
                .filter_map(|input| input.expression)
                .collect();
            editor.delete_nodes(&removed);
        }

        let own = editor.node_position(None);
        let x = own.x - UI_DELTA_X * (nodes_per_row + 1) as f32;
        let y = match self.inputs.iter().rev().find_map(|input| input.expression) {
            Some(last) => editor.node_position(Some(last)).y + UI_DELTA_Y,
            None => own.y,
        };
        Vec2::new(x, y)
    }

    fn post_add_inputs(&mut self, created: &[(String, ExpressionId)], editor: &mut dyn GraphEditor) {
        editor.reconstruct();
        for (name, expression) in created {
            editor.connect(*expression, name);
            if let Some(input) = self.inputs.iter_mut().find(|input| &input.name == name) {
                input.expression = Some(*expression);
            }
        }
    }

    fn create_parameter(
        &mut self,
        editor: &mut dyn GraphEditor,
        name: String,
        kind: ParameterKind,
        position: Vec2,
    ) -> Option<(String, ExpressionId)> {
        let expression = editor.create_parameter_node(ParameterNode {
            name: name.clone(),
            kind,
            position,
        })?;
        self.inputs.push(CustomInput::new(name.clone()));
        Some((name, expression))
    }

    /// Reads the fragment of input shader `index` and creates its parameters.
    ///
    /// A rejected fragment leaves the generated code and parameters as they were.
    pub fn import_shader(
        &mut self,
        index: usize,
        editor: &mut dyn GraphEditor,
    ) -> Result<(), FragmentError> {
        let shader_info = self
            .input_shaders
            .get(index)
            .ok_or(FragmentError::NoSuchShader(index))?;
        let (source, source_path) = shader_info.load_source(self.fallback_dir.as_deref())?;
        let signature = parse_signature(&source)?
            .ok_or_else(|| FragmentError::NoDeclaration(source_path.clone()))?;

        let shader_type = signature.function_name.clone();
        let type_id = shader_type_id(&shader_type)
            .ok_or_else(|| FragmentError::UnknownShaderType(shader_type.clone()))?;
        let duplicate = self
            .input_shaders
            .iter()
            .enumerate()
            .any(|(other, info)| other != index && info.shader_type == shader_type);
        if duplicate {
            return Err(FragmentError::DuplicateShaderType(shader_type));
        }

        self.input_shaders[index].shader_file_path = source_path;
        let previous_type = std::mem::replace(&mut self.input_shaders[index].shader_type, shader_type.clone());
        self.input_shaders[index].texture_parameters.clear();
        let count = self.input_shaders[index].max_shader_count;
        if let Some(previous_id) = shader_type_id(&previous_type).filter(|id| *id != type_id) {
            let previous_prefix = parameter_prefix(previous_id);
            self.pre_delete_inputs(|name| is_type_parameter(name, &previous_prefix), count, editor);
        }
        let input_prefix = parameter_prefix(type_id);
        let mut ui_position =
            self.pre_delete_inputs(|name| is_type_parameter(name, &input_prefix), count, editor);

        let count = count.max(1);
        self.input_shaders[index].max_shader_count = count;

        let mut created = Vec::new();
        let mut call_parameters = Vec::new();
        let mut in_parameters: Vec<InParameter> = Vec::new();
        let mut texture_parameters = Vec::new();
        let mut variable_declaration = String::new();
        let mut output_count = 0;

        for parameter in &signature.parameters {
            let mut ty = parameter.ty.clone();
            if parameter.direction == Some(Direction::Out) {
                let postfix = match ty.as_str() {
                    "float3" => ".xyz",
                    "float2" => ".xy",
                    "float" => ".x",
                    _ => "",
                };
                call_parameters.push(format!("outputs[i][{}]{}", output_count, postfix));
                output_count += 1;
                continue;
            }

            let mut input_parameter = format!("{}{}", input_prefix, parameter.name);
            if parameter.direction == Some(Direction::In) {
                in_parameters.push(InParameter {
                    name: input_parameter.clone(),
                    alpha_variable: None,
                });
            } else if let Some(target) = parameter.name.strip_prefix(TEX_ALPHA_PREFIX) {
                let target = format!("{}{}", input_prefix, target);
                for in_parameter in in_parameters.iter_mut().filter(|p| p.name == target) {
                    in_parameter.alpha_variable = Some(input_parameter.clone());
                }
            }

            let mut position = ui_position;
            let mut slot_names = Vec::new();
            let slot_name = |slot: u32| format!("{}{}", input_parameter, slot);
            if ty == "float" || ty == "int" {
                for slot in 0..count {
                    position.x += UI_DELTA_X;
                    let kind = ParameterKind::Scalar {
                        default: parameter.default_scalar(),
                    };
                    if let Some(node) = self.create_parameter(editor, slot_name(slot), kind, position) {
                        slot_names.push(node.0.clone());
                        created.push(node);
                    }
                }
            } else if ty.starts_with("float") {
                // The alpha of an `in` vector encodes the producer feeding it, -1 for none.
                let linkable = in_parameters.last().is_some_and(|p| p.name == input_parameter);
                if linkable {
                    ty = "float4".to_string();
                }
                for slot in 0..count {
                    position.x += UI_DELTA_X;
                    let mut default = [0.0; 4];
                    if linkable {
                        default[3] = -1.0;
                    }
                    for (component, value) in default.iter_mut().zip(&parameter.defaults) {
                        *component = *value;
                    }
                    let mask = match ty.as_str() {
                        "float3" => VectorMask::Rgb,
                        "float2" => VectorMask::Rg,
                        _ => VectorMask::All,
                    };
                    let kind = ParameterKind::Vector { default, mask };
                    if let Some(node) = self.create_parameter(editor, slot_name(slot), kind, position) {
                        slot_names.push(node.0.clone());
                        created.push(node);
                    }
                }
            } else if ty.starts_with("Texture2D") {
                for slot in 0..count {
                    position.x += UI_DELTA_X;
                    let kind = ParameterKind::TextureObject;
                    if let Some(node) = self.create_parameter(editor, slot_name(slot), kind, position) {
                        created.push(node);
                    }
                }
                texture_parameters.push(parameter.name.clone());
                input_parameter = slot_name(count - 1);
            } else if ty.starts_with("SamplerState") {
                let base = input_parameter
                    .strip_suffix(SAMPLER_POSTFIX)
                    .unwrap_or(&input_parameter);
                input_parameter = format!("{}0{}", base, SAMPLER_POSTFIX);
            } else {
                continue;
            }

            if ty == "Texture2D" || ty == "SamplerState" {
                call_parameters.push(input_parameter);
            } else {
                variable_declaration += &format!(
                    "{} {}[] = {{{}}};\n",
                    ty,
                    input_parameter,
                    slot_names.join(",")
                );
                call_parameters.push(format!("{}[shaderIndex]", input_parameter));
            }
            ui_position.y += UI_DELTA_Y;
        }

        self.post_add_inputs(&created, editor);
        editor.update_material();

        let mut function_body = format!("\tcase {}:\n", type_id);
        for in_parameter in &in_parameters {
            function_body += &in_parameter_init(in_parameter);
        }
        function_body += &format!("\tf.{}({});\n", shader_type, call_parameters.join(","));
        function_body += "\tbreak;\n";

        let shader_info = &mut self.input_shaders[index];
        shader_info.shader_function_body = function_body;
        shader_info.parameter_declaration = variable_declaration;
        shader_info.texture_parameters = texture_parameters;
        log::info!(
            "Imported shader fragment {} from {:?}",
            shader_info.shader_type,
            shader_info.shader_file_path
        );
        Ok(())
    }

    /// Recreates one `ess_nodeID` input per dispatchable node.
    pub fn modify_shader_node_inputs(&mut self, editor: &mut dyn GraphEditor) {
        let mut position = self.pre_delete_inputs(is_node_id_input, 1, editor);
        let mut created = Vec::new();
        for index in 0..self.max_shader_nodes {
            let name = format!("{}{}", NODE_ID_PREFIX, index);
            let kind = ParameterKind::Scalar { default: 0.0 };
            created.extend(self.create_parameter(editor, name, kind, position));
            position.y += UI_DELTA_Y;
        }
        self.post_add_inputs(&created, editor);
        editor.update_material();

        let names: Vec<_> = created.iter().map(|(name, _)| name.as_str()).collect();
        self.node_declaration = format!("uint nodeId[] = {{ {} }};\n", names.join(","));
    }

    /// Regenerates the dispatch code from the imported fragments.
    pub fn create_shader_body(&mut self) {
        let mut code = format!(
            "float4 outputs[{}][4];\n\
             {}\
             for (int i = 0; i < ess_shaderCount; ++i)\n\
             {{\n\
             \tfor (int j = 0; j < 4; ++j)\n\
             \t{{\n\
             \t\toutputs[i][j] = 0;\n\
             \t}}\n\
             }}\n",
            self.max_shader_nodes, self.node_declaration
        );
        for shader_info in &self.input_shaders {
            code += &shader_info.parameter_declaration;
        }
        code += "Functions f;\n\
                 for (i = 0; i < ess_shaderCount; ++i)\n\
                 {\n\
                 \tuint nodeType = nodeId[i] / 10;\n\
                 \tshaderIndex = nodeId[i] % 10;\n\
                 \tswitch (nodeType)\n\
                 \t{\n";
        for shader_info in &self.input_shaders {
            code += &shader_info.shader_function_body;
        }
        code += "\tdefault:\n\
                 \tbreak;\n\
                 \t}\n\
                 }\n\
                 float lastIndex = ess_shaderCount - 1;\n\
                 float3 output_diffuse = outputs[lastIndex][0].xyz;\n\
                 output_specular = outputs[lastIndex][0].w;\n\
                 output_emissive = outputs[lastIndex][1];\n\
                 output_roughness = outputs[lastIndex][1].w;\n\
                 return output_diffuse;\n";
        self.code = code;
    }

    /// Compiles one output. Outputs compiled in the same pass share one implementation.
    pub fn compile(
        &mut self,
        translator: &mut HlslTranslator,
        graph: &dyn GraphEditor,
        output_index: usize,
    ) -> Result<CodeIndex, CompileError> {
        let cached = self
            .frame_stamp
            .as_deref()
            .is_some_and(|stamp| translator.check_frame_stamp(stamp));
        if !cached {
            let frame_stamp = next_frame_stamp();
            self.output_results.clear();

            let mut compiled_inputs = Vec::with_capacity(self.inputs.len());
            for (index, input) in self.inputs.iter().enumerate() {
                if input.name.is_empty() {
                    compiled_inputs.push(None);
                    continue;
                }
                let expression = input.expression.ok_or_else(|| CompileError::MissingInput {
                    description: self.description.clone(),
                    index: index + 1,
                    name: input.name.clone(),
                })?;
                compiled_inputs.push(Some(compile_parameter(translator, graph, expression)?));
            }

            self.output_results = translator.custom_expression(self, &compiled_inputs, &frame_stamp);
            self.frame_stamp = Some(frame_stamp);
        }

        self.output_results
            .get(output_index)
            .copied()
            .flatten()
            .ok_or(CompileError::NoSuchOutput(output_index))
    }
}

/// `e{type}{parameter}{slot}`. Parameter names never start with a digit, so `e1` does not
/// claim the inputs of type 10.
fn is_type_parameter(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| {
        rest.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && rest.ends_with(|c: char| c.is_ascii_digit())
    })
}

fn is_node_id_input(name: &str) -> bool {
    name.strip_prefix(NODE_ID_PREFIX)
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

fn compile_parameter(
    translator: &mut HlslTranslator,
    graph: &dyn GraphEditor,
    expression: ExpressionId,
) -> Result<CodeIndex, CompileError> {
    let node = graph
        .parameter_node(expression)
        .ok_or(CompileError::UnknownExpression(expression))?;
    Ok(match &node.kind {
        ParameterKind::Scalar { default } => translator.scalar_parameter(&node.name, *default),
        ParameterKind::Vector { default, mask } => {
            let vector = translator.vector_parameter(&node.name, *default);
            match mask {
                VectorMask::All => vector,
                VectorMask::Rgb => translator.add_code_chunk(ValueType::Float3, format!("{}.rgb", node.name)),
                VectorMask::Rg => translator.add_code_chunk(ValueType::Float2, format!("{}.rg", node.name)),
            }
        }
        ParameterKind::TextureObject => translator.texture_parameter(&node.name),
    })
}

/// Pulls a linked producer's output into an `in` vector before the call.
fn in_parameter_init(in_parameter: &InParameter) -> String {
    let name = &in_parameter.name;
    let alpha = in_parameter
        .alpha_variable
        .as_ref()
        .map(|alpha| format!("\t\t{}[shaderIndex] = outputs[output_node_index][output_index].w;\n", alpha))
        .unwrap_or_default();
    format!(
        "\tif ({0}[shaderIndex].w >= 0)\n\
         \t{{\n\
         \t\tint output_node_index = {0}[shaderIndex].w / 10;\n\
         \t\tint output_index = {0}[shaderIndex].w % 10;\n\
         \t\t{0}[shaderIndex].xyz = outputs[output_node_index][output_index].xyz;\n\
         {1}\
         \t}}\n",
        name, alpha
    )
}
