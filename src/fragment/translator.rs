use thiserror::Error;

use super::{
    split_fragment, CustomInput, ExpressionId, InputShaderInfo, OutputType, ShaderFragmentNode,
};

pub type CodeIndex = usize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    #[error("Custom material {description} missing input {index} ({name})")]
    MissingInput {
        description: String,
        index: usize,
        name: String,
    },
    #[error("Expression {0:?} is not a parameter")]
    UnknownExpression(ExpressionId),
    #[error("There is no output {0}")]
    NoSuchOutput(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Float1,
    Float2,
    Float3,
    Float4,
    Texture2D,
    TextureCube,
}

impl ValueType {
    fn declaration(self, name: &str) -> String {
        match self {
            ValueType::Float1 => format!("MaterialFloat {}", name),
            ValueType::Float2 => format!("MaterialFloat2 {}", name),
            ValueType::Float3 => format!("MaterialFloat3 {}", name),
            ValueType::Float4 => format!("MaterialFloat4 {}", name),
            ValueType::Texture2D => format!("Texture2D {0}, SamplerState {0}Sampler ", name),
            ValueType::TextureCube => format!("TextureCube {0}, SamplerState {0}Sampler ", name),
        }
    }

    fn is_texture(self) -> bool {
        matches!(self, ValueType::Texture2D | ValueType::TextureCube)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderFrequency {
    Vertex,
    Domain,
    Pixel,
}

impl ShaderFrequency {
    fn parameters_type(self) -> &'static str {
        match self {
            ShaderFrequency::Vertex => "Vertex",
            ShaderFrequency::Domain => "Tessellation",
            ShaderFrequency::Pixel => "Pixel",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vector([f32; 4]),
    Texture,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformParameter {
    pub name: String,
    pub default: UniformValue,
    pub code: CodeIndex,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeChunk {
    pub ty: ValueType,
    pub code: String,
}

/// Collects the code of one material compile pass.
#[derive(Debug)]
pub struct HlslTranslator {
    frequency: ShaderFrequency,
    chunks: Vec<CodeChunk>,
    parameters: Vec<UniformParameter>,
    custom_expression_implementations: Vec<String>,
}

impl HlslTranslator {
    pub fn new(frequency: ShaderFrequency) -> Self {
        Self {
            frequency,
            chunks: Vec::new(),
            parameters: Vec::new(),
            custom_expression_implementations: Vec::new(),
        }
    }

    pub fn add_code_chunk(&mut self, ty: ValueType, code: impl Into<String>) -> CodeIndex {
        self.chunks.push(CodeChunk {
            ty,
            code: code.into(),
        });
        self.chunks.len() - 1
    }

    pub fn chunk(&self, index: CodeIndex) -> Option<&CodeChunk> {
        self.chunks.get(index)
    }

    pub fn parameters(&self) -> &[UniformParameter] {
        &self.parameters
    }

    pub fn implementations(&self) -> &[String] {
        &self.custom_expression_implementations
    }

    fn parameter(&mut self, name: &str, default: UniformValue, ty: ValueType) -> CodeIndex {
        if let Some(parameter) = self.parameters.iter().find(|p| p.name == name) {
            return parameter.code;
        }
        let code = self.add_code_chunk(ty, name);
        self.parameters.push(UniformParameter {
            name: name.to_string(),
            default,
            code,
        });
        code
    }

    pub fn scalar_parameter(&mut self, name: &str, default: f32) -> CodeIndex {
        self.parameter(name, UniformValue::Scalar(default), ValueType::Float1)
    }

    pub fn vector_parameter(&mut self, name: &str, default: [f32; 4]) -> CodeIndex {
        self.parameter(name, UniformValue::Vector(default), ValueType::Float4)
    }

    pub fn texture_parameter(&mut self, name: &str) -> CodeIndex {
        self.parameter(name, UniformValue::Texture, ValueType::Texture2D)
    }

    /// Whether code generated with this stamp is already part of this pass.
    pub fn check_frame_stamp(&self, frame_stamp: &str) -> bool {
        let marker = frame_stamp_marker(frame_stamp);
        self.custom_expression_implementations
            .iter()
            .any(|implementation| implementation.contains(&marker))
    }

    /// Emits the implementation function of a fragment node and the call to it.
    ///
    /// `compiled_inputs` runs parallel to the node's inputs, with `None` for unnamed ones.
    /// Returns one code index per output slot.
    pub fn custom_expression(
        &mut self,
        node: &ShaderFragmentNode,
        compiled_inputs: &[Option<CodeIndex>],
        frame_stamp: &str,
    ) -> Vec<Option<CodeIndex>> {
        let mut external_dependency = String::new();
        let mut inner_function_body = String::new();
        for shader_info in &node.input_shaders {
            let Ok(source) = std::fs::read_to_string(&shader_info.shader_file_path) else {
                continue;
            };
            let Some((external, body)) = split_fragment(&source) else {
                continue;
            };
            inner_function_body += &expand_texture_lines(shader_info, body);
            inner_function_body += "\r\n";
            external_dependency += &external;
        }

        let output_slots = &node.output_slots;
        let output_type = output_slots
            .first()
            .map_or(ValueType::Float1, |slot| slot.output_type.value_type());

        let inputs = named_inputs(&node.inputs, compiled_inputs, &self.chunks);
        let mut input_declaration = String::new();
        for (input, chunk) in &inputs {
            input_declaration += ",";
            input_declaration += &chunk.ty.declaration(&input.name);
        }
        for slot in output_slots.iter().skip(1).filter(|slot| !slot.name.is_empty()) {
            input_declaration += " ,out ";
            input_declaration += &slot.output_type.value_type().declaration(&slot.name);
        }

        let index = self.custom_expression_implementations.len();
        let mut code = node.code.clone();
        if !code.contains("return") {
            code = format!("return {};", code);
        }
        let code = code.replace("\r\n", "\n").replace('\n', "\r\n");

        let implementation = format!(
            "{}\r\n{}\r\n{} CustomExpression{}(FMaterial{}Parameters Parameters{})\r\n{{\r\n uint shaderIndex = 0;\r\nstruct Functions {{\r\n{}}};\r\n{}\r\n}}\r\n",
            external_dependency,
            frame_stamp_marker(frame_stamp),
            type_name(output_type),
            index,
            self.frequency.parameters_type(),
            input_declaration,
            inner_function_body,
            code
        );
        self.custom_expression_implementations.push(implementation);

        let mut call = format!("CustomExpression{}(Parameters", index);
        for (_, chunk) in &inputs {
            call += ",";
            call += &chunk.code;
            if chunk.ty.is_texture() {
                call += ",";
                call += &chunk.code;
                call += "Sampler";
            }
        }

        let mut results = vec![None; output_slots.len()];
        for (slot_index, slot) in output_slots.iter().enumerate().skip(1) {
            if slot.name.is_empty() {
                continue;
            }
            let result = if slot.output_type > OutputType::Float1 {
                self.vector_parameter(&slot.name, [0.0; 4])
            } else {
                self.scalar_parameter(&slot.name, 0.0)
            };
            results[slot_index] = Some(result);
            call += ",";
            call += &self.chunks[result].code;
        }
        call += ")";

        let result = self.add_code_chunk(output_type, call);
        if let Some(first) = results.first_mut() {
            *first = Some(result);
        }
        results
    }
}

fn frame_stamp_marker(frame_stamp: &str) -> String {
    format!(" /* FunctionFrameStamp {}*/", frame_stamp)
}

fn type_name(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Float2 => "MaterialFloat2",
        ValueType::Float3 => "MaterialFloat3",
        ValueType::Float4 => "MaterialFloat4",
        _ => "MaterialFloat",
    }
}

fn named_inputs<'a>(
    inputs: &'a [CustomInput],
    compiled_inputs: &[Option<CodeIndex>],
    chunks: &[CodeChunk],
) -> Vec<(&'a CustomInput, CodeChunk)> {
    inputs
        .iter()
        .zip(compiled_inputs)
        .filter(|(input, _)| !input.name.is_empty())
        .filter_map(|(input, code)| Some((input, chunks.get((*code)?)?.clone())))
        .collect()
}

/// Rewrites each body line that uses a texture parameter into one statement per slot,
/// each reading that slot's texture.
fn expand_texture_lines(shader_info: &InputShaderInfo, body: &str) -> String {
    if shader_info.texture_parameters.is_empty() {
        return body.to_string();
    }
    let type_id = crate::shader_types::shader_type_id(&shader_info.shader_type).unwrap_or_default();

    let lines: Vec<String> = body
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.contains("Texture2D ") || line.contains("SamplerState ") {
                return line.to_string();
            }
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            for texture in &shader_info.texture_parameters {
                if find_identifier(trimmed, texture).is_none() {
                    continue;
                }
                let statements: Vec<String> = (0..shader_info.max_shader_count)
                    .map(|slot| {
                        let replacement = format!("e{}{}{}", type_id, texture, slot);
                        format!(
                            "{}if (shaderIndex == {}) {}",
                            indent,
                            slot,
                            replace_identifier(trimmed, texture, &replacement)
                        )
                    })
                    .collect();
                return statements.join("\r\n");
            }
            line.to_string()
        })
        .collect();
    lines.join("\r\n")
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of the first whole-word occurrence of `name`, at or after `from`.
fn find_identifier_from(text: &str, name: &str, from: usize) -> Option<usize> {
    let mut start = from;
    while let Some(offset) = text[start..].find(name) {
        let position = start + offset;
        let end = position + name.len();
        let before = text[..position].chars().next_back();
        let after = text[end..].chars().next();
        if !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char) {
            return Some(position);
        }
        start = end;
    }
    None
}

fn find_identifier(text: &str, name: &str) -> Option<usize> {
    find_identifier_from(text, name, 0)
}

fn replace_identifier(text: &str, name: &str, replacement: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut copied = 0;
    while let Some(position) = find_identifier_from(text, name, copied) {
        result += &text[copied..position];
        result += replacement;
        copied = position + name.len();
    }
    result += &text[copied..];
    result
}
