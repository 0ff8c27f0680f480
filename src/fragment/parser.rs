use std::sync::OnceLock;

use regex::Regex;

/// One numeric default looks like `1` or `0.5`. The list sits in a `/* ... */` comment.
const DEFAULTS: &str = r"/\*\s*((\d+(\.\d+)?\s*)(,\s*(\d+(\.\d+)?)\s*)*)\s*\*/\s*";

fn parameter_clause() -> String {
    format!(r"((out|in)\s+)?(\w+)\s*(\w+)\s*{}", DEFAULTS)
}

fn compiled(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: impl FnOnce() -> String,
) -> Result<&'static Regex, regex::Error> {
    cell.get_or_init(|| Regex::new(&pattern()))
        .as_ref()
        .map_err(Clone::clone)
}

fn signature_pattern() -> Result<&'static Regex, regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    compiled(&PATTERN, || {
        let clause = parameter_clause();
        format!(r"(\w+)\s*(\w+)\s*\(\s*{}(,\s*{})*\)", clause, clause)
    })
}

fn parameter_pattern() -> Result<&'static Regex, regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    compiled(&PATTERN, parameter_clause)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FragmentParameter {
    pub direction: Option<Direction>,
    pub ty: String,
    pub name: String,
    pub defaults: Vec<f32>,
}

impl FragmentParameter {
    pub fn default_scalar(&self) -> f32 {
        self.defaults.first().copied().unwrap_or_default()
    }
}

/// The leading function declaration of a fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSignature {
    pub return_type: String,
    /// Also the shader type the fragment implements.
    pub function_name: String,
    pub declaration: String,
    pub parameters: Vec<FragmentParameter>,
}

fn parse_defaults(text: &str) -> Vec<f32> {
    text.split(',')
        .filter_map(|value| value.trim().parse().ok())
        .collect()
}

/// Finds the first declaration whose every parameter carries a defaults comment.
pub fn parse_signature(source: &str) -> Result<Option<FragmentSignature>, regex::Error> {
    let Some(captures) = signature_pattern()?.captures(source) else {
        return Ok(None);
    };
    let declaration = &captures[0];

    let parameters = parameter_pattern()?
        .captures_iter(declaration)
        .map(|parameter| FragmentParameter {
            direction: parameter.get(2).map(|modifier| match modifier.as_str() {
                "out" => Direction::Out,
                _ => Direction::In,
            }),
            ty: parameter[3].to_string(),
            name: parameter[4].to_string(),
            defaults: parse_defaults(&parameter[5]),
        })
        .collect();

    Ok(Some(FragmentSignature {
        return_type: captures[1].to_string(),
        function_name: captures[2].to_string(),
        declaration: declaration.to_string(),
        parameters,
    }))
}
