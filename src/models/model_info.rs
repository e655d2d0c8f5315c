// Model information data models
use serde::{Deserialize, Serialize};

/// Declared type of the model's output cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    Float,
    Integer,
    String,
}

impl OutputType {
    /// Lenient parse of the card's "Output Type" entries
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "float" => Some(OutputType::Float),
            "integer" | "int" => Some(OutputType::Integer),
            "string" | "str" => Some(OutputType::String),
            _ => None,
        }
    }
}

/// A card field that may be written either as a single string or as a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(value) => vec![value.as_str()],
            OneOrMany::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        self.values().iter().any(|v| v.eq_ignore_ascii_case(needle))
    }
}

/// Model card as produced by the packaging step (`information.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    #[serde(rename = "Identifier")]
    pub identifier: String,
    #[serde(rename = "Slug", default)]
    pub slug: String,
    #[serde(rename = "Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Task", default, skip_serializing_if = "Option::is_none")]
    pub task: Option<OneOrMany>,
    #[serde(rename = "Input", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<OneOrMany>,
    #[serde(rename = "Input Shape", default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<String>,
    #[serde(rename = "Output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OneOrMany>,
    #[serde(rename = "Output Type", default)]
    pub output_type: Vec<String>,
    #[serde(rename = "Output Shape", default, skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<String>,
    #[serde(rename = "Output Consistency", default, skip_serializing_if = "Option::is_none")]
    pub output_consistency: Option<String>,
}

impl ModelCard {
    /// Generative tasks and cards flagged "Variable" produce non-deterministic output
    pub fn is_variable(&self) -> bool {
        let generative = self
            .task
            .as_ref()
            .map_or(false, |task| task.contains_ignore_case("Generative"));
        let inconsistent = self
            .output_consistency
            .as_deref()
            .map_or(false, |c| c.trim().eq_ignore_ascii_case("Variable"));
        generative || inconsistent
    }

    pub fn output_types(&self) -> Vec<OutputType> {
        let mut types = Vec::new();
        for raw in &self.output_type {
            if let Some(parsed) = OutputType::parse(raw) {
                if !types.contains(&parsed) {
                    types.push(parsed);
                }
            }
        }
        types
    }
}

/// What the engine needs to know about the model it fronts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub identifier: String,
    pub output_types: Vec<OutputType>,
    pub is_variable: bool,
    pub on_disk_bytes: u64,
}

impl ModelDescriptor {
    pub fn from_card(card: &ModelCard, on_disk_bytes: u64) -> Self {
        Self {
            identifier: card.identifier.clone(),
            output_types: card.output_types(),
            is_variable: card.is_variable(),
            on_disk_bytes,
        }
    }

    /// Coercion type for serialized cells; anything but a single declared type is a string
    pub fn effective_output_type(&self) -> OutputType {
        match self.output_types.as_slice() {
            [single] => *single,
            _ => OutputType::String,
        }
    }
}

/// Information document wrapper; older bundles spell the key `Card`
#[derive(Debug, Clone, Deserialize)]
pub struct InformationDocument {
    #[serde(alias = "Card")]
    pub card: ModelCard,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(json: &str) -> ModelCard {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_generative_task_is_variable() {
        let c = card(r#"{"Identifier": "eos1", "Task": ["Generative"], "Output Type": ["String"]}"#);
        assert!(c.is_variable());
    }

    #[test]
    fn test_variable_consistency_is_variable() {
        let c = card(r#"{"Identifier": "eos1", "Task": "Annotation", "Output Consistency": "Variable"}"#);
        assert!(c.is_variable());
    }

    #[test]
    fn test_fixed_model_is_not_variable() {
        let c = card(
            r#"{"Identifier": "eos1", "Task": "Annotation", "Output Consistency": "Fixed", "Output Type": ["Float"]}"#,
        );
        assert!(!c.is_variable());
        let descriptor = ModelDescriptor::from_card(&c, 1024);
        assert_eq!(descriptor.effective_output_type(), OutputType::Float);
    }

    #[test]
    fn test_multi_type_output_degrades_to_string() {
        let c = card(r#"{"Identifier": "eos1", "Output Type": ["Float", "integer"]}"#);
        let descriptor = ModelDescriptor::from_card(&c, 0);
        assert_eq!(descriptor.output_types, vec![OutputType::Float, OutputType::Integer]);
        assert_eq!(descriptor.effective_output_type(), OutputType::String);
    }

    #[test]
    fn test_information_document_accepts_both_spellings() {
        let lower: InformationDocument = serde_json::from_str(r#"{"card": {"Identifier": "a"}}"#).unwrap();
        let upper: InformationDocument = serde_json::from_str(r#"{"Card": {"Identifier": "b"}}"#).unwrap();
        assert_eq!(lower.card.identifier, "a");
        assert_eq!(upper.card.identifier, "b");
    }
}
