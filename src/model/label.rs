//! Label schema: the ordered, possibly nested set of annotation classes for a slide session.

use serde::{Deserialize, Serialize};

use super::color::Color;

/// A named annotation class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelClass {
    /// Display name, matched against `Annotation::label`
    pub name: String,
    /// Hex color string
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sub-classes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LabelClass>,
}

impl LabelClass {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: None,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: LabelClass) -> Self {
        self.children.push(child);
        self
    }

    /// Parsed display color, if the hex string is valid.
    pub fn display_color(&self) -> Option<Color> {
        Color::from_hex(&self.color)
    }
}

/// The `schema_definition` payload of a label schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub classes: Vec<LabelClass>,
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

/// Label schema read once per slide session. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_schema_version")]
    pub version: String,
    pub schema_definition: SchemaDefinition,
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self::new("default", Vec::new())
    }
}

impl LabelSchema {
    pub fn new(name: impl Into<String>, classes: Vec<LabelClass>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: default_schema_version(),
            schema_definition: SchemaDefinition { classes },
        }
    }

    /// Top-level classes in schema order.
    pub fn classes(&self) -> &[LabelClass] {
        &self.schema_definition.classes
    }

    /// Find a class by name anywhere in the hierarchy (depth-first, schema order).
    pub fn resolve(&self, label: &str) -> Option<&LabelClass> {
        fn walk<'a>(classes: &'a [LabelClass], label: &str) -> Option<&'a LabelClass> {
            classes.iter().find_map(|class| {
                if class.name == label {
                    Some(class)
                } else {
                    walk(&class.children, label)
                }
            })
        }
        walk(self.classes(), label)
    }

    /// Names from the root class down to `label`, inclusive.
    ///
    /// Empty when the label is not in the schema.
    pub fn hierarchy_of(&self, label: &str) -> Vec<String> {
        fn walk(classes: &[LabelClass], label: &str, path: &mut Vec<String>) -> bool {
            for class in classes {
                path.push(class.name.clone());
                if class.name == label || walk(&class.children, label, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        walk(self.classes(), label, &mut path);
        path
    }

    /// Display color for a label, if the label is known and its color parses.
    pub fn color_for(&self, label: &str) -> Option<Color> {
        self.resolve(label).and_then(LabelClass::display_color)
    }
}
