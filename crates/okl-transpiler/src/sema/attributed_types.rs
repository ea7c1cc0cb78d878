use okl_core::syntax::AttrNode;
use std::collections::HashMap;
use tracing::debug;

/// OKL attributes carried by a type alias, applied to every variable or
/// parameter declared with that alias.
#[derive(Debug, Clone, Default)]
pub struct AttributedTypeMap {
    types: HashMap<String, Vec<AttrNode>>,
}

impl AttributedTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// A later typedef of the same name replaces the earlier one.
    pub fn insert(&mut self, type_name: impl Into<String>, attrs: Vec<AttrNode>) {
        let type_name = type_name.into();
        debug!(ty = %type_name, attrs = attrs.len(), "attributed type");
        self.types.insert(type_name, attrs);
    }

    pub fn get(&self, type_name: &str) -> Option<&[AttrNode]> {
        self.types.get(type_name).map(Vec::as_slice)
    }

    /// Attributes of every alias named in a declared type such as
    /// `const tile_t`.
    pub fn carried_by(&self, type_text: &str) -> Vec<&AttrNode> {
        type_text
            .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .filter(|word| !word.is_empty())
            .filter_map(|word| self.types.get(word))
            .flatten()
            .collect()
    }
}
