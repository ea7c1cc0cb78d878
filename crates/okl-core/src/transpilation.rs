use crate::error::Result;
use crate::rewriter::Rewriter;
use crate::span::Span;
use crate::syntax::{NodeId, NodeKind, NodeRef};
use itertools::Itertools;
use tracing::debug;

/// Named replacement targets. A later transpilation for the same node and
/// slot overrides an earlier one.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
)]
pub enum SlotName {
    #[strum(serialize = "OKL_TRANSPILED_ATTR")]
    Attr,
    #[strum(serialize = "OKL_TRANSPILED_NAME")]
    Name,
    #[strum(serialize = "OKL_TRANSPILED_ARG")]
    Arg,
    #[strum(serialize = "OKL_TRANSPILED_PROLOGUE")]
    Prologue,
    #[strum(serialize = "OKL_TRANSPILED_EPILOGUE")]
    Epilogue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub slot: SlotName,
    /// Range in the original text; empty means insertion.
    pub range: Span,
    pub text: String,
}

/// Replacements and include insertions produced for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpilation {
    pub node_id: NodeId,
    pub node_kind: NodeKind,
    pub replacements: Vec<Replacement>,
    pub includes: Vec<String>,
}

impl Transpilation {
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.includes.is_empty()
    }

    pub fn has_slot(&self, slot: SlotName) -> bool {
        self.replacements.iter().any(|r| r.slot == slot)
    }

    pub fn slot_text(&self, slot: SlotName) -> Option<&str> {
        self.replacements
            .iter()
            .find(|r| r.slot == slot)
            .map(|r| r.text.as_str())
    }
}

pub struct TranspilationBuilder {
    node_id: NodeId,
    node_kind: NodeKind,
    replacements: Vec<Replacement>,
    includes: Vec<String>,
}

impl TranspilationBuilder {
    pub fn new(node: NodeRef<'_>) -> Self {
        Self {
            node_id: node.id(),
            node_kind: node.kind(),
            replacements: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn add_replacement(mut self, slot: SlotName, range: Span, text: impl Into<String>) -> Self {
        self.replacements.push(Replacement {
            slot,
            range,
            text: text.into(),
        });
        self
    }

    pub fn add_insertion(self, slot: SlotName, offset: usize, text: impl Into<String>) -> Self {
        self.add_replacement(slot, Span::empty_at(offset), text)
    }

    pub fn add_include(mut self, header: impl Into<String>) -> Self {
        let header = header.into();
        if !self.includes.contains(&header) {
            self.includes.push(header);
        }
        self
    }

    pub fn build(self) -> Transpilation {
        Transpilation {
            node_id: self.node_id,
            node_kind: self.node_kind,
            replacements: self.replacements,
            includes: self.includes,
        }
    }
}

#[derive(Debug, Clone)]
struct SlotEntry {
    node_id: NodeId,
    slot: SlotName,
    replacements: Vec<Replacement>,
}

/// Every transpilation accepted for one translation unit, in registration
/// order.
#[derive(Debug, Clone, Default)]
pub struct TranspilationSet {
    entries: Vec<SlotEntry>,
    includes: Vec<String>,
}

impl TranspilationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.includes.is_empty()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn insert(&mut self, transpilation: Transpilation) {
        let mut slots: Vec<SlotName> = Vec::new();
        for replacement in &transpilation.replacements {
            if !slots.contains(&replacement.slot) {
                slots.push(replacement.slot);
            }
        }
        for slot in slots {
            let replacements: Vec<Replacement> = transpilation
                .replacements
                .iter()
                .filter(|r| r.slot == slot)
                .cloned()
                .collect();
            let existing = self
                .entries
                .iter_mut()
                .find(|e| e.node_id == transpilation.node_id && e.slot == slot);
            match existing {
                Some(entry) => {
                    debug!(node = transpilation.node_id, %slot, "overriding slot");
                    entry.replacements = replacements;
                }
                None => self.entries.push(SlotEntry {
                    node_id: transpilation.node_id,
                    slot,
                    replacements,
                }),
            }
        }
        for include in transpilation.includes {
            if !self.includes.contains(&include) {
                self.includes.push(include);
            }
        }
    }

    pub fn get(&self, node_id: NodeId, slot: SlotName) -> Option<&[Replacement]> {
        self.entries
            .iter()
            .find(|e| e.node_id == node_id && e.slot == slot)
            .map(|e| e.replacements.as_slice())
    }

    /// Apply every replacement to `source` and prepend the include lines.
    pub fn apply(&self, source: &str) -> Result<String> {
        let mut rewriter = Rewriter::new(source);
        for entry in &self.entries {
            for replacement in &entry.replacements {
                rewriter.replace(replacement.range, replacement.text.clone());
            }
        }
        if !self.includes.is_empty() {
            let lines = self
                .includes
                .iter()
                .map(|header| format!("#include {header}\n"))
                .join("");
            rewriter.insert_before(0, lines);
        }
        rewriter.apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TranslationUnit;
    use pretty_assertions::assert_eq;

    fn tu() -> TranslationUnit {
        TranslationUnit {
            decls: Vec::new(),
            span: Span::new(0, 0),
        }
    }

    #[test]
    fn later_transpilation_overrides_same_node_and_slot() {
        let tu = tu();
        let node = NodeRef::TranslationUnit(&tu);
        let mut set = TranspilationSet::new();
        set.insert(
            TranspilationBuilder::new(node)
                .add_replacement(SlotName::Attr, Span::new(0, 3), "generic")
                .add_insertion(SlotName::Epilogue, 7, ";")
                .build(),
        );
        set.insert(
            TranspilationBuilder::new(node)
                .add_replacement(SlotName::Attr, Span::new(0, 3), "specific")
                .add_include("<omp.h>")
                .build(),
        );
        assert_eq!(
            set.apply("abc def").expect("apply"),
            "#include <omp.h>\nspecific def;"
        );
        assert_eq!(set.get(node.id(), SlotName::Epilogue).map(|r| r.len()), Some(1));
    }

    #[test]
    fn slot_names_use_transpiled_prefix() {
        assert_eq!(SlotName::Attr.to_string(), "OKL_TRANSPILED_ATTR");
        assert_eq!(SlotName::Name.to_string(), "OKL_TRANSPILED_NAME");
    }
}
