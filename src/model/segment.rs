use serde::{Deserialize, Serialize};

/// One element's sub-element (component) list. A scalar element is a
/// single-component `Element`; composite elements (e.g. `HC:99213:25`)
/// carry more than one component. Zero-length components are distinct
/// from an absent element — see SPEC_FULL.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    pub components: Vec<String>,
}

impl Element {
    pub fn new(components: Vec<String>) -> Self {
        Self { components }
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self {
            components: vec![value.into()],
        }
    }

    /// The first component, or `""` if the element has none. Most
    /// non-composite elements are accessed this way.
    pub fn as_str(&self) -> &str {
        self.components.first().map(String::as_str).unwrap_or("")
    }

    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|c| c.is_empty())
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::single(value)
    }
}

/// A tokenized EDI segment: a 2-3 character id plus its ordered elements.
/// Immutable after tokenization (SPEC_FULL.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub elements: Vec<Element>,
}

impl Segment {
    pub fn new(id: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            id: id.into(),
            elements,
        }
    }

    /// Element at 1-based position `n` (the way X12 implementation
    /// guides number elements, e.g. "BPR02"), or `""` if absent.
    pub fn element(&self, n: usize) -> &str {
        self.elements
            .get(n.saturating_sub(1))
            .map(Element::as_str)
            .unwrap_or("")
    }

    pub fn element_opt(&self, n: usize) -> Option<&str> {
        let s = self.element(n);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn raw_id_is_malformed(&self) -> bool {
        !(2..=3).contains(&self.id.len())
    }
}
