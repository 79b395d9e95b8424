//! Declared scene descriptions: the input the reconciler consumes each
//! render. A declared tree owns nothing external; it is plain data the
//! authoring layer rebuilds from scratch every time.

use crate::props::{PropMap, PropValue};

/// One declared scene node: a type name, its props, and ordered children.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredNode {
    pub type_name: String,
    pub props: PropMap,
    pub children: Vec<DeclaredLeaf>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeclaredLeaf {
    Node(DeclaredNode),
    Text(String),
}

impl DeclaredNode {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            props: PropMap::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<DeclaredLeaf>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = DeclaredLeaf>) -> Self {
        self.children.extend(children);
        self
    }

    /// The explicit identity key used by child matching, when authored.
    pub fn name(&self) -> Option<&str> {
        self.props.get("name").and_then(PropValue::as_str)
    }
}

impl From<DeclaredNode> for DeclaredLeaf {
    fn from(node: DeclaredNode) -> Self {
        DeclaredLeaf::Node(node)
    }
}

impl From<&str> for DeclaredLeaf {
    fn from(text: &str) -> Self {
        DeclaredLeaf::Text(text.to_owned())
    }
}

impl From<String> for DeclaredLeaf {
    fn from(text: String) -> Self {
        DeclaredLeaf::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_prop_and_child_order() {
        let node = DeclaredNode::new("cube")
            .prop("position", [1.0, 0.0, 0.0])
            .prop("scale", [2.0, 2.0, 2.0])
            .child(DeclaredNode::new("material").prop("metallic", 1.0))
            .child("label");

        assert_eq!(node.type_name, "cube");
        let keys: Vec<&str> = node.props.keys().map(String::as_str).collect();
        assert_eq!(keys, ["position", "scale"]);
        assert_eq!(node.children.len(), 2);
        assert!(matches!(node.children[1], DeclaredLeaf::Text(_)));
    }

    #[test]
    fn name_reads_only_string_props() {
        let named = DeclaredNode::new("cube").prop("name", "hero");
        let numbered = DeclaredNode::new("cube").prop("name", 7);
        assert_eq!(named.name(), Some("hero"));
        assert_eq!(numbered.name(), None);
    }
}
