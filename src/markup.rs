use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Handle into a [`Markup`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Nested node shape used on the wire and on disk. Form fragments are YAML
/// documents of this shape. Runtime presentation state (see
/// [`Markup::set_state`]) never appears here; a `hidden` attribute seeds the
/// matching state flag when the fragment is parsed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

#[derive(Clone, Debug, PartialEq)]
struct Node {
    role: Option<String>,
    attrs: BTreeMap<String, String>,
    text: String,
    states: BTreeSet<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed element tree for a rendered form fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct Markup {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Markup {
    pub fn parse(fragment: &str) -> Result<Self> {
        let spec: NodeSpec =
            serde_yaml::from_str(fragment).context("parsing markup fragment")?;
        Ok(Self::from_spec(&spec))
    }

    pub fn from_spec(spec: &NodeSpec) -> Self {
        let mut doc = Markup {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = doc.add_node(spec, None);
        doc.root = root;
        doc
    }

    fn add_node(&mut self, spec: &NodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut states = BTreeSet::new();
        if spec.attrs.contains_key("hidden") {
            states.insert("hidden".to_string());
        }
        self.nodes.push(Node {
            role: spec.role.clone(),
            attrs: spec.attrs.clone(),
            text: spec.text.clone(),
            states,
            parent,
            children: Vec::new(),
        });
        for child in &spec.children {
            let cid = self.add_node(child, Some(id));
            self.nodes[id.0].children.push(cid);
        }
        id
    }

    pub fn to_spec(&self) -> NodeSpec {
        self.spec_of(self.root)
    }

    fn spec_of(&self, id: NodeId) -> NodeSpec {
        let n = &self.nodes[id.0];
        NodeSpec {
            role: n.role.clone(),
            attrs: n.attrs.clone(),
            text: n.text.clone(),
            children: n.children.iter().map(|&c| self.spec_of(c)).collect(),
        }
    }

    /// Serialize the structural tree. State flags are runtime-only and are
    /// not part of the output, so a snapshot taken here always re-parses to
    /// a pristine fragment.
    pub fn serialize(&self) -> Result<String> {
        serde_yaml::to_string(&self.to_spec()).context("serializing markup fragment")
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn role(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].role.as_deref()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0].attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.nodes[id.0].attrs.contains_key(name)
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.0].text
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].text = text.to_string();
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// First descendant with the given role, in document order.
    pub fn find_role(&self, from: NodeId, role: &str) -> Option<NodeId> {
        for &child in &self.nodes[from.0].children {
            if self.nodes[child.0].role.as_deref() == Some(role) {
                return Some(child);
            }
            if let Some(found) = self.find_role(child, role) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given role, in document order.
    pub fn find_all(&self, from: NodeId, role: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_role(from, role, &mut out);
        out
    }

    fn collect_role(&self, from: NodeId, role: &str, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[from.0].children {
            if self.nodes[child.0].role.as_deref() == Some(role) {
                out.push(child);
            }
            self.collect_role(child, role, out);
        }
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = self.nodes[node.0].parent;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.nodes[p.0].parent;
        }
        false
    }

    /// First descendant whose attribute `name` equals `value`.
    pub fn node_by_attr(&self, from: NodeId, name: &str, value: &str) -> Option<NodeId> {
        for &child in &self.nodes[from.0].children {
            if self.nodes[child.0].attrs.get(name).map(String::as_str) == Some(value) {
                return Some(child);
            }
            if let Some(found) = self.node_by_attr(child, name, value) {
                return Some(found);
            }
        }
        None
    }

    /// Detach `node` and reinsert it as the immediate next sibling of
    /// `after`. No-op when the move would detach an ancestor into its own
    /// subtree.
    pub fn move_after(&mut self, node: NodeId, after: NodeId) {
        if node == after || self.contains(node, after) {
            return;
        }
        let Some(new_parent) = self.nodes[after.0].parent else {
            return;
        };
        if let Some(old_parent) = self.nodes[node.0].parent {
            self.nodes[old_parent.0].children.retain(|&c| c != node);
        }
        self.nodes[node.0].parent = Some(new_parent);
        let pos = self.nodes[new_parent.0]
            .children
            .iter()
            .position(|&c| c == after);
        match pos {
            Some(p) => self.nodes[new_parent.0].children.insert(p + 1, node),
            None => self.nodes[new_parent.0].children.push(node),
        }
    }

    /// Apply named presentational state flags. Idempotent; flags not listed
    /// are left untouched.
    pub fn set_state(&mut self, id: NodeId, flags: &[(&str, bool)]) {
        for (name, on) in flags {
            if *on {
                self.nodes[id.0].states.insert((*name).to_string());
            } else {
                self.nodes[id.0].states.remove(*name);
            }
        }
    }

    pub fn in_state(&self, id: NodeId, name: &str) -> bool {
        self.nodes[id.0].states.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"
role: form
attrs: { title: Profile }
children:
  - role: field
    attrs: { label: Email }
    children:
      - { role: input, attrs: { id: email, name: email }, text: ada@example.org }
  - role: actions
    children:
      - { role: save, text: Save }
      - { role: cancel, text: Cancel, attrs: { hidden: "" } }
"#;

    #[test]
    fn parse_resolves_roles_and_attrs() {
        let doc = Markup::parse(FRAGMENT).unwrap();
        let root = doc.root();
        assert_eq!(doc.role(root), Some("form"));
        assert_eq!(doc.attr(root, "title"), Some("Profile"));
        let input = doc.find_role(root, "input").unwrap();
        assert_eq!(doc.text(input), "ada@example.org");
        assert_eq!(doc.attr(input, "id"), Some("email"));
        let field = doc.find_role(root, "field").unwrap();
        assert!(doc.contains(root, input));
        assert!(doc.contains(field, input));
        assert!(!doc.contains(field, doc.find_role(root, "save").unwrap()));
    }

    #[test]
    fn hidden_attr_seeds_state_flag() {
        let doc = Markup::parse(FRAGMENT).unwrap();
        let cancel = doc.find_role(doc.root(), "cancel").unwrap();
        assert!(doc.in_state(cancel, "hidden"));
        let save = doc.find_role(doc.root(), "save").unwrap();
        assert!(!doc.in_state(save, "hidden"));
    }

    #[test]
    fn set_state_is_idempotent() {
        let mut doc = Markup::parse(FRAGMENT).unwrap();
        let field = doc.find_role(doc.root(), "field").unwrap();
        doc.set_state(field, &[("editing", true), ("focused", true)]);
        let snapshot = doc.clone();
        doc.set_state(field, &[("editing", true), ("focused", true)]);
        assert_eq!(doc, snapshot);
        doc.set_state(field, &[("focused", false)]);
        assert!(doc.in_state(field, "editing"));
        assert!(!doc.in_state(field, "focused"));
    }

    #[test]
    fn serialize_drops_runtime_state() {
        let mut doc = Markup::parse(FRAGMENT).unwrap();
        let field = doc.find_role(doc.root(), "field").unwrap();
        doc.set_state(field, &[("editing", true)]);
        let reparsed = Markup::parse(&doc.serialize().unwrap()).unwrap();
        let field2 = reparsed.find_role(reparsed.root(), "field").unwrap();
        assert!(!reparsed.in_state(field2, "editing"));
        assert_eq!(reparsed.attr(field2, "label"), Some("Email"));
    }

    #[test]
    fn move_after_relocates_node() {
        let mut doc = Markup::parse(FRAGMENT).unwrap();
        let root = doc.root();
        let field = doc.find_role(root, "field").unwrap();
        let actions = doc.find_role(root, "actions").unwrap();
        doc.move_after(actions, field);
        assert_eq!(doc.children(root), &[field, actions]);
        // Moving again is a no-op in effect
        doc.move_after(actions, field);
        assert_eq!(doc.children(root), &[field, actions]);
    }

    #[test]
    fn node_by_attr_finds_input_by_id() {
        let doc = Markup::parse(FRAGMENT).unwrap();
        let input = doc.find_role(doc.root(), "input").unwrap();
        assert_eq!(doc.node_by_attr(doc.root(), "id", "email"), Some(input));
        assert_eq!(doc.node_by_attr(doc.root(), "id", "nope"), None);
    }
}
