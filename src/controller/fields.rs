use crate::markup::{Markup, NodeId};
use anyhow::{Context, Result};

/// Marker attribute on a field container: the field stays visually absent
/// until it enters the active editing set.
pub const HIDE_UNTIL_ACTIVE_ATTR: &str = "hide-until-active";

/// One group of controls that constitutes a form field. Discovered once at
/// controller construction; the list never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub container: NodeId,
    pub input: NodeId,
    pub hidden_until_active: bool,
}

pub fn discover_fields(doc: &Markup, root: NodeId) -> Vec<Field> {
    doc.find_all(root, "field")
        .into_iter()
        .filter_map(|container| {
            doc.find_role(container, "input").map(|input| Field {
                container,
                input,
                hidden_until_active: doc.has_attr(container, HIDE_UNTIL_ACTIVE_ATTR),
            })
        })
        .collect()
}

/// Named sub-elements every well-formed form fragment must carry.
#[derive(Clone, Copy, Debug)]
pub struct FormRefs {
    pub cancel_btn: NodeId,
    pub backdrop: NodeId,
    pub actions: NodeId,
    pub save_btn: NodeId,
    pub submit_error: NodeId,
    pub submit_error_message: NodeId,
}

pub fn find_refs(doc: &Markup, root: NodeId) -> Result<FormRefs> {
    let lookup = |role: &str| {
        doc.find_role(root, role)
            .with_context(|| format!("form fragment missing '{role}' ref"))
    };
    Ok(FormRefs {
        cancel_btn: lookup("cancel")?,
        backdrop: lookup("backdrop")?,
        actions: lookup("actions")?,
        save_btn: lookup("save")?,
        submit_error: lookup("submit-error")?,
        submit_error_message: lookup("submit-error-message")?,
    })
}
