use crate::controller::fields::{Field, FormRefs};
use crate::controller::store::EditingState;
use crate::markup::{Markup, NodeId};

/// Project an [`EditingState`] onto the markup tree. Pure presentation:
/// re-running with the same state leaves the tree unchanged.
pub fn project(
    doc: &mut Markup,
    root: NodeId,
    refs: &FormRefs,
    fields: &[Field],
    state: &EditingState,
) {
    for (idx, field) in fields.iter().enumerate() {
        let editing = state.editing_fields.contains(&idx);
        doc.set_state(
            field.container,
            &[
                ("editing", editing),
                ("focused", state.focused_field == Some(idx)),
                ("hidden", field.hidden_until_active && !editing),
            ],
        );
    }

    // Forms that edit one field at a time show the action controls directly
    // under that field; with zero or several active fields the controls stay
    // where the fragment put them.
    if let [only] = state.editing_fields.as_slice() {
        if let Some(field) = fields.get(*only) {
            doc.move_after(refs.actions, field.container);
        }
    }

    let is_editing = !state.editing_fields.is_empty();
    doc.set_state(root, &[("editing", is_editing)]);
    doc.set_state(
        refs.actions,
        &[("hidden", !is_editing), ("saving", state.saving)],
    );
    doc.set_state(
        refs.submit_error,
        &[("visible", !state.submit_error.is_empty())],
    );
    doc.set_text(refs.submit_error_message, &state.submit_error);
}
