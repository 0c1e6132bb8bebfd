pub mod fields;
pub mod project;
pub mod registry;
pub mod store;

pub use fields::{discover_fields, find_refs, Field, FormRefs};
pub use registry::ControllerRegistry;
pub use store::{EditingState, Store};

use crate::app::Effect;
use crate::markup::{Markup, NodeId};
use crate::services::transport::{FormContent, SubmitContext};
use anyhow::Result;
use crossterm::event::KeyCode;
use std::collections::BTreeMap;

/// Native text edit applied to an input node before the input event fires.
#[derive(Clone, Copy, Debug)]
pub enum InputEdit {
    Insert(char),
    Backspace,
}

/// Adds inline editing behavior to one rendered form fragment.
///
/// Owns the markup tree, the immutable field list discovered from it, and
/// the authoritative [`EditingState`]. Every state change funnels through
/// [`set_state`](Self::set_state), which replaces the state wholesale and
/// re-projects it onto the tree.
pub struct FormController {
    doc: Markup,
    root: NodeId,
    fields: Vec<Field>,
    refs: FormRefs,
    store: Store<EditingState>,
}

impl FormController {
    pub fn new(doc: Markup) -> Result<Self> {
        let mut doc = doc;
        let root = doc.root();
        let refs = find_refs(&doc, root)?;
        // Server markup ships the cancel control hidden for non-interactive
        // rendering; reveal it now that this controller is in charge.
        doc.set_state(refs.cancel_btn, &[("hidden", false)]);
        let fields = discover_fields(&doc, root);
        let original = doc.serialize()?;
        let store = Store::new(EditingState::at_rest(original));
        let mut ctrl = Self {
            doc,
            root,
            fields,
            refs,
            store,
        };
        ctrl.render();
        Ok(ctrl)
    }

    fn render(&mut self) {
        project::project(
            &mut self.doc,
            self.root,
            &self.refs,
            &self.fields,
            self.store.get(),
        );
    }

    fn set_state(&mut self, next: EditingState) {
        self.store.set(next);
        self.render();
    }

    pub fn state(&self) -> &EditingState {
        self.store.get()
    }

    pub fn doc(&self) -> &Markup {
        &self.doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn owns(&self, node: NodeId) -> bool {
        node == self.root || self.doc.contains(self.root, node)
    }

    pub fn field_for_input(&self, node: NodeId) -> Option<usize> {
        self.fields.iter().position(|f| f.input == node)
    }

    pub fn is_field_input(&self, node: NodeId) -> bool {
        self.field_for_input(node).is_some()
    }

    pub fn input_by_id(&self, id: &str) -> Option<NodeId> {
        self.doc.node_by_attr(self.root, "id", id)
    }

    pub fn save_button(&self) -> NodeId {
        self.refs.save_btn
    }

    pub fn cancel_button(&self) -> NodeId {
        self.refs.cancel_btn
    }

    /// Focusable nodes in tab order: visible field inputs, then the action
    /// controls while an edit is active.
    pub fn focus_ring(&self) -> Vec<NodeId> {
        let mut ring: Vec<NodeId> = self
            .fields
            .iter()
            .filter(|f| !self.doc.in_state(f.container, "hidden"))
            .map(|f| f.input)
            .collect();
        if !self.doc.in_state(self.refs.actions, "hidden") {
            ring.push(self.refs.save_btn);
            ring.push(self.refs.cancel_btn);
        }
        ring
    }

    /// The set of fields shown as editable when the given field is selected.
    /// Depends only on the static hidden-until-active markers: forms with
    /// concealed fields reveal everything at once (credential-change style),
    /// all others edit a single field at a time.
    pub fn edit_set(&self, idx: usize) -> Vec<usize> {
        if self.fields.iter().any(|f| f.hidden_until_active) {
            (0..self.fields.len()).collect()
        } else {
            vec![idx]
        }
    }

    pub fn on_focus(&mut self, target: NodeId) -> Vec<Effect> {
        let Some(idx) = self.field_for_input(target) else {
            return Vec::new();
        };

        // A field with unsaved changes keeps focus until saved or canceled
        let st = self.store.get();
        if st.dirty && !st.editing_fields.is_empty() && !st.editing_fields.contains(&idx) {
            let first = st.editing_fields[0];
            return vec![Effect::FocusNode(self.fields[first].input)];
        }

        let mut next = st.clone();
        next.editing_fields = self.edit_set(idx);
        next.focused_field = Some(idx);
        self.set_state(next);
        Vec::new()
    }

    pub fn on_input(&mut self) {
        let mut next = self.store.get().clone();
        next.dirty = true;
        self.set_state(next);
    }

    pub fn on_keydown(&mut self, key: KeyCode) -> Vec<Effect> {
        if key == KeyCode::Esc {
            return self.cancel();
        }
        Vec::new()
    }

    /// Blur never acts immediately: the outgoing focus target is not
    /// authoritative until the current event turn has finished, so the real
    /// check is deferred to [`focus_settled`](Self::focus_settled).
    pub fn on_blur(&mut self) -> Vec<Effect> {
        vec![Effect::DeferFocusCheck]
    }

    /// Deferred half of the blur handling, run once focus has settled. A
    /// dirty edit pulls focus back onto its first field; otherwise, focus
    /// leaving the form entirely puts the machine back at rest.
    pub fn focus_settled(&mut self, active: Option<NodeId>) -> Vec<Effect> {
        let st = self.store.get();
        if st.dirty && !self.is_editing_field_focused(active) {
            if let Some(&first) = st.editing_fields.first() {
                return vec![Effect::FocusNode(self.fields[first].input)];
            }
            return Vec::new();
        }
        let inside = active.map(|node| self.owns(node)).unwrap_or(false);
        if !inside {
            let mut next = st.clone();
            next.editing_fields.clear();
            next.focused_field = None;
            self.set_state(next);
        }
        Vec::new()
    }

    /// True when focus rests in the action controls or in any container of
    /// the active editing set.
    fn is_editing_field_focused(&self, active: Option<NodeId>) -> bool {
        let st = self.store.get();
        if st.editing_fields.is_empty() {
            return false;
        }
        let Some(node) = active else {
            return false;
        };
        if node == self.refs.actions || self.doc.contains(self.refs.actions, node) {
            return true;
        }
        st.editing_fields.iter().any(|&idx| {
            let container = self.fields[idx].container;
            node == container || self.doc.contains(container, node)
        })
    }

    /// Kick off an asynchronous save. While a save is in flight further
    /// submits are ignored.
    pub fn submit(&mut self) -> Vec<Effect> {
        if self.store.get().saving {
            return Vec::new();
        }
        let st = self.store.get().clone();
        let active = st.focused_field.or_else(|| st.editing_fields.first().copied());
        let active_input_id = active.and_then(|idx| {
            self.doc
                .attr(self.fields[idx].input, "id")
                .map(str::to_string)
        });
        let ctx = SubmitContext {
            active_input_id,
            original_markup: st.original_markup.clone(),
        };
        let mut next = st;
        next.saving = true;
        self.set_state(next);
        vec![Effect::Submit {
            content: self.content(),
            ctx,
        }]
    }

    /// Discard any in-progress edits and restore the markup this instance
    /// started from.
    pub fn cancel(&self) -> Vec<Effect> {
        vec![Effect::Reload {
            fragment: self.store.get().original_markup.clone(),
        }]
    }

    /// Transport failure: keep the active edit so the user can retry.
    pub fn submit_failed(&mut self, reason: String) {
        let mut next = self.store.get().clone();
        next.saving = false;
        next.submit_error = reason;
        self.set_state(next);
    }

    /// Seed state after a validation-rejection handoff: `dirty` records
    /// whether the edited input was found again in the replacement markup,
    /// and the pre-submit snapshot is carried forward so cancel reverts past
    /// the whole submission attempt.
    pub fn resume_after_rejection(&mut self, dirty: bool, original_markup: String) {
        let mut next = self.store.get().clone();
        next.dirty = dirty;
        next.original_markup = original_markup;
        self.set_state(next);
    }

    pub fn edit_input(&mut self, input: NodeId, edit: InputEdit) {
        let mut text = self.doc.text(input).to_string();
        match edit {
            InputEdit::Insert(c) => text.push(c),
            InputEdit::Backspace => {
                text.pop();
            }
        }
        self.doc.set_text(input, &text);
    }

    /// Current content of the form, keyed by input name.
    pub fn content(&self) -> FormContent {
        let mut out = BTreeMap::new();
        for field in &self.fields {
            let name = self
                .doc
                .attr(field.input, "name")
                .or_else(|| self.doc.attr(field.input, "id"));
            if let Some(name) = name {
                out.insert(name.to_string(), self.doc.text(field.input).to_string());
            }
        }
        FormContent { fields: out }
    }
}
