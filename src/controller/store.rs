/// Authoritative editing state for one form instance. Replaced wholesale on
/// every transition; never mutated field-by-field in place.
#[derive(Clone, Debug, PartialEq)]
pub struct EditingState {
    /// True once the user has changed the field they are currently editing.
    pub dirty: bool,
    /// Indices (into the discovered field list) currently shown as editable.
    pub editing_fields: Vec<usize>,
    /// The member of `editing_fields` that was last focused.
    pub focused_field: Option<usize>,
    /// Serialized markup of the form as it looked when this instance took
    /// over. Cancel reverts to this; a validation-rejection round trip
    /// carries it forward into the replacement instance.
    pub original_markup: String,
    /// A save is currently in flight.
    pub saving: bool,
    /// Transport failure message; empty means no error.
    pub submit_error: String,
}

impl EditingState {
    pub fn at_rest(original_markup: String) -> Self {
        Self {
            dirty: false,
            editing_fields: Vec::new(),
            focused_field: None,
            original_markup,
            saving: false,
            submit_error: String::new(),
        }
    }
}

/// Minimal single-value state container with replace-and-notify semantics.
/// The owner re-runs its projection after every `set`; the version counter
/// exists so tests can assert how often that happened.
pub struct Store<T> {
    current: T,
    version: u64,
}

impl<T> Store<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: initial,
            version: 0,
        }
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn set(&mut self, next: T) {
        self.current = next;
        self.version = self.version.wrapping_add(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_value_and_bumps_version() {
        let mut store = Store::new(EditingState::at_rest("orig".into()));
        assert_eq!(store.version(), 0);
        let mut next = store.get().clone();
        next.dirty = true;
        store.set(next);
        assert!(store.get().dirty);
        assert_eq!(store.get().original_markup, "orig");
        assert_eq!(store.version(), 1);
    }
}
