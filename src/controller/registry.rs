use crate::controller::FormController;

/// Controllers attached to the currently rendered form root. A reload swaps
/// the whole set; the submission pipeline uses the lookup to find the
/// instance created over replacement markup instead of holding a reference
/// to the discarded one.
#[derive(Default)]
pub struct ControllerRegistry {
    attached: Vec<FormController>,
}

impl ControllerRegistry {
    pub fn attach(&mut self, ctrl: FormController) {
        self.attached.clear();
        self.attached.push(ctrl);
    }

    pub fn form_controller(&self) -> Option<&FormController> {
        self.attached.first()
    }

    pub fn form_controller_mut(&mut self) -> Option<&mut FormController> {
        self.attached.first_mut()
    }
}
