mod controller;
mod validation;
mod value;


pub use calmform_derive::FormModel;
pub use controller::{
    ControlKind, ControlNode, ControlState, FieldKey, FormControls, FormError, FormGroup,
    FormGroupBuilder, FormId, FormResult, GroupControls, GroupTemplate, RepeatedGroup,
};
pub(crate) use controller::{read_lock, write_lock};
pub use validation::{
    FieldValidator, FormModel, ValidationFailure, ValidationFailureSet, kind,
};
pub use value::{FieldValue, FormSnapshot, GroupValue, ToFieldValue};
