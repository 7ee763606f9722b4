use calmform::form::{FieldValue, FormModel};

#[derive(Clone, calmform::form::FormModel)]
struct SignupForm {
    #[form(key = "emailAddress")]
    email: String,
    age: i64,
    #[form(skip)]
    scratch: String,
}

fn main() {
    let fields = SignupForm::fields();
    assert_eq!(fields.email().as_str(), "emailAddress");
    assert_eq!(fields.age().as_str(), "age");

    let model = SignupForm {
        email: "a@calm.ui".to_string(),
        age: 30,
        scratch: String::new(),
    };
    let values = model.values();
    assert_eq!(values.len(), 2);
    assert_eq!(values.get(fields.email()), Some(&FieldValue::from("a@calm.ui")));
    assert_eq!(values.get(fields.age()), Some(&FieldValue::Number(30.0)));
    assert!(model.scratch.is_empty());
}
