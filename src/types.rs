use serde_json::Value;

/// Shape description used to check model output before it is trusted.
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// A string. `non_empty` rejects blank strings.
    Text { non_empty: bool },
    /// An array. `non_empty` rejects `[]`.
    List { item: Box<TypeDef>, non_empty: bool },
    Object(Vec<FieldDef>),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: TypeDef,
}

impl TypeDef {
    pub fn text() -> Self {
        TypeDef::Text { non_empty: true }
    }

    pub fn list_of(item: TypeDef) -> Self {
        TypeDef::List {
            item: Box::new(item),
            non_empty: true,
        }
    }
}

/// Single validation error, with a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField { path: String },
    TypeMismatch { path: String, expected: &'static str, found: &'static str },
    Empty { path: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField { path } => {
                write!(f, "Missing required field at path {path}")
            }
            ValidationError::TypeMismatch { path, expected, found } => {
                write!(f, "Type mismatch at {path}: expected {expected}, found {found}")
            }
            ValidationError::Empty { path } => write!(f, "Empty value at {path}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// The only accepted breakdown shape:
/// `{"breakdown": [{"unit": "Week 1", "tasks": ["..."]}, ...]}`.
pub fn breakdown_typedef() -> TypeDef {
    TypeDef::Object(vec![FieldDef {
        name: "breakdown",
        ty: TypeDef::list_of(plan_unit_typedef()),
    }])
}

pub fn plan_unit_typedef() -> TypeDef {
    TypeDef::Object(vec![
        FieldDef {
            name: "unit",
            ty: TypeDef::text(),
        },
        FieldDef {
            name: "tasks",
            ty: TypeDef::list_of(TypeDef::text()),
        },
    ])
}

/// Validate a serde_json::Value against a TypeDef.
///
/// Returns Ok(()) if everything matches, or Err(vec![]) with one or more errors.
pub fn validate(ty: &TypeDef, value: &Value) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_inner(ty, value, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_inner(ty: &TypeDef, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    use TypeDef::*;

    match ty {
        Text { non_empty } => match value.as_str() {
            Some(s) if *non_empty && s.trim().is_empty() => {
                errors.push(ValidationError::Empty {
                    path: path.to_string(),
                });
            }
            Some(_) => {}
            None => errors.push(ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: "string",
                found: value_type_name(value),
            }),
        },
        List { item, non_empty } => {
            let Value::Array(items) = value else {
                errors.push(ValidationError::TypeMismatch {
                    path: path.to_string(),
                    expected: "array",
                    found: value_type_name(value),
                });
                return;
            };

            if *non_empty && items.is_empty() {
                errors.push(ValidationError::Empty {
                    path: path.to_string(),
                });
            }
            for (idx, child) in items.iter().enumerate() {
                let child_path = format!("{path}[{idx}]");
                validate_inner(item, child, &child_path, errors);
            }
        }
        Object(fields) => {
            let Some(obj) = value.as_object() else {
                errors.push(ValidationError::TypeMismatch {
                    path: path.to_string(),
                    expected: "object",
                    found: value_type_name(value),
                });
                return;
            };

            for field in fields {
                let field_path = format!("{path}.{}", field.name);
                match obj.get(field.name) {
                    None => errors.push(ValidationError::MissingField { path: field_path }),
                    Some(v) => validate_inner(&field.ty, v, &field_path, errors),
                }
            }

            // Extra fields are ignored; models like to add "notes".
        }
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_well_formed_breakdown() {
        let value = json!({
            "breakdown": [
                {"unit": "Week 1", "tasks": ["Read chapter 1", "Take notes"]},
                {"unit": "Week 2", "tasks": ["Build a toy project"], "notes": "optional"}
            ]
        });
        assert!(validate(&breakdown_typedef(), &value).is_ok());
    }

    #[test]
    fn test_reports_paths_for_each_problem() {
        let value = json!({
            "breakdown": [
                {"unit": "", "tasks": []},
                {"tasks": ["x", 3]}
            ]
        });
        let errors = validate(&breakdown_typedef(), &value).unwrap_err();

        assert!(errors.contains(&ValidationError::Empty {
            path: "$.breakdown[0].unit".to_string()
        }));
        assert!(errors.contains(&ValidationError::Empty {
            path: "$.breakdown[0].tasks".to_string()
        }));
        assert!(errors.contains(&ValidationError::MissingField {
            path: "$.breakdown[1].unit".to_string()
        }));
        assert!(errors.contains(&ValidationError::TypeMismatch {
            path: "$.breakdown[1].tasks[1]".to_string(),
            expected: "string",
            found: "number",
        }));
    }

    #[test]
    fn test_rejects_empty_breakdown_and_wrong_root() {
        assert!(validate(&breakdown_typedef(), &json!({"breakdown": []})).is_err());
        assert!(validate(&breakdown_typedef(), &json!([1, 2])).is_err());
    }
}
