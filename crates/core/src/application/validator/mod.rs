// Argument Validator
// Pure checks of raw request arguments against a tool's schema.
// No filesystem or network access; nothing is spawned for a rejected request.

pub mod rules;

use super::registry::ToolDescriptor;
use crate::domain::{ArgKind, ArgSpec, ArgValue, Constraint, ValidatedArgs, ValidationError, OUTPUT_DIR_ARG};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

/// Validate `raw` against the descriptor's schema and cross-field rules.
///
/// # Errors
/// - ValidationError::TypeMismatch if `raw` is not an object, or a value has the wrong type
/// - ValidationError::UnexpectedArgument for undeclared arguments
/// - ValidationError::MissingArgument for absent (or null) required arguments
/// - ValidationError::ConstraintViolation naming the violated rule
pub fn validate(descriptor: &ToolDescriptor, raw: &Value) -> Result<ValidatedArgs, ValidationError> {
    let empty = Map::new();
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ValidationError::TypeMismatch {
                argument: "arguments".to_string(),
                expected: "an object".to_string(),
                found: json_type_name(other).to_string(),
            })
        }
    };

    for key in map.keys() {
        if key == OUTPUT_DIR_ARG && descriptor.persists() {
            // String destinations are lifted out before validation
            return Err(ValidationError::TypeMismatch {
                argument: OUTPUT_DIR_ARG.to_string(),
                expected: ArgKind::String.as_str().to_string(),
                found: json_type_name(&map[key]).to_string(),
            });
        }
        if !descriptor.schema().iter().any(|spec| spec.name == key.as_str()) {
            return Err(ValidationError::UnexpectedArgument(key.clone()));
        }
    }

    let mut args = ValidatedArgs::new();
    for spec in descriptor.schema() {
        let value = match map.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(ValidationError::MissingArgument(spec.name.to_string()));
                }
                match &spec.default {
                    Some(default) => default.clone(),
                    None => continue,
                }
            }
            Some(value) => {
                let value = convert(spec, value)?;
                for constraint in &spec.constraints {
                    check_constraint(spec, &value, constraint)?;
                }
                value
            }
        };
        args.insert(spec.name, value);
    }

    descriptor.adapter().check(&args)?;
    Ok(args)
}

/// Lexical check of a requested output destination.
///
/// Accepts only relative paths made of normal components, so joining the
/// result onto the output root can never leave it.
pub fn validate_output_dir(descriptor: &ToolDescriptor, dir: &str) -> Result<PathBuf, ValidationError> {
    if !descriptor.persists() {
        return Err(ValidationError::UnexpectedArgument(OUTPUT_DIR_ARG.to_string()));
    }
    let violation = |reason: &str| ValidationError::constraint(OUTPUT_DIR_ARG, "relative_path", reason);

    if dir.trim().is_empty() {
        return Err(violation("must not be empty"));
    }
    if dir.contains('\0') {
        return Err(violation("must not contain NUL"));
    }
    let path = Path::new(dir);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(violation("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(violation("must be relative to the output root"))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(violation("must name a folder"));
    }
    Ok(clean)
}

fn convert(spec: &ArgSpec, value: &Value) -> Result<ArgValue, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        argument: spec.name.to_string(),
        expected: spec.kind.as_str().to_string(),
        found: json_type_name(value).to_string(),
    };
    match (spec.kind, value) {
        (ArgKind::String, Value::String(s)) => Ok(ArgValue::Str(s.clone())),
        (ArgKind::Integer, Value::Number(n)) => n.as_i64().map(ArgValue::Int).ok_or_else(mismatch),
        (ArgKind::Boolean, Value::Bool(b)) => Ok(ArgValue::Bool(*b)),
        (ArgKind::StringList, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
            .collect::<Result<Vec<_>, _>>()
            .map(ArgValue::List),
        _ => Err(mismatch()),
    }
}

fn check_constraint(spec: &ArgSpec, value: &ArgValue, constraint: &Constraint) -> Result<(), ValidationError> {
    let outcome = match (value, constraint) {
        (ArgValue::Str(s), Constraint::NonEmpty) => {
            if s.trim().is_empty() {
                Err("must not be empty".to_string())
            } else {
                Ok(())
            }
        }
        (ArgValue::List(items), Constraint::NonEmpty) => {
            if items.is_empty() {
                Err("must contain at least one item".to_string())
            } else {
                Ok(())
            }
        }
        (ArgValue::Str(s), c) => check_text(s, c),
        (ArgValue::List(items), c) => items.iter().try_for_each(|item| check_text(item, c)),
        (ArgValue::Int(i), Constraint::Port) => rules::port(*i),
        (ArgValue::Int(i), Constraint::IntRange { min, max }) => rules::int_range(*i, *min, *max),
        _ => Ok(()),
    };
    outcome.map_err(|reason| ValidationError::constraint(spec.name, constraint.rule(), reason))
}

fn check_text(value: &str, constraint: &Constraint) -> rules::RuleResult {
    match constraint {
        Constraint::Ipv4Network => rules::ipv4_network(value),
        Constraint::PortList => rules::port_list(value),
        Constraint::OneOf(set) => rules::one_of(value, set),
        Constraint::Domain => rules::domain(value),
        Constraint::Host => rules::host(value),
        Constraint::Email => rules::email(value),
        Constraint::HttpUrl => rules::http_url(value),
        Constraint::Bandwidth => rules::bandwidth(value),
        Constraint::Username => rules::username(value),
        Constraint::MacAddress => rules::mac_address(value),
        Constraint::InterfaceName => rules::interface_name(value),
        Constraint::SafeText => rules::safe_text(value),
        Constraint::FilePath => rules::file_path(value),
        Constraint::OcrSource => rules::ocr_source(value),
        Constraint::Port | Constraint::IntRange { .. } | Constraint::NonEmpty => Ok(()),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::test_adapters::EchoAdapter;
    use serde_json::json;
    use std::sync::Arc;

    fn echo() -> ToolDescriptor {
        ToolDescriptor::from_adapter(Arc::new(EchoAdapter::new("Echo")))
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let args = validate(&echo(), &json!({"target": "example.com"})).unwrap();
        assert_eq!(args.str("target"), Some("example.com"));
        assert_eq!(args.str("mode"), Some("lines"));
        assert!(!args.contains("count"));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let err = validate(&echo(), &json!({"target": null})).unwrap_err();
        assert_eq!(err, ValidationError::MissingArgument("target".to_string()));

        let args = validate(&echo(), &json!({"target": "x", "mode": null})).unwrap();
        assert_eq!(args.str("mode"), Some("lines"));
    }

    #[test]
    fn test_type_mismatch() {
        let err = validate(&echo(), &json!({"target": "x", "count": "3"})).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref argument, .. } if argument == "count"));

        let err = validate(&echo(), &json!({"target": "x", "count": 2.5})).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));

        let err = validate(&echo(), &json!(["target"])).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref argument, .. } if argument == "arguments"));
    }

    #[test]
    fn test_constraint_violation_names_rule() {
        let err = validate(&echo(), &json!({"target": "x", "mode": "loud"})).unwrap_err();
        match err {
            ValidationError::ConstraintViolation { argument, rule, .. } => {
                assert_eq!(argument, "mode");
                assert_eq!(rule, "one_of(lines|strict)");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = validate(&echo(), &json!({"target": "x", "count": 9})).unwrap_err();
        assert!(matches!(err, ValidationError::ConstraintViolation { ref rule, .. } if rule == "int_range(1..=5)"));
    }

    #[test]
    fn test_unexpected_argument() {
        let err = validate(&echo(), &json!({"target": "x", "shell": "sh"})).unwrap_err();
        assert_eq!(err, ValidationError::UnexpectedArgument("shell".to_string()));
    }

    #[test]
    fn test_cross_field_rule_runs_after_per_argument_checks() {
        let err = validate(&echo(), &json!({"target": "x", "mode": "strict"})).unwrap_err();
        assert!(matches!(err, ValidationError::ConstraintViolation { ref argument, .. } if argument == "count"));

        assert!(validate(&echo(), &json!({"target": "x", "mode": "strict", "count": 2})).is_ok());
    }

    #[test]
    fn test_non_string_output_dir_is_type_mismatch() {
        let err = validate(&echo(), &json!({"target": "x", "output_dir": 3})).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { ref argument, .. } if argument == "output_dir"));
    }

    #[test]
    fn test_output_dir_must_stay_under_root() {
        let descriptor = echo();
        assert_eq!(
            validate_output_dir(&descriptor, "runs/./today").unwrap(),
            PathBuf::from("runs/today")
        );
        assert!(validate_output_dir(&descriptor, "../escape").is_err());
        assert!(validate_output_dir(&descriptor, "runs/../../escape").is_err());
        assert!(validate_output_dir(&descriptor, "/etc").is_err());
        assert!(validate_output_dir(&descriptor, ".").is_err());
        assert!(validate_output_dir(&descriptor, "").is_err());
    }
}
