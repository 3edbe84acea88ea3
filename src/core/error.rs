use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    YamlParseFailed,
    YamlPathNotFound,
    YamlPathInvalid,
    YamlStructuralMismatch,

    PackageVersionUnresolved,
    TriggerAmbiguousRef,

    RemoteRequestFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::YamlParseFailed => "yaml.parse_failed",
            ErrorCode::YamlPathNotFound => "yaml.path_not_found",
            ErrorCode::YamlPathInvalid => "yaml.path_invalid",
            ErrorCode::YamlStructuralMismatch => "yaml.structural_mismatch",

            ErrorCode::PackageVersionUnresolved => "package.version_unresolved",
            ErrorCode::TriggerAmbiguousRef => "trigger.ambiguous_ref",

            ErrorCode::RemoteRequestFailed => "remote.request_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlParseDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlPathDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageUnresolvedDetails {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    /// Malformed YAML. Carries the underlying syntax diagnostic.
    pub fn yaml_parse(error: impl Into<String>, line: Option<usize>, column: Option<usize>) -> Self {
        let error = error.into();
        let message = format!("Unable to parse YAML: {}", error);
        Self::new(
            ErrorCode::YamlParseFailed,
            message,
            to_details(YamlParseDetails {
                error,
                line,
                column,
            }),
        )
    }

    pub fn yaml_path_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::YamlPathNotFound,
            format!("Path {} not found", path),
            to_details(YamlPathDetails {
                path,
                expected: None,
                found: None,
            }),
        )
    }

    pub fn yaml_path_invalid(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::YamlPathInvalid,
            format!("Invalid path {}: {}", path, problem),
            serde_json::json!({ "path": path, "problem": problem }),
        )
    }

    pub fn yaml_structural_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let expected = expected.into();
        let found = found.into();
        Self::new(
            ErrorCode::YamlStructuralMismatch,
            format!("Expected {} at {}, found {}", expected, path, found),
            to_details(YamlPathDetails {
                path,
                expected: Some(expected),
                found: Some(found),
            }),
        )
    }

    pub fn package_version_unresolved(
        package: impl Into<String>,
        major_version: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::PackageVersionUnresolved,
            message,
            to_details(PackageUnresolvedDetails {
                package: package.into(),
                major_version,
            }),
        )
    }

    pub fn trigger_ambiguous_ref(params: Vec<String>) -> Self {
        Self::new(
            ErrorCode::TriggerAmbiguousRef,
            format!(
                "multiple git/clone tasks use different ref init params: {}",
                params.join(", ")
            ),
            serde_json::json!({ "params": params }),
        )
        .with_hint("Point every git/clone task's `with.ref` at the same init param")
    }

    pub fn remote_request_failed(message: impl Into<String>, details: Value) -> Self {
        Self::new(ErrorCode::RemoteRequestFailed, message, details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Text of the underlying error carried in `details`, falling back to the message.
    pub fn detail_text(&self) -> String {
        self.details
            .get("error")
            .and_then(Value::as_str)
            .map(|s| format!("{}: {}", self.message, s))
            .unwrap_or_else(|| self.message.clone())
    }

    pub fn is_structural_mismatch(&self) -> bool {
        self.code == ErrorCode::YamlStructuralMismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dotted() {
        assert_eq!(ErrorCode::YamlPathNotFound.as_str(), "yaml.path_not_found");
        assert_eq!(
            ErrorCode::PackageVersionUnresolved.as_str(),
            "package.version_unresolved"
        );
    }

    #[test]
    fn ambiguous_ref_lists_params() {
        let err = Error::trigger_ambiguous_ref(vec!["commit".into(), "sha".into()]);
        assert!(err.message.contains("different ref init params"));
        assert!(err.message.contains("commit, sha"));
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn detail_text_includes_io_error() {
        let err = Error::internal_io("permission denied", Some("write file".into()));
        assert_eq!(err.detail_text(), "IO error: permission denied");
    }
}
