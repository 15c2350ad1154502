//! The Airbrake v3 notice document.

use faultline::{Error, Value};
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};

use crate::NotifierConfig;

/// A notice as accepted by the Airbrake v3 `notices` endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct Notice {
    /// The reported error, followed by the foreign errors that caused it.
    pub errors: Vec<NoticeError>,
    /// Information about the environment and request.
    pub context: NoticeContext,
    /// The merged error context.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, JsonValue>,
}

/// One error entry of a [`Notice`].
#[derive(Clone, Debug, Serialize)]
pub struct NoticeError {
    /// The error type, used for grouping.
    #[serde(rename = "type")]
    pub kind: String,
    /// The error message.
    pub message: String,
    /// The stack snapshot, most recent call first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<StackFrame>,
}

/// One frame of a [`NoticeError`] backtrace.
#[derive(Clone, Debug, Serialize)]
pub struct StackFrame {
    /// The source file.
    pub file: String,
    /// The function name.
    pub function: String,
    /// The source line, `0` if unknown.
    pub line: u32,
}

/// The `context` object of a [`Notice`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeContext {
    /// The library sending the notice.
    pub notifier: NotifierInfo,
    /// The programming language.
    pub language: &'static str,
    /// The operating system.
    pub os: &'static str,
    /// The notice severity.
    pub severity: &'static str,
    /// The deployment environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// The URL of the request being served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The method of the request being served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    /// The `User-Agent` of the request being served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// The `context.notifier` object of a [`Notice`].
#[derive(Copy, Clone, Debug, Serialize)]
pub struct NotifierInfo {
    /// Library name.
    pub name: &'static str,
    /// Library version.
    pub version: &'static str,
}

impl Default for NotifierInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Notice {
    /// Builds the notice for `error`.
    ///
    /// The stack snapshot of the chain becomes the backtrace of the first
    /// entry, the outermost HTTP request fills the request fields of the
    /// context, and the merged error context becomes `params`.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    /// use faultline_notifier::{Notice, NotifierConfig};
    ///
    /// let config = NotifierConfig::new(1, "key").environment("production");
    /// let error = Error::msg("payment declined").with_context([("order", 17)]);
    ///
    /// let notice = Notice::from_error(&error, &config);
    /// assert_eq!(notice.errors[0].message, "payment declined");
    /// assert_eq!(notice.params["order"], 17);
    /// ```
    pub fn from_error(error: &Error, config: &NotifierConfig) -> Self {
        let backtrace = error
            .stack_trace()
            .map(|trace| {
                trace
                    .frames()
                    .iter()
                    .map(|frame| StackFrame {
                        file: frame
                            .path
                            .as_ref()
                            .map(|path| path.raw_path.clone())
                            .unwrap_or_default(),
                        function: frame.function.clone(),
                        line: frame.line.unwrap_or(0),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut errors = vec![NoticeError {
            kind: error.type_name().to_string(),
            message: error.to_string(),
            backtrace,
        }];
        let mut source = error.root_error().and_then(|root| root.source());
        while let Some(cause) = source {
            errors.push(NoticeError {
                kind: "cause".to_string(),
                message: cause.to_string(),
                backtrace: Vec::new(),
            });
            source = cause.source();
        }

        let request = error.http_request();
        let context = NoticeContext {
            notifier: NotifierInfo::default(),
            language: "Rust",
            os: std::env::consts::OS,
            severity: "error",
            environment: config.environment.clone(),
            url: request.map(|request| request.uri().to_string()),
            http_method: request.map(|request| request.method().to_string()),
            user_agent: request
                .and_then(|request| request.user_agent())
                .map(str::to_string),
        };

        let params = error
            .context()
            .iter()
            .map(|(key, value)| (key.to_string(), json_value(value)))
            .collect();

        Self {
            errors,
            context,
            params,
        }
    }
}

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Str(text) => JsonValue::String(text.to_string()),
        Value::Int(number) => JsonValue::from(*number),
        Value::Uint(number) => JsonValue::from(*number),
        Value::Float(number) => Number::from_f64(*number).map_or(JsonValue::Null, JsonValue::Number),
        Value::Bool(flag) => JsonValue::Bool(*flag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(json_value(&Value::Float(f64::NAN)), JsonValue::Null);
        assert_eq!(json_value(&Value::Float(1.5)), serde_json::json!(1.5));
    }

    #[test]
    fn test_notice_without_request_omits_request_fields() {
        let notice = Notice::from_error(&Error::msg("error"), &NotifierConfig::new(1, "k"));
        let json = serde_json::to_value(&notice).unwrap();
        let context = json["context"].as_object().unwrap();
        assert!(!context.contains_key("url"));
        assert!(!context.contains_key("httpMethod"));
        assert_eq!(context["language"], "Rust");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_foreign_sources_become_causes() {
        #[derive(Debug)]
        struct Outer(std::io::Error);

        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("outer failure")
            }
        }

        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let error = Error::new(Outer(std::io::Error::other("inner failure")));
        let notice = Notice::from_error(&error, &NotifierConfig::new(1, "k"));

        let messages: Vec<&str> = notice.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["outer failure", "inner failure"]);
        assert_eq!(notice.errors[1].kind, "cause");
    }
}
