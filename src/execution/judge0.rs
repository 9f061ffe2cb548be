use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{ExecutionError, ExecutionOutcome, Executor};

const STATUS_ACCEPTED: i64 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Judge0Config {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_host: Option<String>,
    /// Unset means requests wait as long as the backend takes.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Judge0 language id for a language identifier.
pub fn language_id(language: &str) -> Option<u32> {
    let id = match language.to_ascii_lowercase().as_str() {
        "javascript" => 63,
        "typescript" => 74,
        "python" => 71,
        "java" => 62,
        "cpp" => 54,
        "c" => 50,
        "csharp" => 51,
        "go" => 60,
        "rust" => 73,
        "php" => 68,
        "ruby" => 72,
        "swift" => 83,
        "kotlin" => 78,
        _ => return None,
    };
    Some(id)
}

/// Client for a Judge0-compatible execution API, using synchronous
/// (`wait=true`) base64-encoded submissions.
pub struct Judge0Client {
    client: Client,
    config: Judge0Config,
}

impl Judge0Client {
    pub fn new(config: Judge0Config) -> Result<Self, ExecutionError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        info!("⚙️ Judge0 client configured for {}", config.base_url);
        Ok(Self { client, config })
    }

    fn submissions_url(&self) -> String {
        format!(
            "{}/submissions?base64_encoded=true&wait=true",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Executor for Judge0Client {
    async fn submit(&self, code: &str, language: &str, stdin: &str) -> Result<ExecutionOutcome, ExecutionError> {
        let language_id =
            language_id(language).ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))?;

        let request_body = serde_json::json!({
            "source_code": STANDARD.encode(code),
            "language_id": language_id,
            "stdin": STANDARD.encode(stdin),
        });

        let mut request = self.client.post(self.submissions_url()).json(&request_body);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-RapidAPI-Key", key);
        }
        if let Some(host) = &self.config.api_host {
            request = request.header("X-RapidAPI-Host", host);
        }

        debug!("Submitting {} bytes of {} to Judge0", code.len(), language);
        let response = request.send().await?;

        if !response.status().is_success() {
            warn!("Judge0 responded with {}", response.status());
            return Err(ExecutionError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        parse_submission(&body)
    }
}

fn decode_field(body: &Value, field: &str) -> Result<String, ExecutionError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(encoded)) => {
            // Judge0 wraps base64 output at 60 columns
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| ExecutionError::Decode(format!("{}: {}", field, e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Some(other) => Err(ExecutionError::Decode(format!("{} is not a string: {}", field, other))),
    }
}

pub(crate) fn parse_submission(body: &Value) -> Result<ExecutionOutcome, ExecutionError> {
    let status = body
        .get("status")
        .ok_or_else(|| ExecutionError::Decode("missing status".to_string()))?;
    let status_id = status
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ExecutionError::Decode("missing status.id".to_string()))?;
    let status_description = status
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ExecutionOutcome {
        succeeded: status_id == STATUS_ACCEPTED,
        stdout: decode_field(body, "stdout")?,
        stderr: decode_field(body, "stderr")?,
        compile_output: decode_field(body, "compile_output")?,
        status_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_ids() {
        assert_eq!(language_id("javascript"), Some(63));
        assert_eq!(language_id("Python"), Some(71));
        assert_eq!(language_id("RUST"), Some(73));
        assert_eq!(language_id("cobol"), None);
    }

    #[test]
    fn test_parse_accepted_submission() {
        let body = json!({
            "stdout": STANDARD.encode("3\n"),
            "stderr": null,
            "compile_output": null,
            "status": {"id": 3, "description": "Accepted"}
        });
        let outcome = parse_submission(&body).unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.stdout, "3\n");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.status_description, "Accepted");
    }

    #[test]
    fn test_parse_compile_error() {
        let body = json!({
            "stdout": null,
            "compile_output": format!("{}\n{}", &STANDARD.encode("main.cpp:1:1: error: expected")[..20], &STANDARD.encode("main.cpp:1:1: error: expected")[20..]),
            "status": {"id": 6, "description": "Compilation Error"}
        });
        let outcome = parse_submission(&body).unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.compile_output, "main.cpp:1:1: error: expected");
        assert_eq!(
            outcome.error_message().as_deref(),
            Some("Compilation Error\nmain.cpp:1:1: error: expected")
        );
    }

    #[test]
    fn test_parse_rejects_missing_status() {
        assert!(matches!(parse_submission(&json!({"stdout": null})), Err(ExecutionError::Decode(_))));
        assert!(matches!(
            parse_submission(&json!({"stdout": "***", "status": {"id": 3}})),
            Err(ExecutionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_language_skips_request() {
        let client = Judge0Client::new(Judge0Config {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            api_host: None,
            timeout_secs: Some(1),
        })
        .unwrap();
        let err = client.submit("x", "brainfuck", "").await.unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedLanguage(lang) if lang == "brainfuck"));
    }

    #[test]
    fn test_submissions_url_trims_slash() {
        let client = Judge0Client::new(Judge0Config {
            base_url: "https://judge0.example.com/".into(),
            api_key: None,
            api_host: None,
            timeout_secs: None,
        })
        .unwrap();
        assert_eq!(
            client.submissions_url(),
            "https://judge0.example.com/submissions?base64_encoded=true&wait=true"
        );
    }
}
