use serde::Serialize;
use thiserror::Error;

use crate::error::ScriptError;

const RATE_LIMIT_CODE: &str = "AI_RATE_LIMIT";

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub json_mode: bool,
}

impl ModelRequest {
    #[must_use]
    pub fn json(system: Option<String>, prompt: String) -> Self {
        Self {
            system,
            prompt,
            max_tokens: 8192,
            temperature: 0.7,
            json_mode: true,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{provider}: {message}")]
pub struct ModelError {
    pub provider: String,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ModelError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429) || self.code.as_deref() == Some(RATE_LIMIT_CODE)
    }
}

impl From<ModelError> for ScriptError {
    fn from(err: ModelError) -> Self {
        ScriptError::ModelCall {
            provider: err.provider,
            status: err.status,
            message: err.message,
        }
    }
}

/// A text generator. Implementations block until the provider answers or fails.
pub trait TextModel {
    fn provider(&self) -> &str;

    fn generate(&mut self, request: &ModelRequest) -> Result<String, ModelError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReply {
    pub text: String,
    pub provider_used: String,
    pub fallback_used: bool,
    pub last_error: Option<String>,
}

/// Calls `primary`; only a rate-limited failure is retried once on `secondary`.
pub struct FallbackModel {
    primary: Box<dyn TextModel>,
    secondary: Option<Box<dyn TextModel>>,
}

impl FallbackModel {
    #[must_use]
    pub fn new(primary: Box<dyn TextModel>, secondary: Option<Box<dyn TextModel>>) -> Self {
        Self { primary, secondary }
    }

    pub fn generate_with_meta(&mut self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let err = match self.primary.generate(request) {
            Ok(text) => {
                return Ok(ModelReply {
                    text,
                    provider_used: self.primary.provider().to_string(),
                    fallback_used: false,
                    last_error: None,
                })
            }
            Err(err) => err,
        };
        let Some(secondary) = self.secondary.as_mut() else {
            return Err(err);
        };
        if !err.is_rate_limited() {
            return Err(err);
        }
        log::warn!("{} rate limited, falling back to {}", err.provider, secondary.provider());
        let text = secondary.generate(request)?;
        Ok(ModelReply {
            text,
            provider_used: secondary.provider().to_string(),
            fallback_used: true,
            last_error: Some(err.to_string()),
        })
    }
}

impl TextModel for FallbackModel {
    fn provider(&self) -> &str {
        self.primary.provider()
    }

    fn generate(&mut self, request: &ModelRequest) -> Result<String, ModelError> {
        self.generate_with_meta(request).map(|r| r.text)
    }
}

#[cfg(test)]
mod tests {
    use super::{FallbackModel, ModelError, ModelRequest, TextModel};

    struct Fixed {
        name: &'static str,
        reply: Result<String, ModelError>,
        calls: usize,
    }

    impl TextModel for Fixed {
        fn provider(&self) -> &str {
            self.name
        }

        fn generate(&mut self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls += 1;
            self.reply.clone()
        }
    }

    fn failing(name: &'static str, status: Option<u16>, code: Option<&str>) -> Box<Fixed> {
        Box::new(Fixed {
            name,
            reply: Err(ModelError {
                provider: name.to_string(),
                status,
                code: code.map(str::to_string),
                message: "boom".to_string(),
            }),
            calls: 0,
        })
    }

    fn ok(name: &'static str) -> Box<Fixed> {
        Box::new(Fixed {
            name,
            reply: Ok("{\"blocks\":[]}".to_string()),
            calls: 0,
        })
    }

    #[test]
    fn falls_back_only_on_rate_limit() {
        let req = ModelRequest::json(None, "p".to_string());
        let mut model = FallbackModel::new(failing("groq", Some(429), None), Some(ok("gemini")));
        let reply = model.generate_with_meta(&req).unwrap();
        assert!(reply.fallback_used);
        assert_eq!(reply.provider_used, "gemini");
        assert_eq!(reply.last_error.as_deref(), Some("groq: boom"));

        let mut model = FallbackModel::new(failing("groq", Some(500), None), Some(ok("gemini")));
        let err = model.generate_with_meta(&req).unwrap_err();
        assert_eq!(err.status, Some(500));
    }

    #[test]
    fn rate_limit_code_counts_without_status() {
        let err = ModelError {
            provider: "x".to_string(),
            status: None,
            code: Some("AI_RATE_LIMIT".to_string()),
            message: String::new(),
        };
        assert!(err.is_rate_limited());
    }
}
