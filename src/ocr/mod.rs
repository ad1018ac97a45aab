//! Page OCR through an ordered chain of vision models
//!
//! This module provides:
//! - A trait for OCR backends (one model each)
//! - An HTTP backend for OpenAI-compatible vision APIs
//! - A fallback chain that moves to the next model when one is rate limited

mod http_backend;

pub use http_backend::*;

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Trait for OCR providers
#[async_trait]
pub trait OcrModel: Send + Sync {
    /// Extract text from a PNG page image.
    ///
    /// Capacity refusals must be reported as [`Error::RateLimited`].
    async fn recognize(&self, image: &[u8]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Text recognized for a page and which model produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutput {
    pub text: String,
    pub model: String,
    pub level: usize,
}

/// Ordered models, free tier first
pub struct OcrChain {
    models: Vec<Box<dyn OcrModel>>,
}

impl OcrChain {
    pub fn new(models: Vec<Box<dyn OcrModel>>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::Config("OCR chain needs at least one model".to_string()));
        }
        Ok(Self { models })
    }

    /// Build the HTTP chain described by configuration
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let models = config
            .models
            .iter()
            .map(|model| {
                HttpVisionModel::from_config(model, config)
                    .map(|m| Box::new(m) as Box<dyn OcrModel>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(models)
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.model_name().to_string()).collect()
    }

    /// Recognize starting from the first model
    pub async fn recognize(&self, image: &[u8]) -> Result<OcrOutput> {
        self.recognize_from(image, 0).await
    }

    /// Recognize starting at `level`, moving down the chain on rate limits.
    ///
    /// Any other error, or a rate limit on the last model, is returned as is.
    pub async fn recognize_from(&self, image: &[u8], level: usize) -> Result<OcrOutput> {
        let mut level = level;

        loop {
            let model = self.models.get(level).ok_or_else(|| {
                Error::Ocr(format!(
                    "No OCR model at level {} (chain has {})",
                    level,
                    self.models.len()
                ))
            })?;

            debug!(model = model.model_name(), level, "Running OCR");
            match model.recognize(image).await {
                Ok(text) => {
                    return Ok(OcrOutput {
                        text,
                        model: model.model_name().to_string(),
                        level,
                    })
                }
                Err(e) if e.is_rate_limit() && level + 1 < self.models.len() => {
                    warn!(
                        model = model.model_name(),
                        next = self.models[level + 1].model_name(),
                        "OCR model rate limited, falling back: {}", e
                    );
                    level += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Reply, ScriptedModel};
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn chain(models: Vec<Arc<ScriptedModel>>) -> OcrChain {
        OcrChain::new(
            models
                .into_iter()
                .map(|m| Box::new(m) as Box<dyn OcrModel>)
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_model_success() {
        let free = Arc::new(ScriptedModel::new("free", Reply::Text("page text".into())));
        let paid = Arc::new(ScriptedModel::new("paid", Reply::Text("other".into())));
        let chain = chain(vec![free.clone(), paid.clone()]);

        let output = chain.recognize(b"png").await.unwrap();
        assert_eq!(output.text, "page text");
        assert_eq!(output.model, "free");
        assert_eq!(paid.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_falls_back_to_next_model() {
        let free = Arc::new(ScriptedModel::new("free", Reply::RateLimited));
        let cheap = Arc::new(ScriptedModel::new("cheap", Reply::RateLimited));
        let paid = Arc::new(ScriptedModel::new("paid", Reply::Text("from paid".into())));
        let chain = chain(vec![free.clone(), cheap.clone(), paid.clone()]);

        let output = chain.recognize(b"png").await.unwrap();
        assert_eq!(output.text, "from paid");
        assert_eq!(output.level, 2);
        assert_eq!(free.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cheap.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let free = Arc::new(ScriptedModel::new("free", Reply::Fail));
        let paid = Arc::new(ScriptedModel::new("paid", Reply::Text("unused".into())));
        let chain = chain(vec![free, paid.clone()]);

        let err = chain.recognize(b"png").await.unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
        assert_eq!(paid.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_on_last_model_propagates() {
        let free = Arc::new(ScriptedModel::new("free", Reply::RateLimited));
        let paid = Arc::new(ScriptedModel::new("paid", Reply::RateLimited));
        let chain = chain(vec![free, paid]);

        let err = chain.recognize(b"png").await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_start_level_and_out_of_range() {
        let free = Arc::new(ScriptedModel::new("free", Reply::Text("free".into())));
        let paid = Arc::new(ScriptedModel::new("paid", Reply::Text("paid".into())));
        let chain = chain(vec![free.clone(), paid]);

        let output = chain.recognize_from(b"png", 1).await.unwrap();
        assert_eq!(output.model, "paid");
        assert_eq!(free.calls.load(Ordering::SeqCst), 0);

        assert!(chain.recognize_from(b"png", 5).await.is_err());
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(OcrChain::new(Vec::new()).is_err());
    }
}
