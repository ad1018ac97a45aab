//! Default values for configuration

use super::OcrModelConfig;

/// Default file extensions picked up by the scanner
pub fn default_scan_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

/// Default: only scan the top level of the documents directory
pub fn default_scan_recursive() -> bool {
    false
}

/// Default target characters per chunk
pub fn default_chunk_target_chars() -> usize {
    1000
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default minimum characters per chunk
pub fn default_chunk_min_chars() -> usize {
    100
}

/// Default minimum offset for sentence/word cuts, as a fraction of the target
pub fn default_chunk_min_break_ratio() -> f64 {
    0.5
}

/// Default OCR fallback chain: free tier first, then paid tiers
pub fn default_ocr_models() -> Vec<OcrModelConfig> {
    let endpoint = default_ocr_endpoint();
    [
        "google/gemini-2.0-flash-exp:free",
        "google/gemini-2.0-flash-001",
        "openai/gpt-4o-mini",
        "openai/gpt-4o",
    ]
    .iter()
    .map(|name| OcrModelConfig {
        name: name.to_string(),
        endpoint: endpoint.clone(),
        api_key_env: default_ocr_api_key_env(),
    })
    .collect()
}

/// Default OpenAI-compatible endpoint for vision models
pub fn default_ocr_endpoint() -> String {
    std::env::var("PAGEWISE_OCR_ENDPOINT")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string())
}

/// Default environment variable holding the OCR API key
pub fn default_ocr_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

/// Default extraction prompt sent alongside each page image
pub fn default_ocr_prompt() -> String {
    "Extract all readable text from this page image. Preserve reading order. \
     Return only the extracted text with no commentary."
        .to_string()
}

/// Default OCR request timeout in seconds
pub fn default_ocr_timeout() -> u64 {
    120
}

/// Default number of retries for transport errors and 5xx responses
pub fn default_ocr_transport_retries() -> usize {
    2
}

/// Default rasterization resolution
pub fn default_ocr_dpi() -> u32 {
    150
}

/// Default number of queue entries claimed per batch
pub fn default_queue_batch_limit() -> usize {
    10
}

/// Default age after which a `processing` entry is considered abandoned (30 minutes)
pub fn default_queue_stale_after_secs() -> u64 {
    30 * 60
}

/// Default: scan on startup
pub fn default_scan_on_start() -> bool {
    true
}

/// Default: process the queue on startup
pub fn default_process_on_start() -> bool {
    true
}
