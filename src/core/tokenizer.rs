//! Token counting via tiktoken.
//!
//! The upstream never reports usage, so prompt and completion token counts
//! are computed locally with the `cl100k_base` encoding. The encoder is
//! loaded once on first use; if loading fails, counting degrades to zero
//! rather than failing the request.

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;
use tracing::warn;

static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!("Failed to initialize tokenizer: {}. Token counting disabled.", e);
        None
    }
});

/// Count tokens in text. Returns 0 when the encoder is unavailable.
pub fn count_tokens(text: &str) -> usize {
    TOKENIZER
        .as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens_nonempty() {
        let tokens = count_tokens("Hello world");
        assert!(tokens > 0);
    }

    #[test]
    fn test_count_tokens_empty() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_count_tokens_monotonic() {
        let short = count_tokens("Hello");
        let long = count_tokens("Hello there, how are you doing today?");
        assert!(long > short);
    }
}
