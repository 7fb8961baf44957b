//! Tokenizer Registry: per-model token counters with a shared LRU.
//!
//! Instances are keyed by `(model, options)` and shared (`Arc`) across
//! callers that request the same key, mirroring the storage engine's
//! cache-in-front-of-disk idiom applied to a pure-CPU resource instead.

use lru::LruCache;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

/// Parameters for a model unknown to the registry's built-in table.
const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;
const DEFAULT_CONTEXT_SIZE: u64 = 4096;
const DEFAULT_MAX_OUTPUT_TOKENS: u64 = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerOptions {
    pub cache_capacity: usize,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self { cache_capacity: 4096 }
    }
}

impl Eq for TokenizerOptions {}

impl Hash for TokenizerOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cache_capacity.hash(state);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    pub context_size: u64,
    pub chars_per_token: f32,
    pub max_output_tokens: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

fn builtin_model_params(model: &str) -> ModelParams {
    match model {
        "gpt-4o" | "gpt-4o-mini" => ModelParams {
            context_size: 128_000,
            chars_per_token: 3.8,
            max_output_tokens: 16_384,
        },
        "gpt-4-turbo" => ModelParams {
            context_size: 128_000,
            chars_per_token: 3.8,
            max_output_tokens: 4096,
        },
        "claude-3-5-sonnet" | "claude-3-7-sonnet" => ModelParams {
            context_size: 200_000,
            chars_per_token: 3.6,
            max_output_tokens: 8192,
        },
        "claude-3-opus" => ModelParams {
            context_size: 200_000,
            chars_per_token: 3.6,
            max_output_tokens: 4096,
        },
        _ => ModelParams::default(),
    }
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// A single model's token counter. Immutable after construction; the only
/// interior mutability is the count cache, synchronized internally.
pub struct Tokenizer {
    model: String,
    params: ModelParams,
    cache: Mutex<LruCache<u64, u64>>,
}

impl Tokenizer {
    fn new(model: &str, params: ModelParams, cache_capacity: usize) -> Self {
        let cap = NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Self {
            model: model.to_string(),
            params,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn context_size(&self) -> u64 {
        self.params.context_size
    }

    pub fn max_output_tokens(&self) -> u64 {
        self.params.max_output_tokens
    }

    pub fn chars_per_token(&self) -> f32 {
        self.params.chars_per_token
    }

    /// Heuristic token count: `ceil(len(text) / chars_per_token)`, cached by
    /// content hash so repeated counts on the same text are cache-warm.
    pub fn count_tokens(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let key = content_hash(text);
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(&cached) = cache.get(&key) {
                return cached;
            }
        }
        let count = (text.chars().count() as f32 / self.params.chars_per_token).ceil() as u64;
        self.cache.lock().unwrap().put(key, count);
        count
    }

    /// Truncate `text` so its token count fits within `context_size -
    /// reserve`, trimming from the tail on a char boundary. Returns the
    /// (possibly unchanged) text, its token count, and whether truncation
    /// occurred.
    pub fn fit_to_context(&self, text: &str, reserve: u64) -> (String, u64, bool) {
        let budget = self.params.context_size.saturating_sub(reserve);
        let total = self.count_tokens(text);
        if total <= budget {
            return (text.to_string(), total, false);
        }
        if budget == 0 {
            return (String::new(), 0, true);
        }
        let max_chars = (budget as f32 * self.params.chars_per_token).floor() as usize;
        let truncated: String = text.chars().take(max_chars).collect();
        let tokens = self.count_tokens(&truncated);
        (truncated, tokens, true)
    }
}

/// Registry of shared [`Tokenizer`] instances keyed by `(model, options)`.
/// Repeated lookups with the same key return the same `Arc`.
pub struct TokenizerRegistry {
    instances: RwLock<HashMap<(String, TokenizerOptions), Arc<Tokenizer>>>,
    overrides: RwLock<HashMap<String, ModelParams>>,
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenizerRegistry {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Register custom parameters for `model`, overriding the built-in
    /// table for future `get` calls. Existing shared instances are
    /// unaffected (tokenizers are immutable after construction).
    pub fn register_model(&self, model: &str, params: ModelParams) {
        self.overrides.write().unwrap().insert(model.to_string(), params);
    }

    pub fn get(&self, model: &str, options: TokenizerOptions) -> Arc<Tokenizer> {
        let key = (model.to_string(), options.clone());
        if let Some(existing) = self.instances.read().unwrap().get(&key) {
            return Arc::clone(existing);
        }
        let mut instances = self.instances.write().unwrap();
        if let Some(existing) = instances.get(&key) {
            return Arc::clone(existing);
        }
        let params = self
            .overrides
            .read()
            .unwrap()
            .get(model)
            .copied()
            .unwrap_or_else(|| builtin_model_params(model));
        let tokenizer = Arc::new(Tokenizer::new(model, params, options.cache_capacity));
        instances.insert(key, Arc::clone(&tokenizer));
        tokenizer
    }

    pub fn get_default(&self, model: &str) -> Arc<Tokenizer> {
        self.get(model, TokenizerOptions::default())
    }
}
