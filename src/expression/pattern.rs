use crate::core::{CuraError, Result};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const PATTERN_CACHE_CAPACITY: usize = 200;

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> = Arc::new(Mutex::new(
        LruCache::new(NonZeroUsize::new(PATTERN_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    ));
}

/// Converts a LIKE pattern to an anchored regex. `%` spans newlines.
#[inline]
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Simple shapes that need no regex
#[inline]
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let fold = |s: &str| {
        if case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    };

    let wildcards = pattern.matches('%').count();

    // exact
    if wildcards == 0 {
        return Some(if case_sensitive {
            text == pattern
        } else {
            text.to_lowercase() == pattern.to_lowercase()
        });
    }

    // "prefix%"
    if wildcards == 1 && pattern.ends_with('%') {
        let prefix = &pattern[..pattern.len() - 1];
        return Some(fold(text).starts_with(&fold(prefix)));
    }

    // "%suffix"
    if wildcards == 1 && pattern.starts_with('%') {
        return Some(fold(text).ends_with(&fold(&pattern[1..])));
    }

    // "%substring%"
    if wildcards == 2 && pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') {
        let substring = &pattern[1..pattern.len() - 1];
        return Some(fold(text).contains(&fold(substring)));
    }

    None
}

fn cached(cache_key: String, compile: impl FnOnce() -> Result<Regex>) -> Result<Arc<Regex>> {
    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled_arc = Arc::new(compile()?);

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        cache.put(cache_key, Arc::clone(&compiled_arc));
    }

    Ok(compiled_arc)
}

fn get_or_compile_like(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_sensitive {
        format!("s:{}", pattern)
    } else {
        format!("i:{}", pattern)
    };

    cached(cache_key, || {
        RegexBuilder::new(&like_to_regex(pattern))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| CuraError::MalformedInput(format!("Invalid LIKE pattern: {}", e)))
    })
}

/// Compiles (or fetches) a plain regular expression from the shared cache.
pub fn cached_regex(pattern: &str) -> Result<Arc<Regex>> {
    cached(format!("r:{}", pattern), || {
        Regex::new(pattern)
            .map_err(|e| CuraError::MalformedInput(format!("Invalid pattern: {}", e)))
    })
}

/// SQL LIKE: `%` any run, `_` one character, `\` escapes.
#[inline]
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let regex = get_or_compile_like(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}

/// Case-insensitive LIKE.
#[inline]
pub fn eval_ilike(text: &str, pattern: &str) -> Result<bool> {
    eval_like(text, pattern, false)
}
