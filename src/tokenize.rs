//! Free-text tokenization
//!
//! Tokens are maximal runs of alphanumeric characters, lowercased. The
//! policy decides whether apostrophes stay inside tokens, whether short
//! tokens are dropped, and whether "alphanumeric" means ASCII only or the
//! full Unicode classes (with NFC normalization first).

use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// `[0-9A-Za-z]`; every other byte separates tokens
    #[default]
    Ascii,
    /// `char::is_alphanumeric` after NFC normalization
    Unicode,
}

/// How free text is split into tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Tokens shorter than this (in characters) are dropped
    pub min_len: usize,
    /// Keep `'` inside tokens ("don't" stays one token)
    pub keep_apostrophes: bool,
    pub charset: Charset,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            min_len: 1,
            keep_apostrophes: false,
            charset: Charset::Ascii,
        }
    }
}

/// Reusable tokenizer; holds scratch buffers so steady-state tokenizing does not allocate
pub struct Tokenizer {
    policy: TokenPolicy,
    token: String,
    normalized: String,
}

impl Tokenizer {
    pub fn new(policy: TokenPolicy) -> Self {
        Self {
            policy,
            token: String::with_capacity(64),
            normalized: String::new(),
        }
    }

    /// Call `emit` once per token in `text`. Returns the number of tokens emitted.
    pub fn for_each_token<F: FnMut(&str)>(&mut self, text: &str, mut emit: F) -> u64 {
        let policy = self.policy;
        let mut emitted = 0u64;
        let mut token = std::mem::take(&mut self.token);
        let mut chars_in_token = 0usize;
        let mut has_alnum = false;

        let mut flush = |token: &mut String, chars: &mut usize, alnum: &mut bool| {
            if *alnum && *chars >= policy.min_len {
                emit(token);
                emitted += 1;
            }
            token.clear();
            *chars = 0;
            *alnum = false;
        };

        match policy.charset {
            Charset::Ascii => {
                for &b in text.as_bytes() {
                    if b.is_ascii_alphanumeric() {
                        token.push(b.to_ascii_lowercase() as char);
                        chars_in_token += 1;
                        has_alnum = true;
                    } else if b == b'\'' && policy.keep_apostrophes {
                        token.push('\'');
                        chars_in_token += 1;
                    } else if !token.is_empty() {
                        flush(&mut token, &mut chars_in_token, &mut has_alnum);
                    }
                }
            }
            Charset::Unicode => {
                let mut normalized = std::mem::take(&mut self.normalized);
                normalized.clear();
                normalized.extend(text.nfc());
                for c in normalized.chars() {
                    let c = if c == '\u{2019}' || c == '\u{2018}' { '\'' } else { c };
                    if c.is_alphanumeric() {
                        for lower in c.to_lowercase() {
                            token.push(lower);
                            chars_in_token += 1;
                        }
                        has_alnum = true;
                    } else if c == '\'' && policy.keep_apostrophes {
                        token.push('\'');
                        chars_in_token += 1;
                    } else if !token.is_empty() {
                        flush(&mut token, &mut chars_in_token, &mut has_alnum);
                    }
                }
                self.normalized = normalized;
            }
        }
        if !token.is_empty() {
            flush(&mut token, &mut chars_in_token, &mut has_alnum);
        }

        self.token = token;
        emitted
    }

    /// Collect tokens of `text` into owned strings
    pub fn tokenize(&mut self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.for_each_token(text, |t| out.push(t.to_owned()));
        out
    }
}
