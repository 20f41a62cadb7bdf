//! Imperfection injector: simulated typing errors.
//!
//! A small fraction of outgoing messages get one interior word locally
//! corrupted; the orchestrator sends the corrupted text first and edits it
//! back to the original shortly after, the way a person fixes their own typo.

use rand::Rng;
use rand::RngCore;

#[derive(Debug, Clone, PartialEq)]
pub struct TypoOutcome {
    pub text: String,
    pub has_typo: bool,
}

pub struct ImperfectionInjector {
    probability: f64,
}

const MIN_WORD_LEN: usize = 3;

impl ImperfectionInjector {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Maybe corrupt one word of `text`. Texts with fewer than two words, or
    /// with no eligible word, pass through untouched with `has_typo = false`;
    /// that is the defined no-op path, not an error.
    pub fn apply(&self, text: &str, rng: &mut dyn RngCore) -> TypoOutcome {
        let spans = word_spans(text);
        if spans.len() < 2 {
            return TypoOutcome {
                text: text.to_string(),
                has_typo: false,
            };
        }
        // Interior words only; a two-word message may corrupt its second word.
        let hi = if spans.len() == 2 { 2 } else { spans.len() - 1 };
        let eligible: Vec<usize> = (1..hi)
            .filter(|&i| {
                let (s, e) = spans[i];
                text[s..e].chars().count() >= MIN_WORD_LEN
            })
            .collect();
        if eligible.is_empty() || !rng.gen_bool(self.probability) {
            return TypoOutcome {
                text: text.to_string(),
                has_typo: false,
            };
        }

        let (s, e) = spans[eligible[rng.gen_range(0..eligible.len())]];
        // Splice in place so surrounding whitespace survives untouched.
        let mut out = String::with_capacity(text.len() + 1);
        out.push_str(&text[..s]);
        out.push_str(&corrupt_word(&text[s..e], rng));
        out.push_str(&text[e..]);
        TypoOutcome {
            text: out,
            has_typo: true,
        }
    }
}

/// Byte ranges of the whitespace-separated words of `text`, in order.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Apply one local corruption transform, guaranteed to change the word.
fn corrupt_word(word: &str, rng: &mut dyn RngCore) -> String {
    let chars: Vec<char> = word.chars().collect();
    let corrupted = match rng.gen_range(0..3u8) {
        0 => {
            // Duplicate a letter
            let i = rng.gen_range(0..chars.len());
            let mut out = chars.clone();
            out.insert(i, chars[i]);
            out.into_iter().collect::<String>()
        }
        1 => {
            // Drop the last letter
            chars[..chars.len() - 1].iter().collect::<String>()
        }
        _ => {
            // Swap an adjacent pair
            let i = rng.gen_range(0..chars.len() - 1);
            let mut out = chars.clone();
            out.swap(i, i + 1);
            out.into_iter().collect::<String>()
        }
    };
    if corrupted == word {
        // Swapping identical letters was a no-op; truncation always differs.
        chars[..chars.len() - 1].iter().collect()
    } else {
        corrupted
    }
}

// ============================================================================
// Tests
// ============================================================================
