//! PII redaction for prompts and responses.
//!
//! Detected spans are replaced by a placeholder per kind. Placeholders contain
//! no digits and no `@`, so masked text never matches a pattern again.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b").unwrap()
});

/// 13 to 16 digits, optionally grouped by spaces or dashes.
static CARD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d(?:[ -]?\d){12,15}\b").unwrap());

static SSN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b")
        .unwrap()
});

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]?\d{4}\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    Email,
    Card,
    Ssn,
    Ipv4,
    Phone,
}

impl PiiKind {
    /// Most specific first, so one span is never counted twice.
    pub const ALL: [PiiKind; 5] = [
        PiiKind::Email,
        PiiKind::Card,
        PiiKind::Ssn,
        PiiKind::Ipv4,
        PiiKind::Phone,
    ];

    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiKind::Email => "[EMAIL]",
            PiiKind::Card => "[CARD]",
            PiiKind::Ssn => "[SSN]",
            PiiKind::Ipv4 => "[IP]",
            PiiKind::Phone => "[PHONE]",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            PiiKind::Email => &EMAIL_PATTERN,
            PiiKind::Card => &CARD_PATTERN,
            PiiKind::Ssn => &SSN_PATTERN,
            PiiKind::Ipv4 => &IPV4_PATTERN,
            PiiKind::Phone => &PHONE_PATTERN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub masked: String,
    pub count: usize,
}

pub fn redact(text: &str) -> Redaction {
    let mut masked = text.to_string();
    let mut count = 0;

    for kind in PiiKind::ALL {
        let mut hits = 0;
        let replaced = kind
            .pattern()
            .replace_all(&masked, |_: &Captures<'_>| {
                hits += 1;
                kind.placeholder()
            })
            .into_owned();
        if hits > 0 {
            masked = replaced;
            count += hits;
        }
    }

    Redaction { masked, count }
}
