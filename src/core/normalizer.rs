use regex::Regex;

use crate::models::NormalizedAddress;

/// Address normalization capability consumed by the matcher
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> NormalizedAddress;
}

impl<F> Normalizer for F
where
    F: Fn(&str) -> NormalizedAddress + Send + Sync,
{
    fn normalize(&self, text: &str) -> NormalizedAddress {
        self(text)
    }
}

const REPLACEMENTS: &[(&str, &str)] = &[
    ("－", "-"),
    ("—", "-"),
    ("～", "-"),
    ("号楼", "号"),
    ("栋", "号"),
    ("幢", "号"),
];

/// Multi-character suffixes are listed before their single-character tails
const SEGMENT_SUFFIXES: &[&str] = &[
    "特别行政区", "自治区", "自治州", "自治县", "街道", "大道", "胡同", "小区", "单元",
    "省", "市", "区", "县", "旗", "镇", "乡", "路", "街", "巷", "弄", "号", "室",
];

lazy_static::lazy_static! {
    static ref BRACKETS_RE: Regex = Regex::new(r"[()（）【】\s]").unwrap();
    static ref DIGIT_RUN_RE: Regex = Regex::new(r"\d+").unwrap();
    static ref HOUSE_RE: Regex = Regex::new(r"(\d+)(号|弄|栋|幢|室|单元)").unwrap();
}

/// Rule-based normalizer for Chinese delivery addresses
///
/// Segments the cleaned text after administrative and road suffixes and at
/// digit boundaries. Good enough to drive the lexical index without a
/// dictionary-based segmenter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNormalizer;

impl BasicNormalizer {
    pub fn new() -> Self {
        Self
    }

    fn clean(&self, text: &str) -> String {
        let mut cleaned = text.trim().to_string();
        for (from, to) in REPLACEMENTS {
            cleaned = cleaned.replace(from, to);
        }
        BRACKETS_RE.replace_all(&cleaned, "").into_owned()
    }

    fn segment(&self, cleaned: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut rest = cleaned;

        while let Some(ch) = rest.chars().next() {
            if let Some(suffix) = starts_with_suffix(rest) {
                current.push_str(suffix);
                rest = &rest[suffix.len()..];
                tokens.push(std::mem::take(&mut current));
                continue;
            }

            // Digit runs form their own token unless a suffix closes them ("1号")
            if let Some(last) = current.chars().last() {
                if last.is_ascii_digit() != ch.is_ascii_digit() {
                    tokens.push(std::mem::take(&mut current));
                }
            }

            current.push(ch);
            rest = &rest[ch.len_utf8()..];
        }

        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }

    fn extract_house(&self, cleaned: &str) -> Option<String> {
        if let Some(caps) = HOUSE_RE.captures(cleaned) {
            return Some(caps[1].to_string());
        }
        DIGIT_RUN_RE.find(cleaned).map(|m| m.as_str().to_string())
    }
}

fn starts_with_suffix(text: &str) -> Option<&'static str> {
    SEGMENT_SUFFIXES.iter().copied().find(|s| text.starts_with(s))
}

impl Normalizer for BasicNormalizer {
    fn normalize(&self, text: &str) -> NormalizedAddress {
        let cleaned = self.clean(text);
        let tokens = self.segment(&cleaned);
        let house_number = self.extract_house(&cleaned);
        NormalizedAddress::from_tokens(tokens, house_number)
    }
}
