use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Languages the voice-cloning model can speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "pl")]
    Polish,
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "nl")]
    Dutch,
    #[serde(rename = "cs")]
    Czech,
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "zh-cn")]
    Chinese,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "hu")]
    Hungarian,
    #[serde(rename = "ko")]
    Korean,
}

impl Language {
    pub const DEFAULT: Language = Language::English;

    pub const ALL: [Language; 16] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Italian,
        Language::Portuguese,
        Language::Polish,
        Language::Turkish,
        Language::Russian,
        Language::Dutch,
        Language::Czech,
        Language::Arabic,
        Language::Chinese,
        Language::Japanese,
        Language::Hungarian,
        Language::Korean,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::German => "de",
            Self::Italian => "it",
            Self::Portuguese => "pt",
            Self::Polish => "pl",
            Self::Turkish => "tr",
            Self::Russian => "ru",
            Self::Dutch => "nl",
            Self::Czech => "cs",
            Self::Arabic => "ar",
            Self::Chinese => "zh-cn",
            Self::Japanese => "ja",
            Self::Hungarian => "hu",
            Self::Korean => "ko",
        }
    }

    /// Native name, as shown to people picking target languages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Español",
            Self::French => "Français",
            Self::German => "Deutsch",
            Self::Italian => "Italiano",
            Self::Portuguese => "Português",
            Self::Polish => "Polski",
            Self::Turkish => "Türkçe",
            Self::Russian => "Русский",
            Self::Dutch => "Nederlands",
            Self::Czech => "Čeština",
            Self::Arabic => "العربية",
            Self::Chinese => "中文",
            Self::Japanese => "日本語",
            Self::Hungarian => "Magyar",
            Self::Korean => "한국어",
        }
    }

    /// Resolves `code` to a supported language, falling back to
    /// [`Language::DEFAULT`] with a warning.
    pub fn coerce(code: &str) -> Language {
        match code.parse() {
            Ok(language) => language,
            Err(_) => {
                tracing::warn!(
                    "Language '{}' not supported for synthesis, using '{}'",
                    code,
                    Self::DEFAULT
                );
                Self::DEFAULT
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language code '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.code() == normalized)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Ordered (source, target) combination served by one translation model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.trim().to_ascii_lowercase(),
            target: target.trim().to_ascii_lowercase(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.source, self.target)
    }

    /// Drops region subtags, e.g. `en-zh-cn` becomes `en-zh`.
    pub fn primary(&self) -> Self {
        Self {
            source: primary_subtag(&self.source).to_string(),
            target: primary_subtag(&self.target).to_string(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.target)
    }
}

fn primary_subtag(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_code() {
        for language in Language::ALL {
            assert_eq!(language.code().parse::<Language>().unwrap(), language);
        }
        assert_eq!("ZH-CN".parse::<Language>().unwrap(), Language::Chinese);
    }

    #[test]
    fn unknown_code_is_coerced_to_english() {
        assert_eq!(Language::coerce("xx"), Language::English);
        assert_eq!(Language::coerce("sv"), Language::English);
        assert_eq!(Language::coerce("ja"), Language::Japanese);
    }

    #[test]
    fn pair_primary_drops_region() {
        let pair = LanguagePair::new("en", "zh-CN");
        assert_eq!(pair.key(), "en-zh-cn");
        assert_eq!(pair.primary().key(), "en-zh");
    }

    #[test]
    fn serde_uses_codes() {
        let json = serde_json::to_string(&Language::Chinese).unwrap();
        assert_eq!(json, "\"zh-cn\"");
    }
}
