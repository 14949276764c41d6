use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Wikipedia,
    Wikibooks,
    Wikinews,
}

impl Family {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wikipedia" => Ok(Self::Wikipedia),
            "wikibooks" => Ok(Self::Wikibooks),
            "wikinews" => Ok(Self::Wikinews),
            other => bail!("unknown wiki family: {other}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wikipedia => "wikipedia",
            Self::Wikibooks => "wikibooks",
            Self::Wikinews => "wikinews",
        }
    }

    fn domain(self) -> &'static str {
        match self {
            Self::Wikipedia => "wikipedia.org",
            Self::Wikibooks => "wikibooks.org",
            Self::Wikinews => "wikinews.org",
        }
    }

    /// Resolve legacy language codes to the code actually hosting the wiki.
    pub fn canonical_lang(self, lang: &str) -> String {
        let lang = lang.trim().to_ascii_lowercase();
        let mapped = match (self, lang.as_str()) {
            (_, "dk") => "da",
            (_, "jp") => "ja",
            (_, "nb") => "no",
            (Self::Wikipedia, "minnan") => "zh-min-nan",
            (Self::Wikipedia, "zh-cn" | "zh-tw") => "zh",
            _ => return lang,
        };
        mapped.to_string()
    }

    pub fn hostname(self, lang: &str) -> String {
        format!("{}.{}", self.canonical_lang(lang), self.domain())
    }

    pub fn api_url(self, lang: &str) -> String {
        format!("https://{}/w/api.php", self.hostname(lang))
    }

    pub fn db_name(self, lang: &str) -> String {
        let code = self.canonical_lang(lang).replace('-', "_");
        match self {
            Self::Wikipedia => format!("{code}wiki"),
            other => format!("{code}{}", other.as_str()),
        }
    }

    /// Whether `code` is a language prefix that forms an interwiki link in this family.
    pub fn is_known_language(self, code: &str) -> bool {
        let code = code.trim().to_ascii_lowercase();
        if KNOWN_LANGUAGES.binary_search(&code.as_str()).is_ok() {
            return true;
        }
        matches!(self, Self::Wikipedia) && LEGACY_CODES.contains(&code.as_str())
    }
}

/// The wiki a bot run talks to: family, language, and local category namespace names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub family: Family,
    pub lang: String,
    pub category_aliases: Vec<String>,
}

impl Site {
    pub fn new(family: Family, lang: &str) -> Self {
        Self {
            family,
            lang: family.canonical_lang(lang),
            category_aliases: Vec::new(),
        }
    }

    pub fn with_category_aliases(mut self, aliases: Vec<String>) -> Self {
        self.category_aliases = aliases;
        self
    }

    /// Namespace name used when writing new category tags.
    pub fn category_namespace(&self) -> &str {
        self.category_aliases
            .first()
            .map(String::as_str)
            .unwrap_or(crate::title::CATEGORY_NAMESPACE)
    }
}

impl Default for Site {
    fn default() -> Self {
        Self::new(Family::Wikipedia, "en")
    }
}

const LEGACY_CODES: &[&str] = &["dk", "jp", "minnan", "nb", "tokipona", "zh-cn", "zh-tw"];

// Sorted: looked up with binary_search.
const KNOWN_LANGUAGES: &[&str] = &[
    "af", "als", "am", "an", "ar", "ast", "az", "be", "bg", "bn", "br", "bs", "ca", "cs", "cy",
    "da", "de", "el", "en", "eo", "es", "et", "eu", "fa", "fi", "fo", "fr", "fy", "ga", "gl",
    "gu", "he", "hi", "hr", "hsb", "hu", "hy", "ia", "id", "io", "is", "it", "ja", "ka", "kk",
    "km", "ko", "ksh", "ku", "la", "lb", "li", "lt", "lv", "mk", "ml", "mr", "ms", "mt", "nds",
    "nds-nl", "nl", "nn", "no", "oc", "pa", "pl", "pt", "ro", "ru", "scn", "sh", "simple", "sk",
    "sl", "sq", "sr", "sv", "sw", "szl", "ta", "te", "tg", "th", "tl", "tr", "tt", "uk", "ur",
    "uz", "vi", "vo", "wa", "yi", "zh", "zh-min-nan", "zh-yue",
];
