use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Languages with prompt templates. `En` is the designated fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Ca,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Es, Language::Ca];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Ca => "ca",
        }
    }

    /// Accepts ISO 639-1 and 639-3 codes, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "eng" => Some(Language::En),
            "es" | "spa" => Some(Language::Es),
            "ca" | "cat" => Some(Language::Ca),
            _ => None,
        }
    }

    pub fn from_code_or_default(code: &str) -> Self {
        Self::from_code(code).unwrap_or_default()
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Guesses the language of a piece of text. May return codes outside the
/// supported set; callers resolve them through `Language::from_code`.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String>;
}

/// whatlang restricted to the languages we have templates for, so short
/// questions are not pulled towards neighbours like Portuguese.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

const SUPPORTED: [whatlang::Lang; 3] = [whatlang::Lang::Eng, whatlang::Lang::Spa, whatlang::Lang::Cat];

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(RagError::Detection("empty text".to_string()));
        }
        let info = whatlang::Detector::with_allowlist(SUPPORTED.to_vec())
            .detect(text)
            .ok_or_else(|| RagError::Detection(format!("no language identified for {:?}", text)))?;
        Ok(info.lang().code().to_string())
    }
}

/// Detect the language of `text`, recovering from detection failures and
/// unsupported results with `fallback`.
pub fn detect_or_default(detector: &dyn LanguageDetector, text: &str, fallback: Language) -> Language {
    match detector.detect(text) {
        Ok(code) => Language::from_code(&code).unwrap_or_else(|| {
            tracing::debug!(detected = %code, fallback = %fallback, "Unsupported language, using fallback");
            fallback
        }),
        Err(e) => {
            tracing::debug!(error = %e, fallback = %fallback, "Language detection failed, using fallback");
            fallback
        }
    }
}

/// Explicit caller choice wins; otherwise detect from `text`.
pub fn resolve_language(
    detector: &dyn LanguageDetector,
    explicit: Option<&str>,
    text: &str,
) -> Language {
    match explicit.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => Language::from_code_or_default(code),
        None => detect_or_default(detector, text, Language::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl LanguageDetector for Failing {
        fn detect(&self, _text: &str) -> Result<String> {
            Err(RagError::Detection("too short".into()))
        }
    }

    struct Always(&'static str);

    impl LanguageDetector for Always {
        fn detect(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_codes_resolve_to_closed_set() {
        assert_eq!(Language::from_code("ES"), Some(Language::Es));
        assert_eq!(Language::from_code("cat"), Some(Language::Ca));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::from_code_or_default("fr"), Language::En);
        assert_eq!(Language::from_code_or_default(""), Language::En);
    }

    #[test]
    fn test_detection_failure_recovers() {
        assert_eq!(detect_or_default(&Failing, "ok", Language::Ca), Language::Ca);
        assert_eq!(detect_or_default(&Always("fra"), "bonjour", Language::Es), Language::Es);
        assert_eq!(detect_or_default(&Always("spa"), "hola", Language::En), Language::Es);
    }

    #[test]
    fn test_explicit_language_wins_over_detection() {
        assert_eq!(resolve_language(&Always("eng"), Some("es"), "What is a stack?"), Language::Es);
        assert_eq!(resolve_language(&Always("cat"), None, "Què és una pila?"), Language::Ca);
        assert_eq!(resolve_language(&Always("cat"), Some("  "), "Què és una pila?"), Language::Ca);
        assert_eq!(resolve_language(&Always("spa"), Some("de"), "hola"), Language::En);
    }

    #[test]
    fn test_whatlang_detects_spanish_sentence() {
        let text = "Una pila es una estructura de datos que sigue el principio de que \
                    el último elemento en entrar es el primero en salir.";
        assert_eq!(detect_or_default(&WhatlangDetector, text, Language::En), Language::Es);
    }

    #[test]
    fn test_whatlang_only_reports_supported_languages() {
        let english = WhatlangDetector.detect("How does a queue work?").unwrap();
        assert_eq!(english, "eng");

        let catalan = "Les cues i les piles són estructures de dades que farem servir durant tot el curs.";
        assert_eq!(detect_or_default(&WhatlangDetector, catalan, Language::En), Language::Ca);

        for text in ["Como funciona uma fila?", "Wie funktioniert eine Warteschlange?"] {
            let code = WhatlangDetector.detect(text).unwrap();
            assert!(Language::from_code(&code).is_some(), "{} detected as {}", text, code);
        }
    }

    #[test]
    fn test_whatlang_rejects_blank_text() {
        assert!(matches!(WhatlangDetector.detect("   "), Err(RagError::Detection(_))));
    }
}
