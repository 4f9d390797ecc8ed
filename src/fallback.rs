//! Terminal level of the cascade.
//!
//! The synthesizer cannot fail and has no threshold: whatever reaches it gets
//! an answer. A query that already names a legal form is returned as-is;
//! otherwise the default form is prepended.

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::error::ValidationError;
use crate::result::{Candidate, Source};

/// Fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Form prepended when the query has none.
    pub default_legal_form: String,
    /// Tokens that count as a legal form when found anywhere in the query.
    pub legal_forms: Vec<String>,
    /// Confidence when the query already contains a legal form.
    pub with_form_confidence: f32,
    /// Confidence when the default form was prepended.
    pub synthesized_confidence: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_legal_form: "株式会社".to_string(),
            legal_forms: ["株式会社", "有限会社", "合同会社", "合資会社", "合名会社"]
                .into_iter()
                .map(String::from)
                .collect(),
            with_form_confidence: 0.90,
            synthesized_confidence: 0.85,
        }
    }
}

impl FallbackConfig {
    /// Checks the default form and confidences.
    ///
    /// # Errors
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_legal_form.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "fallback.default_legal_form".into(),
            });
        }
        if self.legal_forms.iter().any(String::is_empty) {
            return Err(ValidationError::MissingField {
                field: "fallback.legal_forms".into(),
            });
        }
        Confidence::validate_value(self.with_form_confidence)?;
        Confidence::validate_value(self.synthesized_confidence)?;
        Ok(())
    }
}

/// Deterministic name synthesis. Always answers.
#[derive(Debug, Clone)]
pub struct FallbackSynthesizer {
    config: FallbackConfig,
    with_form: Confidence,
    synthesized: Confidence,
}

impl Default for FallbackSynthesizer {
    fn default() -> Self {
        Self {
            config: FallbackConfig::default(),
            with_form: Confidence::calibrated(0.90),
            synthesized: Confidence::calibrated(0.85),
        }
    }
}

impl FallbackSynthesizer {
    /// Creates a synthesizer from validated settings.
    ///
    /// # Errors
    /// See [`FallbackConfig::validate`].
    pub fn new(config: FallbackConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            with_form: Confidence::new(config.with_form_confidence)?,
            synthesized: Confidence::new(config.synthesized_confidence)?,
            config,
        })
    }

    /// Returns true if `query` contains any configured legal-form token.
    #[must_use]
    pub fn has_legal_form(&self, query: &str) -> bool {
        self.config
            .legal_forms
            .iter()
            .any(|form| query.contains(form.as_str()))
    }

    /// Produces the terminal answer for `query`.
    #[must_use]
    pub fn synthesize(&self, query: &str) -> Candidate {
        if self.has_legal_form(query) {
            Candidate::new(query, self.with_form, Source::FallbackSynthesized)
        } else {
            Candidate::new(
                format!("{}{query}", self.config.default_legal_form),
                self.synthesized,
                Source::FallbackSynthesized,
            )
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn config(&self) -> &FallbackConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_default_form() {
        let fb = FallbackSynthesizer::default();
        let c = fb.synthesize("Unknown Widgets");
        assert_eq!(c.predicted_name, "株式会社Unknown Widgets");
        assert_eq!(c.source, Source::FallbackSynthesized);
        assert!((c.confidence.value() - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_keeps_existing_form_anywhere() {
        let fb = FallbackSynthesizer::default();
        for q in ["山田商事株式会社", "合同会社ABC", "東京合資会社本店"] {
            let c = fb.synthesize(q);
            assert_eq!(c.predicted_name, q);
            assert!((c.confidence.value() - 0.90).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_empty_query_yields_bare_form() {
        let c = FallbackSynthesizer::default().synthesize("");
        assert_eq!(c.predicted_name, "株式会社");
    }

    #[test]
    fn test_custom_config() {
        let fb = FallbackSynthesizer::new(FallbackConfig {
            default_legal_form: "Inc. ".into(),
            legal_forms: vec!["Inc.".into(), "LLC".into()],
            with_form_confidence: 0.7,
            synthesized_confidence: 0.6,
        })
        .unwrap();
        assert_eq!(fb.synthesize("Acme").predicted_name, "Inc. Acme");
        assert_eq!(fb.synthesize("Acme LLC").predicted_name, "Acme LLC");
    }

    #[test]
    fn test_invalid_config() {
        let bad = FallbackConfig {
            default_legal_form: "  ".into(),
            ..FallbackConfig::default()
        };
        assert!(FallbackSynthesizer::new(bad).is_err());

        let bad = FallbackConfig {
            synthesized_confidence: 2.0,
            ..FallbackConfig::default()
        };
        assert!(matches!(
            FallbackSynthesizer::new(bad),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
    }
}
