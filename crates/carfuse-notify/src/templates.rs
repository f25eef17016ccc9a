//! File-based notification templates.
//!
//! Templates live under `<root>/<locale>/<name>`; rendering falls back to
//! the default locale when the localized file is absent. Placeholders use
//! `{{key}}` and are filled from the request's data map.
//!
//! An optional leading `Subject: ...` line carries the email subject; the
//! dispatcher splits it off with [`split_subject`].

use std::path::{Path, PathBuf};

use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::traits::TemplateRenderer;

pub struct FileTemplates {
    root: PathBuf,
    default_locale: String,
}

impl FileTemplates {
    pub fn new(root: &Path, default_locale: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            default_locale: default_locale.to_string(),
        }
    }

    fn locate(&self, template: &str, locale: &str) -> Option<PathBuf> {
        let localized = self.root.join(locale).join(template);
        if localized.exists() {
            return Some(localized);
        }
        let fallback = self.root.join(&self.default_locale).join(template);
        if fallback.exists() {
            tracing::debug!(
                "Template '{template}' missing for locale '{locale}', using '{}'",
                self.default_locale
            );
            return Some(fallback);
        }
        None
    }
}

impl TemplateRenderer for FileTemplates {
    fn render(
        &self,
        template: &str,
        locale: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String> {
        let path = self.locate(template, locale).ok_or_else(|| {
            CarFuseError::Template(format!(
                "'{template}' not found for locale '{locale}' or default '{}'",
                self.default_locale
            ))
        })?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| CarFuseError::Template(format!("read {}: {e}", path.display())))?;
        Ok(substitute(&raw, data))
    }
}

/// Replace `{{key}}` placeholders with values from the data map. Unknown
/// placeholders are left as-is.
fn substitute(raw: &str, data: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = raw.to_string();
    for (key, value) in data {
        let needle = format!("{{{{{key}}}}}");
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&needle, &replacement);
    }
    out
}

/// Split an optional leading `Subject: ...` line from rendered content.
/// Returns (subject, body).
pub fn split_subject(rendered: &str) -> (Option<String>, String) {
    if let Some(rest) = rendered.strip_prefix("Subject:") {
        if let Some((subject, body)) = rest.split_once('\n') {
            return (
                Some(subject.trim().to_string()),
                body.trim_start_matches('\n').to_string(),
            );
        }
        return (Some(rest.trim().to_string()), String::new());
    }
    (None, rendered.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(dir.join("en")).unwrap();
        std::fs::create_dir_all(dir.join("pl")).unwrap();
        dir
    }

    fn data(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_render_with_substitution() {
        let dir = setup("carfuse-test-tpl-subst");
        std::fs::write(
            dir.join("en/booking_confirmed"),
            "Hello {{name}}, booking {{ref}} is confirmed.",
        )
        .unwrap();

        let templates = FileTemplates::new(&dir, "en");
        let out = templates
            .render(
                "booking_confirmed",
                "en",
                &data(&[("name", "Ada"), ("ref", "BK-42")]),
            )
            .unwrap();
        assert_eq!(out, "Hello Ada, booking BK-42 is confirmed.");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_locale_fallback() {
        let dir = setup("carfuse-test-tpl-fallback");
        std::fs::write(dir.join("en/reminder"), "default locale").unwrap();

        let templates = FileTemplates::new(&dir, "en");
        let out = templates.render("reminder", "pl", &data(&[])).unwrap();
        assert_eq!(out, "default locale");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_localized_template_wins() {
        let dir = setup("carfuse-test-tpl-localized");
        std::fs::write(dir.join("en/reminder"), "english").unwrap();
        std::fs::write(dir.join("pl/reminder"), "polski").unwrap();

        let templates = FileTemplates::new(&dir, "en");
        let out = templates.render("reminder", "pl", &data(&[])).unwrap();
        assert_eq!(out, "polski");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_everywhere_is_an_error() {
        let dir = setup("carfuse-test-tpl-missing");
        let templates = FileTemplates::new(&dir, "en");
        let err = templates.render("nope", "pl", &data(&[])).unwrap_err();
        assert!(err.to_string().contains("not found"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_split_subject() {
        let (subject, body) = split_subject("Subject: Your booking\n\nBody here");
        assert_eq!(subject.as_deref(), Some("Your booking"));
        assert_eq!(body, "Body here");

        let (subject, body) = split_subject("No subject line");
        assert!(subject.is_none());
        assert_eq!(body, "No subject line");
    }
}
