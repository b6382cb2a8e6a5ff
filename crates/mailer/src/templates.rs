//! Rate notification templates.
//!
//! Templates are compiled into the binary by askama. A rate message is
//! rendered once and every recipient of that message shares the output.

use askama::Template;

use crate::Result;

#[derive(Template)]
#[template(source = "USD to UAH exchange rate: {{ rate }}", ext = "txt")]
struct SubjectTemplate {
    rate: f64,
}

#[derive(Template)]
#[template(path = "rate_email.txt")]
struct PlainBodyTemplate {
    rate: f64,
}

#[derive(Template)]
#[template(path = "rate_email.html")]
struct HtmlBodyTemplate {
    rate: f64,
}

/// Subject and bodies rendered for one rate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

impl RenderedEmail {
    /// Renders the rate notification for `rate`.
    pub fn rate_notification(rate: f64) -> Result<Self> {
        Ok(Self {
            subject: SubjectTemplate { rate }.render()?,
            plain_body: PlainBodyTemplate { rate }.render()?,
            html_body: HtmlBodyTemplate { rate }.render()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_rate_in_every_part() {
        let rendered = RenderedEmail::rate_notification(27.5).unwrap();
        assert_eq!(rendered.subject, "USD to UAH exchange rate: 27.5");
        assert!(rendered.plain_body.contains("rate is 27.5."));
        assert!(rendered.html_body.contains("<strong>27.5</strong>"));
    }

    #[test]
    fn test_rate_is_printed_in_full() {
        let rendered = RenderedEmail::rate_notification(92.97563671014653).unwrap();
        assert!(rendered.subject.ends_with("92.97563671014653"));
        assert!(rendered.plain_body.contains("92.97563671014653"));
    }

    #[test]
    fn test_html_body_is_a_document() {
        let rendered = RenderedEmail::rate_notification(1.0).unwrap();
        assert!(rendered.html_body.starts_with("<!doctype html>"));
        assert!(!rendered.plain_body.contains('<'));
    }
}
