use std::sync::Arc;

use crate::templates::RenderedEmail;

/// One delivery: a recipient and the rate notification rendered for them.
#[derive(Debug, Clone)]
pub struct EmailSendJob {
    pub recipient: String,
    pub rate: f64,
    pub content: Arc<RenderedEmail>,
}

impl EmailSendJob {
    pub fn new(recipient: impl Into<String>, rate: f64, content: Arc<RenderedEmail>) -> Self {
        Self {
            recipient: recipient.into(),
            rate,
            content,
        }
    }
}
