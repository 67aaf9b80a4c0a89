//! Out-of-band notice delivery.

use async_trait::async_trait;

use crate::config::VaultConfig;

/// Delivers notices to users, typically by email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

/// A mailer that only logs what it would have sent.
///
/// Useful for local runs where no SMTP relay is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingMailer {
    sender: String,
}

impl TracingMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }

    /// Use the configured sender address.
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::new(config.mail_sender.clone())
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.sender,
            to = %recipient,
            subject,
            size = html_body.len(),
            "mail delivered to log"
        );
        Ok(())
    }
}

/// Body of the notice sent when a request is rejected.
pub(crate) fn rejection_body(owner: &str, subject: &str) -> String {
    format!(
        "<p>{} declined your request for access to {}.</p>",
        escape(owner),
        escape(subject)
    )
}

/// Body of the notice carrying a newly minted share key.
pub(crate) fn share_key_body(owner: &str, subject: &str, encoded_key: &str) -> String {
    format!(
        "<p>{} accepted your request for access to {}.</p>\
         <p>Your share key:</p><pre>{}</pre>\
         <p>It is encrypted for your account and opens every resource {} shares with you.</p>",
        escape(owner),
        escape(subject),
        encoded_key,
        escape(owner)
    )
}

/// Body of the notice sent when a later grant reuses an existing key.
pub(crate) fn grant_body(owner: &str, subject: &str) -> String {
    format!(
        "<p>{} accepted your request for access to {}.</p>\
         <p>Use the share key you already received.</p>",
        escape(owner),
        escape(subject)
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bodies_escape_user_text() {
        let body = rejection_body("<b>bob</b>", "file \"x\"");
        assert!(body.contains("&lt;b&gt;bob&lt;/b&gt;"));
        assert!(body.contains("&quot;x&quot;"));
    }

    #[test]
    fn test_share_key_body_carries_key() {
        let body = share_key_body("bob", "profile", "QUJD");
        assert!(body.contains("<pre>QUJD</pre>"));
    }

    #[test]
    fn test_tracing_mailer_uses_configured_sender() {
        let config = VaultConfig {
            mail_sender: "vault@example.org".into(),
            ..VaultConfig::default()
        };
        assert_eq!(TracingMailer::from_config(&config).sender(), "vault@example.org");
        assert_eq!(
            TracingMailer::from_config(&VaultConfig::default()).sender(),
            "noreply@keyward.local"
        );
    }

    #[tokio::test]
    async fn test_tracing_mailer_accepts() {
        TracingMailer::new("noreply@keyward.local")
            .send("alice@example.org", "hi", "<p>hi</p>")
            .await
            .unwrap();
    }
}
