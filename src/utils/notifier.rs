use std::path::Path;

use anyhow::{Context, Result, bail};
use reqwest::multipart::{Form, Part};
use tracing::{error, info};

/// Client for the chat gateway that distributes reports.
pub struct ChatNotifier {
    client: reqwest::Client,
    api_url: String,
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => "text/csv",
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        _ => "application/octet-stream",
    }
}

impl ChatNotifier {
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Posts `path` as a `document` part with `message` to chat `chat_id`.
    pub async fn send_document(&self, chat_id: &str, message: &str, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let part = Part::bytes(bytes).file_name(file_name).mime_str(mime_for(path))?;
        let form = Form::new()
            .text("id", chat_id.to_string())
            .text("message", message.to_string())
            .part("document", part);

        let resp = self.client.post(&self.api_url).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("chat gateway returned {}: {}", status.as_u16(), body);
        }
        Ok(())
    }

    /// Sends the report and deletes it whatever the outcome. Never fails.
    pub async fn deliver(&self, chat_id: &str, message: &str, path: &Path) {
        match self.send_document(chat_id, message, path).await {
            Ok(()) => info!(chat_id, path = %path.display(), "Report sent"),
            Err(e) => error!(error = %e, chat_id, "Failed to send report"),
        }
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "Report file deleted"),
            Err(e) => error!(error = %e, path = %path.display(), "Failed to delete report file"),
        }
    }
}
