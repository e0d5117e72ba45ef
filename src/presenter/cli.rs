//! CLI presenter — shows the wizard on stderr and reads answers from stdin.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use super::{Confirmation, Notice, Presenter};

/// A presenter for local use in a terminal.
pub struct CliPresenter {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl CliPresenter {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Prompt and read one trimmed line. `None` on EOF.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                None
            }
        }
    }
}

impl Default for CliPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for CliPresenter {
    fn show_notice(&self, notice: Notice) {
        match &notice {
            Notice::SignedIn { .. } => eprintln!("✅ {}", notice.text()),
            Notice::InvalidField { .. } => eprintln!("⚠️  {}", notice.text()),
            _ => eprintln!("❌ {}", notice.text()),
        }
    }

    fn show_progress(&self, message: &str) {
        eprintln!("⏳ {message}...");
    }

    fn hide_progress(&self) {}

    fn focus_field(&self, field: &str) {
        eprintln!("   → check '{field}'");
    }

    fn set_input_enabled(&self, enabled: bool) {
        if !enabled {
            eprintln!("   (please wait)");
        }
    }

    async fn confirm(&self, confirmation: Confirmation) -> bool {
        let prompt = format!("❓ {} [y/N] ", confirmation.text());
        matches!(
            self.read_line(&prompt).await.as_deref(),
            Some("y" | "Y" | "yes" | "Yes")
        )
    }
}
