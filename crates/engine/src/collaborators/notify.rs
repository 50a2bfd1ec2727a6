use async_trait::async_trait;
use tracing::info;

use super::{CollaboratorError, Notifier};
use crate::presentation::ResultItemPresentation;

/// Records notifications in the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipients: &[String],
        signal_id: &str,
        items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError> {
        let titles: Vec<&str> = items.iter().take(5).map(|i| i.title.as_str()).collect();
        info!(
            signal_id = %signal_id,
            recipients = %recipients.join(", "),
            items = items.len(),
            first = ?titles,
            "notification"
        );
        Ok(())
    }
}
