//! Processed-state tracking through a provider label.
//!
//! The label is the only record of "already handled". There is no local
//! state: the selector's query excludes labelled messages.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::GatewayError;
use crate::gmail::MailGateway;

/// Name of the processed-marker label.
pub const PROCESSED_LABEL: &str = "AI-Drafted";

pub struct ProcessedStateTracker {
    gateway: Arc<dyn MailGateway>,
    label_name: String,
}

impl ProcessedStateTracker {
    pub fn new(gateway: Arc<dyn MailGateway>) -> Self {
        Self {
            gateway,
            label_name: PROCESSED_LABEL.to_string(),
        }
    }

    /// Resolve the marker label id, creating the label if it does not exist.
    ///
    /// Called once per sweep; the id is reused for every candidate in it.
    pub async fn ensure_marker_label(&self) -> Result<String, GatewayError> {
        if let Some(id) = self.find_label().await? {
            debug!(label_id = %id, "Marker label found");
            return Ok(id);
        }

        match self.gateway.create_label(&self.label_name).await {
            Ok(label) => {
                info!(label_id = %label.id, name = %label.name, "Marker label created");
                Ok(label.id)
            }
            // Someone else created it between our list and create.
            Err(e) if e.status() == Some(409) => {
                self.find_label()
                    .await?
                    .ok_or_else(|| GatewayError::InvalidResponse {
                        operation: "labels.create".into(),
                        reason: format!("label {} conflicts but is not listed", self.label_name),
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the marker to a message.
    pub async fn mark_processed(
        &self,
        message_id: &str,
        label_id: &str,
    ) -> Result<(), GatewayError> {
        self.gateway.apply_label(message_id, label_id).await?;
        debug!(id = %message_id, label_id = %label_id, "Marked processed");
        Ok(())
    }

    async fn find_label(&self) -> Result<Option<String>, GatewayError> {
        let labels = self.gateway.list_labels().await?;
        Ok(labels
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(&self.label_name))
            .map(|l| l.id))
    }
}
