//! Lead import flow: find-or-create the contact, open a deal in the
//! configured pipeline, attach the form message as a note. The scheduling
//! and the lead source are the embedding application's concern.

use crate::clients::amocrm::AmoClient;
use crate::error::{AmoError, Result};
use amocrm_types::{Lead, NewDeal};
use async_trait::async_trait;
use std::sync::Arc;

/// Deal name for imported leads
const DEFAULT_DEAL_NAME: &str = "Заказ";

/// What happened to one imported lead
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub contact_id: i64,
    pub deal_id: i64,
    /// True when an existing contact was reused instead of created
    pub matched: bool,
}

/// Seam the scheduled driver calls; mockable in embeddings
#[async_trait]
pub trait LeadImport: Send + Sync {
    async fn send(&self, lead: &Lead) -> Result<ImportOutcome>;
}

pub struct LeadImporter {
    client: Arc<AmoClient>,
}

impl LeadImporter {
    pub fn new(client: Arc<AmoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LeadImport for LeadImporter {
    async fn send(&self, lead: &Lead) -> Result<ImportOutcome> {
        if !self.client.is_authenticated().await {
            return Err(AmoError::Auth("client is not authenticated".to_string()));
        }

        self.client.ensure_account_fresh().await?;

        let pipeline_id = self
            .client
            .current_pipeline()
            .await
            .ok_or_else(|| AmoError::Validation("no pipeline selected in settings".to_string()))?;
        let status_id = self.client.current_status().await.ok_or_else(|| {
            AmoError::Validation("no pipeline status selected in settings".to_string())
        })?;

        let (contact_id, matched) = match self.client.find_client(lead).await? {
            Some(found) => {
                log::info!(
                    "matched contact {} '{}' (grade {})",
                    found.contact.id,
                    found.contact.name,
                    found.grade
                );
                (found.contact.id, true)
            }
            None => {
                log::info!("no matching contact for '{}', creating", lead.name);
                (self.client.create_client(lead).await?, false)
            }
        };

        let deal = NewDeal {
            name: DEFAULT_DEAL_NAME.to_string(),
            pipeline_id,
            status_id,
            contact_id,
            manager_id: lead.manager_id,
        };
        let deal_id = self.client.create_deal(&deal).await?;

        if let Some(message) = lead.message.as_deref() {
            if !message.trim().is_empty() {
                self.client.create_text_note(deal_id, message).await?;
            }
        }

        Ok(ImportOutcome {
            contact_id,
            deal_id,
            matched,
        })
    }
}
