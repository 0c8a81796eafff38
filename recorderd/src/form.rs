//! Form submission recorder.
//!
//! Appends a FORM entry to the transaction document. Form submissions never
//! change the document's TTL and never trigger side effects.

use serde_json::Value;
use tracing::{error, info};

use recorder_domain::{transaction_key, DomainError, FormSubmission, JsonObject};
use recorder_store::OptimisticMerger;

use crate::error::{DaemonError, DaemonResult};

/// Records form submissions against transaction documents.
#[derive(Clone)]
pub struct FormRecorder {
    merger: OptimisticMerger,
}

impl FormRecorder {
    pub fn new(merger: OptimisticMerger) -> Self {
        Self { merger }
    }

    /// Decode a raw request body and record it.
    pub async fn submit_bytes(&self, bytes: &[u8]) -> DaemonResult<u32> {
        let form = match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(form)) => form,
            _ => return Err(DaemonError::InvalidInput("Invalid form data".to_string())),
        };
        self.submit(&form).await
    }

    /// Record a decoded form. Returns the merge attempts used.
    ///
    /// # Errors
    /// `InvalidInput` for missing fields or a blank key; every merge
    /// failure becomes `Internal`.
    pub async fn submit(&self, form: &JsonObject) -> DaemonResult<u32> {
        let submission = FormSubmission::from_object(form)?;

        let key = transaction_key(&submission.transaction_id, &submission.subscriber_url);
        if key.is_empty() {
            return Err(DomainError::InvalidKey.into());
        }

        info!(
            transaction_id = %submission.transaction_id,
            form_action_id = %submission.form_action_id,
            "Recording form submission"
        );

        self.merger.append_form(&key, &submission.form_append(), None).await.map_err(|e| {
            error!(key = %key, error = %e, "Failed to append form entry");
            DaemonError::Internal("Internal Server Error".to_string())
        })
    }
}
