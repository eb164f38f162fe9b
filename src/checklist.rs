use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use ulid::Ulid;

use crate::error::CoreResult;
use crate::model::{Appointment, ChecklistItem};
use crate::observability;
use crate::store::Store;
use crate::tenant::{self, Operation, Session};

/// Per-appointment task lists, replaced wholesale on every update.
pub struct Checklists {
    store: Arc<Store>,
}

impl Checklists {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Replace the checklist of `appointment_id` with `items`, in order.
    /// An empty list clears it.
    pub async fn update(
        &self,
        session: &Session,
        appointment_id: Ulid,
        items: Vec<ChecklistItem>,
    ) -> CoreResult<Appointment> {
        let started = Instant::now();
        let result = self.update_inner(session, appointment_id, items).await;
        observability::record("checklist.update", started, &result);
        result
    }

    async fn update_inner(
        &self,
        session: &Session,
        appointment_id: Ulid,
        items: Vec<ChecklistItem>,
    ) -> CoreResult<Appointment> {
        let ctx = tenant::authorize(&self.store, session, Operation::UpdateChecklist).await?;
        let org = tenant::owning_org(&self.store, &ctx, "appointment", appointment_id)?;
        let count = items.len();
        let done = items.iter().filter(|i| i.done).count();
        let updated = self.store.replace_checklist(org, appointment_id, items).await?;
        info!(org = %org, appointment = %appointment_id, "checklist replaced ({done}/{count} done)");
        Ok(updated)
    }
}
