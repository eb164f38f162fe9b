use std::sync::Arc;
use std::time::Instant;

use chrono::FixedOffset;
use tracing::{debug, info};
use ulid::Ulid;

use crate::error::{CoreResult, ValidationError};
use crate::interval::Span;
use crate::limits::*;
use crate::model::ScheduleBlock;
use crate::observability;
use crate::store::Store;
use crate::tenant::{self, Operation, Session};
use crate::time::{self, Timestamp};

/// Caller input for a new block. Timestamps may be naive.
#[derive(Debug, Clone, Default)]
pub struct NewScheduleBlock {
    pub start_at: String,
    pub end_at: String,
    pub reason: String,
}

pub(crate) fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(trimmed)
    }
}

pub(crate) fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        Err(ValidationError::TooLong { field, max })
    } else {
        Ok(())
    }
}

pub(crate) fn check_range(ts: &Timestamp) -> Result<(), ValidationError> {
    let ms = ts.millis();
    if (MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&ms) {
        Ok(())
    } else {
        Err(ValidationError::MalformedTimestamp(ts.to_string()))
    }
}

/// Organization-wide "do not book" intervals.
pub struct ScheduleBlocks {
    store: Arc<Store>,
    offset: FixedOffset,
}

impl ScheduleBlocks {
    pub fn new(store: Arc<Store>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    pub async fn create(&self, session: &Session, input: NewScheduleBlock) -> CoreResult<ScheduleBlock> {
        let started = Instant::now();
        let result = self.create_inner(session, input).await;
        observability::record("schedule_block.create", started, &result);
        result
    }

    async fn create_inner(&self, session: &Session, input: NewScheduleBlock) -> CoreResult<ScheduleBlock> {
        let ctx = tenant::authorize(&self.store, session, Operation::ManageScheduleBlocks).await?;

        let start_raw = required("start_at", &input.start_at)?;
        let end_raw = required("end_at", &input.end_at)?;
        let reason = required("reason", &input.reason)?;
        check_len("reason", reason, MAX_REASON_LEN)?;

        let start_at = time::normalize(start_raw, self.offset)?;
        let end_at = time::normalize(end_raw, self.offset)?;
        check_range(&start_at)?;
        check_range(&end_at)?;
        if start_at.millis() >= end_at.millis() {
            return Err(ValidationError::InvalidRange {
                start: start_at.to_string(),
                end: end_at.to_string(),
            }
            .into());
        }

        let block = ScheduleBlock {
            id: Ulid::new(),
            organization_id: ctx.organization_id,
            start_at,
            end_at,
            reason: reason.to_string(),
            created_by: ctx.principal_id,
        };
        self.store.insert_block(block.clone()).await?;
        info!(
            org = %block.organization_id,
            block = %block.id,
            "schedule block [{}, {}) created: {}",
            block.start_at,
            block.end_at,
            block.reason
        );
        Ok(block)
    }

    /// Delete one of the caller's blocks. Unknown ids fail with `NotFound`,
    /// another organization's block with `Forbidden`.
    pub async fn delete(&self, session: &Session, block_id: Ulid) -> CoreResult<()> {
        let started = Instant::now();
        let result = self.delete_inner(session, block_id).await;
        observability::record("schedule_block.delete", started, &result);
        result
    }

    async fn delete_inner(&self, session: &Session, block_id: Ulid) -> CoreResult<()> {
        let ctx = tenant::authorize(&self.store, session, Operation::ManageScheduleBlocks).await?;
        let org = tenant::owning_org(&self.store, &ctx, "schedule block", block_id)?;
        let removed = self.store.delete_block(org, block_id).await?;
        info!(org = %org, block = %removed.id, "schedule block deleted");
        Ok(())
    }

    /// The caller's blocks overlapping `[window_start, window_end)`, ascending
    /// by start. An empty or inverted window matches nothing.
    pub async fn query(
        &self,
        session: &Session,
        window_start: &str,
        window_end: &str,
    ) -> CoreResult<Vec<ScheduleBlock>> {
        let ctx = tenant::authorize(&self.store, session, Operation::QueryScheduleBlocks).await?;
        let start = time::normalize(required("window_start", window_start)?, self.offset)?;
        let end = time::normalize(required("window_end", window_end)?, self.offset)?;
        Ok(self
            .blocks_in(ctx.organization_id, Span::new(start.millis(), end.millis()))
            .await)
    }

    /// Tenant-scoped lookup for callers that already resolved the organization.
    pub async fn blocks_in(&self, organization_id: Ulid, window: Span) -> Vec<ScheduleBlock> {
        if window.is_empty() {
            return Vec::new();
        }
        let blocks = self.store.blocks_overlapping(organization_id, window).await;
        debug!(org = %organization_id, hits = blocks.len(), "schedule block query");
        blocks
    }
}
