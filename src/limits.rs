use crate::interval::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_BLOCKS_PER_ORGANIZATION: usize = 10_000;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 4_000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CHECKLIST_ITEMS: usize = 100;
pub const MAX_TASK_LEN: usize = 300;

/// Compensating identity deletes attempted before giving up.
pub const COMPENSATION_ATTEMPTS: u32 = 3;
pub const COMPENSATION_BACKOFF_MS: u64 = 50;
