use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ValidationError;
use crate::interval::{self, Span};
use crate::notify::View;
use crate::time::Timestamp;

/// Closed set of roles. Access checks go through [`crate::tenant::Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Superadmin,
    Admin,
    Staff,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Superadmin, Role::Admin, Role::Staff, Role::Customer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ordered = self.start <= self.lunch_start
            && self.lunch_start <= self.lunch_end
            && self.lunch_end <= self.end
            && self.start < self.end;
        if ordered { Ok(()) } else { Err(ValidationError::InvalidWorkingHours) }
    }
}

impl Default for WorkingHours {
    /// 08:00 to 18:00, lunch 12:00 to 13:00.
    fn default() -> Self {
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or_default();
        Self {
            start: at(8),
            lunch_start: at(12),
            lunch_end: at(13),
            end: at(18),
        }
    }
}

/// A principal's membership in one organization. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Ulid,
    pub organization_id: Ulid,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub active: bool,
    pub working_hours: WorkingHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub organization_id: Ulid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub size: Option<String>,
    pub weight_kg: Option<f64>,
    pub birth_date: Option<NaiveDate>,
    pub neutered: bool,
    pub medical_notes: Option<String>,
    pub vaccinated: bool,
    pub photo_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    Boarding,
    Daycare,
    Grooming,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub organization_id: Ulid,
    pub category_id: Option<Ulid>,
    pub name: String,
    pub kind: ServiceKind,
    pub duration_minutes: Option<u32>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Done,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Done => "done",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "done" => Ok(AppointmentStatus::Done),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub task: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub organization_id: Ulid,
    pub pet_id: Ulid,
    pub service_id: Ulid,
    pub staff_id: Option<Ulid>,
    pub scheduled_at: Timestamp,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub actual_check_in: Option<Timestamp>,
    pub actual_check_out: Option<Timestamp>,
    /// Boarding stays only.
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
}

/// An organization-wide "do not book" interval `[start_at, end_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Ulid,
    pub organization_id: Ulid,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
    pub reason: String,
    pub created_by: Ulid,
}

impl ScheduleBlock {
    pub fn span(&self) -> Span {
        Span::new(self.start_at.millis(), self.end_at.millis())
    }
}

/// Everything one organization owns. Blocks are kept sorted by start.
#[derive(Debug, Clone)]
pub struct OrganizationState {
    pub id: Ulid,
    pub profiles: HashMap<Ulid, Profile>,
    pub pets: HashMap<Ulid, Pet>,
    pub services: HashMap<Ulid, Service>,
    pub appointments: HashMap<Ulid, Appointment>,
    pub blocks: Vec<ScheduleBlock>,
}

impl OrganizationState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            profiles: HashMap::new(),
            pets: HashMap::new(),
            services: HashMap::new(),
            appointments: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    /// Insert block maintaining sort order by start.
    pub fn insert_block(&mut self, block: ScheduleBlock) {
        let start = block.span().start;
        let pos = self.blocks.partition_point(|b| b.span().start <= start);
        self.blocks.insert(pos, block);
    }

    pub fn remove_block(&mut self, id: Ulid) -> Option<ScheduleBlock> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    pub fn blocks_overlapping(&self, window: Span) -> impl Iterator<Item = &ScheduleBlock> {
        interval::overlapping(&self.blocks, window, ScheduleBlock::span)
    }

    /// First block whose `[start_at, end_at)` contains the instant.
    pub fn block_at(&self, t: interval::Ms) -> Option<&ScheduleBlock> {
        self.blocks_overlapping(Span::instant(t)).next()
    }
}

/// The WAL record format: one variant per atomic mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ProfileCreated(Profile),
    ProfileUpdated(Profile),
    PetCreated(Pet),
    PetUpdated(Pet),
    PetDeleted {
        id: Ulid,
        organization_id: Ulid,
    },
    ServiceCreated(Service),
    BlockCreated(ScheduleBlock),
    BlockDeleted {
        id: Ulid,
        organization_id: Ulid,
    },
    AppointmentCreated(Appointment),
    AppointmentStatusSet {
        id: Ulid,
        organization_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentCheckedIn {
        id: Ulid,
        organization_id: Ulid,
        at: Timestamp,
    },
    /// Stamps `actual_check_out` and moves the status to done in one record.
    AppointmentCheckedOut {
        id: Ulid,
        organization_id: Ulid,
        at: Timestamp,
    },
    ChecklistReplaced {
        id: Ulid,
        organization_id: Ulid,
        items: Vec<ChecklistItem>,
    },
}

const APPOINTMENT_VIEWS: &[View] = &[View::Agenda, View::Daycare, View::Grooming];
const SCHEDULE_VIEWS: &[View] = &[View::Agenda];

impl Event {
    pub fn organization_id(&self) -> Ulid {
        match self {
            Event::ProfileCreated(p) | Event::ProfileUpdated(p) => p.organization_id,
            Event::PetCreated(p) | Event::PetUpdated(p) => p.organization_id,
            Event::ServiceCreated(s) => s.organization_id,
            Event::BlockCreated(b) => b.organization_id,
            Event::AppointmentCreated(a) => a.organization_id,
            Event::PetDeleted { organization_id, .. }
            | Event::BlockDeleted { organization_id, .. }
            | Event::AppointmentStatusSet { organization_id, .. }
            | Event::AppointmentCheckedIn { organization_id, .. }
            | Event::AppointmentCheckedOut { organization_id, .. }
            | Event::ChecklistReplaced { organization_id, .. } => *organization_id,
        }
    }

    /// Read surfaces that are stale once this event is applied.
    pub fn invalidates(&self) -> &'static [View] {
        match self {
            Event::AppointmentCreated(_)
            | Event::AppointmentStatusSet { .. }
            | Event::AppointmentCheckedIn { .. }
            | Event::AppointmentCheckedOut { .. }
            | Event::ChecklistReplaced { .. } => APPOINTMENT_VIEWS,
            Event::BlockCreated(_) | Event::BlockDeleted { .. } => SCHEDULE_VIEWS,
            _ => &[],
        }
    }
}
