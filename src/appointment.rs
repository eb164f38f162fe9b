use std::sync::Arc;
use std::time::Instant;

use chrono::{FixedOffset, NaiveDate};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::interval::Span;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::schedule::{check_len, check_range, required, ScheduleBlocks};
use crate::store::{Store, StoreError};
use crate::tenant::{self, Operation, Session, TenantContext};
use crate::time::{self, Clock, Timestamp};

/// Caller input for a booking. Missing required fields are reported, not assumed.
#[derive(Debug, Clone, Default)]
pub struct NewAppointment {
    pub pet_id: Option<Ulid>,
    pub service_id: Option<Ulid>,
    pub staff_id: Option<Ulid>,
    pub scheduled_at: Option<String>,
    pub notes: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
}

fn stay_dates(
    kind: ServiceKind,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ValidationError> {
    if kind == ServiceKind::Boarding {
        check_in.ok_or(ValidationError::MissingField("check_in_date"))?;
        check_out.ok_or(ValidationError::MissingField("check_out_date"))?;
    }
    match (check_in, check_out) {
        (Some(i), Some(o)) if i > o => Err(ValidationError::InvalidStayDates),
        dates => Ok(dates),
    }
}

#[derive(Debug, Clone, Copy)]
enum Stamp {
    CheckIn,
    CheckOut,
}

/// Creates appointments and moves them through their lifecycle.
///
/// Every successful mutation invalidates the agenda, daycare and grooming
/// views of the organization (through the store's invalidation hub).
pub struct Appointments {
    store: Arc<Store>,
    blocks: ScheduleBlocks,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl Appointments {
    pub fn new(store: Arc<Store>, offset: FixedOffset, clock: Arc<dyn Clock>) -> Self {
        Self {
            blocks: ScheduleBlocks::new(store.clone(), offset),
            store,
            offset,
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_utc(self.clock.now(), self.offset)
    }

    pub async fn create(&self, session: &Session, input: NewAppointment) -> CoreResult<Appointment> {
        let started = Instant::now();
        let result = self.create_inner(session, input).await;
        observability::record("appointment.create", started, &result);
        result
    }

    async fn create_inner(&self, session: &Session, input: NewAppointment) -> CoreResult<Appointment> {
        let ctx = tenant::authorize(&self.store, session, Operation::CreateAppointment).await?;

        let pet_id = input.pet_id.ok_or(ValidationError::MissingField("pet_id"))?;
        let service_id = input.service_id.ok_or(ValidationError::MissingField("service_id"))?;
        let raw_at = input.scheduled_at.as_deref().unwrap_or_default();
        let scheduled_at = time::normalize(required("scheduled_at", raw_at)?, self.offset)?;
        check_range(&scheduled_at)?;
        let notes = input
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if let Some(n) = &notes {
            check_len("notes", n, MAX_NOTES_LEN)?;
        }

        let org = ctx.organization_id;
        tenant::owning_org(&self.store, &ctx, "pet", pet_id)?;
        let pet = self
            .store
            .pet(org, &pet_id)
            .await
            .ok_or(CoreError::NotFound { entity: "pet", id: pet_id })?;
        if ctx.role == Role::Customer && pet.customer_id != ctx.principal_id {
            return Err(CoreError::forbidden("customers may only book for their own pets"));
        }
        tenant::owning_org(&self.store, &ctx, "service", service_id)?;
        let service = self
            .store
            .service(org, &service_id)
            .await
            .ok_or(CoreError::NotFound { entity: "service", id: service_id })?;
        if let Some(staff_id) = input.staff_id {
            self.check_staff(&ctx, staff_id).await?;
        }
        let (check_in_date, check_out_date) =
            stay_dates(service.kind, input.check_in_date, input.check_out_date)?;

        let at = scheduled_at.millis();
        if let Some(block) = self.blocks.blocks_in(org, Span::instant(at)).await.into_iter().next() {
            return Err(self.conflict(org, &scheduled_at, block.id, block.reason));
        }

        let appointment = Appointment {
            id: Ulid::new(),
            organization_id: org,
            pet_id,
            service_id,
            staff_id: input.staff_id,
            scheduled_at,
            status: AppointmentStatus::Pending,
            notes,
            checklist: Vec::new(),
            actual_check_in: None,
            actual_check_out: None,
            check_in_date,
            check_out_date,
        };
        // The store repeats the block check under the organization lock, so a
        // block inserted since the lookup above still wins.
        match self.store.insert_appointment(appointment.clone()).await {
            Ok(()) => {}
            Err(StoreError::Excluded { block_id, reason }) => {
                return Err(self.conflict(org, &appointment.scheduled_at, block_id, reason));
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            org = %org,
            appointment = %appointment.id,
            pet = %pet.id,
            "appointment created for {} ({})",
            appointment.scheduled_at,
            service.name
        );
        Ok(appointment)
    }

    fn conflict(&self, org: Ulid, at: &Timestamp, block_id: Ulid, reason: String) -> CoreError {
        warn!(org = %org, block = %block_id, "appointment at {at} refused: {reason}");
        metrics::counter!(observability::SCHEDULE_CONFLICTS_TOTAL).increment(1);
        CoreError::Conflict { block_id, reason }
    }

    async fn check_staff(&self, ctx: &TenantContext, staff_id: Ulid) -> CoreResult<()> {
        tenant::owning_org(&self.store, ctx, "staff member", staff_id)?;
        let staff = self
            .store
            .profile(&staff_id)
            .await
            .filter(|p| p.active && p.role != Role::Customer)
            .ok_or(CoreError::NotFound { entity: "staff member", id: staff_id })?;
        debug!(staff = %staff.id, "assigned {}", staff.full_name);
        Ok(())
    }

    /// Overwrite the status. No transition table applies; the only refusal is
    /// moving a checked-out appointment away from `done`.
    pub async fn set_status(
        &self,
        session: &Session,
        appointment_id: Ulid,
        status: AppointmentStatus,
    ) -> CoreResult<Appointment> {
        let started = Instant::now();
        let result = self.set_status_inner(session, appointment_id, status).await;
        observability::record("appointment.set_status", started, &result);
        result
    }

    async fn set_status_inner(
        &self,
        session: &Session,
        appointment_id: Ulid,
        status: AppointmentStatus,
    ) -> CoreResult<Appointment> {
        let ctx = tenant::authorize(&self.store, session, Operation::SetAppointmentStatus).await?;
        let org = tenant::owning_org(&self.store, &ctx, "appointment", appointment_id)?;
        let updated = self.store.set_status(org, appointment_id, status).await?;
        info!(org = %org, appointment = %appointment_id, "status set to {status}");
        Ok(updated)
    }

    /// Stamp `actual_check_in` with the current instant. Repeated calls overwrite it.
    pub async fn check_in(&self, session: &Session, appointment_id: Ulid) -> CoreResult<Appointment> {
        let started = Instant::now();
        let result = self.stamp(session, appointment_id, Stamp::CheckIn).await;
        observability::record("appointment.check_in", started, &result);
        result
    }

    /// Stamp `actual_check_out` and set status `done` in a single write.
    pub async fn check_out(&self, session: &Session, appointment_id: Ulid) -> CoreResult<Appointment> {
        let started = Instant::now();
        let result = self.stamp(session, appointment_id, Stamp::CheckOut).await;
        observability::record("appointment.check_out", started, &result);
        result
    }

    async fn stamp(&self, session: &Session, appointment_id: Ulid, which: Stamp) -> CoreResult<Appointment> {
        let op = match which {
            Stamp::CheckIn => Operation::CheckIn,
            Stamp::CheckOut => Operation::CheckOut,
        };
        let ctx = tenant::authorize(&self.store, session, op).await?;
        let org = tenant::owning_org(&self.store, &ctx, "appointment", appointment_id)?;
        let at = self.now();
        let updated = match which {
            Stamp::CheckIn => self.store.stamp_check_in(org, appointment_id, at).await?,
            Stamp::CheckOut => self.store.stamp_check_out(org, appointment_id, at).await?,
        };
        info!(org = %org, appointment = %appointment_id, status = %updated.status, "{which:?} stamped");
        Ok(updated)
    }

    pub async fn get(&self, session: &Session, appointment_id: Ulid) -> CoreResult<Appointment> {
        let ctx = tenant::authorize(&self.store, session, Operation::ReadAppointments).await?;
        let org = tenant::owning_org(&self.store, &ctx, "appointment", appointment_id)?;
        let appointment = self
            .store
            .appointment(org, &appointment_id)
            .await
            .ok_or(CoreError::NotFound { entity: "appointment", id: appointment_id })?;
        if ctx.role == Role::Customer && !self.owns_pet(&ctx, &appointment.pet_id).await {
            return Err(CoreError::forbidden("customers may only read their own pets' appointments"));
        }
        Ok(appointment)
    }

    async fn owns_pet(&self, ctx: &TenantContext, pet_id: &Ulid) -> bool {
        self.store
            .pet(ctx.organization_id, pet_id)
            .await
            .is_some_and(|p| p.customer_id == ctx.principal_id)
    }

    /// The caller's appointments scheduled within `[window_start, window_end)`.
    /// Customers only see appointments for their own pets.
    pub async fn agenda(
        &self,
        session: &Session,
        window_start: &str,
        window_end: &str,
    ) -> CoreResult<Vec<Appointment>> {
        let ctx = tenant::authorize(&self.store, session, Operation::ReadAppointments).await?;
        let start = time::normalize(required("window_start", window_start)?, self.offset)?;
        let end = time::normalize(required("window_end", window_end)?, self.offset)?;
        let window = Span::new(start.millis(), end.millis());
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let mut appointments = self
            .store
            .appointments_between(ctx.organization_id, window)
            .await;
        if ctx.role == Role::Customer {
            let mut own = Vec::with_capacity(appointments.len());
            for a in appointments {
                if self.owns_pet(&ctx, &a.pet_id).await {
                    own.push(a);
                }
            }
            appointments = own;
        }
        debug!(org = %ctx.organization_id, hits = appointments.len(), "agenda query");
        Ok(appointments)
    }
}
