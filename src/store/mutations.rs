use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::Timestamp;

use super::{Store, StoreError};

impl Store {
    /// Write lock on an organization that must already exist.
    async fn write_existing(
        &self,
        organization_id: Ulid,
        entity: &'static str,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<OrganizationState>, StoreError> {
        let shared = self
            .existing_partition(&organization_id)
            .ok_or(StoreError::not_found(entity, id))?;
        Ok(shared.write_owned().await)
    }

    fn ensure_new(&self, id: Ulid) -> Result<(), StoreError> {
        if self.entity_to_org.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        Ok(())
    }

    // ── Profiles ─────────────────────────────────────────────

    pub async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.ensure_new(profile.id)?;
        let mut guard = self.partition(profile.organization_id).write_owned().await;
        self.persist_and_apply(&mut guard, Event::ProfileCreated(profile)).await
    }

    pub async fn update_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self
            .write_existing(profile.organization_id, "profile", profile.id)
            .await?;
        if !guard.profiles.contains_key(&profile.id) {
            return Err(StoreError::not_found("profile", profile.id));
        }
        self.persist_and_apply(&mut guard, Event::ProfileUpdated(profile)).await
    }

    // ── Catalog ──────────────────────────────────────────────

    pub async fn insert_pet(&self, pet: Pet) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.ensure_new(pet.id)?;
        let mut guard = self.partition(pet.organization_id).write_owned().await;
        self.persist_and_apply(&mut guard, Event::PetCreated(pet)).await
    }

    pub async fn update_pet(&self, pet: Pet) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_existing(pet.organization_id, "pet", pet.id).await?;
        if !guard.pets.contains_key(&pet.id) {
            return Err(StoreError::not_found("pet", pet.id));
        }
        self.persist_and_apply(&mut guard, Event::PetUpdated(pet)).await
    }

    pub async fn delete_pet(&self, organization_id: Ulid, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_existing(organization_id, "pet", id).await?;
        if !guard.pets.contains_key(&id) {
            return Err(StoreError::not_found("pet", id));
        }
        self.persist_and_apply(&mut guard, Event::PetDeleted { id, organization_id })
            .await
    }

    pub async fn insert_service(&self, service: Service) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.ensure_new(service.id)?;
        let mut guard = self.partition(service.organization_id).write_owned().await;
        self.persist_and_apply(&mut guard, Event::ServiceCreated(service)).await
    }

    // ── Schedule blocks ──────────────────────────────────────

    pub async fn insert_block(&self, block: ScheduleBlock) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.ensure_new(block.id)?;
        let mut guard = self.partition(block.organization_id).write_owned().await;
        if guard.blocks.len() >= MAX_BLOCKS_PER_ORGANIZATION {
            return Err(StoreError::LimitExceeded("too many schedule blocks"));
        }
        self.persist_and_apply(&mut guard, Event::BlockCreated(block)).await
    }

    /// Delete a block of `organization_id`. Unknown ids are an error.
    pub async fn delete_block(
        &self,
        organization_id: Ulid,
        id: Ulid,
    ) -> Result<ScheduleBlock, StoreError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_existing(organization_id, "schedule block", id).await?;
        let block = guard
            .blocks
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(StoreError::not_found("schedule block", id))?;
        self.persist_and_apply(&mut guard, Event::BlockDeleted { id, organization_id })
            .await?;
        Ok(block)
    }

    // ── Appointments ─────────────────────────────────────────

    /// Insert an appointment unless its scheduled instant lies inside one of
    /// the organization's blocks. The check and the write share one lock.
    pub async fn insert_appointment(&self, appointment: Appointment) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        self.ensure_new(appointment.id)?;
        let mut guard = self.partition(appointment.organization_id).write_owned().await;
        if let Some(block) = guard.block_at(appointment.scheduled_at.millis()) {
            return Err(StoreError::Excluded {
                block_id: block.id,
                reason: block.reason.clone(),
            });
        }
        self.persist_and_apply(&mut guard, Event::AppointmentCreated(appointment))
            .await
    }

    /// Look up the appointment under the write lock, let `make` turn it into
    /// the one event to persist.
    async fn mutate_appointment<F>(
        &self,
        organization_id: Ulid,
        id: Ulid,
        make: F,
    ) -> Result<Appointment, StoreError>
    where
        F: FnOnce(&Appointment) -> Result<Event, StoreError>,
    {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.write_existing(organization_id, "appointment", id).await?;
        let current = guard
            .appointments
            .get(&id)
            .ok_or(StoreError::not_found("appointment", id))?;
        let event = make(current)?;
        self.persist_and_apply(&mut guard, event).await?;
        guard
            .appointments
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("appointment", id))
    }

    /// Overwrite the status. Once checked out, only `done` is accepted.
    pub async fn set_status(
        &self,
        organization_id: Ulid,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        self.mutate_appointment(organization_id, id, |current| {
            if current.actual_check_out.is_some() && status != AppointmentStatus::Done {
                return Err(StoreError::CheckedOut(id));
            }
            Ok(Event::AppointmentStatusSet { id, organization_id, status })
        })
        .await
    }

    pub async fn stamp_check_in(
        &self,
        organization_id: Ulid,
        id: Ulid,
        at: Timestamp,
    ) -> Result<Appointment, StoreError> {
        self.mutate_appointment(organization_id, id, |_| {
            Ok(Event::AppointmentCheckedIn { id, organization_id, at })
        })
        .await
    }

    /// Stamp `actual_check_out` and set status `done` as one record.
    pub async fn stamp_check_out(
        &self,
        organization_id: Ulid,
        id: Ulid,
        at: Timestamp,
    ) -> Result<Appointment, StoreError> {
        self.mutate_appointment(organization_id, id, |_| {
            Ok(Event::AppointmentCheckedOut { id, organization_id, at })
        })
        .await
    }

    pub async fn replace_checklist(
        &self,
        organization_id: Ulid,
        id: Ulid,
        items: Vec<ChecklistItem>,
    ) -> Result<Appointment, StoreError> {
        if items.len() > MAX_CHECKLIST_ITEMS {
            return Err(StoreError::LimitExceeded("too many checklist items"));
        }
        if items.iter().any(|i| i.task.chars().count() > MAX_TASK_LEN) {
            return Err(StoreError::LimitExceeded("checklist task too long"));
        }
        self.mutate_appointment(organization_id, id, |_| {
            Ok(Event::ChecklistReplaced { id, organization_id, items })
        })
        .await
    }
}
