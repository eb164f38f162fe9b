use serde::Serialize;
use ulid::Ulid;

use crate::interval::Span;
use crate::model::*;

use super::Store;

/// Row counts for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationSummary {
    pub organization_id: Ulid,
    pub profiles: usize,
    pub pets: usize,
    pub services: usize,
    pub appointments: usize,
    pub schedule_blocks: usize,
}

impl Store {
    pub async fn profile(&self, id: &Ulid) -> Option<Profile> {
        let org = self.organization_of(id)?;
        let shared = self.existing_partition(&org)?;
        let guard = shared.read().await;
        guard.profiles.get(id).cloned()
    }

    pub async fn pet(&self, organization_id: Ulid, id: &Ulid) -> Option<Pet> {
        let shared = self.existing_partition(&organization_id)?;
        let guard = shared.read().await;
        guard.pets.get(id).cloned()
    }

    pub async fn service(&self, organization_id: Ulid, id: &Ulid) -> Option<Service> {
        let shared = self.existing_partition(&organization_id)?;
        let guard = shared.read().await;
        guard.services.get(id).cloned()
    }

    pub async fn appointment(&self, organization_id: Ulid, id: &Ulid) -> Option<Appointment> {
        let shared = self.existing_partition(&organization_id)?;
        let guard = shared.read().await;
        guard.appointments.get(id).cloned()
    }

    /// Blocks of one organization overlapping `window`, ascending by start.
    pub async fn blocks_overlapping(&self, organization_id: Ulid, window: Span) -> Vec<ScheduleBlock> {
        let Some(shared) = self.existing_partition(&organization_id) else {
            return Vec::new();
        };
        let guard = shared.read().await;
        guard.blocks_overlapping(window).cloned().collect()
    }

    /// Appointments whose scheduled instant lies in `window`, ascending.
    pub async fn appointments_between(&self, organization_id: Ulid, window: Span) -> Vec<Appointment> {
        let Some(shared) = self.existing_partition(&organization_id) else {
            return Vec::new();
        };
        let guard = shared.read().await;
        let mut hits: Vec<Appointment> = guard
            .appointments
            .values()
            .filter(|a| window.contains_instant(a.scheduled_at.millis()))
            .cloned()
            .collect();
        hits.sort_by_key(|a| (a.scheduled_at.millis(), a.id));
        hits
    }

    pub async fn summaries(&self) -> Vec<OrganizationSummary> {
        let partitions: Vec<_> = self.orgs.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(partitions.len());
        for shared in partitions {
            let guard = shared.read().await;
            out.push(OrganizationSummary {
                organization_id: guard.id,
                profiles: guard.profiles.len(),
                pets: guard.pets.len(),
                services: guard.services.len(),
                appointments: guard.appointments.len(),
                schedule_blocks: guard.blocks.len(),
            });
        }
        out.sort_by_key(|s| s.organization_id);
        out
    }
}
