//! Appointment lifecycle and schedule-conflict engine for a multi-tenant pet shop.
//!
//! Every operation takes an explicit [`tenant::Session`] and resolves the
//! caller's organization before touching scoped data. All state lives in a
//! WAL-backed [`store::Store`].

pub mod appointment;
pub mod catalog;
pub mod checklist;
pub mod compactor;
pub mod config;
pub mod error;
pub mod interval;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod provisioning;
pub mod schedule;
pub mod store;
pub mod tenant;
pub mod time;
pub mod wal;

use std::sync::Arc;

use chrono::FixedOffset;

use crate::appointment::Appointments;
use crate::catalog::Catalog;
use crate::checklist::Checklists;
use crate::provisioning::{IdentityProvider, Provisioning};
use crate::schedule::ScheduleBlocks;
use crate::store::Store;
use crate::time::Clock;

/// Every manager, wired to one store.
pub struct PetShop {
    pub store: Arc<Store>,
    pub schedule: ScheduleBlocks,
    pub appointments: Appointments,
    pub checklists: Checklists,
    pub catalog: Catalog,
    pub provisioning: Provisioning,
}

impl PetShop {
    pub fn new(
        store: Arc<Store>,
        offset: FixedOffset,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            schedule: ScheduleBlocks::new(store.clone(), offset),
            appointments: Appointments::new(store.clone(), offset, clock),
            checklists: Checklists::new(store.clone()),
            catalog: Catalog::new(store.clone()),
            provisioning: Provisioning::new(store.clone(), identity),
            store,
        }
    }
}
