use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::schedule::{check_len, required};
use crate::store::Store;
use crate::tenant::{self, Operation, Session, TenantContext};

/// Editable pet attributes. `customer_id` only matters on creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetInput {
    pub customer_id: Option<Ulid>,
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub name: String,
    pub kind: ServiceKind,
    pub category_id: Option<Ulid>,
    pub duration_minutes: Option<u32>,
    pub price_cents: Option<i64>,
}

fn pet_from(id: Ulid, organization_id: Ulid, customer_id: Ulid, input: PetInput) -> Result<Pet, ValidationError> {
    let name = required("name", &input.name)?.to_string();
    check_len("name", &name, MAX_NAME_LEN)?;
    let species = required("species", &input.species)?.to_string();
    check_len("species", &species, MAX_NAME_LEN)?;
    if let Some(notes) = &input.medical_notes {
        check_len("medical_notes", notes, MAX_NOTES_LEN)?;
    }
    Ok(Pet {
        id,
        customer_id,
        organization_id,
        name,
        species,
        breed: input.breed,
        gender: input.gender,
        size: input.size,
        weight_kg: input.weight_kg.filter(|w| w.is_finite() && *w > 0.0),
        birth_date: input.birth_date,
        neutered: input.neutered,
        medical_notes: input.medical_notes,
        vaccinated: input.vaccinated,
        photo_ref: input.photo_ref,
    })
}

/// Pets and the services an organization offers.
pub struct Catalog {
    store: Arc<Store>,
}

impl Catalog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The customer must be an active customer profile of the caller's organization.
    async fn customer_of(&self, ctx: &TenantContext, customer_id: Ulid) -> CoreResult<Profile> {
        let not_found = CoreError::NotFound { entity: "customer", id: customer_id };
        match self.store.profile(&customer_id).await {
            Some(p) if p.organization_id == ctx.organization_id && p.role == Role::Customer && p.active => {
                Ok(p)
            }
            _ => Err(not_found),
        }
    }

    pub async fn create_pet(&self, session: &Session, input: PetInput) -> CoreResult<Pet> {
        let started = Instant::now();
        let result = self.create_pet_inner(session, input).await;
        observability::record("pet.create", started, &result);
        result
    }

    async fn create_pet_inner(&self, session: &Session, input: PetInput) -> CoreResult<Pet> {
        let ctx = tenant::authorize(&self.store, session, Operation::CreatePet).await?;
        let customer_id = input.customer_id.ok_or(ValidationError::MissingField("customer_id"))?;
        let pet = pet_from(Ulid::new(), ctx.organization_id, customer_id, input)?;
        let customer = self.customer_of(&ctx, customer_id).await?;
        self.store.insert_pet(pet.clone()).await?;
        info!(org = %pet.organization_id, pet = %pet.id, "pet {} registered for {}", pet.name, customer.full_name);
        Ok(pet)
    }

    /// Replace a pet's attributes. The owning customer never changes.
    pub async fn update_pet(&self, session: &Session, pet_id: Ulid, input: PetInput) -> CoreResult<Pet> {
        let started = Instant::now();
        let result = self.update_pet_inner(session, pet_id, input).await;
        observability::record("pet.update", started, &result);
        result
    }

    async fn update_pet_inner(&self, session: &Session, pet_id: Ulid, input: PetInput) -> CoreResult<Pet> {
        let ctx = tenant::authorize(&self.store, session, Operation::UpdatePet).await?;
        let org = tenant::owning_org(&self.store, &ctx, "pet", pet_id)?;
        let current = self
            .store
            .pet(org, &pet_id)
            .await
            .ok_or(CoreError::NotFound { entity: "pet", id: pet_id })?;
        let pet = pet_from(pet_id, org, current.customer_id, input)?;
        self.store.update_pet(pet.clone()).await?;
        info!(org = %org, pet = %pet_id, "pet updated");
        Ok(pet)
    }

    /// Hard delete. Appointments that reference the pet are left as they are.
    pub async fn delete_pet(&self, session: &Session, pet_id: Ulid) -> CoreResult<()> {
        let started = Instant::now();
        let result = self.delete_pet_inner(session, pet_id).await;
        observability::record("pet.delete", started, &result);
        result
    }

    async fn delete_pet_inner(&self, session: &Session, pet_id: Ulid) -> CoreResult<()> {
        let ctx = tenant::authorize(&self.store, session, Operation::DeletePet).await?;
        let org = tenant::owning_org(&self.store, &ctx, "pet", pet_id)?;
        self.store.delete_pet(org, pet_id).await?;
        info!(org = %org, pet = %pet_id, "pet deleted");
        Ok(())
    }

    pub async fn pet(&self, session: &Session, pet_id: Ulid) -> CoreResult<Pet> {
        let ctx = tenant::resolve(&self.store, session).await?;
        let org = tenant::owning_org(&self.store, &ctx, "pet", pet_id)?;
        self.store
            .pet(org, &pet_id)
            .await
            .ok_or(CoreError::NotFound { entity: "pet", id: pet_id })
    }

    pub async fn create_service(&self, session: &Session, input: NewService) -> CoreResult<Service> {
        let started = Instant::now();
        let result = self.create_service_inner(session, input).await;
        observability::record("service.create", started, &result);
        result
    }

    async fn create_service_inner(&self, session: &Session, input: NewService) -> CoreResult<Service> {
        let ctx = tenant::authorize(&self.store, session, Operation::CreateService).await?;
        let name = required("name", &input.name)?.to_string();
        check_len("name", &name, MAX_NAME_LEN)?;
        let service = Service {
            id: Ulid::new(),
            organization_id: ctx.organization_id,
            category_id: input.category_id,
            name,
            kind: input.kind,
            duration_minutes: input.duration_minutes,
            price_cents: input.price_cents,
        };
        self.store.insert_service(service.clone()).await?;
        info!(org = %service.organization_id, service = %service.id, "service {} created", service.name);
        Ok(service)
    }
}
