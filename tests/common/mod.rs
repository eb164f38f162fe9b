#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

use petshop_core::catalog::{NewService, PetInput};
use petshop_core::model::{Pet, Profile, Role, Service, ServiceKind, WorkingHours};
use petshop_core::notify::InvalidationHub;
use petshop_core::provisioning::{InMemoryIdentityProvider, NewPrincipal};
use petshop_core::store::Store;
use petshop_core::tenant::Session;
use petshop_core::time::{default_offset, Clock};
use petshop_core::PetShop;

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(rfc3339: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct Fixture {
    pub shop: PetShop,
    pub identity: Arc<InMemoryIdentityProvider>,
    pub clock: Arc<ManualClock>,
    pub wal_path: PathBuf,
}

pub fn fixture(name: &str) -> Fixture {
    let dir = std::env::temp_dir().join(format!("petshop_it_{name}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let wal_path = dir.join("petshop.wal");
    let store = Arc::new(Store::open(wal_path.clone(), Arc::new(InvalidationHub::new())).unwrap());
    let identity = Arc::new(InMemoryIdentityProvider::new());
    let clock = Arc::new(ManualClock::at("2024-06-03T13:00:00Z"));
    let shop = PetShop::new(store, default_offset(), clock.clone(), identity.clone());
    Fixture { shop, identity, clock, wal_path }
}

/// One seeded organization: an admin written straight to the store, a staff
/// member and a customer provisioned through the saga, one pet, two services.
pub struct Org {
    pub id: Ulid,
    pub admin: Session,
    pub staff: Session,
    pub staff_id: Ulid,
    pub customer: Session,
    pub customer_id: Ulid,
    pub pet: Pet,
    pub grooming: Service,
    pub boarding: Service,
}

pub async fn bootstrap_admin(fx: &Fixture, org: Ulid, role: Role) -> Profile {
    let admin = Profile {
        id: Ulid::new(),
        organization_id: org,
        role,
        full_name: "Dona Marta".into(),
        email: format!("admin-{org}@example.com"),
        active: true,
        working_hours: WorkingHours::default(),
    };
    fx.shop.store.insert_profile(admin.clone()).await.unwrap();
    admin
}

pub fn principal(email: &str, role: Role) -> NewPrincipal {
    NewPrincipal {
        email: email.into(),
        password: "s3cret".into(),
        full_name: email.split('@').next().unwrap_or_default().into(),
        role,
        working_hours: None,
    }
}

pub async fn seed_org(fx: &Fixture, tag: &str) -> Org {
    let id = Ulid::new();
    let admin_profile = bootstrap_admin(fx, id, Role::Admin).await;
    let admin = Session::for_principal(admin_profile.id);

    let staff_profile = fx
        .shop
        .provisioning
        .provision(&admin, principal(&format!("staff-{tag}@example.com"), Role::Staff))
        .await
        .unwrap();
    let customer_profile = fx
        .shop
        .provisioning
        .provision(&admin, principal(&format!("tutor-{tag}@example.com"), Role::Customer))
        .await
        .unwrap();
    let staff = Session::for_principal(staff_profile.id);

    let pet = fx
        .shop
        .catalog
        .create_pet(
            &staff,
            PetInput {
                customer_id: Some(customer_profile.id),
                name: "Thor".into(),
                species: "dog".into(),
                vaccinated: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let grooming = fx
        .shop
        .catalog
        .create_service(&admin, service("Banho e tosa", ServiceKind::Grooming))
        .await
        .unwrap();
    let boarding = fx
        .shop
        .catalog
        .create_service(&admin, service("Hotel", ServiceKind::Boarding))
        .await
        .unwrap();

    Org {
        id,
        admin,
        staff,
        staff_id: staff_profile.id,
        customer: Session::for_principal(customer_profile.id),
        customer_id: customer_profile.id,
        pet,
        grooming,
        boarding,
    }
}

pub fn service(name: &str, kind: ServiceKind) -> NewService {
    NewService {
        name: name.into(),
        kind,
        category_id: None,
        duration_minutes: Some(60),
        price_cents: Some(9_000),
    }
}
