use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::limits::*;
use crate::model::{Profile, Role, WorkingHours};
use crate::observability;
use crate::schedule::{check_len, required};
use crate::store::Store;
use crate::tenant::{self, Operation, Session, TenantContext};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("email already registered: {0}")]
    AlreadyRegistered(String),
    #[error("unknown identity: {0}")]
    UnknownIdentity(Ulid),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The external authentication service that owns credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Ulid, IdentityError>;
    async fn delete_identity(&self, id: Ulid) -> Result<(), IdentityError>;
}

/// Identity provider kept in memory. Failures can be injected for tests.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    identities: DashMap<Ulid, String>,
    failing_deletes: AtomicU32,
    next_id: Mutex<Option<Ulid>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` delete calls fail as unavailable.
    pub fn fail_next_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    /// Hand out `id` for the next identity instead of a fresh one.
    pub fn assign_next_id(&self, id: Ulid) {
        if let Ok(mut next) = self.next_id.lock() {
            *next = Some(id);
        }
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.identities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_identity(&self, email: &str, _password: &str) -> Result<Ulid, IdentityError> {
        if self.identities.iter().any(|e| e.value() == email) {
            return Err(IdentityError::AlreadyRegistered(email.to_string()));
        }
        let assigned = self.next_id.lock().ok().and_then(|mut next| next.take());
        let id = assigned.unwrap_or_else(Ulid::new);
        self.identities.insert(id, email.to_string());
        Ok(id)
    }

    async fn delete_identity(&self, id: Ulid) -> Result<(), IdentityError> {
        let failing = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(IdentityError::Unavailable("injected failure".into()));
        }
        self.identities
            .remove(&id)
            .map(|_| ())
            .ok_or(IdentityError::UnknownIdentity(id))
    }
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub working_hours: Option<WorkingHours>,
}

/// Partial profile edit; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub working_hours: Option<WorkingHours>,
}

fn grantable(ctx: &TenantContext, role: Role) -> CoreResult<()> {
    if role == Role::Superadmin && ctx.role != Role::Superadmin {
        return Err(CoreError::forbidden("only a superadmin may grant superadmin"));
    }
    Ok(())
}

/// Two-step principal creation: identity first, then the profile that ties
/// it to an organization. A failed profile write undoes the identity.
pub struct Provisioning {
    store: Arc<Store>,
    identity: Arc<dyn IdentityProvider>,
}

impl Provisioning {
    pub fn new(store: Arc<Store>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    pub async fn provision(&self, session: &Session, input: NewPrincipal) -> CoreResult<Profile> {
        let started = Instant::now();
        let result = self.provision_inner(session, input).await;
        observability::record("principal.provision", started, &result);
        result
    }

    async fn provision_inner(&self, session: &Session, input: NewPrincipal) -> CoreResult<Profile> {
        let ctx = tenant::authorize(&self.store, session, Operation::ProvisionPrincipal).await?;
        grantable(&ctx, input.role)?;

        let email = required("email", &input.email)?;
        if !email.contains('@') {
            return Err(ValidationError::InvalidEmail(email.to_string()).into());
        }
        check_len("email", email, MAX_NAME_LEN)?;
        let full_name = required("full_name", &input.full_name)?;
        check_len("full_name", full_name, MAX_NAME_LEN)?;
        required("password", &input.password)?;
        let working_hours = input.working_hours.unwrap_or_default();
        working_hours.validate()?;

        let id = self.identity.create_identity(email, &input.password).await?;
        let profile = Profile {
            id,
            organization_id: ctx.organization_id,
            role: input.role,
            full_name: full_name.to_string(),
            email: email.to_string(),
            active: true,
            working_hours,
        };
        if let Err(e) = self.store.insert_profile(profile.clone()).await {
            warn!(principal = %id, "profile write failed, removing identity: {e}");
            self.compensate(id).await;
            return Err(e.into());
        }
        info!(
            org = %profile.organization_id,
            principal = %id,
            role = %profile.role,
            "provisioned {}",
            profile.email
        );
        Ok(profile)
    }

    /// Delete an identity whose profile never got written. Retries with
    /// exponential backoff; giving up leaves an orphan that is logged and counted.
    async fn compensate(&self, id: Ulid) {
        for attempt in 0..COMPENSATION_ATTEMPTS {
            match self.identity.delete_identity(id).await {
                Ok(()) => {
                    info!(principal = %id, attempt = attempt + 1, "identity removed");
                    return;
                }
                Err(e) => {
                    warn!(principal = %id, attempt = attempt + 1, "identity delete failed: {e}");
                    if attempt + 1 < COMPENSATION_ATTEMPTS {
                        let delay = COMPENSATION_BACKOFF_MS * 2u64.pow(attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        error!(
            principal = %id,
            attempts = COMPENSATION_ATTEMPTS,
            "orphaned identity left behind; remove it by hand"
        );
        metrics::counter!(observability::COMPENSATION_FAILURES_TOTAL).increment(1);
    }

    /// Edit one profile of the caller's organization.
    pub async fn update_profile(
        &self,
        session: &Session,
        profile_id: Ulid,
        changes: ProfileChanges,
    ) -> CoreResult<Profile> {
        let started = Instant::now();
        let result = self.update_profile_inner(session, profile_id, changes).await;
        observability::record("principal.update", started, &result);
        result
    }

    async fn update_profile_inner(
        &self,
        session: &Session,
        profile_id: Ulid,
        changes: ProfileChanges,
    ) -> CoreResult<Profile> {
        let (ctx, mut profile) = self.managed_profile(session, profile_id).await?;
        if let Some(name) = &changes.full_name {
            let name = required("full_name", name)?;
            check_len("full_name", name, MAX_NAME_LEN)?;
            profile.full_name = name.to_string();
        }
        if let Some(role) = changes.role {
            grantable(&ctx, role)?;
            profile.role = role;
        }
        if let Some(hours) = changes.working_hours {
            hours.validate()?;
            profile.working_hours = hours;
        }
        self.store.update_profile(profile.clone()).await?;
        info!(org = %profile.organization_id, principal = %profile_id, "profile updated");
        Ok(profile)
    }

    /// Soft (de)activation. Profiles are never deleted.
    pub async fn set_active(&self, session: &Session, profile_id: Ulid, active: bool) -> CoreResult<Profile> {
        let started = Instant::now();
        let result = self.set_active_inner(session, profile_id, active).await;
        observability::record("principal.set_active", started, &result);
        result
    }

    async fn set_active_inner(&self, session: &Session, profile_id: Ulid, active: bool) -> CoreResult<Profile> {
        let (ctx, mut profile) = self.managed_profile(session, profile_id).await?;
        if !active && profile_id == ctx.principal_id {
            return Err(CoreError::forbidden("cannot deactivate your own profile"));
        }
        profile.active = active;
        self.store.update_profile(profile.clone()).await?;
        info!(org = %profile.organization_id, principal = %profile_id, active, "profile activation changed");
        Ok(profile)
    }

    /// A profile the caller may manage: same organization, and superadmin
    /// profiles only by a superadmin.
    async fn managed_profile(&self, session: &Session, profile_id: Ulid) -> CoreResult<(TenantContext, Profile)> {
        let ctx = tenant::authorize(&self.store, session, Operation::ManagePrincipal).await?;
        tenant::owning_org(&self.store, &ctx, "profile", profile_id)?;
        let profile = self
            .store
            .profile(&profile_id)
            .await
            .ok_or(CoreError::NotFound { entity: "profile", id: profile_id })?;
        grantable(&ctx, profile.role)?;
        Ok((ctx, profile))
    }
}
