use ulid::Ulid;

use crate::error::{CoreError, CoreResult};
use crate::model::Role;
use crate::store::Store;

/// What the identity collaborator knows about the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    principal: Option<Ulid>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn for_principal(id: Ulid) -> Self {
        Self { principal: Some(id) }
    }

    pub fn current_principal(&self) -> Option<Ulid> {
        self.principal
    }
}

/// Every role-gated operation. The allow-list lives here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ProvisionPrincipal,
    ManagePrincipal,
    CreatePet,
    UpdatePet,
    DeletePet,
    CreateService,
    ManageScheduleBlocks,
    QueryScheduleBlocks,
    CreateAppointment,
    ReadAppointments,
    SetAppointmentStatus,
    CheckIn,
    CheckOut,
    UpdateChecklist,
}

const ANY_ROLE: &[Role] = &[Role::Superadmin, Role::Admin, Role::Staff, Role::Customer];
const ADMINS: &[Role] = &[Role::Superadmin, Role::Admin];
const STAFF_AND_UP: &[Role] = &[Role::Superadmin, Role::Admin, Role::Staff];

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::ProvisionPrincipal
            | Operation::ManagePrincipal
            | Operation::DeletePet
            | Operation::CreateService => ADMINS,
            Operation::CreatePet | Operation::UpdatePet | Operation::ManageScheduleBlocks => {
                STAFF_AND_UP
            }
            // Status, stamps and checklist are open to any authenticated member.
            Operation::QueryScheduleBlocks
            | Operation::CreateAppointment
            | Operation::ReadAppointments
            | Operation::SetAppointmentStatus
            | Operation::CheckIn
            | Operation::CheckOut
            | Operation::UpdateChecklist => ANY_ROLE,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}

/// The resolved caller: who, in which organization, with which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub principal_id: Ulid,
    pub organization_id: Ulid,
    pub role: Role,
}

impl TenantContext {
    pub fn authorize(&self, op: Operation) -> CoreResult<()> {
        if op.permits(self.role) {
            Ok(())
        } else {
            Err(CoreError::forbidden(format!("role {} may not {op:?}", self.role)))
        }
    }

    /// Cross-tenant access is refused outright, never treated as a missing row.
    pub fn ensure_same_org(&self, organization_id: Ulid) -> CoreResult<()> {
        if organization_id == self.organization_id {
            Ok(())
        } else {
            Err(CoreError::forbidden("entity belongs to another organization"))
        }
    }
}

/// Resolve the caller's organization and role from their profile.
pub async fn resolve(store: &Store, session: &Session) -> CoreResult<TenantContext> {
    let principal_id = session.current_principal().ok_or(CoreError::Unauthenticated)?;
    let profile = store
        .profile(&principal_id)
        .await
        .ok_or(CoreError::ProfileNotFound(principal_id))?;
    if !profile.active {
        return Err(CoreError::forbidden("profile is deactivated"));
    }
    Ok(TenantContext {
        principal_id,
        organization_id: profile.organization_id,
        role: profile.role,
    })
}

/// [`resolve`] followed by [`TenantContext::authorize`].
pub async fn authorize(store: &Store, session: &Session, op: Operation) -> CoreResult<TenantContext> {
    let ctx = resolve(store, session).await?;
    ctx.authorize(op)?;
    Ok(ctx)
}

/// Resolve the organization owning `entity_id` and check it is the caller's.
pub fn owning_org(
    store: &Store,
    ctx: &TenantContext,
    entity: &'static str,
    entity_id: Ulid,
) -> CoreResult<Ulid> {
    let org = store
        .organization_of(&entity_id)
        .ok_or(CoreError::NotFound { entity, id: entity_id })?;
    ctx.ensure_same_org(org)?;
    Ok(org)
}
