mod common;

use chrono::NaiveTime;
use ulid::Ulid;

use petshop_core::error::{CoreError, ValidationError};
use petshop_core::model::{Role, WorkingHours};
use petshop_core::provisioning::{NewPrincipal, ProfileChanges};
use petshop_core::schedule::NewScheduleBlock;
use petshop_core::store::StoreError;
use petshop_core::tenant::Session;

use common::{bootstrap_admin, fixture, principal};

#[tokio::test]
async fn admin_provisions_into_own_organization() {
    let fx = fixture("provision_ok");
    let org = Ulid::new();
    let admin = bootstrap_admin(&fx, org, Role::Admin).await;

    let staff = fx
        .shop
        .provisioning
        .provision(&Session::for_principal(admin.id), principal("joana@example.com", Role::Staff))
        .await
        .unwrap();
    assert_eq!(staff.organization_id, org);
    assert_eq!(staff.role, Role::Staff);
    assert!(staff.active);
    assert_eq!(staff.working_hours, WorkingHours::default());
    assert!(fx.identity.contains(&staff.id));
    assert_eq!(fx.shop.store.profile(&staff.id).await, Some(staff));
}

#[tokio::test]
async fn only_admins_provision_and_only_superadmins_grant_superadmin() {
    let fx = fixture("provision_roles");
    let org = Ulid::new();
    let admin = Session::for_principal(bootstrap_admin(&fx, org, Role::Admin).await.id);
    let root = Session::for_principal(bootstrap_admin(&fx, org, Role::Superadmin).await.id);
    let staff = fx
        .shop
        .provisioning
        .provision(&admin, principal("staff@example.com", Role::Staff))
        .await
        .unwrap();

    let err = fx
        .shop
        .provisioning
        .provision(&Session::for_principal(staff.id), principal("x@example.com", Role::Customer))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = fx
        .shop
        .provisioning
        .provision(&admin, principal("boss@example.com", Role::Superadmin))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    // Refused before any identity is created.
    assert_eq!(fx.identity.len(), 1);

    let boss = fx
        .shop
        .provisioning
        .provision(&root, principal("boss@example.com", Role::Superadmin))
        .await
        .unwrap();
    assert_eq!(boss.role, Role::Superadmin);
}

#[tokio::test]
async fn input_is_validated_before_identity_creation() {
    let fx = fixture("provision_validation");
    let admin = Session::for_principal(bootstrap_admin(&fx, Ulid::new(), Role::Admin).await.id);

    let err = fx
        .shop
        .provisioning
        .provision(&admin, principal("not-an-email", Role::Staff))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidEmail(_))));

    let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let backwards = NewPrincipal {
        working_hours: Some(WorkingHours { start: at(18), lunch_start: at(12), lunch_end: at(13), end: at(8) }),
        ..principal("late@example.com", Role::Staff)
    };
    let err = fx.shop.provisioning.provision(&admin, backwards).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidWorkingHours)));
    assert!(fx.identity.is_empty());
}

#[tokio::test]
async fn failed_profile_write_removes_the_identity() {
    let fx = fixture("provision_compensate");
    let admin = bootstrap_admin(&fx, Ulid::new(), Role::Admin).await;
    // The identity service hands back an id the store already knows.
    fx.identity.assign_next_id(admin.id);

    let err = fx
        .shop
        .provisioning
        .provision(&Session::for_principal(admin.id), principal("clash@example.com", Role::Staff))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(StoreError::AlreadyExists(id)) if id == admin.id));
    assert!(fx.identity.is_empty());
    // The existing profile is untouched.
    assert_eq!(fx.shop.store.profile(&admin.id).await.unwrap().email, admin.email);
}

#[tokio::test]
async fn compensation_is_retried() {
    let fx = fixture("provision_retry");
    let admin = bootstrap_admin(&fx, Ulid::new(), Role::Admin).await;
    fx.identity.assign_next_id(admin.id);
    fx.identity.fail_next_deletes(2);

    let err = fx
        .shop
        .provisioning
        .provision(&Session::for_principal(admin.id), principal("retry@example.com", Role::Staff))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert!(fx.identity.is_empty());
}

#[tokio::test]
async fn exhausted_compensation_still_returns_the_original_error() {
    let fx = fixture("provision_orphan");
    let admin = bootstrap_admin(&fx, Ulid::new(), Role::Admin).await;
    fx.identity.assign_next_id(admin.id);
    fx.identity.fail_next_deletes(10);

    let err = fx
        .shop
        .provisioning
        .provision(&Session::for_principal(admin.id), principal("orphan@example.com", Role::Staff))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(StoreError::AlreadyExists(_))));
    assert!(fx.identity.contains(&admin.id));
}

#[tokio::test]
async fn profiles_are_edited_not_deleted() {
    let fx = fixture("profile_edit");
    let org = Ulid::new();
    let admin_profile = bootstrap_admin(&fx, org, Role::Admin).await;
    let admin = Session::for_principal(admin_profile.id);
    let staff = fx
        .shop
        .provisioning
        .provision(&admin, principal("rui@example.com", Role::Staff))
        .await
        .unwrap();

    let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let hours = WorkingHours { start: at(9), lunch_start: at(12), lunch_end: at(13), end: at(17) };
    let promoted = fx
        .shop
        .provisioning
        .update_profile(
            &admin,
            staff.id,
            ProfileChanges { role: Some(Role::Admin), working_hours: Some(hours), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Admin);
    assert_eq!(promoted.working_hours, hours);
    assert_eq!(promoted.full_name, staff.full_name);

    let err = fx
        .shop
        .provisioning
        .update_profile(&admin, staff.id, ProfileChanges { role: Some(Role::Superadmin), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn deactivated_principals_lose_access() {
    let fx = fixture("deactivate");
    let org = Ulid::new();
    let admin_profile = bootstrap_admin(&fx, org, Role::Admin).await;
    let admin = Session::for_principal(admin_profile.id);
    let staff = fx
        .shop
        .provisioning
        .provision(&admin, principal("ex@example.com", Role::Staff))
        .await
        .unwrap();
    let staff_session = Session::for_principal(staff.id);

    let block = || NewScheduleBlock {
        start_at: "2024-06-01T00:00".into(),
        end_at: "2024-06-02T00:00".into(),
        reason: "Feriado".into(),
    };
    fx.shop.schedule.create(&staff_session, block()).await.unwrap();

    let off = fx.shop.provisioning.set_active(&admin, staff.id, false).await.unwrap();
    assert!(!off.active);
    assert!(matches!(
        fx.shop.schedule.create(&staff_session, block()).await,
        Err(CoreError::Forbidden(_))
    ));
    // Still there, just inactive.
    assert!(fx.shop.store.profile(&staff.id).await.is_some());

    assert!(matches!(
        fx.shop.provisioning.set_active(&admin, admin_profile.id, false).await,
        Err(CoreError::Forbidden(_))
    ));

    fx.shop.provisioning.set_active(&admin, staff.id, true).await.unwrap();
    fx.shop.schedule.create(&staff_session, block()).await.unwrap();
}

#[tokio::test]
async fn other_organizations_profiles_are_off_limits() {
    let fx = fixture("profile_isolation");
    let admin_a = Session::for_principal(bootstrap_admin(&fx, Ulid::new(), Role::Admin).await.id);
    let admin_b = bootstrap_admin(&fx, Ulid::new(), Role::Admin).await;

    assert!(matches!(
        fx.shop.provisioning.set_active(&admin_a, admin_b.id, false).await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(matches!(
        fx.shop.provisioning.update_profile(&admin_a, Ulid::new(), ProfileChanges::default()).await,
        Err(CoreError::NotFound { entity: "profile", .. })
    ));
}
