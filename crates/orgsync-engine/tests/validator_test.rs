//! State-sync validation across the database, directory and secret store.

mod common;

use common::{admin_of, directory_id, setup};
use orgsync_core::gateway::DirectoryGateway;
use orgsync_core::models::assignment::CreateAssignment;
use orgsync_core::models::capability::UpdateCapabilityType;
use orgsync_core::models::credential::UpdateDatabaseCredential;
use orgsync_core::models::finding::ResourceType;
use orgsync_core::models::organization::UpdateOrganization;
use orgsync_core::models::user::UpdateUser;
use orgsync_core::models::validation::IssueSeverity;
use orgsync_core::repository::{
    AssignmentRepository, CapabilityTypeRepository, DatabaseCredentialRepository,
    OrganizationRepository, Repositories, UserRepository,
};
use uuid::Uuid;

#[tokio::test]
async fn consistent_organization_validates_clean() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    h.credential(org.id, "sales", true).await;
    let caller = admin_of(org.id);
    h.engine
        .reconciler()
        .assign_user_to_capabilities(&caller, alice.id, &[reports.id], org.id)
        .await
        .unwrap();

    let result = h.engine.validator().validate_all_states(&caller, org.id).await.unwrap();

    assert!(result.overall_valid(), "{result:#?}");
    assert_eq!(result.total_issues(), 0);
    assert_eq!(result.user_state.records_checked, 1);
    assert_eq!(result.group_state.records_checked, 2);
    assert_eq!(result.credential_state.records_checked, 1);
}

#[tokio::test]
async fn disabled_directory_account_is_an_error() {
    let h = setup().await;
    let org = h.organization("contoso.com", vec![]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    h.directory.state().upsert_account(&directory_id("alice@contoso.com"), false);

    let result = h
        .engine
        .validator()
        .validate_user_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert!(!result.is_valid);
    assert_eq!(result.issues_found, 1);
    assert_eq!(result.issues[0].resource_id, alice.id.to_string());
    assert_eq!(result.issues[0].severity, IssueSeverity::Error);
    assert_eq!(result.issues[0].description, "active in database but disabled in directory");
}

#[tokio::test]
async fn removed_account_is_reported_once() {
    let h = setup().await;
    let org = h.organization("contoso.com", vec![]).await;
    h.user(org.id, "alice@contoso.com").await;
    h.directory.state().remove_account(&directory_id("alice@contoso.com"));

    let result = h
        .engine
        .validator()
        .validate_user_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert_eq!(result.issues_found, 1);
    assert!(!result.recommendations.is_empty());
}

#[tokio::test]
async fn stale_references_are_warnings() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let finance = h.capability("finance").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let credential = h.credential(org.id, "sales", true).await;
    h.repos
        .users()
        .update(
            org.id,
            alice.id,
            UpdateUser {
                database_credential_ids: Some(vec![credential.id, Uuid::new_v4()]),
                capability_type_ids: Some(vec![reports.id, finance.id]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h
        .engine
        .validator()
        .validate_user_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert_eq!(result.issues_found, 2);
    assert!(result.issues.iter().all(|i| i.severity == IssueSeverity::Warning));
    assert_eq!(result.recommendations.len(), 2);
}

#[tokio::test]
async fn membership_drift_in_both_directions() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let bob = h.user(org.id, "bob@contoso.com").await;
    let caller = admin_of(org.id);
    h.engine
        .reconciler()
        .assign_user_to_capabilities(&caller, alice.id, &[reports.id], org.id)
        .await
        .unwrap();

    let state = h.directory.state();
    // Alice's membership was removed by hand, Bob was added by hand.
    state
        .remove_user_from_group(&directory_id("alice@contoso.com"), "cap-reports")
        .await
        .unwrap();
    state
        .add_user_to_group(&directory_id("bob@contoso.com"), "cap-reports")
        .await
        .unwrap();
    // Members of other tenants are ignored.
    state.upsert_account("dir-stranger", true);
    state.add_user_to_group("dir-stranger", "cap-reports").await.unwrap();

    let result = h.engine.validator().validate_group_state(&caller, org.id).await.unwrap();

    assert_eq!(result.issues_found, 2, "{:#?}", result.issues);
    let missing = result
        .issues
        .iter()
        .find(|i| i.resource_type == ResourceType::Assignment)
        .unwrap();
    assert_eq!(missing.severity, IssueSeverity::Error);
    let extra = result.issues.iter().find(|i| i.resource_type == ResourceType::User).unwrap();
    assert_eq!(extra.resource_id, bob.id.to_string());
    assert_eq!(extra.severity, IssueSeverity::Warning);
    // Most severe first.
    assert_eq!(result.issues[0].severity, IssueSeverity::Error);
}

#[tokio::test]
async fn live_assignment_of_a_disabled_capability_is_an_error() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    h.engine
        .reconciler()
        .assign_user_to_capabilities(&caller, alice.id, &[reports.id], org.id)
        .await
        .unwrap();
    h.repos
        .organizations()
        .update(
            org.id,
            UpdateOrganization {
                capability_type_ids: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.engine
        .cleanup()
        .cleanup_user_capability_assignments(&caller, org.id)
        .await
        .unwrap();

    let result = h.engine.validator().validate_all_states(&caller, org.id).await.unwrap();

    assert!(!result.overall_valid());
    let group = &result.group_state;
    assert_eq!(group.issues_found, 1, "{:#?}", group.issues);
    assert_eq!(group.issues[0].resource_type, ResourceType::Assignment);
    assert_eq!(group.issues[0].severity, IssueSeverity::Error);
    assert_eq!(
        group.issues[0].description,
        "active assignment for a capability type not enabled for the organization"
    );
    // The user's reference is still reported until the access is revoked.
    assert_eq!(result.user_state.issues_found, 1);
    assert_eq!(result.total_issues(), 2);
}

#[tokio::test]
async fn live_assignment_of_an_inactive_capability_is_an_error() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    h.engine
        .reconciler()
        .assign_user_to_capabilities(&caller, alice.id, &[reports.id], org.id)
        .await
        .unwrap();
    h.repos
        .capability_types()
        .update(
            reports.id,
            UpdateCapabilityType {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h.engine.validator().validate_group_state(&caller, org.id).await.unwrap();

    assert!(!result.is_valid);
    assert_eq!(result.issues_found, 1, "{:#?}", result.issues);
    assert_eq!(result.issues[0].description, "active assignment for an inactive capability type");
}

#[tokio::test]
async fn assignment_of_an_unknown_capability_is_reported() {
    let h = setup().await;
    let org = h.organization("contoso.com", vec![]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let state = h.directory.state();
    state.create_group("cap-ghost");
    state
        .add_user_to_group(&directory_id("alice@contoso.com"), "cap-ghost")
        .await
        .unwrap();
    h.repos
        .assignments()
        .create(CreateAssignment {
            organization_id: org.id,
            user_id: alice.id,
            capability_type_id: Uuid::new_v4(),
            directory_group_id: "cap-ghost".into(),
            assigned_by: "import".into(),
        })
        .await
        .unwrap();

    let result = h
        .engine
        .validator()
        .validate_group_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert_eq!(result.issues_found, 1, "{:#?}", result.issues);
    assert_eq!(result.issues[0].description, "active assignment for an unknown capability type");
    assert_eq!(result.unverified, 0);
}

#[tokio::test]
async fn missing_backing_group_is_critical() {
    let h = setup().await;
    let dangling = h.capability_with_group("legacy", Some("cap-deleted")).await;
    let org = h.organization("contoso.com", vec![dangling.id]).await;

    let result = h
        .engine
        .validator()
        .validate_group_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert_eq!(result.issues_found, 1);
    assert_eq!(result.issues[0].severity, IssueSeverity::Critical);
    assert_eq!(result.records_checked, 1);
}

#[tokio::test]
async fn unreachable_group_counts_as_unverified() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let alice = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    h.engine
        .reconciler()
        .assign_user_to_capabilities(&caller, alice.id, &[reports.id], org.id)
        .await
        .unwrap();
    h.directory.make_group_unavailable("cap-reports");

    let result = h.engine.validator().validate_group_state(&caller, org.id).await.unwrap();

    assert!(result.is_valid);
    // Backing group existence check plus the assignment's membership check.
    assert_eq!(result.unverified, 2);
}

#[tokio::test]
async fn credential_state_covers_active_and_inactive() {
    let h = setup().await;
    let org = h.organization("contoso.com", vec![]).await;
    h.credential(org.id, "sales", true).await;
    h.credential(org.id, "ledger", false).await;
    let retired = h.credential(org.id, "archive", true).await;
    h.repos
        .credentials()
        .update(
            org.id,
            retired.id,
            UpdateDatabaseCredential {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h
        .engine
        .validator()
        .validate_credential_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert_eq!(result.records_checked, 3);
    assert_eq!(result.issues_found, 2);
    assert_eq!(result.issues[0].severity, IssueSeverity::Error);
    assert_eq!(result.issues[1].severity, IssueSeverity::Warning);
    assert_eq!(result.issues[1].resource_id, retired.id.to_string());
}

#[tokio::test]
async fn unreachable_secret_store_is_not_an_issue() {
    let h = setup().await;
    let org = h.organization("contoso.com", vec![]).await;
    h.credential(org.id, "sales", true).await;
    h.secrets.go_offline();

    let result = h
        .engine
        .validator()
        .validate_credential_state(&admin_of(org.id), org.id)
        .await
        .unwrap();

    assert!(result.is_valid);
    assert_eq!(result.unverified, 1);
}
