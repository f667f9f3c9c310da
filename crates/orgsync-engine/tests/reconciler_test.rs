//! Assignment reconciler against an in-memory database and fake directory.

mod common;

use std::collections::BTreeSet;

use common::{admin_of, directory_id, member_of, setup};
use orgsync_core::gateway::DirectoryGateway;
use orgsync_core::models::assignment::{Assignment, AssignmentState};
use orgsync_core::repository::{AssignmentRepository, Repositories};
use orgsync_engine::CapabilityStatus;
use uuid::Uuid;

fn active_set(rows: &[Assignment]) -> BTreeSet<Uuid> {
    rows.iter()
        .filter(|a| a.state == AssignmentState::Active)
        .map(|a| a.capability_type_id)
        .collect()
}

#[tokio::test]
async fn assign_adds_membership_then_row() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;

    let outcome = h
        .engine
        .reconciler()
        .assign_user_to_capabilities(&admin_of(org.id), user.id, &[reports.id], org.id)
        .await
        .unwrap();

    assert_eq!(outcome.summary(), "1/1 succeeded");
    assert_eq!(outcome.results[0].status, CapabilityStatus::Assigned);
    assert!(h.directory.state().members("cap-reports").contains(&directory_id("alice@contoso.com")));

    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(active_set(&rows), BTreeSet::from([reports.id]));
    assert_eq!(h.reload_user(&user).await.capability_type_ids, vec![reports.id]);
}

#[tokio::test]
async fn assigning_again_reports_already_assigned() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    let adds = h.directory.add_calls();
    let again = reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id, reports.id], org.id)
        .await
        .unwrap();

    assert_eq!(again.results.len(), 1);
    assert_eq!(again.results[0].status, CapabilityStatus::AlreadyAssigned);
    assert_eq!(h.directory.add_calls(), adds);
}

#[tokio::test]
async fn directory_failure_creates_no_row() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let billing = h.capability("billing").await;
    let org = h.organization("contoso.com", vec![reports.id, billing.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    h.directory.fail_add("cap-billing");

    let outcome = h
        .engine
        .reconciler()
        .assign_user_to_capabilities(&admin_of(org.id), user.id, &[reports.id, billing.id], org.id)
        .await
        .unwrap();

    assert_eq!(outcome.summary(), "1/2 succeeded");
    assert!(outcome.is_success());
    assert!(!outcome.all_succeeded());
    let failure = outcome.failures().next().unwrap();
    assert_eq!(failure.capability_type_id, billing.id);

    let row = h.repos.assignments().find(org.id, user.id, billing.id).await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn refused_add_leaves_inactive_row_inactive() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();
    let before = h.repos.assignments().find(org.id, user.id, reports.id).await.unwrap().unwrap();
    assert_eq!(before.state, AssignmentState::Inactive);

    h.directory.refuse_add("cap-reports");
    let outcome = reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    let after = h.repos.assignments().find(org.id, user.id, reports.id).await.unwrap().unwrap();
    assert_eq!(after.state, AssignmentState::Inactive);
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn inactive_row_reactivated_without_add_when_member() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();

    // Someone re-added the membership directly in the directory.
    h.directory
        .state()
        .add_user_to_group(&directory_id("alice@contoso.com"), "cap-reports")
        .await
        .unwrap();
    let adds = h.directory.add_calls();

    let outcome = reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].status, CapabilityStatus::Reactivated);
    assert_eq!(h.directory.add_calls(), adds);
    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, AssignmentState::Active);
}

#[tokio::test]
async fn inactive_row_reactivated_with_add_when_not_member() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();
    let adds = h.directory.add_calls();

    let outcome = reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].status, CapabilityStatus::Reactivated);
    assert_eq!(h.directory.add_calls(), adds + 1);
    assert!(h.directory.state().members("cap-reports").contains(&directory_id("alice@contoso.com")));
}

#[tokio::test]
async fn capability_configuration_problems_fail_per_item() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let not_enabled = h.capability("finance").await;
    let groupless = h.capability_with_group("legacy", None).await;
    let org = h.organization("contoso.com", vec![reports.id, groupless.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;

    let outcome = h
        .engine
        .reconciler()
        .assign_user_to_capabilities(
            &admin_of(org.id),
            user.id,
            &[reports.id, not_enabled.id, groupless.id, Uuid::new_v4()],
            org.id,
        )
        .await
        .unwrap();

    assert_eq!(outcome.summary(), "1/4 succeeded");
    for failure in outcome.failures() {
        assert!(matches!(failure.status, CapabilityStatus::Failed { .. }));
    }
    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(active_set(&rows), BTreeSet::from([reports.id]));
}

#[tokio::test]
async fn assign_then_remove_restores_memberships() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let billing = h.capability("billing").await;
    let org = h.organization("contoso.com", vec![reports.id, billing.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();
    let before = (h.directory.state().members("cap-reports"), h.directory.state().members("cap-billing"));

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id, billing.id], org.id)
        .await
        .unwrap();
    let removed = reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();

    assert_eq!(removed.summary(), "2/2 succeeded");
    assert!(removed.results.iter().all(|r| r.status == CapabilityStatus::Removed));
    let after = (h.directory.state().members("cap-reports"), h.directory.state().members("cap-billing"));
    assert_eq!(before, after);

    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(active_set(&rows).is_empty());
    assert!(h.reload_user(&user).await.capability_type_ids.is_empty());
}

#[tokio::test]
async fn failed_removal_leaves_row_active() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    h.directory.fail_remove("cap-reports");

    let outcome = reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();

    assert_eq!(outcome.summary(), "0/1 succeeded");
    let row = h.repos.assignments().find(org.id, user.id, reports.id).await.unwrap().unwrap();
    assert_eq!(row.state, AssignmentState::Active);
}

#[tokio::test]
async fn failed_removal_confirmed_absent_deactivates_row() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[reports.id], org.id)
        .await
        .unwrap();
    // Membership vanished out of band, then the remove call errors.
    h.directory
        .state()
        .remove_user_from_group(&directory_id("alice@contoso.com"), "cap-reports")
        .await
        .unwrap();
    h.directory.fail_remove("cap-reports");

    let outcome = reconciler
        .remove_user_from_capabilities(&caller, user.id, org.id)
        .await
        .unwrap();

    assert_eq!(outcome.results[0].status, CapabilityStatus::Removed);
    let row = h.repos.assignments().find(org.id, user.id, reports.id).await.unwrap().unwrap();
    assert_eq!(row.state, AssignmentState::Inactive);
}

#[tokio::test]
async fn update_assignments_is_idempotent() {
    let h = setup().await;
    let caps = [
        h.capability("a").await,
        h.capability("b").await,
        h.capability("c").await,
        h.capability("d").await,
    ];
    let ids: Vec<Uuid> = caps.iter().map(|c| c.id).collect();
    let org = h.organization("contoso.com", ids.clone()).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    let targets: [&[Uuid]; 4] = [&ids[..2], &ids[1..4], &[], &[ids[3], ids[0]]];
    for target in targets {
        let first = reconciler
            .update_assignments(&caller, user.id, target, org.id)
            .await
            .unwrap();
        assert!(first.all_succeeded());

        let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
        let expected: BTreeSet<Uuid> = target.iter().copied().collect();
        assert_eq!(active_set(&rows), expected);

        let adds = h.directory.add_calls();
        let second = reconciler
            .update_assignments(&caller, user.id, target, org.id)
            .await
            .unwrap();
        assert!(second.results.is_empty(), "second call must be a no-op");
        assert_eq!(h.directory.add_calls(), adds);

        let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
        assert_eq!(active_set(&rows), expected);
        let synced: BTreeSet<Uuid> = h.reload_user(&user).await.capability_type_ids.into_iter().collect();
        assert_eq!(synced, expected);
    }
}

#[tokio::test]
async fn update_assignments_excludes_failed_additions() {
    let h = setup().await;
    let a = h.capability("a").await;
    let b = h.capability("b").await;
    let org = h.organization("contoso.com", vec![a.id, b.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    h.directory.fail_add("cap-b");

    let outcome = h
        .engine
        .reconciler()
        .update_assignments(&admin_of(org.id), user.id, &[a.id, b.id], org.id)
        .await
        .unwrap();

    assert_eq!(outcome.summary(), "1/2 succeeded");
    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(active_set(&rows), BTreeSet::from([a.id]));
}

#[tokio::test]
async fn switching_between_capabilities_on_a_shared_group_keeps_membership() {
    let h = setup().await;
    let a = h.capability("a").await;
    let b = h.capability_with_group("b", Some("cap-a")).await;
    let org = h.organization("contoso.com", vec![a.id, b.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .update_assignments(&caller, user.id, &[a.id], org.id)
        .await
        .unwrap();
    let outcome = reconciler
        .update_assignments(&caller, user.id, &[b.id], org.id)
        .await
        .unwrap();

    assert!(outcome.all_succeeded());
    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(active_set(&rows), BTreeSet::from([b.id]));
    assert!(h.directory.state().members("cap-a").contains(&directory_id("alice@contoso.com")));
}

#[tokio::test]
async fn dropping_one_of_two_capabilities_on_a_shared_group_keeps_membership() {
    let h = setup().await;
    let a = h.capability("a").await;
    let b = h.capability_with_group("b", Some("cap-a")).await;
    let org = h.organization("contoso.com", vec![a.id, b.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .update_assignments(&caller, user.id, &[a.id, b.id], org.id)
        .await
        .unwrap();
    h.directory.fail_remove("cap-a");
    let outcome = reconciler
        .update_assignments(&caller, user.id, &[b.id], org.id)
        .await
        .unwrap();

    // The row is deactivated without a directory call, so the injected
    // removal failure is never hit.
    assert_eq!(outcome.summary(), "1/1 succeeded");
    assert_eq!(outcome.results[0].status, CapabilityStatus::Removed);
    let rows = h.repos.assignments().list_for_user(org.id, user.id).await.unwrap();
    assert_eq!(active_set(&rows), BTreeSet::from([b.id]));
    assert!(h.directory.state().members("cap-a").contains(&directory_id("alice@contoso.com")));
}

#[tokio::test]
async fn deactivate_and_reactivate_user() {
    let h = setup().await;
    let a = h.capability("a").await;
    let b = h.capability("b").await;
    let org = h.organization("contoso.com", vec![a.id, b.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[a.id, b.id], org.id)
        .await
        .unwrap();

    let down = reconciler.deactivate_user(&caller, user.id, org.id).await.unwrap();
    assert!(down.state_changed);
    let reloaded = h.reload_user(&user).await;
    assert!(!reloaded.is_active);
    assert_eq!(reloaded.capability_type_ids.len(), 2);
    assert!(h.directory.state().members("cap-a").is_empty());

    let up = reconciler.reactivate_user(&caller, user.id, org.id).await.unwrap();
    assert!(up.state_changed);
    assert_eq!(up.assignments.summary(), "2/2 succeeded");
    assert!(h.reload_user(&user).await.is_active);
    assert!(h.directory.state().members("cap-b").contains(&directory_id("alice@contoso.com")));
}

#[tokio::test]
async fn partial_deactivation_keeps_user_active() {
    let h = setup().await;
    let a = h.capability("a").await;
    let b = h.capability("b").await;
    let org = h.organization("contoso.com", vec![a.id, b.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;
    let caller = admin_of(org.id);
    let reconciler = h.engine.reconciler();

    reconciler
        .assign_user_to_capabilities(&caller, user.id, &[a.id, b.id], org.id)
        .await
        .unwrap();
    h.directory.fail_remove("cap-b");

    let outcome = reconciler.deactivate_user(&caller, user.id, org.id).await.unwrap();
    assert!(!outcome.state_changed);
    assert_eq!(outcome.assignments.summary(), "1/2 succeeded");
    assert!(h.reload_user(&user).await.is_active);
}

#[tokio::test]
async fn foreign_caller_is_denied_before_any_directory_call() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let other = h.organization("fabrikam.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;

    let err = h
        .engine
        .reconciler()
        .assign_user_to_capabilities(&member_of(other.id), user.id, &[reports.id], org.id)
        .await
        .unwrap_err();

    assert!(err.is_access_denied());
    assert_eq!(h.directory.add_calls(), 0);
}

#[tokio::test]
async fn user_lookup_is_scoped_to_the_organization() {
    let h = setup().await;
    let reports = h.capability("reports").await;
    let org = h.organization("contoso.com", vec![reports.id]).await;
    let other = h.organization("fabrikam.com", vec![reports.id]).await;
    let user = h.user(org.id, "alice@contoso.com").await;

    // Caller is legitimately in `other` but names a user from `org`.
    let err = h
        .engine
        .reconciler()
        .assign_user_to_capabilities(&admin_of(other.id), user.id, &[reports.id], other.id)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(h.directory.add_calls(), 0);
}
