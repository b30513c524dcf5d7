//! Authorization decisions and the grant lifecycle over in-memory stores.

mod common;

use carevault_auth::{
    AccessLevel, AuthError, DenyReason, GrantFilter, GrantRequest, GrantState, PatientOperation,
};
use carevault_core::audit::{AuditAction, AuditOutcome, AuditRange};
use carevault_core::time::Clock;
use carevault_core::{Actor, PageRequest, ResourceType, TenantId};
use common::{Harness, T1, T2, admin, ctx, nurse, provider};
use time::Duration;
use tokio_util::sync::CancellationToken;

async fn setup() -> (Harness, Actor, Actor) {
    let h = Harness::new();
    let dr_a = provider("dr-a", T1, "pr-a");
    let n = nurse("nurse-1", T1);
    h.register_patient("p-1", T1, Some("pr-a")).await;
    h.register_user(&dr_a).await;
    h.register_user(&n).await;
    (h, dr_a, n)
}

fn code(decision: &carevault_auth::AccessDecision) -> &str {
    decision.deny_reason().map(|r| r.code.as_str()).unwrap_or("allow")
}

#[tokio::test]
async fn test_provider_of_record_reads_and_writes() {
    let (h, dr_a, _) = setup().await;
    let c = ctx(&dr_a);

    for op in [PatientOperation::Read, PatientOperation::Write] {
        let decision = h.engine.can_access_patient(&c, "p-1", op).await.unwrap();
        assert!(decision.is_allowed(), "{op} should be allowed");
    }
    let decision = h
        .engine
        .can_access_patient(&c, "p-1", PatientOperation::Delete)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::INSUFFICIENT_LEVEL);

    let other = provider("dr-b", T1, "pr-b");
    let decision = h
        .engine
        .can_access_patient(&ctx(&other), "p-1", PatientOperation::Read)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::NO_ACTIVE_GRANT);
}

#[tokio::test]
async fn test_read_only_grant_lifecycle() {
    let (h, dr_a, n) = setup().await;
    let grant_ctx = ctx(&dr_a);

    assert!(
        h.engine
            .can_grant_access(&grant_ctx, "p-1", "nurse-1", AccessLevel::ReadOnly)
            .await
            .unwrap()
            .is_allowed()
    );
    let expires = h.clock.now() + Duration::hours(8);
    let grant = h
        .registry
        .grant(
            &grant_ctx,
            &TenantId::new(T1),
            GrantRequest::new("p-1", "nurse-1", AccessLevel::ReadOnly)
                .expires_at(expires)
                .purpose("ward round"),
        )
        .await
        .unwrap();

    let c = ctx(&n);
    let read = h.engine.can_access_patient(&c, "p-1", PatientOperation::Read).await.unwrap();
    assert!(read.is_allowed());
    let write = h.engine.can_access_patient(&c, "p-1", PatientOperation::Write).await.unwrap();
    assert_eq!(code(&write), DenyReason::INSUFFICIENT_LEVEL);

    // Expiry is computed, never stored.
    h.clock.advance(Duration::hours(9));
    let read = h.engine.can_access_patient(&c, "p-1", PatientOperation::Read).await.unwrap();
    assert_eq!(code(&read), DenyReason::NO_ACTIVE_GRANT);
    let stored = h.registry.get(&grant.id).await.unwrap().unwrap();
    assert_eq!(stored.state(h.clock.now()), GrantState::Expired);
    assert!(stored.revoked_at.is_none());
}

#[tokio::test]
async fn test_revocation_takes_effect_immediately() {
    let (h, dr_a, n) = setup().await;
    let grant = h
        .registry
        .grant(
            &ctx(&dr_a),
            &TenantId::new(T1),
            GrantRequest::new("p-1", "nurse-1", AccessLevel::ReadWrite).purpose("care team"),
        )
        .await
        .unwrap();
    let c = ctx(&n);
    assert!(
        h.engine
            .can_access_patient(&c, "p-1", PatientOperation::Write)
            .await
            .unwrap()
            .is_allowed()
    );

    // Only the granter or an administrator may revoke.
    let other = provider("dr-b", T1, "pr-b");
    let decision = h.engine.can_revoke_access(&ctx(&other), &grant.id).await.unwrap();
    assert_eq!(code(&decision), DenyReason::NOT_GRANTER);

    let decision = h.engine.can_revoke_access(&ctx(&dr_a), &grant.id).await.unwrap();
    assert!(decision.is_allowed());
    assert!(h.registry.revoke(&ctx(&dr_a), &grant.id, Some("transferred".into())).await.unwrap());
    assert!(!h.registry.revoke(&ctx(&admin(T1)), &grant.id, None).await.unwrap());

    let read = h.engine.can_access_patient(&c, "p-1", PatientOperation::Read).await.unwrap();
    assert_eq!(code(&read), DenyReason::NO_ACTIVE_GRANT);

    let stored = h.registry.get(&grant.id).await.unwrap().unwrap();
    assert_eq!(stored.revoked_by.as_deref(), Some("dr-a"));
    assert_eq!(stored.revocation_reason.as_deref(), Some("transferred"));

    let missing = h.engine.can_revoke_access(&ctx(&dr_a), "g-missing").await.unwrap();
    assert_eq!(code(&missing), DenyReason::GRANT_NOT_FOUND);
    assert!(matches!(
        missing.into_result(),
        Err(AuthError::NotFound { entity: "AccessGrant", .. })
    ));
}

#[tokio::test]
async fn test_grant_from_other_tenant_never_crosses() {
    let (h, dr_a, _) = setup().await;
    // Grantee is unknown to the directory when the grant is issued.
    let grant = h
        .registry
        .grant(
            &ctx(&dr_a),
            &TenantId::new(T1),
            GrantRequest::new("p-1", "dr-x", AccessLevel::FullAccess).purpose("consult"),
        )
        .await
        .unwrap();
    assert_eq!(grant.tenant_id, TenantId::new(T1));

    let outsider = provider("dr-x", T2, "pr-x");
    let decision = h
        .engine
        .can_access_patient(&ctx(&outsider), "p-1", PatientOperation::Read)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::TENANT_MISMATCH);
    assert!(matches!(decision.into_result(), Err(AuthError::TenantMismatch { .. })));

    // The denial is recorded under the patient's tenant.
    let events = h
        .audit
        .query(&TenantId::new(T1), AuditRange::all(), &CancellationToken::new())
        .await
        .unwrap();
    let denial = events
        .iter()
        .rev()
        .find(|e| e.action == AuditAction::AuthorizePatientAccess)
        .unwrap();
    assert_eq!(denial.outcome, AuditOutcome::Denied);
    assert_eq!(denial.reason.as_deref(), Some(DenyReason::TENANT_MISMATCH));
    assert_eq!(denial.actor_id, "dr-x");
}

#[tokio::test]
async fn test_grant_cannot_escalate() {
    let (h, dr_a, n) = setup().await;
    let c = ctx(&dr_a);

    let full = h
        .engine
        .can_grant_access(&c, "p-1", "nurse-1", AccessLevel::FullAccess)
        .await
        .unwrap();
    assert_eq!(code(&full), DenyReason::PRIVILEGE_ESCALATION);

    for level in [AccessLevel::ReadWrite, AccessLevel::EmergencyAccess, AccessLevel::ResearchAccess] {
        let decision = h.engine.can_grant_access(&c, "p-1", "nurse-1", level).await.unwrap();
        assert!(decision.is_allowed(), "{level} should be grantable");
    }

    // Nurses never grant.
    let decision = h
        .engine
        .can_grant_access(&ctx(&n), "p-1", "dr-a", AccessLevel::ReadOnly)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::ROLE_NOT_PERMITTED);

    // A provider holding only ReadOnly lacks Write.
    let dr_b = provider("dr-b", T1, "pr-b");
    h.registry
        .grant(&c, &TenantId::new(T1), GrantRequest::new("p-1", "dr-b", AccessLevel::ReadOnly).purpose("review"))
        .await
        .unwrap();
    let decision = h
        .engine
        .can_grant_access(&ctx(&dr_b), "p-1", "nurse-1", AccessLevel::ReadOnly)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::INSUFFICIENT_LEVEL);

    // A FullAccess grant lets a provider hand out FullAccess.
    h.registry
        .grant(
            &ctx(&admin(T1)),
            &TenantId::new(T1),
            GrantRequest::new("p-1", "dr-b", AccessLevel::FullAccess).purpose("handover"),
        )
        .await
        .unwrap();
    let decision = h
        .engine
        .can_grant_access(&ctx(&dr_b), "p-1", "nurse-1", AccessLevel::FullAccess)
        .await
        .unwrap();
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn test_grantee_in_other_tenant_is_rejected() {
    let (h, dr_a, _) = setup().await;
    let outsider = nurse("nurse-x", T2);
    h.register_user(&outsider).await;

    let decision = h
        .engine
        .can_grant_access(&ctx(&dr_a), "p-1", "nurse-x", AccessLevel::ReadOnly)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::TENANT_MISMATCH);
}

#[tokio::test]
async fn test_administrator_and_unknown_patients() {
    let (h, dr_a, _) = setup().await;
    let decision = h
        .engine
        .can_access_patient(&ctx(&admin(T2)), "p-1", PatientOperation::Delete)
        .await
        .unwrap();
    assert!(decision.is_allowed());

    let decision = h
        .engine
        .can_access_patient(&ctx(&admin(T1)), "p-unknown", PatientOperation::Read)
        .await
        .unwrap();
    assert!(decision.is_allowed());

    let decision = h
        .engine
        .can_access_patient(&ctx(&dr_a), "p-unknown", PatientOperation::Read)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::PATIENT_NOT_FOUND);
    assert!(matches!(
        decision.into_result(),
        Err(AuthError::NotFound { entity: "Patient", .. })
    ));
}

#[tokio::test]
async fn test_register_and_shared_access() {
    let (h, dr_a, n) = setup().await;
    let t1 = TenantId::new(T1);

    assert!(h.engine.can_register_patient(&ctx(&dr_a), &t1).await.unwrap().is_allowed());
    assert_eq!(
        code(&h.engine.can_register_patient(&ctx(&n), &t1).await.unwrap()),
        DenyReason::ROLE_NOT_PERMITTED
    );
    assert_eq!(
        code(&h.engine.can_register_patient(&ctx(&dr_a), &TenantId::new(T2)).await.unwrap()),
        DenyReason::TENANT_MISMATCH
    );

    let shared = |actor: &Actor, op| {
        let engine = h.engine.clone();
        let c = ctx(actor);
        let t1 = t1.clone();
        async move {
            engine
                .can_access_shared(&c, &t1, ResourceType::Medication, op)
                .await
                .unwrap()
                .is_allowed()
        }
    };
    assert!(shared(&dr_a, PatientOperation::Write).await);
    assert!(!shared(&dr_a, PatientOperation::Delete).await);
    assert!(shared(&n, PatientOperation::Read).await);
    assert!(!shared(&n, PatientOperation::Write).await);
    assert!(shared(&admin(T2), PatientOperation::Delete).await);
}

#[tokio::test]
async fn test_each_decision_is_audited_once() {
    let (h, dr_a, n) = setup().await;
    let before = h.audit_store.len();

    h.engine
        .can_access_patient(&ctx(&dr_a), "p-1", PatientOperation::Read)
        .await
        .unwrap();
    h.engine
        .can_access_patient(&ctx(&n), "p-1", PatientOperation::Read)
        .await
        .unwrap();
    h.engine
        .can_grant_access(&ctx(&dr_a), "p-1", "nurse-1", AccessLevel::FullAccess)
        .await
        .unwrap();
    assert_eq!(h.audit_store.len(), before + 3);

    let decisions = h.events(AuditAction::AuthorizePatientAccess);
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].outcome, AuditOutcome::Allowed);
    assert_eq!(decisions[0].details.as_ref().unwrap()["basis"], "provider-of-record");
    assert_eq!(decisions[1].outcome, AuditOutcome::Denied);
    assert_eq!(decisions[1].reason.as_deref(), Some(DenyReason::NO_ACTIVE_GRANT));

    let grant_decisions = h.events(AuditAction::AuthorizeGrant);
    assert_eq!(grant_decisions[0].reason.as_deref(), Some(DenyReason::PRIVILEGE_ESCALATION));
}

#[tokio::test]
async fn test_list_grants_filters_and_pages() {
    let (h, dr_a, _) = setup().await;
    h.register_patient("p-2", T1, Some("pr-a")).await;
    let c = ctx(&dr_a);
    let t1 = TenantId::new(T1);
    for (patient, user) in [("p-1", "u-1"), ("p-1", "u-2"), ("p-2", "u-1")] {
        h.registry
            .grant(&c, &t1, GrantRequest::new(patient, user, AccessLevel::ReadOnly).purpose("audit"))
            .await
            .unwrap();
    }
    let revoked = h
        .registry
        .grant(&c, &t1, GrantRequest::new("p-1", "u-3", AccessLevel::ReadOnly).purpose("audit"))
        .await
        .unwrap();
    h.registry.revoke(&c, &revoked.id, None).await.unwrap();

    let cancel = CancellationToken::new();
    let all = h
        .registry
        .list_grants(&GrantFilter::for_patient("p-1"), PageRequest::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(all.total, 3);

    let active = h
        .registry
        .list_grants(&GrantFilter::for_patient("p-1").active_only(), PageRequest::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(active.total, 2);

    let by_user = h
        .registry
        .list_grants(&GrantFilter::for_user("u-1"), PageRequest::new(0, 1), &cancel)
        .await
        .unwrap();
    assert_eq!(by_user.total, 2);
    assert_eq!(by_user.len(), 1);
    assert!(by_user.has_more);
}

#[tokio::test]
async fn test_emergency_grant_requires_justification() {
    let (h, dr_a, _) = setup().await;
    let c = ctx(&dr_a);
    let t1 = TenantId::new(T1);

    let err = h
        .registry
        .grant(&c, &t1, GrantRequest::new("p-1", "nurse-1", AccessLevel::EmergencyAccess))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest { .. }));

    let grant = h
        .registry
        .grant(
            &c,
            &t1,
            GrantRequest::new("p-1", "nurse-1", AccessLevel::EmergencyAccess)
                .justification("unconscious on arrival"),
        )
        .await
        .unwrap();
    let events = h.events(AuditAction::GrantCreate);
    let last = events.last().unwrap();
    assert_eq!(last.entity.grant_id.as_deref(), Some(grant.id.as_str()));
    assert_eq!(last.reason.as_deref(), Some("emergency-access"));
}

#[tokio::test]
async fn test_only_provider_of_record_reassigns() {
    let (h, dr_a, _) = setup().await;
    let dr_b = provider("dr-b", T1, "pr-b");
    h.register_user(&dr_b).await;
    h.registry
        .grant(
            &ctx(&dr_a),
            &TenantId::new(T1),
            GrantRequest::new("p-1", "dr-b", AccessLevel::FullAccess).purpose("cover"),
        )
        .await
        .unwrap();

    // Full access to the record does not extend to reassigning it.
    let decision = h.engine.can_assign_provider(&ctx(&dr_b), "p-1", Some("pr-b")).await.unwrap();
    assert_eq!(code(&decision), DenyReason::PRIVILEGE_ESCALATION);
    assert!(matches!(
        decision.into_result(),
        Err(AuthError::Forbidden { code, .. }) if code == DenyReason::PRIVILEGE_ESCALATION
    ));

    let decision = h.engine.can_assign_provider(&ctx(&dr_a), "p-1", Some("pr-b")).await.unwrap();
    assert!(decision.is_allowed());
    let decision = h.engine.can_assign_provider(&ctx(&admin(T2)), "p-1", None).await.unwrap();
    assert!(decision.is_allowed());

    let outsider = provider("dr-x", T2, "pr-a");
    let decision = h.engine.can_assign_provider(&ctx(&outsider), "p-1", Some("pr-a")).await.unwrap();
    assert_eq!(code(&decision), DenyReason::TENANT_MISMATCH);

    let events = h.events(AuditAction::AuthorizeProviderChange);
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].outcome, AuditOutcome::Denied);
    assert_eq!(events[0].entity.patient_id.as_deref(), Some("p-1"));
    assert_eq!(events[1].outcome, AuditOutcome::Allowed);
}

#[tokio::test]
async fn test_patient_id_reused_by_another_tenant() {
    let (h, dr_a, _) = setup().await;
    h.register_patient("p-1", T2, Some("pr-b")).await;
    let dr_b = provider("dr-b", T2, "pr-b");

    // Each provider sees the record of their own tenant.
    for actor in [&dr_a, &dr_b] {
        let decision = h
            .engine
            .can_access_patient(&ctx(actor), "p-1", PatientOperation::Write)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "{} should reach its own patient", actor.user_id);
    }

    let dr_c = provider("dr-c", "tenant-3", "pr-a");
    let decision = h
        .engine
        .can_access_patient(&ctx(&dr_c), "p-1", PatientOperation::Read)
        .await
        .unwrap();
    assert_eq!(code(&decision), DenyReason::TENANT_MISMATCH);
}

#[tokio::test]
async fn test_audit_trail_access_is_a_decision() {
    let (h, dr_a, _) = setup().await;
    let t1 = TenantId::new(T1);

    let decision = h.engine.can_read_audit(&ctx(&dr_a), &t1).await.unwrap();
    assert_eq!(code(&decision), DenyReason::ROLE_NOT_PERMITTED);
    assert!(h.engine.can_read_audit(&ctx(&admin(T1)), &t1).await.unwrap().is_allowed());

    let events = h.events(AuditAction::AuthorizeAuditTrail);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].actor_id, "dr-a");
    assert_eq!(events[0].outcome, AuditOutcome::Denied);
    assert_eq!(events[0].reason.as_deref(), Some(DenyReason::ROLE_NOT_PERMITTED));
    assert_eq!(events[1].outcome, AuditOutcome::Allowed);
}
