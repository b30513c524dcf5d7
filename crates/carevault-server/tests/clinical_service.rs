//! ClinicalService behaviour below the HTTP layer.

use axum::http::StatusCode;
use carevault_auth::{AccessLevel, AuthError, DenyReason, GrantRequest};
use carevault_core::audit::{AuditAction, AuditOutcome, AuditRange};
use carevault_core::{Actor, RequestContext, ResourceType, Role, TenantId};
use carevault_server::{AppConfig, ApiError, AuditMode, ClinicalService, PageQuery, build_state};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn service(cfg: &AppConfig) -> ClinicalService {
    let (state, _writer) = build_state(cfg).expect("state");
    state.service
}

fn provider() -> RequestContext {
    RequestContext::new(Actor::new("dr-a", Role::HealthcareProvider, "tenant-1").with_practitioner("pr-a"))
        .with_correlation_id("corr-1")
}

fn practitioner(user: &str, tenant: &str, practitioner: &str) -> RequestContext {
    RequestContext::new(Actor::new(user, Role::HealthcareProvider, tenant).with_practitioner(practitioner))
}

fn admin() -> RequestContext {
    RequestContext::new(Actor::new("root", Role::SystemAdministrator, "tenant-1"))
}

fn observation(patient: &str, status: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "status": status,
        "code": {"text": "Glucose"},
        "subject": {"reference": format!("Patient/{patient}")},
    })
}

async fn patient(svc: &ClinicalService, ctx: &RequestContext) -> String {
    let cancel = CancellationToken::new();
    svc.create(ctx, ResourceType::Patient, json!({"resourceType": "Patient"}), &cancel)
        .await
        .unwrap()
        .logical_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unconditional_updates_retry_until_applied() {
    let svc = service(&AppConfig::default());
    let ctx = provider();
    let cancel = CancellationToken::new();
    let pid = patient(&svc, &ctx).await;
    let obs = svc
        .create(&ctx, ResourceType::Observation, observation(&pid, "preliminary"), &cancel)
        .await
        .unwrap();

    // Four writers with three retries each: every loss means another writer
    // committed, so nobody can lose more than three times.
    let mut tasks = Vec::new();
    for status in ["final", "amended", "corrected", "cancelled"] {
        let svc = svc.clone();
        let ctx = ctx.clone();
        let id = obs.logical_id.clone();
        let payload = observation(&pid, status);
        tasks.push(tokio::spawn(async move {
            svc.update_with_retry(&ctx, ResourceType::Observation, &id, payload, &CancellationToken::new())
                .await
        }));
    }
    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap().unwrap().version);
    }
    versions.sort_unstable();
    assert_eq!(versions, [2, 3, 4, 5]);
}

#[tokio::test]
async fn test_conditional_update_does_not_retry() {
    let svc = service(&AppConfig::default());
    let ctx = provider();
    let cancel = CancellationToken::new();
    let pid = patient(&svc, &ctx).await;
    let obs = svc
        .create(&ctx, ResourceType::Observation, observation(&pid, "preliminary"), &cancel)
        .await
        .unwrap();
    svc.update(&ctx, ResourceType::Observation, &obs.logical_id, Some(1), observation(&pid, "final"), &cancel)
        .await
        .unwrap();

    let err = svc
        .update(&ctx, ResourceType::Observation, &obs.logical_id, Some(1), observation(&pid, "amended"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Storage(ref e) if e.is_version_conflict()));
    assert!(err.kind().is_retryable());
}

#[tokio::test]
async fn test_compartment_resources_need_a_patient() {
    let svc = service(&AppConfig::default());
    let ctx = provider();
    let err = svc
        .create(
            &ctx,
            ResourceType::Condition,
            json!({"resourceType": "Condition", "code": {"text": "Asthma"}}),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancelled_operations_have_no_effect() {
    let svc = service(&AppConfig::default());
    let ctx = provider();
    let pid = patient(&svc, &ctx).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = svc
        .create(&ctx, ResourceType::Observation, observation(&pid, "final"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
    let err = svc
        .history(&ctx, ResourceType::Patient, &pid, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));

    let page = svc
        .search(
            &ctx,
            ResourceType::Observation,
            vec![("patient".into(), pid.clone())],
            PageQuery::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_search_paging_is_clamped() {
    let mut cfg = AppConfig::default();
    cfg.paging.max_count = 2;
    cfg.paging.default_count = 2;
    let svc = service(&cfg);
    let ctx = provider();
    let cancel = CancellationToken::new();
    let pid = patient(&svc, &ctx).await;
    for _ in 0..3 {
        svc.create(&ctx, ResourceType::Observation, observation(&pid, "final"), &cancel)
            .await
            .unwrap();
    }

    let page = svc
        .search(
            &ctx,
            ResourceType::Observation,
            vec![("patient".into(), pid.clone())],
            PageQuery {
                offset: None,
                count: Some(50),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);

    // Administrators may search without a patient scope.
    let page = svc
        .search(&admin(), ResourceType::Observation, Vec::new(), PageQuery::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_background_audit_mode_records_decisions() {
    let mut cfg = AppConfig::default();
    cfg.audit.mode = AuditMode::Background;
    cfg.audit.channel_capacity = 1;
    let svc = service(&cfg);
    let ctx = provider();
    let pid = patient(&svc, &ctx).await;

    // Give the writer a moment to drain the queue.
    let cancel = CancellationToken::new();
    let mut events = Vec::new();
    for _ in 0..50 {
        events = svc
            .audit_trail(&admin(), None, AuditRange::all(), &cancel)
            .await
            .unwrap();
        if events.iter().any(|e| e.action == AuditAction::ResourceCreate) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let create = events
        .iter()
        .find(|e| e.action == AuditAction::ResourceCreate)
        .expect("create audited");
    assert_eq!(create.entity.resource_id.as_deref(), Some(pid.as_str()));
    assert!(events.iter().any(|e| e.action == AuditAction::AuthorizeRegisterPatient));

    let err = svc
        .audit_trail(&ctx, None, AuditRange::all(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

fn patient_with_gp(id: &str, practitioner: Option<&str>) -> Value {
    let mut payload = json!({"resourceType": "Patient", "id": id, "gender": "female"});
    if let Some(practitioner) = practitioner {
        payload["generalPractitioner"] = json!([{"reference": format!("Practitioner/{practitioner}")}]);
    }
    payload
}

fn denial_code(err: &ApiError) -> &str {
    match err {
        ApiError::Auth(AuthError::Forbidden { code, .. }) => code,
        other => panic!("expected a denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_same_patient_id_in_two_tenants_stays_isolated() {
    let mut cfg = AppConfig::default();
    cfg.resources.client_assigned_id_types = vec!["Patient".into()];
    let svc = service(&cfg);
    let cancel = CancellationToken::new();
    let dr_a = practitioner("dr-a", "tenant-a", "pr-a");
    let dr_b = practitioner("dr-b", "tenant-b", "pr-b");
    let nurse = RequestContext::new(Actor::new("nurse-a", Role::Nurse, "tenant-a"));

    svc.create(&dr_a, ResourceType::Patient, patient_with_gp("p-1", None), &cancel)
        .await
        .unwrap();
    svc.grant_access(
        &dr_a,
        GrantRequest::new("p-1", "nurse-a", AccessLevel::ReadOnly).purpose("ward round"),
        &cancel,
    )
    .await
    .unwrap();
    svc.create(&dr_b, ResourceType::Patient, patient_with_gp("p-1", None), &cancel)
        .await
        .unwrap();

    // Each tenant keeps its own record, provider-of-record and grants.
    let read_a = svc.read(&dr_a, ResourceType::Patient, "p-1", &cancel).await.unwrap();
    assert_eq!(read_a.tenant_id, TenantId::new("tenant-a"));
    let read_b = svc.read(&dr_b, ResourceType::Patient, "p-1", &cancel).await.unwrap();
    assert_eq!(read_b.tenant_id, TenantId::new("tenant-b"));
    svc.read(&nurse, ResourceType::Patient, "p-1", &cancel).await.unwrap();
    svc.create(&dr_a, ResourceType::Observation, observation("p-1", "final"), &cancel)
        .await
        .unwrap();

    // A provider of another tenant is still told apart from a missing patient.
    let dr_c = practitioner("dr-c", "tenant-c", "pr-c");
    let err = svc
        .create(&dr_c, ResourceType::Observation, observation("p-1", "final"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Auth(AuthError::TenantMismatch { .. })));
}

#[tokio::test]
async fn test_grantee_cannot_take_over_provider_of_record() {
    let svc = service(&AppConfig::default());
    let cancel = CancellationToken::new();
    let dr_a = provider();
    let dr_b = practitioner("dr-b", "tenant-1", "pr-b");
    let pid = patient(&svc, &dr_a).await;

    let grant = svc
        .grant_access(
            &dr_a,
            GrantRequest::new(&pid, "dr-b", AccessLevel::ReadWrite).purpose("weekend cover"),
            &cancel,
        )
        .await
        .unwrap();

    // Write access covers ordinary edits.
    svc.update(&dr_b, ResourceType::Patient, &pid, None, patient_with_gp(&pid, None), &cancel)
        .await
        .unwrap();

    // Naming themselves provider-of-record is not an ordinary edit.
    let err = svc
        .update(&dr_b, ResourceType::Patient, &pid, None, patient_with_gp(&pid, Some("pr-b")), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(denial_code(&err), DenyReason::PRIVILEGE_ESCALATION);

    svc.revoke_access(&dr_a, &grant.id, Some("cover ended".into()), &cancel)
        .await
        .unwrap();
    let err = svc.read(&dr_b, ResourceType::Patient, &pid, &cancel).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    let current = svc.read(&dr_a, ResourceType::Patient, &pid, &cancel).await.unwrap();
    assert_eq!(current.version, 2);

    let events = svc
        .audit_trail(&admin(), None, AuditRange::all(), &cancel)
        .await
        .unwrap();
    let change = events
        .iter()
        .find(|e| e.action == AuditAction::AuthorizeProviderChange)
        .expect("provider change decision audited");
    assert_eq!(change.outcome, AuditOutcome::Denied);
    assert_eq!(change.actor_id, "dr-b");
    assert_eq!(change.reason.as_deref(), Some(DenyReason::PRIVILEGE_ESCALATION));
}

#[tokio::test]
async fn test_provider_of_record_hands_over_and_clears() {
    let svc = service(&AppConfig::default());
    let cancel = CancellationToken::new();
    let dr_a = provider();
    let dr_b = practitioner("dr-b", "tenant-1", "pr-b");
    let pid = patient(&svc, &dr_a).await;

    svc.update(&dr_a, ResourceType::Patient, &pid, None, patient_with_gp(&pid, Some("pr-b")), &cancel)
        .await
        .unwrap();
    svc.read(&dr_b, ResourceType::Patient, &pid, &cancel).await.unwrap();
    let err = svc.read(&dr_a, ResourceType::Patient, &pid, &cancel).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    // Dropping generalPractitioner leaves the patient without a provider-of-record.
    svc.update(&dr_b, ResourceType::Patient, &pid, None, patient_with_gp(&pid, None), &cancel)
        .await
        .unwrap();
    let err = svc.read(&dr_b, ResourceType::Patient, &pid, &cancel).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    let current = svc.read(&admin(), ResourceType::Patient, &pid, &cancel).await.unwrap();
    assert!(current.payload.get("generalPractitioner").is_none());
}

#[tokio::test]
async fn test_audit_trail_denial_is_audited() {
    let svc = service(&AppConfig::default());
    let cancel = CancellationToken::new();
    let err = svc
        .audit_trail(&provider(), None, AuditRange::all(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let events = svc
        .audit_trail(&admin(), None, AuditRange::all(), &cancel)
        .await
        .unwrap();
    let decisions: Vec<_> = events
        .iter()
        .filter(|e| e.action == AuditAction::AuthorizeAuditTrail)
        .collect();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].actor_id, "dr-a");
    assert_eq!(decisions[0].outcome, AuditOutcome::Denied);
    assert_eq!(decisions[0].reason.as_deref(), Some(DenyReason::ROLE_NOT_PERMITTED));
    assert_eq!(decisions[1].actor_id, "root");
    assert_eq!(decisions[1].outcome, AuditOutcome::Allowed);
}
