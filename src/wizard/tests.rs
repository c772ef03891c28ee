use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::api::ApiError;
use crate::entities::artifact::{ArtifactDetails, ArtifactRepository, ArtifactType, TagType};
use crate::entities::connector::{
    ConnectorAuth, ConnectorDetails, ConnectorOverview, ConnectorType, DelegateSelection,
    GitConnectionType,
};
use crate::entities::manifest::{ManifestDetails, ManifestStore, ManifestStoreType, ManifestType};
use crate::entities::{ArtifactSlot, EntityKind, WizardKind};
use crate::scope::Scope;
use crate::submit::{
    Resolution, ServiceDefinitionSubmitter, SubmissionAdapter, SubmitRequest,
};

/// Adapter replaying scripted results and recording every call
#[derive(Default)]
struct ScriptedAdapter {
    results: Mutex<VecDeque<Result<Value, ApiError>>>,
    calls: Mutex<Vec<(&'static str, SubmitRequest)>>,
}

impl ScriptedAdapter {
    fn with(results: Vec<Result<Value, ApiError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::default(),
        }
    }

    fn calls(&self) -> Vec<(&'static str, SubmitRequest)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_result(&self, op: &'static str, request: &SubmitRequest) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push((op, request.clone()));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(request.payload.clone()))
    }
}

#[async_trait]
impl SubmissionAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        self.next_result("create", request)
    }

    async fn update(&self, request: &SubmitRequest) -> Result<Value, ApiError> {
        self.next_result("update", request)
    }
}

fn overview(name: &str, identifier: &str) -> StepOutput {
    StepOutput::ConnectorOverview(ConnectorOverview {
        name: name.to_string(),
        identifier: identifier.to_string(),
        description: None,
        tags: BTreeMap::new(),
    })
}

fn helm_details(url: &str) -> StepOutput {
    StepOutput::ConnectorDetails(ConnectorDetails {
        url: url.to_string(),
        auth: ConnectorAuth::Anonymous,
        connection_type: None,
        validation_repo: None,
        provider_type: None,
    })
}

fn delegates() -> StepOutput {
    StepOutput::DelegateSelector(DelegateSelection::default())
}

fn helm_session() -> WizardSession {
    WizardSession::start(
        WizardKind::Connector(ConnectorType::HttpHelmRepo),
        Scope::project("acc", "default", "web"),
    )
}

fn ready_helm_session() -> WizardSession {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    session.next(helm_details("http://x")).unwrap();
    assert_eq!(session.next(delegates()).unwrap(), NextOutcome::ReadyToSubmit);
    session
}

// ─── Sequencing ─────────────────────────────────────────────────────────

#[test]
fn test_start_seeds_context_and_opens_first_step() {
    let session = helm_session();
    assert_eq!(session.phase(), Phase::Step(0));
    assert_eq!(session.current_step().unwrap().name(), "overview");
    assert_eq!(session.context().get_str("type"), Some("HttpHelmRepo"));
    assert!(!session.mode().is_edit());
}

#[test]
fn test_open_only_from_idle() {
    let mut session = WizardSession::new(
        WizardKind::Manifest,
        WizardMode::Create,
        Scope::account("acc"),
    );
    assert_eq!(session.phase(), Phase::Idle);
    assert!(matches!(
        session.next(delegates()),
        Err(WizardError::InvalidPhase { action: "advance", phase: Phase::Idle })
    ));

    session.open(AccumulatedContext::new()).unwrap();
    assert_eq!(session.cursor(), Some(0));
    assert!(session.open(AccumulatedContext::new()).is_err());
}

#[test]
fn test_every_wizard_kind_has_steps() {
    let kinds = [
        WizardKind::Connector(ConnectorType::DockerRegistry),
        WizardKind::Connector(ConnectorType::K8sCluster),
        WizardKind::Manifest,
        WizardKind::Artifact(ArtifactSlot::Primary),
        WizardKind::Artifact(ArtifactSlot::Sidecar),
    ];
    for kind in kinds {
        let session = WizardSession::start(kind, Scope::account("acc"));
        assert!(!session.steps().is_empty(), "{}", kind.title());
        assert!(session.current_step().is_some());
    }
}

#[test]
fn test_custom_steps_must_not_be_empty() {
    let result = WizardSession::with_steps(
        WizardKind::Manifest,
        WizardMode::Create,
        Scope::account("acc"),
        Vec::new(),
    );
    assert!(matches!(result, Err(WizardError::NoSteps)));
}

#[test]
fn test_back_then_next_round_trips() {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    session.next(helm_details("http://x")).unwrap();
    let cursor = session.cursor();
    let context = session.context().clone();

    assert_eq!(session.back().unwrap(), 1);
    session.next(helm_details("http://x")).unwrap();

    assert_eq!(session.cursor(), cursor);
    assert_eq!(session.context(), &context);
}

#[test]
fn test_back_at_first_step_is_noop() {
    let mut session = helm_session();
    assert_eq!(session.back().unwrap(), 0);
    assert_eq!(session.phase(), Phase::Step(0));
}

#[test]
fn test_back_keeps_merged_context() {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    session.back().unwrap();
    assert_eq!(session.context().get_str("name"), Some("conn1"));
}

#[test]
fn test_next_on_last_step_goes_to_submitting() {
    let session = ready_helm_session();
    assert_eq!(session.phase(), Phase::Submitting);
    assert_eq!(session.cursor(), None);
}

#[test]
fn test_back_from_submitting_returns_to_last_step() {
    let mut session = ready_helm_session();
    assert_eq!(session.back().unwrap(), 2);
    assert!(session.is_last_step());
}

#[test]
fn test_validation_failure_leaves_state_unchanged() {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    let before = session.context().clone();

    let err = session.next(helm_details("not a url")).unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert!(errors.has_field("url"));
    assert_eq!(session.cursor(), Some(1));
    assert_eq!(session.context(), &before);
}

#[test]
fn test_wrong_step_output_rejected() {
    let mut session = helm_session();
    let err = session.next(delegates()).unwrap_err();
    assert!(matches!(
        err,
        WizardError::WrongStep {
            expected: StepKind::ConnectorOverview,
            got: StepKind::DelegateSelector,
            ..
        }
    ));
    assert_eq!(session.cursor(), Some(0));
}

#[test]
fn test_go_to_only_reached_steps() {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    assert!(matches!(
        session.go_to("delegates"),
        Err(WizardError::StepNotReached(_))
    ));
    assert!(matches!(session.go_to("nope"), Err(WizardError::UnknownStep(_))));

    session.next(helm_details("http://x")).unwrap();
    assert_eq!(session.go_to("overview").unwrap(), 0);
    assert_eq!(session.go_to("delegates").unwrap(), 2);
}

#[test]
fn test_close_discards_context() {
    let mut session = helm_session();
    session.next(overview("conn1", "conn1")).unwrap();
    session.close();
    assert_eq!(session.phase(), Phase::Closed);
    assert!(session.context().is_empty());
    assert!(session.back().is_err());
    session.close();
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn test_sessions_do_not_share_context() {
    let mut a = helm_session();
    let b = helm_session();
    a.next(overview("conn1", "conn1")).unwrap();
    assert!(b.context().get("name").is_none());
    assert_ne!(a.id(), b.id());
}

// ─── Merge ──────────────────────────────────────────────────────────────

#[test]
fn test_merge_last_write_wins() {
    let first = merge(&AccumulatedContext::new(), json!({"a": 1}).as_object().unwrap().clone());
    let second = merge(&first, json!({"a": 2, "b": 3}).as_object().unwrap().clone());
    assert_eq!(second.to_value(), json!({"a": 2, "b": 3}));
}


#[test]
fn test_recommit_clears_dropped_optional_fields() {
    let mut session = WizardSession::start(
        WizardKind::Connector(ConnectorType::Git),
        Scope::project("acc", "default", "web"),
    );
    let git_details = |connection_type: GitConnectionType, validation_repo: Option<&str>| {
        StepOutput::ConnectorDetails(ConnectorDetails {
            url: "https://github.com/acme".to_string(),
            auth: ConnectorAuth::UsernameToken {
                username: "bot".to_string(),
                token_ref: "account.gh_token".to_string(),
            },
            connection_type: Some(connection_type),
            validation_repo: validation_repo.map(str::to_string),
            provider_type: None,
        })
    };

    session
        .next(StepOutput::ConnectorOverview(ConnectorOverview {
            name: "acme".to_string(),
            identifier: "acme".to_string(),
            description: Some("old desc".to_string()),
            tags: BTreeMap::new(),
        }))
        .unwrap();
    session
        .next(git_details(GitConnectionType::Account, Some("acme/test")))
        .unwrap();

    assert_eq!(session.back().unwrap(), 0);
    session.next(overview("acme", "acme")).unwrap();
    session.next(git_details(GitConnectionType::Repo, None)).unwrap();
    assert_eq!(session.next(delegates()).unwrap(), NextOutcome::ReadyToSubmit);

    let payload = session.payload().unwrap();
    let connector = &payload["connector"];
    assert!(connector.get("description").is_none(), "{}", payload);
    assert_eq!(connector["spec"]["connectionType"], "Repo");
    assert!(connector["spec"].get("validationRepo").is_none(), "{}", payload);
}

// ─── Submission ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_connector_payload() {
    let mut session = ready_helm_session();
    let adapter = ScriptedAdapter::default();

    let entity = session.submit(&adapter).await.unwrap();
    assert_eq!(entity["connector"]["name"], "conn1");
    assert_eq!(entity["connector"]["spec"]["helmRepoUrl"], "http://x");

    let calls = adapter.calls();
    assert_eq!(calls.len(), 1);
    let (op, request) = &calls[0];
    assert_eq!(*op, "create");
    assert_eq!(request.entity, EntityKind::Connector);
    assert_eq!(request.identifier, "conn1");
    assert_eq!(request.payload["connector"]["projectIdentifier"], "web");

    assert_eq!(session.phase(), Phase::Committed);
    assert!(session.context().is_empty());
}

#[tokio::test]
async fn test_submit_requires_submitting_phase() {
    let mut session = helm_session();
    let adapter = ScriptedAdapter::default();
    assert!(matches!(
        session.submit(&adapter).await,
        Err(WizardError::InvalidPhase { action: "submit", .. })
    ));
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_conflict_returns_to_last_step_with_context() {
    let remote = json!({"connector": {
        "name": "conn1", "identifier": "conn1", "type": "HttpHelmRepo",
        "spec": {"helmRepoUrl": "http://old", "auth": {"type": "Anonymous"}, "delegateSelectors": []}
    }});
    let adapter = ScriptedAdapter::with(vec![Err(ApiError::conflict(
        "scripted",
        "connector changed",
        Some(remote),
    ))]);
    let mut session = ready_helm_session();
    let context = session.context().clone();

    let err = session.submit(&adapter).await.unwrap_err();
    assert!(matches!(err, WizardError::Submission(ref e) if e.is_conflict()));
    assert_eq!(session.phase(), Phase::Step(2));
    assert_eq!(session.context(), &context);
    assert!(session.last_failure().unwrap().is_conflict());

    let diff = session.conflict_diff().unwrap();
    assert!(diff
        .iter()
        .any(|e| e.path == "connector.spec.helmRepoUrl"));
}

#[tokio::test]
async fn test_retry_after_network_failure() {
    let adapter = ScriptedAdapter::with(vec![Err(ApiError::network("scripted", "timed out"))]);
    let mut session = ready_helm_session();

    assert!(session.submit(&adapter).await.is_err());
    assert!(session.conflict_diff().is_none());
    session.next(delegates()).unwrap();
    session.submit(&adapter).await.unwrap();
    assert_eq!(session.phase(), Phase::Committed);
    assert_eq!(adapter.calls().len(), 2);
}

#[tokio::test]
async fn test_keep_mine_resubmits_as_update() {
    let adapter = ScriptedAdapter::with(vec![Err(ApiError::conflict(
        "scripted",
        "exists",
        Some(json!({"connector": {"identifier": "conn1", "type": "HttpHelmRepo", "spec": {}}})),
    ))]);
    let mut session = ready_helm_session();
    session.submit(&adapter).await.unwrap_err();

    let entity = session
        .resolve_conflict(Resolution::KeepMine, &adapter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity["connector"]["spec"]["helmRepoUrl"], "http://x");

    let calls = adapter.calls();
    assert_eq!(calls[1].0, "update");
    assert_eq!(
        calls[1].1.mode,
        WizardMode::Edit {
            identifier: "conn1".to_string()
        }
    );
    assert_eq!(session.phase(), Phase::Committed);
}

#[tokio::test]
async fn test_take_theirs_loads_server_copy() {
    let remote = json!({"connector": {
        "name": "Shared charts", "identifier": "conn1", "type": "HttpHelmRepo",
        "spec": {"helmRepoUrl": "http://old", "auth": {"type": "Anonymous"}, "delegateSelectors": []}
    }});
    let adapter = ScriptedAdapter::with(vec![Err(ApiError::conflict(
        "scripted",
        "exists",
        Some(remote),
    ))]);
    let mut session = ready_helm_session();
    session.submit(&adapter).await.unwrap_err();

    let outcome = session
        .resolve_conflict(Resolution::TakeTheirs, &adapter)
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(session.context().get_str("url"), Some("http://old"));
    assert_eq!(session.context().get_str("name"), Some("Shared charts"));
    assert!(session.mode().is_edit());
    assert!(session.last_failure().is_none());
    assert!(session.is_last_step());

    session.next(delegates()).unwrap();
    session.submit(&adapter).await.unwrap();
    assert_eq!(adapter.calls().last().unwrap().0, "update");
}

#[tokio::test]
async fn test_resolve_without_conflict() {
    let adapter = ScriptedAdapter::with(vec![Err(ApiError::unauthorized("scripted"))]);
    let mut session = ready_helm_session();
    session.submit(&adapter).await.unwrap_err();
    assert!(matches!(
        session.resolve_conflict(Resolution::KeepMine, &adapter).await,
        Err(WizardError::NoConflict)
    ));
}

// ─── Edit mode ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_edit_mode_prefills_and_updates() {
    let existing = json!({"connector": {
        "name": "charts", "identifier": "charts", "type": "HttpHelmRepo",
        "spec": {"helmRepoUrl": "https://charts.example.com", "auth": {"type": "Anonymous"}, "delegateSelectors": ["eu"]}
    }});
    let kind = WizardKind::Connector(ConnectorType::HttpHelmRepo);
    let mut session = WizardSession::start_edit(kind, Scope::account("acc"), &existing).unwrap();

    assert_eq!(
        session.mode(),
        &WizardMode::Edit {
            identifier: "charts".to_string()
        }
    );
    assert_eq!(session.context().get_str("url"), Some("https://charts.example.com"));
    assert_eq!(session.go_to("delegates").unwrap(), 2);

    session.go_to("overview").unwrap();
    let err = session.next(overview("charts", "renamed")).unwrap_err();
    assert!(err.validation_errors().unwrap().has_field("identifier"));

    session.next(overview("Charts", "charts")).unwrap();
    session.go_to("delegates").unwrap();
    session
        .next(StepOutput::DelegateSelector(DelegateSelection {
            delegate_mode: crate::entities::connector::DelegateMode::Selected,
            delegate_selectors: vec!["eu".to_string()],
        }))
        .unwrap();

    let adapter = ScriptedAdapter::default();
    let entity = session.submit(&adapter).await.unwrap();
    assert_eq!(entity["connector"]["name"], "Charts");
    assert_eq!(entity["connector"]["spec"]["delegateSelectors"], json!(["eu"]));
    assert_eq!(adapter.calls()[0].0, "update");
}

// ─── Service definition wizards ─────────────────────────────────────────

#[tokio::test]
async fn test_manifest_wizard_into_service_definition() {
    let submitter = ServiceDefinitionSubmitter::default();
    let mut session = WizardSession::start(WizardKind::Manifest, Scope::account("acc"));

    session
        .next(StepOutput::ManifestStore(ManifestStore {
            manifest_type: ManifestType::K8sManifest,
            store_type: ManifestStoreType::Github,
            connector_ref: "org.github".to_string(),
        }))
        .unwrap();
    session
        .next(StepOutput::ManifestDetails(ManifestDetails {
            identifier: "web_manifests".to_string(),
            branch: Some("main".to_string()),
            paths: vec!["k8s/".to_string()],
            ..ManifestDetails::default()
        }))
        .unwrap();
    session.submit(&submitter).await.unwrap();

    let definition = submitter.snapshot();
    let manifest = definition.manifest("web_manifests").unwrap();
    assert_eq!(manifest["manifest"]["spec"]["store"]["type"], "Github");
}

#[tokio::test]
async fn test_sidecar_wizard_duplicate_conflicts() {
    let submitter = ServiceDefinitionSubmitter::default();
    for image in ["fluentd", "fluent-bit"] {
        let mut session = WizardSession::start(
            WizardKind::Artifact(ArtifactSlot::Sidecar),
            Scope::account("acc"),
        );
        session
            .next(StepOutput::ArtifactRepository(ArtifactRepository {
                artifact_type: ArtifactType::DockerRegistry,
                connector_ref: "docker_hub".to_string(),
            }))
            .unwrap();
        session
            .next(StepOutput::ArtifactDetails(ArtifactDetails {
                identifier: Some("logger".to_string()),
                image_path: image.to_string(),
                tag_type: TagType::Value,
                tag: Some("latest".to_string()),
                tag_regex: None,
                registry_hostname: None,
                region: None,
            }))
            .unwrap();
        let result = session.submit(&submitter).await;
        if image == "fluentd" {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(WizardError::Submission(ref e)) if e.is_conflict()));
            assert!(session.is_last_step());
        }
    }
    assert_eq!(submitter.snapshot().artifacts.sidecars.len(), 1);
}
