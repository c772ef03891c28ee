//! Integration tests for the `stepwizard` binary
//!
//! These tests drive the CLI the way a user would:
//! - route resolution and path matching
//! - manifest wizards writing a service definition file
//! - conflicts on re-run and their resolution flags
//! - dry runs and payload diffs
//!
//! Each test runs in its own temp directory with HOME pointed at it, so no
//! user configuration leaks in. Nothing here touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn stepwizard(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stepwizard"));
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("RUST_LOG", "warn")
        .args(["--account", "acc1", "--org", "default", "--project", "web"]);
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn manifest_answers(dir: &Path, name: &str, branch: &str) -> PathBuf {
    write(
        dir,
        name,
        &format!(
            r#"
- step: manifest_store
  manifestType: K8sManifest
  storeType: Github
  connectorRef: account.github_conn
- step: manifest_details
  identifier: web_manifests
  branch: {}
  paths:
    - k8s/deployment.yaml
"#,
            branch
        ),
    )
}

fn run_manifest(dir: &Path, answers: &Path, extra: &[&str]) -> Output {
    let service = dir.join("svc.yaml");
    stepwizard(dir)
        .args(["run", "manifest", "--answers"])
        .arg(answers)
        .arg("--service")
        .arg(&service)
        .args(extra)
        .output()
        .unwrap()
}

fn read_service(dir: &Path) -> Value {
    let content = fs::read_to_string(dir.join("svc.yaml")).unwrap();
    serde_yaml::from_str(&content).unwrap()
}

fn branch_of_first_manifest(service: &Value) -> String {
    service["manifests"][0]["manifest"]["spec"]["store"]["spec"]["branch"]
        .as_str()
        .unwrap()
        .to_string()
}

// ─── Routes ───────────────────────────────────────────────────────────────────

#[test]
fn test_route_prints_project_path() {
    let temp = TempDir::new().unwrap();
    let output = stepwizard(temp.path())
        .args(["--module", "cd", "route", "connector-details", "--id", "docker_hub"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output).trim(),
        "/account/acc1/cd/orgs/default/projects/web/setup/resources/connectors/docker_hub"
    );
}

#[test]
fn test_route_requires_id_for_detail_pages() {
    let temp = TempDir::new().unwrap();
    let output = stepwizard(temp.path())
        .args(["route", "pipeline-studio"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("--id is required"));
}

#[test]
fn test_match_reports_intent_and_scope() {
    let temp = TempDir::new().unwrap();
    let output = stepwizard(temp.path())
        .args([
            "match",
            "/account/acc9/ci/orgs/platform/projects/api/pipelines/build/pipeline-studio?step=1",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("pipeline-studio"), "{}", out);
    assert!(out.contains("account: acc9"), "{}", out);
    assert!(out.contains("org:     platform"), "{}", out);
    assert!(out.contains("project: api"), "{}", out);
}

#[test]
fn test_match_unknown_path_fails() {
    let temp = TempDir::new().unwrap();
    let output = stepwizard(temp.path())
        .args(["match", "/nowhere"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No route matches"));
}

// ─── Manifest wizard ──────────────────────────────────────────────────────────

#[test]
fn test_manifest_run_writes_service_definition() {
    let temp = TempDir::new().unwrap();
    let answers = manifest_answers(temp.path(), "answers.yaml", "main");

    let output = run_manifest(temp.path(), &answers, &[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let service = read_service(temp.path());
    let manifest = &service["manifests"][0]["manifest"];
    assert_eq!(manifest["identifier"], "web_manifests");
    assert_eq!(manifest["type"], "K8sManifest");
    assert_eq!(manifest["spec"]["store"]["type"], "Github");
    assert_eq!(manifest["spec"]["store"]["spec"]["paths"][0], "k8s/deployment.yaml");
    assert_eq!(branch_of_first_manifest(&service), "main");
}

#[test]
fn test_manifest_rerun_conflicts_until_resolved() {
    let temp = TempDir::new().unwrap();
    let first = manifest_answers(temp.path(), "first.yaml", "main");
    assert!(run_manifest(temp.path(), &first, &[]).status.success());

    let second = manifest_answers(temp.path(), "second.yaml", "dev");
    let output = run_manifest(temp.path(), &second, &[]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Conflict"), "{}", err);
    assert!(err.contains("manifest.spec.store.spec.branch"), "{}", err);
    assert!(err.contains("--resolve keep-mine"), "{}", err);
    assert_eq!(branch_of_first_manifest(&read_service(temp.path())), "main");

    let output = run_manifest(temp.path(), &second, &["--resolve", "keep-mine"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let service = read_service(temp.path());
    assert_eq!(service["manifests"].as_array().unwrap().len(), 1);
    assert_eq!(branch_of_first_manifest(&service), "dev");
}

#[test]
fn test_manifest_take_theirs_leaves_file_unchanged() {
    let temp = TempDir::new().unwrap();
    let first = manifest_answers(temp.path(), "first.yaml", "main");
    assert!(run_manifest(temp.path(), &first, &[]).status.success());

    let second = manifest_answers(temp.path(), "second.yaml", "dev");
    let output = run_manifest(temp.path(), &second, &["--resolve", "take-theirs"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Keeping the server copy"));
    assert_eq!(branch_of_first_manifest(&read_service(temp.path())), "main");
}

#[test]
fn test_manifest_edit_reuses_prefilled_steps() {
    let temp = TempDir::new().unwrap();
    let first = manifest_answers(temp.path(), "first.yaml", "main");
    assert!(run_manifest(temp.path(), &first, &[]).status.success());

    let details = write(
        temp.path(),
        "details.yaml",
        r#"
- step: manifest_details
  identifier: web_manifests
  branch: release
  paths:
    - k8s/deployment.yaml
    - k8s/service.yaml
"#,
    );
    let output = run_manifest(temp.path(), &details, &["--edit", "web_manifests"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let service = read_service(temp.path());
    let manifest = &service["manifests"][0]["manifest"];
    assert_eq!(branch_of_first_manifest(&service), "release");
    assert_eq!(manifest["spec"]["store"]["spec"]["connectorRef"], "account.github_conn");
    assert_eq!(
        manifest["spec"]["store"]["spec"]["paths"].as_array().unwrap().len(),
        2
    );
}

#[test]
fn test_manifest_validation_errors_are_reported() {
    let temp = TempDir::new().unwrap();
    let answers = write(
        temp.path(),
        "answers.yaml",
        r#"
- step: manifest_store
  manifestType: K8sManifest
  storeType: Github
  connectorRef: account.github_conn
- step: manifest_details
  identifier: web_manifests
  paths: []
"#,
    );

    let output = run_manifest(temp.path(), &answers, &[]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("branch"), "{}", err);
    assert!(err.contains("paths"), "{}", err);
    assert!(!temp.path().join("svc.yaml").exists());
}

// ─── Connector dry run ────────────────────────────────────────────────────────

#[test]
fn test_connector_dry_run_prints_payload() {
    let temp = TempDir::new().unwrap();
    let answers = write(
        temp.path(),
        "connector.yaml",
        r#"
- step: connector_overview
  name: Docker Hub
  identifier: docker_hub
- step: connector_details
  url: https://index.docker.io/v2/
  providerType: DockerHub
  auth:
    type: Anonymous
- step: delegate_selector
"#,
    );

    let output = stepwizard(temp.path())
        .args(["run", "connector", "--type", "DockerRegistry", "--dry-run", "--answers"])
        .arg(&answers)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let payload: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let connector = &payload["connector"];
    assert_eq!(connector["identifier"], "docker_hub");
    assert_eq!(connector["orgIdentifier"], "default");
    assert_eq!(connector["projectIdentifier"], "web");
    assert_eq!(connector["spec"]["dockerRegistryUrl"], "https://index.docker.io/v2/");
    assert_eq!(connector["spec"]["auth"]["type"], "Anonymous");
}

#[test]
fn test_connector_requires_type() {
    let temp = TempDir::new().unwrap();
    let answers = write(temp.path(), "connector.yaml", "[]\n");
    let output = stepwizard(temp.path())
        .args(["run", "connector", "--dry-run", "--answers"])
        .arg(&answers)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--type is required"));
}

// ─── Diff ─────────────────────────────────────────────────────────────────────

#[test]
fn test_diff_lists_changed_leaves() {
    let temp = TempDir::new().unwrap();
    let local = write(
        temp.path(),
        "local.json",
        r#"{"connector":{"identifier":"c1","spec":{"url":"https://new"}}}"#,
    );
    let remote = write(
        temp.path(),
        "remote.json",
        r#"{"connector":{"identifier":"c1","spec":{"url":"https://old"}}}"#,
    );

    let output = stepwizard(temp.path())
        .arg("diff")
        .arg(&local)
        .arg(&remote)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output).trim(),
        r#"~ connector.spec.url: "https://old" -> "https://new""#
    );

    let output = stepwizard(temp.path())
        .arg("diff")
        .arg(&local)
        .arg(&local)
        .output()
        .unwrap();
    assert_eq!(stdout(&output).trim(), "No differences");
}
