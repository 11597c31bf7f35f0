// tests/demo_config.rs

use std::path::PathBuf;

use playgate::config::load_and_validate;
use playgate::exec::ToolInvocation;
use playgate::types::{ExecutionRequest, Payload};
use serde_json::json;

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/Playgate.toml")
}

#[test]
fn demo_config_is_valid() {
    let cfg = load_and_validate(demo_path()).unwrap();

    assert_eq!(cfg.runner.max_concurrent, 4);
    assert_eq!(cfg.catalog.entries().count(), 7);
    assert_eq!(
        cfg.metrics.path,
        demo_path().parent().unwrap().join("playgate-metrics.jsonl")
    );
}

#[test]
fn demo_catalog_accepts_a_webserver_create() {
    let cfg = load_and_validate(demo_path()).unwrap();

    let mut payload = Payload::new();
    payload.insert("server_name".into(), json!("example.com"));
    let req = ExecutionRequest::new("webserver", "create", payload);

    cfg.catalog.check(&req).unwrap();
    let rendered = ToolInvocation::structured(&cfg.tool, &req).render();
    assert!(rendered.starts_with(
        "/usr/bin/ansible-playbook -i inventory/hosts.ini --vault-password-file /etc/playgate/vault_pass.txt playbook.yml --extra-vars "
    ));
    assert!(rendered.ends_with(r#"'{"target":"webserver","action":"create","payload":{"server_name":"example.com"}}'"#));
}

#[test]
fn demo_catalog_rejects_undeclared_actions() {
    let cfg = load_and_validate(demo_path()).unwrap();
    let req = ExecutionRequest::new("database", "drop", Payload::new());
    assert!(cfg.catalog.check(&req).is_err());
}
