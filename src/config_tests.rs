use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["threadhost"];
    full.extend_from_slice(args);
    Config::parse_from(full)
}

#[test]
fn defaults_are_sane() {
    let cfg = parse(&[]);
    assert_eq!(cfg.max_agents, 10);
    assert_eq!(cfg.agent_timeout_secs, 1800);
    assert_eq!(cfg.max_retries, 2);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_zero_max_agents() {
    let mut cfg = parse(&[]);
    cfg.max_agents = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_bad_log_format() {
    let mut cfg = parse(&[]);
    cfg.log_format = "xml".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn cors_origin_list_splits_on_comma() {
    let mut cfg = parse(&[]);
    cfg.cors_origins = "https://a.example, https://b.example".to_string();
    assert_eq!(cfg.cors_origin_list(), vec!["https://a.example", "https://b.example"]);
}

#[test]
fn database_path_overrides_default() {
    let mut cfg = parse(&[]);
    cfg.database_path = Some(std::path::PathBuf::from("/tmp/custom.db"));
    assert_eq!(cfg.resolved_database_path(), std::path::PathBuf::from("/tmp/custom.db"));
}

#[test]
fn agent_command_defaults_to_threadhost_agent() {
    let cfg = parse(&[]);
    assert_eq!(cfg.agent_command, "threadhost-agent");
}

#[test]
fn agent_command_overridable_via_flag() {
    let cfg = parse(&["--agent-command", "my-agent-cli"]);
    assert_eq!(cfg.agent_command, "my-agent-cli");
}
