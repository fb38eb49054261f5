use super::*;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.limits.maximum_clients, 10_000);
}

#[test]
fn parses_predefined_topics() {
    let toml = r#"
        [topics.predefined]
        status = 1
        control = 2
    "#;
    let config = Config::parse(toml).unwrap();
    assert_eq!(config.topics.predefined.get("status"), Some(&1));
}

#[test]
fn rejects_predefined_topic_id_zero() {
    let toml = r#"
        [topics.predefined]
        bad = 0
    "#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn rejects_out_of_range_packet_ber() {
    let toml = r#"
        [server]
        packet_ber = 1.5
    "#;
    assert!(Config::parse(toml).is_err());
}

#[test]
fn load_applies_env_var_substitution() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("mqtt-sn-gw-test-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "[server]\nbind = \"${MQTTSN_GW_TEST_BIND:-0.0.0.0:20000}\"\n",
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:20000".parse().unwrap());

    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = Config::load("/nonexistent/path/does-not-exist.toml").unwrap();
    assert_eq!(config.server.dest_port, 10000);
}
