#![cfg(test)]

use crate::config::config::{Config, ConfigError};
use dimse::AssociationMode;

/// Parse a TOML string into a `Config` and run its validation.
fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(toml_str).expect("TOML parse error");
    cfg.validate()?;
    Ok(cfg)
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml = r#"
        [service]
        id = "endo-room-1"

        [peer]
        ae_title = "PACS"
        host = "10.0.0.20"
    "#;

    let config = load_config_from_str(toml).expect("minimal config is valid");

    assert_eq!(config.service.log_level, "info");
    assert!(!config.logging.log_to_file);
    assert_eq!(config.logging.log_file_path, "app.log");
    assert_eq!(config.http.bind_port, 5000);
    assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5000");
    assert_eq!(config.storage.path, "./tmp");
    assert!(!config.storage.retain_failed_artifacts);
    assert_eq!(config.peer.port, 11112);
    assert_eq!(config.dimse.association_mode, AssociationMode::PerBatch);
    assert_eq!(config.dataset.sop_class_uid, "1.2.840.10008.5.1.4.1.1.7");
    assert_eq!(config.dataset.modality, "OT");
    assert_eq!(config.dataset.study_description, "ENDOSCOPIA");
}

#[test]
fn test_full_config() {
    let toml = r#"
        [service]
        id = "endo-room-2"
        log_level = "debug"

        [logging]
        log_to_file = true
        log_file_path = "/var/log/scopebridge.log"

        [http]
        bind_address = "127.0.0.1"
        bind_port = 8080

        [storage]
        path = "/tmp/scopebridge"
        retain_failed_artifacts = true

        [dimse]
        local_aet = "ENDO2"
        association_mode = "per_object"

        [dimse.retry]
        max_retries = 3
        initial_backoff_ms = 250

        [peer]
        ae_title = "ARCHIVE"
        host = "pacs.local"
        port = 104
        connect_timeout_ms = 5000

        [dataset]
        sop_class_uid = "1.2.840.10008.5.1.4.1.1.77.1.1"
        modality = "ES"
    "#;

    let config = load_config_from_str(toml).expect("full config is valid");

    assert_eq!(config.dimse.local_aet, "ENDO2");
    assert_eq!(config.dimse.association_mode, AssociationMode::PerObject);
    assert_eq!(config.dimse.retry.max_retries, 3);
    assert_eq!(config.peer.to_string(), "ARCHIVE@pacs.local:104");
    assert_eq!(config.peer.connect_timeout_ms, Some(5000));
    assert!(config.storage.retain_failed_artifacts);
    assert_eq!(config.dataset.modality, "ES");
}

#[test]
fn test_modality_mismatch_is_rejected() {
    let toml = r#"
        [service]
        id = "endo"

        [peer]
        ae_title = "PACS"
        host = "10.0.0.20"

        [dataset]
        sop_class_uid = "1.2.840.10008.5.1.4.1.1.2"
        modality = "OT"
    "#;

    let err = load_config_from_str(toml).expect_err("CT class with OT modality");
    assert!(matches!(err, ConfigError::InvalidDataset(_)));
}

#[test]
fn test_invalid_sections_are_rejected() {
    let base = |extra: &str| {
        format!(
            r#"
            [service]
            id = "endo"

            [peer]
            ae_title = "PACS"
            host = "10.0.0.20"

            {}
            "#,
            extra
        )
    };

    let err = load_config_from_str(&base("[http]\nbind_address = \"not-an-ip\"")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidHttp(_)));

    let err = load_config_from_str(&base("[storage]\nbackend = \"s3\"")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStorage(_)));

    let err = load_config_from_str(&base("[dimse]\nmax_pdu = 1024")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDimse(_)));

    let err = load_config_from_str(&base("[logging]\nlog_to_file = true\nlog_file_path = \"\""))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidLogging(_)));
}
