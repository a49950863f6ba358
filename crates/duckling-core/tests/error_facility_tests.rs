use duckling_core::errors::{DucklingError, ExError, ExErrorKind};

#[test]
fn test_table_not_found_verifiable_by_kind() {
    let err = DucklingError::TableDefinitionNotFound {
        table_spec_name: "unknown".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::NotFound);
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.table(), Some("unknown"));
    assert_eq!(ex_err.op(), Some("load_table"));
}

#[test]
fn test_load_error_keeps_engine_subtype() {
    let err = DucklingError::Load {
        table_spec_name: "trades".to_string(),
        table_instance_name: "trades_4".to_string(),
        message: "Catalog Error".to_string(),
        subtype: Some("ENTRY_ALREADY_EXISTS".to_string()),
    };

    let ex_err: ExError = (&err).into();

    assert_eq!(ex_err.kind(), ExErrorKind::Load);
    assert_eq!(ex_err.table(), Some("trades_4"));
    assert_eq!(ex_err.subtype(), Some("ENTRY_ALREADY_EXISTS"));
    assert!(err.to_string().contains("trades_4"));
}

#[test]
fn test_payload_decode_distinct_from_load() {
    let err = DucklingError::PayloadDecode {
        table_spec_name: "trades".to_string(),
        reason: "invalid base64".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::PayloadDecode);
    assert_eq!(ex_err.code(), "ERR_PAYLOAD_DECODE");
    assert_ne!(ex_err.kind(), ExErrorKind::Load);
    assert!(ex_err.message().contains("base64"));
}

#[test]
fn test_invalid_transition_names_state_and_command() {
    let err = DucklingError::invalid_transition("Idle", "QUERY.EXECUTE");

    assert_eq!(
        err.to_string(),
        "Command QUERY.EXECUTE is not accepted in state Idle"
    );

    let ex_err: ExError = err.into();
    assert_eq!(ex_err.kind(), ExErrorKind::InvalidTransition);
    assert_eq!(ex_err.op(), Some("QUERY.EXECUTE"));
    assert!(ex_err.message().contains("Idle"));
}

#[test]
fn test_transaction_stage_becomes_operation() {
    let err = DucklingError::Transaction {
        stage: "commit".to_string(),
        message: "no transaction is active".to_string(),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::Transaction);
    assert_eq!(ex_err.op(), Some("transaction.commit"));
}

#[test]
fn test_cancelled_and_unavailable_conversion() {
    let cancelled: ExError = DucklingError::cancelled("catalog reset").into();
    assert_eq!(cancelled.code(), "ERR_CANCELLED");
    assert_eq!(cancelled.message(), "catalog reset");

    let unavailable: ExError = DucklingError::ActorUnavailable {
        actor: "catalog".to_string(),
    }
    .into();
    assert_eq!(unavailable.code(), "ERR_UNAVAILABLE");
}

#[test]
fn test_serde_json_error_becomes_serialization() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: DucklingError = parse_err.into();

    assert_eq!(err.kind(), ExErrorKind::Serialization);
}

#[test]
fn test_ex_error_builder_pattern() {
    use duckling_core_types::RequestId;

    let request_id = RequestId::new();
    let ex_err = ExError::new(ExErrorKind::Load)
        .with_op("load_table")
        .with_table("trades")
        .with_version_id(7)
        .with_message("insert failed")
        .with_request_id(request_id.clone());

    assert_eq!(ex_err.kind(), ExErrorKind::Load);
    assert_eq!(ex_err.op(), Some("load_table"));
    assert_eq!(ex_err.table(), Some("trades"));
    assert_eq!(ex_err.version_id(), Some(7));
    assert_eq!(ex_err.request_id(), Some(&request_id));
}

#[test]
fn test_ex_error_display() {
    let ex_err = ExError::new(ExErrorKind::Drop)
        .with_op("drop_table")
        .with_table("trades")
        .with_message("locked");

    let display_str = format!("{}", ex_err);

    assert!(display_str.starts_with("[ERR_DROP]"));
    assert!(display_str.contains("drop_table"));
    assert!(display_str.contains("trades"));
}

#[test]
fn test_all_error_kinds_have_unique_codes() {
    use std::collections::HashSet;

    let kinds = vec![
        ExErrorKind::Configuration,
        ExErrorKind::NotFound,
        ExErrorKind::PayloadDecode,
        ExErrorKind::Load,
        ExErrorKind::Prune,
        ExErrorKind::Drop,
        ExErrorKind::EngineConnection,
        ExErrorKind::Query,
        ExErrorKind::Transaction,
        ExErrorKind::InvalidTransition,
        ExErrorKind::Cancelled,
        ExErrorKind::Unavailable,
        ExErrorKind::Serialization,
        ExErrorKind::Internal,
    ];

    let codes: HashSet<_> = kinds.iter().map(|k| k.code()).collect();

    assert_eq!(codes.len(), kinds.len());
    for code in codes {
        assert!(code.starts_with("ERR_"));
    }
}
