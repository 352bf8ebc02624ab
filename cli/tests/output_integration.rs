//! Integration tests for the text output and setup errors of rtcontrol.

use rtcontrol::output::{format_row, keys_table, referenced_fields};
use rtcontrol::CliError;
use rtq_engine::{fields, prefetch_calls, Settings};
use rtq_query::{create_matcher, parse_query, QueryError, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

fn item() -> HashMap<String, Value> {
    HashMap::from([
        ("name".to_string(), Value::Str("ubuntu-22.04.iso".to_string())),
        ("size".to_string(), Value::Int(1_500_000)),
        ("ratio".to_string(), Value::Float(1.25)),
        ("is_complete".to_string(), Value::Bool(true)),
        (
            "tagged".to_string(),
            Value::Set(BTreeSet::from(["iso".to_string(), "linux".to_string()])),
        ),
    ])
}

#[test]
fn test_format_row_is_tab_separated() {
    let row = format_row(&item(), &["name", "size", "ratio", "is_complete", "tagged"]).unwrap();
    assert_eq!(row, "ubuntu-22.04.iso\t1500000\t1.25\t1\tiso linux");
}

#[test]
fn test_format_row_missing_value_is_empty() {
    let row = format_row(&item(), &["name", "message"]).unwrap();
    assert_eq!(row, "ubuntu-22.04.iso\t");
}

#[test]
fn test_referenced_fields_follow_key_names() {
    let query = parse_query("ubuntu [ ratio>1 OR name=*arch* ] tagged=iso").unwrap();
    assert_eq!(referenced_fields(&query), query.key_names());
    assert_eq!(referenced_fields(&query), ["ratio", "name", "tagged"]);
}

#[test]
fn test_referenced_fields_add_name_for_bare_values() {
    let query = parse_query("size>1G NOT [ arch ]").unwrap();
    assert_eq!(query.key_names(), ["size"]);
    assert_eq!(referenced_fields(&query), ["name", "size"]);
    assert_eq!(referenced_fields(&parse_query("arch linux").unwrap()), ["name"]);
}

#[test]
fn test_prefetch_from_referenced_fields() {
    let registry = fields::registry();
    let query = parse_query("linux tagged=hd").unwrap();
    let calls = prefetch_calls(&referenced_fields(&query), &registry).unwrap();
    assert_eq!(calls, ["d.custom=tags", "d.hash=", "d.name="]);
}

#[test]
fn test_keys_table_lists_requirements() {
    let registry = fields::registry();
    let table = keys_table(&["tagged", "ratio"], &registry).unwrap().to_string();

    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Field"));
    assert!(lines[1].starts_with("tagged"));
    assert!(lines[1].contains("d.custom=tags"));
    assert!(lines[2].starts_with("ratio"));
    assert!(lines[2].contains("d.ratio="));
}

#[test]
fn test_keys_table_unknown_field() {
    let registry = fields::registry();
    let err = keys_table(&["nmae"], &registry).unwrap_err();
    assert!(matches!(err, QueryError::UnknownField { .. }));
    assert!(err.to_string().contains("did you mean 'name'"));
}

#[test]
fn test_config_load_error_names_the_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "fast_query = \"fast\"").unwrap();

    let err = Settings::load(file.path()).unwrap_err();
    let display_msg = CliError::ConfigLoad(file.path().to_path_buf(), err).to_string();

    assert!(display_msg.contains("Failed to load configuration from"));
    assert!(display_msg.contains("Failed to parse config file"));
    assert!(display_msg.contains("Possible fixes"));
}

#[test]
fn test_invalid_filter_error_carries_position() {
    let registry = fields::registry();
    let err = create_matcher("name=x ]", &registry).unwrap_err();
    let display_msg = CliError::InvalidFilter(err).to_string();

    assert!(display_msg.starts_with("Invalid filter: Syntax error in filter 'name=x ]'"));
}

#[test]
fn test_connect_error_without_daemon_configuration() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = Settings {
        rtorrent_rc: dir.path().join("missing.rc").display().to_string(),
        ..Settings::default()
    };

    let err = rtq_engine::Engine::connect(settings).unwrap_err();
    let display_msg = CliError::Connect(err).to_string();
    assert!(display_msg.contains("No daemon URL configured"));
    assert!(display_msg.contains("--scgi-url"));
}
