//! Query driver tests against an in-memory daemon.

use rtq_engine::{prefetch_calls, Call, Engine, RpcClient, RpcError, Settings};
use rtq_query::{create_matcher, FastQuery, Item, Value};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

const UBUNTU: &str = "1111111111111111111111111111111111111111";
const ARCH: &str = "2222222222222222222222222222222222222222";

type CallLog = Arc<Mutex<Vec<(String, Vec<JsonValue>)>>>;

/// Answers item queries from fixed torrent data, ignoring any pre-filter.
struct FakeDaemon {
    torrents: Vec<HashMap<String, JsonValue>>,
    methods: Vec<&'static str>,
    log: CallLog,
}

impl FakeDaemon {
    fn rows(&self, calls: &[JsonValue]) -> JsonValue {
        let rows: Vec<JsonValue> = self
            .torrents
            .iter()
            .map(|torrent| {
                let row: Vec<JsonValue> = calls
                    .iter()
                    .map(|call| {
                        let call = call.as_str().unwrap_or_default();
                        torrent.get(call).cloned().unwrap_or_else(|| json!(""))
                    })
                    .collect();
                JsonValue::Array(row)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

impl RpcClient for FakeDaemon {
    fn call(&self, method: &str, params: Vec<JsonValue>) -> Result<JsonValue, RpcError> {
        self.log.lock().unwrap().push((method.to_string(), params.clone()));
        match method {
            "system.listMethods" => Ok(json!(self.methods)),
            "d.multicall2" => Ok(self.rows(&params[2..])),
            "d.multicall.filtered" => Ok(self.rows(&params[3..])),
            _ => {
                let hash = params[0].as_str().unwrap_or_default();
                let args: Vec<&str> = params[1..].iter().map(|p| p.as_str().unwrap_or_default()).collect();
                let key = format!("{}={}", method, args.join(","));
                let torrent = self
                    .torrents
                    .iter()
                    .find(|t| t["d.hash="] == json!(hash))
                    .ok_or_else(|| RpcError::HashNotFound(hash.to_string()))?;
                Ok(torrent.get(&key).cloned().unwrap_or_else(|| json!("")))
            }
        }
    }

    fn multicall(&self, calls: &[Call]) -> Result<Vec<JsonValue>, RpcError> {
        self.log.lock().unwrap().push(("system.multicall".to_string(), Vec::new()));
        calls
            .iter()
            .map(|call| self.call(&call.method, call.params.clone()))
            .collect()
    }

    fn url(&self) -> &str {
        "scgi://fake:5000"
    }
}

fn torrent(hash: &str, name: &str, ratio: i64, tags: &str) -> HashMap<String, JsonValue> {
    [
        ("d.hash=", json!(hash)),
        ("d.name=", json!(name)),
        ("d.ratio=", json!(ratio)),
        ("d.size_bytes=", json!(1000)),
        ("d.completed_bytes=", json!(500)),
        ("d.complete=", json!(1)),
        ("d.is_multi_file=", json!(0)),
        ("d.directory=", json!("/data")),
        ("d.custom=tags", json!(tags)),
        ("d.custom=tm_completed", json!("3600")),
        ("d.custom=activations", json!("R1000P2000R3000P3500")),
        ("d.custom1=", json!("linux")),
        ("d.base_path=", json!(format!("/data/{}", name))),
        (
            "t.multicall=,t.url=,t.is_enabled=",
            json!([["http://old.example.com/announce", 0], ["http://tracker.example.org:6969/announce", 1]]),
        ),
        ("f.multicall=,f.path=", json!([["disk.iso"], ["notes.txt"]])),
        ("f.multicall=,f.path=,f.size_bytes=", json!([["disk.iso", 900], ["notes.txt", 100]])),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

fn engine(settings: Settings, methods: Vec<&'static str>) -> (Engine, CallLog) {
    let log = CallLog::default();
    let daemon = FakeDaemon {
        torrents: vec![
            torrent(UBUNTU, "ubuntu-22.04.iso", 1500, "Linux ISO"),
            torrent(ARCH, "archlinux-2024.01.01.iso", 500, "linux"),
        ],
        methods,
        log: log.clone(),
    };
    (Engine::new(Box::new(daemon), settings), log)
}

fn all_methods() -> Vec<&'static str> {
    vec!["d.multicall2", "d.multicall.filtered", "string.contains_i", "pyro._activations.append"]
}

fn methods_called(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|(method, _)| method.clone()).collect()
}

fn item_query(log: &CallLog) -> (String, Vec<JsonValue>) {
    log.lock()
        .unwrap()
        .iter()
        .find(|(method, _)| method.starts_with("d.multicall"))
        .cloned()
        .unwrap()
}

fn names(items: &[impl Item]) -> Vec<String> {
    items.iter().map(|item| item.attribute("name").unwrap().to_string()).collect()
}

#[test]
fn test_items_use_pre_filter_and_match_locally() {
    let (engine, log) = engine(Settings::default(), all_methods());
    let matcher = create_matcher("ratio>1", engine.fields()).unwrap();
    let prefetch = prefetch_calls(&["ratio"], engine.fields()).unwrap();
    assert_eq!(prefetch, ["d.hash=", "d.ratio="]);

    let items = engine.items("default", Some(&matcher), &prefetch).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].hash(), UBUNTU);

    let pre_filter = matcher.pre_filter(FastQuery::Safe);
    assert!(!pre_filter.is_empty());
    let (method, params) = item_query(&log);
    assert_eq!(method, "d.multicall.filtered");
    assert_eq!(params[..3], [json!(""), json!("default"), json!(pre_filter)]);
    assert_eq!(params[3..], [json!("d.hash="), json!("d.ratio=")]);

    // not prefetched, so fetched on demand
    assert_eq!(names(&items), ["ubuntu-22.04.iso"]);
    assert!(log
        .lock()
        .unwrap()
        .contains(&("d.name".to_string(), vec![json!(UBUNTU)])));
}

#[test]
fn test_items_fall_back_without_filtered_multicall() {
    let (engine, log) = engine(Settings::default(), vec!["d.multicall2"]);
    let matcher = create_matcher("ratio>1", engine.fields()).unwrap();

    let items = engine.items("main", Some(&matcher), &[]).unwrap();
    assert_eq!(names(&items), ["ubuntu-22.04.iso"]);
    let (method, params) = item_query(&log);
    assert_eq!(method, "d.multicall2");
    assert_eq!(params[1], json!("main"));
}

#[test]
fn test_fast_query_off_skips_method_listing() {
    let settings = Settings {
        fast_query: FastQuery::Off,
        ..Settings::default()
    };
    let (engine, log) = engine(settings, all_methods());
    let matcher = create_matcher("tagged=linux", engine.fields()).unwrap();
    let prefetch = prefetch_calls(&["tagged"], engine.fields()).unwrap();

    let items = engine.items("default", Some(&matcher), &prefetch).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(methods_called(&log), ["d.multicall2"]);
}

#[test]
fn test_safety_checks_disabled_trusts_daemon() {
    let settings = Settings {
        safety_checks_enabled: false,
        ..Settings::default()
    };
    let (engine, log) = engine(settings, Vec::new());
    let matcher = create_matcher("name=*arch*", engine.fields()).unwrap();

    let items = engine.items("default", Some(&matcher), &[]).unwrap();
    assert_eq!(names(&items), ["archlinux-2024.01.01.iso"]);
    assert_eq!(methods_called(&log), ["d.multicall.filtered"]);
}

#[test]
fn test_missing_contains_i_disables_pre_filter() {
    let (engine, log) = engine(Settings::default(), vec!["d.multicall.filtered"]);
    let matcher = create_matcher("name=*arch*", engine.fields()).unwrap();
    assert!(matcher.pre_filter(FastQuery::Safe).contains("string.contains_i"));

    assert_eq!(engine.pre_filter(&matcher).unwrap(), None);
    let items = engine.items("default", Some(&matcher), &[]).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(item_query(&log).0, "d.multicall2");
    // the method list is fetched only once
    let listings = methods_called(&log).iter().filter(|m| *m == "system.listMethods").count();
    assert_eq!(listings, 1);
}

#[test]
fn test_hash_view_uses_batched_calls() {
    let (engine, log) = engine(Settings::default(), all_methods());
    let prefetch = prefetch_calls(&["name", "tracker"], engine.fields()).unwrap();

    let items = engine.items(&format!("#{}", ARCH), None, &prefetch).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].hash(), ARCH);
    let called = methods_called(&log);
    assert_eq!(called[0], "system.multicall");
    assert!(!called.iter().any(|m| m.starts_with("d.multicall")));
    assert!(log.lock().unwrap().contains(&(
        "t.multicall".to_string(),
        vec![json!(ARCH), json!(""), json!("t.url="), json!("t.is_enabled=")]
    )));
}

#[test]
fn test_unknown_hash_is_an_error() {
    let (engine, _log) = engine(Settings::default(), all_methods());
    let err = engine.items("#DEADBEEF", None, &[]).unwrap_err();
    assert!(format!("{:#}", err).contains("While getting download items from scgi://fake:5000"));
}

#[test]
fn test_derived_fields() {
    let (engine, _log) = engine(Settings::default(), all_methods());
    let items = engine.items(UBUNTU, None, &[]).unwrap();
    let item = &items[0];
    let attr = |name: &str| item.attribute(name).unwrap();
    let set = |values: &[&str]| Value::Set(values.iter().map(|v| v.to_string()).collect::<BTreeSet<_>>());

    assert_eq!(attr("ratio"), Value::Float(1.5));
    assert_eq!(attr("done"), Value::Float(50.0));
    assert_eq!(attr("size"), Value::Int(1000));
    assert_eq!(attr("is_complete"), Value::Bool(true));
    assert_eq!(attr("tagged"), set(&["iso", "linux"]));
    assert_eq!(attr("path"), Value::Str("/data/ubuntu-22.04.iso".to_string()));
    assert_eq!(
        attr("tracker"),
        Value::Str("http://tracker.example.org:6969/announce".to_string())
    );
    assert_eq!(attr("alias"), Value::Str("example.org".to_string()));
    assert_eq!(attr("files"), Value::List(vec!["disk.iso".to_string(), "notes.txt".to_string()]));
    assert_eq!(attr("kind"), set(&["iso", "txt"]));
    assert_eq!(attr("kind_50"), set(&["iso"]));
    assert_eq!(attr("completed"), Value::Int(3600));
    assert_eq!(attr("leechtime"), Value::Int(1500));
    assert_eq!(attr("seedtime"), Value::None);
    assert_eq!(attr("stopped"), Value::Int(3500));
    assert_eq!(attr("label"), Value::Str("linux".to_string()));
    assert_eq!(attr("custom_1"), Value::Str("linux".to_string()));
    assert_eq!(attr("d_base_path"), Value::Str("/data/ubuntu-22.04.iso".to_string()));
    assert_eq!(attr("f_path").to_set().len(), 2);
    assert!(item.attribute("no_such_field").is_err());
}

#[test]
fn test_alias_from_settings() {
    let mut settings = Settings::default();
    settings
        .aliases
        .insert("EXAMPLE".to_string(), vec!["example.org".to_string()]);
    let (engine, _log) = engine(settings, all_methods());
    let matcher = create_matcher("alias=EXAMPLE", engine.fields()).unwrap();

    let items = engine.items("default", Some(&matcher), &[]).unwrap();
    assert_eq!(items.len(), 2);
}
