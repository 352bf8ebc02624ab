use crate::engine::{split_call, Engine};
use crate::error::RpcError;
use crate::fields::{FILES_CALL, FILE_SIZES_CALL, TRACKER_CALL};
use crate::guess::guess;
use anyhow::anyhow;
use chrono::Utc;
use indexmap::IndexMap;
use log::warn;
use regex::Regex;
use rtq_query::{resolve_field, Item, MatcherKind, QueryError, Value, ValueType};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

/// A single download item, backed by a cache of daemon call results.
///
/// The cache is seeded from one multicall row and keyed by call strings such
/// as `d.name=` or `d.custom=tags`. Calls that were not prefetched are made
/// on first use, with the info hash as target.
pub struct TorrentItem<'a> {
    engine: &'a Engine,
    hash: String,
    cache: RefCell<IndexMap<String, JsonValue>>,
}

impl<'a> TorrentItem<'a> {
    pub fn new(
        engine: &'a Engine,
        rpc_fields: impl IntoIterator<Item = (String, JsonValue)>,
    ) -> Result<Self, RpcError> {
        let cache: IndexMap<String, JsonValue> = rpc_fields.into_iter().collect();
        let hash = cache
            .get("d.hash=")
            .and_then(JsonValue::as_str)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RpcError::protocol("Item data without an info hash"))?
            .to_string();
        Ok(Self {
            engine,
            hash,
            cache: RefCell::new(cache),
        })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Result of a daemon call for this item, from the cache when possible.
    pub fn fetch(&self, call: &str) -> Result<JsonValue, RpcError> {
        if let Some(value) = self.cache.borrow().get(call) {
            return Ok(value.clone());
        }
        let (method, args) = split_call(call);
        let mut params = vec![JsonValue::String(self.hash.clone())];
        params.extend(args);
        let value = self.engine.client().call(method, params)?;
        self.cache.borrow_mut().insert(call.to_string(), value.clone());
        Ok(value)
    }

    fn text(&self, call: &str) -> Result<String, RpcError> {
        Ok(json_text(&self.fetch(call)?))
    }

    fn int(&self, call: &str) -> Result<i64, RpcError> {
        Ok(json_i64(&self.fetch(call)?))
    }

    fn flag(&self, call: &str) -> Result<bool, RpcError> {
        Ok(self.int(call)? != 0)
    }

    fn column(&self, call: &str) -> Result<Vec<String>, RpcError> {
        Ok(json_rows(&self.fetch(call)?)
            .iter()
            .filter_map(|row| row.first().map(json_text))
            .collect())
    }

    fn custom_time(&self, key: &str) -> Result<i64, RpcError> {
        self.int(&format!("d.custom={}", key))
    }

    /// Enabled announce URLs, in tracker order.
    pub fn announce_urls(&self) -> Result<Vec<String>, RpcError> {
        Ok(json_rows(&self.fetch(TRACKER_CALL)?)
            .iter()
            .filter(|row| row.get(1).map_or(false, |enabled| json_i64(enabled) != 0))
            .filter_map(|row| row.first().map(json_text))
            .collect())
    }

    fn alias(&self) -> Result<Option<String>, RpcError> {
        let settings = self.engine.settings();
        let memo = self.text("d.custom=memo_alias")?;
        let alias = if memo.is_empty() {
            match self.announce_urls()?.first() {
                Some(url) => settings.map_announce_to_alias(url),
                None => return Ok(None),
            }
        } else {
            settings.map_announce_to_alias(&memo)
        };
        Ok(Some(alias).filter(|alias| !alias.is_empty()))
    }

    fn datapath(&self) -> Result<String, RpcError> {
        let directory = self.text("d.directory=")?;
        if self.flag("d.is_multi_file=")? {
            return Ok(directory);
        }
        let name = self.text("d.name=")?;
        Ok(Path::new(&directory).join(name).display().to_string())
    }

    /// Timestamp from a command the daemon config may not define.
    fn optional_timestamp(&self, method: &str) -> Result<i64, RpcError> {
        if self.engine.settings().safety_checks_enabled && !self.engine.has_method(method)? {
            warn!(
                "Method '{}' does not exist! Add it to rtorrent.rc to use this field.",
                method
            );
            return Ok(0);
        }
        self.int(&format!("{}=", method))
    }

    fn activations(&self) -> Result<String, RpcError> {
        if self.engine.settings().safety_checks_enabled
            && !self.engine.has_method("pyro._activations.append")?
        {
            warn!("Method 'pyro._activations.append' does not exist! Activation history is not recorded.");
        }
        self.text("d.custom=activations")
    }

    fn leechtime(&self) -> Result<Option<i64>, RpcError> {
        let completed = self.custom_time("tm_completed")? as f64;
        let now = now();
        match interval_sum(&self.activations()?, None, Some(completed), now) {
            Some(total) if total > 0 => Ok(Some(total)),
            _ => {
                let started = self.custom_time("tm_started")? as f64;
                Ok(duration(started, completed, now).map(|d| d as i64))
            }
        }
    }

    fn seedtime(&self) -> Result<Option<i64>, RpcError> {
        if !self.flag("d.complete=")? {
            return Ok(None);
        }
        let completed = self.custom_time("tm_completed")? as f64;
        Ok(interval_sum(&self.activations()?, Some(completed), None, now()))
    }

    fn stopped(&self) -> Result<i64, RpcError> {
        let activations = self.text("d.custom=activations")?;
        Ok(interval_split(&activations, Some('P'))
            .first()
            .map_or(0, |(_, ts)| *ts as i64))
    }

    /// File types making up at least `limit` percent of the item's size.
    fn kind(&self, limit: u32) -> Result<BTreeSet<String>, RpcError> {
        let cached = self.text("d.custom=kind")?;
        let histogram = if cached.trim().is_empty() {
            let rows = json_rows(&self.fetch(FILE_SIZES_CALL)?);
            file_types(rows.iter().filter_map(|row| {
                Some((json_text(row.first()?), json_i64(row.get(1)?)))
            }))
        } else {
            parse_histogram(&cached)
        };
        Ok(histogram
            .into_iter()
            .filter(|(percent, ext)| !ext.is_empty() && *percent >= limit)
            .map(|(_, ext)| ext)
            .collect())
    }

    fn value(&self, name: &str) -> anyhow::Result<Value> {
        Ok(match name {
            "hash" => Value::Str(self.hash.clone()),
            "name" => self.text("d.name=")?.into(),
            "size" => self.int("d.size_bytes=")?.into(),
            "prio" => self.int("d.priority=")?.into(),
            "message" => self.text("d.message=")?.into(),
            "tracker" => self.announce_urls()?.into_iter().next().into(),
            "alias" => self.alias()?.into(),
            "is_private" => self.flag("d.is_private=")?.into(),
            "is_open" => self.flag("d.is_open=")?.into(),
            "is_active" => self.flag("d.is_active=")?.into(),
            "is_complete" => self.flag("d.complete=")?.into(),
            "is_multi_file" => self.flag("d.is_multi_file=")?.into(),
            "is_ignored" => self.flag("d.ignore_commands=")?.into(),
            "directory" => self.text("d.directory=")?.into(),
            "path" => self.datapath()?.into(),
            "metafile" => self.text("d.tied_to_file=")?.into(),
            "files" => Value::List(self.column(FILES_CALL)?),
            "fno" => self.int("d.size_files=")?.into(),
            "done" => {
                let size = self.int("d.size_bytes=")?;
                let completed = self.int("d.completed_bytes=")?;
                let percent = if size > 0 {
                    completed as f64 * 100.0 / size as f64
                } else {
                    0.0
                };
                percent.into()
            }
            "ratio" => (self.int("d.ratio=")? as f64 / 1000.0).into(),
            "uploaded" => self.int("d.up.total=")?.into(),
            "xfer" => (self.int("d.up.rate=")? + self.int("d.down.rate=")?).into(),
            "down" => self.int("d.down.rate=")?.into(),
            "up" => self.int("d.up.rate=")?.into(),
            "throttle" => self.text("d.throttle_name=")?.into(),
            "loaded" => self.custom_time("tm_loaded")?.into(),
            "started" => self.custom_time("tm_started")?.into(),
            "completed" => self.custom_time("tm_completed")?.into(),
            "last_xfer" => self.optional_timestamp("d.timestamp.last_xfer")?.into(),
            "active" => self.optional_timestamp("d.timestamp.last_active")?.into(),
            "stopped" => self.stopped()?.into(),
            "leechtime" => self.leechtime()?.into(),
            "seedtime" => self.seedtime()?.into(),
            "tagged" => Value::Set(
                self.text("d.custom=tags")?
                    .to_lowercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            ),
            "views" => Value::Set(json_strings(&self.fetch("d.views=")?)),
            "kind" => Value::Set(self.kind(0)?),
            "label" => self.text("d.custom1=")?.into(),
            _ => self.dynamic_value(name)?,
        })
    }

    fn dynamic_value(&self, name: &str) -> anyhow::Result<Value> {
        if let Some(limit) = name.strip_prefix("kind_") {
            return Ok(Value::Set(self.kind(limit.parse()?)?));
        }
        if let Some(property) = name.strip_prefix("guessit_") {
            return Ok(guess(&self.text("d.name=")?).get(property).into());
        }

        let field = resolve_field(self.engine.fields(), name)?;
        let call = field
            .requires
            .first()
            .ok_or_else(|| anyhow!("Field '{}' has no daemon call", name))?;
        let raw = self.fetch(call)?;
        Ok(match (field.matcher, field.value_type) {
            (MatcherKind::Files, _) => Value::List(
                json_rows(&raw)
                    .iter()
                    .filter_map(|row| row.first().map(json_text))
                    .collect(),
            ),
            (_, ValueType::Int) => json_i64(&raw).into(),
            _ => json_text(&raw).into(),
        })
    }
}

impl Item for TorrentItem<'_> {
    fn attribute(&self, name: &str) -> rtq_query::Result<Value> {
        self.value(name)
            .map_err(|e| QueryError::attribute(name, format!("{:#}", e)))
    }
}

impl std::fmt::Debug for TorrentItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentItem")
            .field("hash", &self.hash)
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Text view of a call result; integers and flags as the daemon prints them.
pub fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
        other => other.to_string(),
    }
}

/// Integer view of a call result, 0 for anything unparseable.
pub fn json_i64(value: &JsonValue) -> i64 {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        JsonValue::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn json_rows(value: &JsonValue) -> Vec<Vec<JsonValue>> {
    match value {
        JsonValue::Array(rows) => rows
            .iter()
            .map(|row| match row {
                JsonValue::Array(columns) => columns.clone(),
                other => vec![other.clone()],
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn json_strings(value: &JsonValue) -> BTreeSet<String> {
    match value {
        JsonValue::Array(values) => values.iter().map(json_text).filter(|s| !s.is_empty()).collect(),
        other => json_text(other).split_whitespace().map(str::to_string).collect(),
    }
}

fn event_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z][0-9]+").unwrap())
}

/// Events of an activation history like `R1283008245P1283008268`, latest first.
pub fn interval_split(interval: &str, only: Option<char>) -> Vec<(char, f64)> {
    let mut events: Vec<(char, f64)> = event_re()
        .find_iter(interval)
        .map(|m| m.as_str())
        .filter(|event| only.map_or(true, |kind| event.starts_with(kind)))
        .filter_map(|event| {
            let kind = event.chars().next()?;
            Some((kind, event[1..].parse().ok()?))
        })
        .collect();
    events.reverse();
    events
}

/// Total time between "R"esume and following "P"ause events, clipped to the
/// window from `start` to `end` (or now). `None` without any interval.
pub fn interval_sum(interval: &str, start: Option<f64>, end: Option<f64>, now: f64) -> Option<i64> {
    let end = end.filter(|e| *e != 0.0).unwrap_or(now);
    let start = start.filter(|s| *s != 0.0);
    let mut events = interval_split(interval, None);
    let mut total = None;

    while let Some((kind, resumed)) = events.pop() {
        if kind != 'R' {
            continue;
        }
        let resumed = start.map_or(resumed, |s| resumed.max(s));
        let paused = match events.last().copied() {
            Some(('P', paused)) => {
                events.pop();
                paused.min(end)
            }
            Some(_) => continue,
            None => end,
        };
        if resumed >= paused {
            continue;
        }
        *total.get_or_insert(0.0) += paused - resumed;
    }
    total.map(|t: f64| t as i64)
}

/// Time between two timestamps, or since `start` when `end` is unset.
pub fn duration(start: f64, end: f64, now: f64) -> Option<f64> {
    match (start != 0.0, end != 0.0) {
        (true, true) if start > end => None,
        (true, true) => Some(end - start),
        (true, false) => Some(now - start),
        _ => None,
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.to_lowercase();
    let numbered_rar = ext.len() > 1
        && ext.starts_with('r')
        && ext[1..].chars().all(|c| c.is_ascii_digit());
    match ext.as_str() {
        _ if numbered_rar => "rar".to_string(),
        "jpeg" => "jpg".to_string(),
        "mpeg" => "mpg".to_string(),
        _ => ext,
    }
}

/// Size share in percent per file extension, largest first.
pub fn file_types(files: impl IntoIterator<Item = (String, i64)>) -> Vec<(u32, String)> {
    let mut sizes: IndexMap<String, i64> = IndexMap::new();
    for (path, size) in files {
        let ext = Path::new(&path)
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()))
            .unwrap_or_default();
        *sizes.entry(ext).or_insert(0) += size;
    }
    let total: i64 = sizes.values().sum();
    let mut histogram: Vec<(u32, String)> = sizes
        .into_iter()
        .map(|(ext, size)| {
            let percent = if total > 0 {
                (size as f64 * 100.0 / total as f64 + 0.499) as u32
            } else {
                0
            };
            (percent, ext)
        })
        .collect();
    histogram.sort_by(|a, b| b.cmp(a));
    histogram
}

/// Parse a cached histogram like `80%_flac 20%_jpg`.
fn parse_histogram(text: &str) -> Vec<(u32, String)> {
    text.split_whitespace()
        .filter_map(|entry| {
            let (percent, ext) = entry.split_once("%_")?;
            Some((percent.parse().ok()?, ext.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interval_split() {
        let events = interval_split("R100P200R300", None);
        assert_eq!(events, vec![('R', 300.0), ('P', 200.0), ('R', 100.0)]);
        assert_eq!(interval_split("R100P200R300P400", Some('P'))[0], ('P', 400.0));
        assert!(interval_split("", None).is_empty());
    }

    #[test]
    fn test_interval_sum() {
        assert_eq!(interval_sum("R100P200R300P450", None, None, 1000.0), Some(250));
        // still running, counts up to the window end
        assert_eq!(interval_sum("R100P200R300", None, Some(400.0), 1000.0), Some(200));
        assert_eq!(interval_sum("R100P200R300", None, None, 1000.0), Some(800));
        assert_eq!(interval_sum("R100P200R300P450", Some(350.0), None, 1000.0), Some(100));
        assert_eq!(interval_sum("R100R200", None, Some(150.0), 1000.0), None);
        assert_eq!(interval_sum("", None, None, 1000.0), None);
    }

    #[test]
    fn test_duration() {
        assert_eq!(duration(100.0, 250.0, 1000.0), Some(150.0));
        assert_eq!(duration(300.0, 250.0, 1000.0), None);
        assert_eq!(duration(100.0, 0.0, 1000.0), Some(900.0));
        assert_eq!(duration(0.0, 250.0, 1000.0), None);
    }

    #[test]
    fn test_file_types() {
        let files = vec![
            ("Album/01.FLAC".to_string(), 700),
            ("Album/02.flac".to_string(), 100),
            ("Album/cover.jpeg".to_string(), 150),
            ("Album/data.r01".to_string(), 50),
            ("Album/README".to_string(), 0),
        ];
        assert_eq!(
            file_types(files),
            vec![
                (80, "flac".to_string()),
                (15, "jpg".to_string()),
                (5, "rar".to_string()),
                (0, String::new()),
            ]
        );
        assert_eq!(
            parse_histogram("80%_flac 20%_jpg junk"),
            vec![(80, "flac".to_string()), (20, "jpg".to_string())]
        );
    }

    #[test]
    fn test_json_conversions() {
        assert_eq!(json_i64(&json!("1700000000")), 1_700_000_000);
        assert_eq!(json_i64(&json!("")), 0);
        assert_eq!(json_i64(&json!(2.9)), 2);
        assert_eq!(json_text(&json!(42)), "42");
        assert_eq!(json_text(&JsonValue::Null), "");
        let views = json_strings(&json!(["seeding", "", "linux"]));
        assert_eq!(views.into_iter().collect::<Vec<_>>(), ["linux", "seeding"]);
    }
}
