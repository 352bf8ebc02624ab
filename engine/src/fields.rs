//! Catalogue of torrent fields known to the filter language.

use rtq_query::{FieldDescriptor, FieldRegistry, MatcherKind, QueryError, Result, ValueType};

/// Announce URLs with their enabled flag.
pub const TRACKER_CALL: &str = "t.multicall=,t.url=,t.is_enabled=";
/// Paths of all files in an item.
pub const FILES_CALL: &str = "f.multicall=,f.path=";
/// Paths and sizes of all files, for the kind histogram.
pub const FILE_SIZES_CALL: &str = "f.multicall=,f.path=,f.size_bytes=";

/// `d.*` commands whose names use dots where field names use underscores.
const DOTTED_D_CALLS: &[&str] = &[
    "d.custom_items",
    "d.custom_keys",
    "d.down_rate",
    "d.down_sequential",
    "d.down_total",
    "d.group_name",
    "d.skip_rate",
    "d.skip_total",
    "d.up_rate",
    "d.up_total",
    "d.views_has",
];

fn field(name: &str, value_type: ValueType, matcher: MatcherKind, doc: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, value_type, matcher).with_doc(doc)
}

/// Built-in fields, in display order.
pub fn core_fields() -> Vec<FieldDescriptor> {
    use MatcherKind as M;
    use ValueType as V;

    vec![
        field("hash", V::Str, M::Pattern, "info hash")
            .with_prefilter("d.hash=")
            .with_requires(&["d.hash="]),
        field("name", V::Str, M::Pattern, "name (file or root directory)")
            .with_prefilter("d.name=")
            .with_requires(&["d.name="]),
        field("size", V::ByteSize, M::ByteSize, "data size")
            .with_prefilter("d.size_bytes=")
            .with_requires(&["d.size_bytes="]),
        field("prio", V::Int, M::Float, "priority (0=off, 1=low, 2=normal, 3=high)")
            .with_prefilter("d.priority=")
            .with_requires(&["d.priority="]),
        field("message", V::Str, M::Pattern, "current tracker message")
            .with_prefilter("d.message=")
            .with_requires(&["d.message="]),
        field("tracker", V::Str, M::Pattern, "first in the list of announce URLs")
            .with_requires(&[TRACKER_CALL]),
        field("alias", V::Str, M::Pattern, "tracker alias or domain")
            .with_requires(&["d.custom=memo_alias"]),
        field("is_private", V::Bool, M::Bool, "private flag set (no DHT/PEX)?")
            .with_prefilter("d.is_private=")
            .with_requires(&["d.is_private="]),
        field("is_open", V::Bool, M::Bool, "download open?")
            .with_prefilter("d.is_open=")
            .with_requires(&["d.is_open="]),
        field("is_active", V::Bool, M::Bool, "download active?")
            .with_prefilter("d.is_active=")
            .with_requires(&["d.is_active="]),
        field("is_complete", V::Bool, M::Bool, "download complete?")
            .with_prefilter("d.complete=")
            .with_requires(&["d.complete="]),
        field("is_multi_file", V::Bool, M::Bool, "single- or multi-file download?")
            .with_prefilter("d.is_multi_file=")
            .with_requires(&["d.is_multi_file="]),
        field("is_ignored", V::Bool, M::Bool, "ignore commands?")
            .with_prefilter("d.ignore_commands=")
            .with_requires(&["d.ignore_commands="]),
        field("directory", V::Str, M::Pattern, "directory containing download data")
            .with_prefilter("d.directory=")
            .with_requires(&["d.directory="]),
        field("path", V::Str, M::Pattern, "path to download data")
            .with_requires(&["d.directory=", "d.is_multi_file=", "d.name="]),
        field("metafile", V::Str, M::Pattern, "path to torrent file")
            .with_requires(&["d.tied_to_file="]),
        field("files", V::List, M::Files, "list of files in this item").with_requires(&[FILES_CALL]),
        field("fno", V::Int, M::Float, "number of files in this item")
            .with_requires(&["d.size_files="]),
        field("done", V::Float, M::Float, "completion in percent")
            .with_requires(&["d.size_bytes=", "d.completed_bytes="]),
        field("ratio", V::Float, M::Float, "normalized ratio (1:1 = 1.0)")
            .with_prefilter("d.ratio=")
            .with_scale(1000)
            .with_requires(&["d.ratio="]),
        field("uploaded", V::ByteSize, M::ByteSize, "amount of uploaded data")
            .with_prefilter("d.up.total=")
            .with_requires(&["d.up.total="]),
        field("xfer", V::ByteSize, M::ByteSize, "transfer rate")
            .with_requires(&["d.up.rate=", "d.down.rate="]),
        field("down", V::ByteSize, M::ByteSize, "download rate")
            .with_prefilter("d.down.rate=")
            .with_requires(&["d.down.rate="]),
        field("up", V::ByteSize, M::ByteSize, "upload rate")
            .with_prefilter("d.up.rate=")
            .with_requires(&["d.up.rate="]),
        field("throttle", V::Str, M::Pattern, "throttle group name (NULL=unlimited, NONE=global)")
            .with_prefilter("d.throttle_name=")
            .with_requires(&["d.throttle_name="]),
        field("loaded", V::Timestamp, M::TimeNotNull, "time metafile was loaded")
            .with_prefilter("d.custom=tm_loaded")
            .with_requires(&["d.custom=tm_loaded"]),
        field("started", V::Timestamp, M::TimeNotNull, "time download was FIRST started")
            .with_prefilter("d.custom=tm_started")
            .with_requires(&["d.custom=tm_started"]),
        field("completed", V::Timestamp, M::TimeNotNull, "time download was finished")
            .with_prefilter("d.custom=tm_completed")
            .with_requires(&["d.custom=tm_completed"]),
        field("last_xfer", V::Timestamp, M::Time, "last time data was transferred")
            .with_requires(&["d.timestamp.last_xfer="]),
        field("active", V::Timestamp, M::Time, "last time a peer was connected")
            .with_requires(&["d.timestamp.last_active="]),
        field("stopped", V::Timestamp, M::TimeNotNull, "time download was last stopped or paused")
            .with_requires(&["d.custom=activations"]),
        field("leechtime", V::Duration, M::Duration, "time taken from start to completion")
            .with_requires(&["d.custom=tm_completed", "d.custom=tm_started", "d.custom=activations"]),
        field("seedtime", V::Duration, M::Duration, "total seeding time after completion")
            .with_requires(&["d.custom=tm_completed", "d.complete=", "d.custom=activations"]),
        field("tagged", V::Set, M::TaggedAs, "has certain tags? (not related to the 'tagged' view)")
            .with_prefilter("d.custom=tags")
            .with_requires(&["d.custom=tags"]),
        field("views", V::Set, M::TaggedAs, "views this item is attached to")
            .with_prefilter("d.views=")
            .with_requires(&["d.views="]),
        field("kind", V::Set, M::TaggedAs, "ALL kinds of files in this item (the same as kind_0)")
            .with_requires(&["d.custom=kind"]),
        field("label", V::Str, M::Pattern, "ruTorrent label (alias for custom_1)")
            .with_requires(&["d.custom1="]),
    ]
}

/// `custom_<key>` reads `d.custom=<key>`, `custom1`..`custom5` and
/// `custom_1`..`custom_5` read the numbered slots.
fn generate_custom(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    let numbered = |key: &str| matches!(key, "1" | "2" | "3" | "4" | "5");
    let key = match suffix.strip_prefix('_') {
        Some(key) if !key.is_empty() => key,
        None if numbered(suffix) => suffix,
        _ => return Ok(None),
    };
    let (call, doc) = if numbered(key) {
        (format!("d.custom{}=", key), format!("custom{}", key))
    } else {
        (format!("d.custom={}", key), format!("custom attribute {}", key))
    };
    Ok(Some(
        field(name, ValueType::Str, MatcherKind::Pattern, &doc)
            .with_prefilter(call.clone())
            .with_requires(&[call]),
    ))
}

fn generate_kind(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    let limit: u32 = suffix.parse().unwrap_or(u32::MAX);
    if limit > 100 {
        return Err(QueryError::invalid_value(
            name,
            suffix,
            "kind_N: N can't be greater than 100",
        ));
    }
    Ok(Some(
        field(
            name,
            ValueType::Set,
            MatcherKind::TaggedAs,
            &format!("kinds of files that make up more than {}% of this item's size", limit),
        )
        .with_requires(&["d.custom=kind"]),
    ))
}

fn generate_guessit(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    if suffix.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        field(
            name,
            ValueType::Str,
            MatcherKind::Pattern,
            &format!("release name property {}", suffix),
        )
        .with_requires(&["d.name="]),
    ))
}

/// The `d.*` command behind a `d_<call>` field.
pub fn d_call_name(suffix: &str) -> String {
    let call = format!("d.{}", suffix);
    if DOTTED_D_CALLS.contains(&call.as_str()) {
        format!("d.{}", suffix.replace('_', "."))
    } else {
        call
    }
}

fn generate_d_call(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    if suffix.is_empty() {
        return Ok(None);
    }
    let call = d_call_name(suffix);
    let (value_type, matcher) = match call.as_str() {
        "d.size_files" => (ValueType::Int, MatcherKind::Float),
        "d.size_bytes" => (ValueType::Int, MatcherKind::ByteSize),
        _ => (ValueType::Str, MatcherKind::Pattern),
    };
    Ok(Some(
        field(
            name,
            value_type,
            matcher,
            &format!("Dynamic rpc call for {}", call),
        )
        .with_requires(&[format!("{}=", call)]),
    ))
}

fn sub_multicall(prefix: char, name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    if suffix.is_empty() {
        return Ok(None);
    }
    let call = format!("{}.{}=", prefix, suffix);
    Ok(Some(
        field(
            name,
            ValueType::List,
            MatcherKind::Files,
            &format!("Dynamic rpc call for {}.multicall={}", prefix, call),
        )
        .with_requires(&[format!("{}.multicall=,{}", prefix, call)]),
    ))
}

fn generate_file_call(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    sub_multicall('f', name, suffix)
}

fn generate_peer_call(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    sub_multicall('p', name, suffix)
}

fn generate_tracker_call(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>> {
    sub_multicall('t', name, suffix)
}

/// Registry with the core fields and all dynamic field generators.
pub fn registry() -> FieldRegistry {
    core_fields()
        .into_iter()
        .fold(FieldRegistry::new(), FieldRegistry::with_field)
        .with_generator("custom", generate_custom)
        .with_generator("kind_", generate_kind)
        .with_generator("guessit_", generate_guessit)
        .with_generator("d_", generate_d_call)
        .with_generator("f_", generate_file_call)
        .with_generator("p_", generate_peer_call)
        .with_generator("t_", generate_tracker_call)
}
