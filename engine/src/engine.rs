use crate::config::Settings;
use crate::error::RpcError;
use crate::fields;
use crate::item::TorrentItem;
use crate::rpc::{Call, JsonRpcClient, RpcClient};
use anyhow::{anyhow, Context, Result};
use indexmap::IndexSet;
use log::{debug, warn};
use rtq_query::{required_calls, FastQuery, FieldLookup, FieldRegistry, MatcherNode};
use serde_json::Value as JsonValue;
use std::sync::{Mutex, PoisonError};

/// Calls every item row carries.
pub const BASE_FIELDS: &[&str] = &["d.hash="];

/// Calls fetched when the caller names no fields.
pub const PREFETCH_FIELDS: &[&str] = &[
    "d.hash=",
    "d.name=",
    "d.is_private=",
    "d.is_multi_file=",
    "d.tracker_size=",
    "d.size_bytes=",
    "d.complete=",
    "d.tied_to_file=",
    "d.base_path=",
    "d.custom=memo_alias",
    "d.custom=tm_completed",
    "d.custom=tm_loaded",
    "d.custom=tm_started",
    "d.down.rate=",
    "d.down.total=",
    "d.is_active=",
    "d.is_open=",
    "d.message=",
    "d.ratio=",
    "d.up.rate=",
    "d.up.total=",
];

/// Split a call string like `d.custom=tags` or `t.multicall=,t.url=` into
/// the method and its parameters, not including the target.
pub fn split_call(call: &str) -> (&str, Vec<JsonValue>) {
    match call.split_once('=') {
        Some((method, "")) => (method, Vec::new()),
        Some((method, rest)) => (
            method,
            rest.split(',').map(|arg| JsonValue::String(arg.to_string())).collect(),
        ),
        None => (call, Vec::new()),
    }
}

/// The info hash if a view name addresses a single item (`#<hash>` or 40 hex digits).
pub fn hash_view(view: &str) -> Option<&str> {
    if let Some(hash) = view.strip_prefix('#') {
        return Some(hash);
    }
    (view.len() == 40 && view.chars().all(|c| c.is_ascii_hexdigit())).then_some(view)
}

/// Sorted daemon calls to prefetch for the named fields, the base calls included.
pub fn prefetch_calls<S: AsRef<str>>(names: &[S], fields: &dyn FieldLookup) -> rtq_query::Result<Vec<String>> {
    let mut calls: Vec<String> = if names.is_empty() {
        PREFETCH_FIELDS.iter().map(|c| c.to_string()).collect()
    } else {
        BASE_FIELDS
            .iter()
            .map(|c| c.to_string())
            .chain(required_calls(names, fields)?)
            .collect()
    };
    calls.sort();
    calls.dedup();
    Ok(calls)
}

/// Query driver for one daemon.
pub struct Engine {
    client: Box<dyn RpcClient>,
    fields: FieldRegistry,
    settings: Settings,
    methods: Mutex<Option<IndexSet<String>>>,
}

impl Engine {
    pub fn new(client: Box<dyn RpcClient>, settings: Settings) -> Self {
        Self {
            client,
            fields: fields::registry(),
            settings,
            methods: Mutex::new(None),
        }
    }

    /// Connect to the configured (or autodetected) endpoint.
    pub fn connect(settings: Settings) -> Result<Self> {
        let url = settings.resolve_scgi_url()?;
        let client = JsonRpcClient::connect(&url, settings.rpc_timeout())
            .with_context(|| format!("Failed to set up a connection to {}", url))?;
        debug!("Using daemon at {}", client.url());
        Ok(Self::new(Box::new(client), settings))
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }

    pub(crate) fn client(&self) -> &dyn RpcClient {
        self.client.as_ref()
    }

    /// Whether the daemon knows a command; the method list is fetched once.
    pub fn has_method(&self, method: &str) -> Result<bool, RpcError> {
        let mut methods = self.methods.lock().unwrap_or_else(PoisonError::into_inner);
        if methods.is_none() {
            let listed = match self.client.call("system.listMethods", Vec::new())? {
                JsonValue::Array(names) => names
                    .iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect(),
                other => {
                    return Err(RpcError::protocol(format!(
                        "Expected a method list, got {}",
                        other
                    )))
                }
            };
            *methods = Some(listed);
        }
        Ok(methods.as_ref().is_some_and(|m| m.contains(method)))
    }

    /// The pre-filter to send with the item query, if any can and may be used.
    pub fn pre_filter(&self, matcher: &MatcherNode) -> Result<Option<String>, RpcError> {
        let level = self.settings.fast_query;
        if level == FastQuery::Off {
            return Ok(None);
        }
        let safety_checks = self.settings.safety_checks_enabled;
        if safety_checks && !self.has_method("d.multicall.filtered")? {
            warn!("Fast query enabled but host does not support 'd.multicall.filtered', disabling fast query.");
            return Ok(None);
        }

        let pre_filter = matcher.pre_filter(level);
        if pre_filter.is_empty() {
            return Ok(None);
        }
        debug!("Created pre-filter: {}", pre_filter);
        if safety_checks
            && pre_filter.contains("string.contains_i")
            && !self.has_method("string.contains_i")?
        {
            warn!("Method 'string.contains_i' does not exist!");
            warn!(
                "Fast query {:?} would return an empty list, disabling fast query.",
                pre_filter
            );
            return Ok(None);
        }
        Ok(Some(pre_filter))
    }

    fn fetch_rows(
        &self,
        view: &str,
        matcher: Option<&MatcherNode>,
        calls: &[String],
    ) -> Result<Vec<JsonValue>, RpcError> {
        if let Some(hash) = hash_view(view) {
            let batch: Vec<Call> = calls
                .iter()
                .map(|call| {
                    let (method, args) = split_call(call);
                    let mut params = vec![JsonValue::String(hash.to_string())];
                    params.extend(args);
                    Call::new(method, params)
                })
                .collect();
            return Ok(vec![JsonValue::Array(self.client.multicall(&batch)?)]);
        }

        let mut method = "d.multicall2";
        let mut params = vec![JsonValue::String(String::new()), JsonValue::String(view.to_string())];
        if let Some(pre_filter) = matcher.map(|m| self.pre_filter(m)).transpose()?.flatten() {
            method = "d.multicall.filtered";
            params.push(JsonValue::String(pre_filter));
        }
        params.extend(calls.iter().map(|call| JsonValue::String(call.clone())));

        match self.client.call(method, params)? {
            JsonValue::Array(rows) => Ok(rows),
            other => Err(RpcError::protocol(format!(
                "Expected a list of items from {}, got {}",
                method, other
            ))),
        }
    }

    /// Items of a view that match, with `prefetch` calls loaded up front.
    ///
    /// An empty `prefetch` loads the default call set. Items are matched
    /// locally even when the daemon already applied a pre-filter.
    pub fn items(
        &self,
        view: &str,
        matcher: Option<&MatcherNode>,
        prefetch: &[String],
    ) -> Result<Vec<TorrentItem<'_>>> {
        let calls: Vec<String> = if prefetch.is_empty() {
            prefetch_calls::<&str>(&[], &self.fields)?
        } else {
            let mut calls: Vec<String> = BASE_FIELDS
                .iter()
                .map(|c| c.to_string())
                .chain(prefetch.iter().cloned())
                .collect();
            calls.sort();
            calls.dedup();
            calls
        };

        let rows = self
            .fetch_rows(view, matcher, &calls)
            .with_context(|| format!("While getting download items from {}", self.url()))?;
        debug!("Got {} items with {} attributes", rows.len(), calls.len());

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let values = match row {
                JsonValue::Array(values) => values,
                other => return Err(anyhow!("Malformed item row from {}: {}", self.url(), other)),
            };
            let item = TorrentItem::new(self, calls.iter().cloned().zip(values))?;
            if let Some(matcher) = matcher {
                if !matcher.matches(&item)? {
                    continue;
                }
            }
            items.push(item);
        }
        Ok(items)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.url())
            .field("fast_query", &self.settings.fast_query)
            .finish()
    }
}
