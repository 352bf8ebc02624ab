use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use rtq_query::FastQuery;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "RTQ_CONF";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Daemon endpoint; autodetected from `rtorrent_rc` when unset.
    pub scgi_url: Option<String>,
    #[serde(default)]
    pub fast_query: FastQuery,
    #[serde(default = "default_safety_checks")]
    pub safety_checks_enabled: bool,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_seconds: u64,
    #[serde(default = "default_rtorrent_rc")]
    pub rtorrent_rc: String,
    /// Tracker alias to announce URLs or domains.
    #[serde(default)]
    pub aliases: IndexMap<String, Vec<String>>,
    /// Named daemon endpoints, usable wherever a URL is expected.
    #[serde(default)]
    pub connections: IndexMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scgi_url: None,
            fast_query: FastQuery::default(),
            safety_checks_enabled: default_safety_checks(),
            rpc_timeout_seconds: default_rpc_timeout(),
            rtorrent_rc: default_rtorrent_rc(),
            aliases: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `$RTQ_CONF`, or `<config dir>/rtq/config.toml`, falling back to defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    /// The endpoint to connect to.
    ///
    /// A configured URL that names an entry in `connections` is replaced by
    /// that entry. Without a configured URL, the SCGI settings of the daemon's
    /// own rc file are used, preferring the Unix socket.
    pub fn resolve_scgi_url(&self) -> Result<String> {
        if let Some(url) = self.scgi_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(self.connections.get(url).cloned().unwrap_or_else(|| url.to_string()));
        }
        let rcfile = expand_user(&self.rtorrent_rc);
        if !rcfile.exists() {
            bail!(
                "No daemon URL configured, and rTorrent RC file '{}' doesn't exist",
                rcfile.display()
            );
        }
        match scgi_url_from_rtorrent_rc(&rcfile)? {
            Some(url) => Ok(url),
            None => bail!(
                "Unable to find an SCGI setting in '{}', set scgi_url in the config",
                rcfile.display()
            ),
        }
    }

    /// Tracker alias for an announce URL, or its second-level domain.
    pub fn map_announce_to_alias(&self, url: &str) -> String {
        if self.aliases.contains_key(url) {
            return url.to_string();
        }
        if let Some(alias) = self.find_alias(|u| u == url) {
            return alias;
        }

        let (scheme, netloc) = split_url(url);
        let server = format!("{}://{}/", scheme, netloc);
        if !netloc.is_empty() {
            if let Some(alias) = self.find_alias(|u| u.starts_with(&server)) {
                return alias;
            }
        }

        let host = netloc.split(':').next().unwrap_or_default();
        let labels: Vec<&str> = host.split('.').collect();
        let domain = labels[labels.len().saturating_sub(2)..].join(".");
        self.find_alias(|u| u == domain).unwrap_or(domain)
    }

    fn find_alias(&self, pred: impl Fn(&str) -> bool) -> Option<String> {
        self.aliases
            .iter()
            .find(|(_, urls)| urls.iter().any(|u| pred(u)))
            .map(|(alias, _)| alias.clone())
    }
}

fn default_safety_checks() -> bool {
    true
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_rtorrent_rc() -> String {
    "~/.rtorrent.rc".to_string()
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rtq").join("config.toml"))
}

fn expand_user(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// `(scheme, netloc)` of a URL, empty parts when absent.
fn split_url(url: &str) -> (&str, &str) {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
    let netloc = rest.split(['/', '?', '#']).next().unwrap_or_default();
    (scheme, netloc)
}

fn private_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([.\w]+),\s*private\|const\|string,\s*\(cat,(.*)\)$").unwrap()
    })
}

fn cat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(cat,(.*)\)$").unwrap())
}

fn cat_arg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)"|\(([^()]*)\)"#).unwrap())
}

/// Evaluate the arguments of a `(cat,...)` expression, looking up `(name)`
/// references in previously defined private strings.
fn expand_cat(args: &str, replacements: &IndexMap<String, String>) -> String {
    cat_arg_re()
        .captures_iter(args)
        .map(|caps| match (caps.get(1), caps.get(2)) {
            (Some(literal), _) => literal.as_str().to_string(),
            (None, Some(name)) => replacements
                .get(name.as_str().trim())
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        })
        .collect()
}

/// Key/value pairs of an rtorrent.rc file, with naive expansion of
/// `method.insert = name, private|const|string, (cat, ...)` definitions.
pub fn expand_rc(content: &str) -> Vec<(String, String)> {
    let mut data = Vec::new();
    let mut replacements = IndexMap::new();
    let mut continued = false;

    for line in content.lines().map(str::trim) {
        let was_continued = continued;
        continued = line.ends_with('\\');
        if line.is_empty() || was_continued || line.starts_with('#') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            debug!("Ignored invalid rc line {:?}", line);
            continue;
        };
        let key = key.trim().to_string();
        let mut val = val.trim().to_string();

        if let Some(caps) = private_string_re().captures(&val) {
            let expanded = expand_cat(&caps[2], &replacements);
            replacements.insert(caps[1].to_string(), expanded.clone());
            val = expanded;
        } else if is_scgi_key(&key) {
            if let Some(caps) = cat_re().captures(&val) {
                val = expand_cat(&caps[1], &replacements);
            }
        }
        data.push((key, val));
    }
    data
}

fn is_scgi_key(key: &str) -> bool {
    matches!(
        key,
        "network.scgi.open_local" | "scgi_local" | "network.scgi.open_port" | "scgi_port"
    )
}

/// SCGI URL configured in an rtorrent.rc file, preferring the Unix socket.
pub fn scgi_url_from_rtorrent_rc(rcfile: &Path) -> Result<Option<String>> {
    debug!("Loading rtorrent config from '{}'", rcfile.display());
    let content = fs_err::read_to_string(rcfile)
        .with_context(|| format!("Failed to read rTorrent RC file: {}", rcfile.display()))?;

    let mut scgi_local = String::new();
    let mut scgi_port = String::new();
    for (key, val) in expand_rc(&content) {
        match key.as_str() {
            "network.scgi.open_port" | "scgi_port" => {
                debug!("rtorrent.rc: {} = {}", key, val);
                scgi_port = val;
            }
            "network.scgi.open_local" | "scgi_local" => {
                debug!("rtorrent.rc: {} = {}", key, val);
                scgi_local = val;
            }
            _ => {}
        }
    }

    if !scgi_local.is_empty() {
        if !scgi_local.starts_with("scgi+unix://") {
            scgi_local = format!("scgi+unix://{}", expand_user(&scgi_local).display());
        }
        return Ok(Some(scgi_local));
    }
    if !scgi_port.is_empty() {
        if !scgi_port.starts_with("scgi://") {
            scgi_port = format!("scgi://{}", scgi_port);
        }
        return Ok(Some(scgi_port));
    }
    Ok(None)
}
