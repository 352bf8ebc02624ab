//! Scene release name parsing for the `guessit_*` fields.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

const VIDEO_EXTENSIONS: &[&str] = &[
    "avi", "mkv", "m4v", "vob", "mp4", "mpg", "mpeg", "m2ts", "ts", "ogv", "wmv",
];

fn episode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<title>.+?)[._ ](?:S(?P<season>\d{1,2})E(?P<episode>\d{2,3})|(?P<season2>\d{1,2})x(?P<episode2>\d{2,3}))(?:[._ -](?P<rest>.*))?$",
        )
        .unwrap()
    })
}

fn movie_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<title>.+?)[._ ][\[(]?(?P<year>(?:19|20)\d{2})[)\]]?(?:[._ -](?P<rest>.*))?$",
        )
        .unwrap()
    })
}

fn screen_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(480p|576p|720p|1080p|1080i|2160p)\b").unwrap())
}

fn source_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(HDTV|PDTV|DSR|WEB-DL|WEB\.DL|WEBRip|Blu-?ray|BDRip|BRRip|HDRip|DVDRip)\b")
            .unwrap()
    })
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(?P<group>[A-Za-z0-9]+)$").unwrap())
}

/// Properties guessed from a release name, e.g. `title`, `season` or `screen_size`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guess {
    properties: IndexMap<&'static str, String>,
}

impl Guess {
    /// The property's value, empty when it could not be determined.
    pub fn get(&self, property: &str) -> &str {
        self.properties.get(property).map_or("", String::as_str)
    }

    pub fn properties(&self) -> &IndexMap<&'static str, String> {
        &self.properties
    }

    fn set(&mut self, property: &'static str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.properties.insert(property, value);
        }
    }
}

fn clean_title(raw: &str) -> String {
    raw.replace(['.', '_'], " ").trim().to_string()
}

/// Drop leading zeros from a numeric part.
fn number(raw: &str) -> String {
    raw.parse::<u32>().map_or_else(|_| raw.to_string(), |n| n.to_string())
}

pub fn guess(name: &str) -> Guess {
    let mut result = Guess::default();
    let mut stem = name.trim();
    if let Some((base, ext)) = stem.rsplit_once('.') {
        if VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            result.set("container", ext.to_lowercase());
            stem = base;
        }
    }

    if let Some(caps) = episode_re().captures(stem) {
        result.set("title", clean_title(&caps["title"]));
        let season = caps.name("season").or_else(|| caps.name("season2"));
        let episode = caps.name("episode").or_else(|| caps.name("episode2"));
        result.set("season", season.map(|m| number(m.as_str())).unwrap_or_default());
        result.set("episode", episode.map(|m| number(m.as_str())).unwrap_or_default());
        result.set("type", "episode");
    } else if let Some(caps) = movie_re().captures(stem) {
        result.set("title", clean_title(&caps["title"]));
        result.set("year", &caps["year"]);
        result.set("type", "movie");
    } else {
        result.set("title", clean_title(stem));
    }

    if let Some(m) = screen_size_re().find(stem) {
        result.set("screen_size", m.as_str().to_lowercase());
    }
    if let Some(m) = source_re().find(stem) {
        result.set("source", m.as_str());
    }
    if let Some(caps) = group_re().captures(stem) {
        result.set("release_group", &caps["group"]);
    }
    result
}
