use super::{Comparison, Candidate};
use crate::error::{QueryError, Result};
use crate::field::FieldDescriptor;
use crate::item::{Item, Value};
use crate::prefilter::{self, Command, PreFilter};
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

static TEMPLATE_FIELD: OnceLock<Regex> = OnceLock::new();
static STAR_RUN: OnceLock<Regex> = OnceLock::new();

fn template_field() -> &'static Regex {
    TEMPLATE_FIELD.get_or_init(|| Regex::new(r"\{\{\s*(?:d\.)?(\w+)\s*\}\}").unwrap())
}

fn star_run() -> &'static Regex {
    STAR_RUN.get_or_init(|| Regex::new(r"\*{2,}").unwrap())
}

/// Case-insensitive shell glob, also accepting the pattern as a literal.
#[derive(Debug)]
struct Glob {
    pattern: Option<Pattern>,
    literal: String,
}

impl Glob {
    fn new(text: &str) -> Self {
        let literal = text.to_lowercase();
        // `**` has a special meaning for path globs, here it is just `*`
        let pattern = Pattern::new(&star_run().replace_all(&literal, "*")).ok();
        Self { pattern, literal }
    }

    fn matches(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.matches_with(&value, MATCH_OPTIONS))
            || value == self.literal
    }
}

#[derive(Debug)]
enum Strategy {
    Empty,
    Always,
    NonEmpty,
    Regex(Regex),
    Glob(Glob),
    /// `{{ field }}` placeholders, rendered per item into a glob.
    Template(String),
}

/// Glob, `/regex/` or templated pattern on a string field.
#[derive(Debug)]
pub(crate) struct PatternFilter {
    source: String,
    strategy: Strategy,
}

fn regex_body(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('/')?;
    inner.strip_suffix("/i").or_else(|| inner.strip_suffix('/'))
}

impl PatternFilter {
    pub fn new(field: &str, text: &str) -> Result<Self> {
        let strategy = if text.is_empty() {
            Strategy::Empty
        } else if let Some(body) = regex_body(text) {
            match body {
                "" | ".*" => Strategy::Always,
                ".+" => Strategy::NonEmpty,
                _ => Strategy::Regex(
                    RegexBuilder::new(body)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            QueryError::invalid_value(field, text, format!("bad regex: {}", e))
                        })?,
                ),
            }
        } else if text.contains("{{") && text.contains("}}") {
            Strategy::Template(text.to_string())
        } else if text.chars().all(|c| c == '*') {
            Strategy::Always
        } else {
            Strategy::Glob(Glob::new(text))
        };

        Ok(Self {
            source: text.to_string(),
            strategy,
        })
    }
}

/// Substitute `{{ name }}` and `{{ d.name }}` with the item's attributes.
fn render_template(template: &str, item: &dyn Item) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in template_field().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&item.attribute(name.as_str())?.as_text());
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

impl Comparison for PatternFilter {
    fn kind(&self) -> &'static str {
        "PatternFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        let value = candidate.value()?;
        let text = value.as_text();
        Ok(match &self.strategy {
            Strategy::Empty => text.is_empty(),
            Strategy::Always => true,
            Strategy::NonEmpty => !text.is_empty(),
            Strategy::Regex(regex) => regex.is_match(&text),
            Strategy::Glob(glob) => glob.matches(&text),
            Strategy::Template(template) => {
                Glob::new(&render_template(template, candidate.item)?).matches(&text)
            }
        })
    }

    fn pre_filter_eq(&self, _field: &FieldDescriptor, key: &str) -> Option<PreFilter> {
        match &self.strategy {
            Strategy::Empty => Some(PreFilter::exact(Command::empty(key))),
            Strategy::NonEmpty => Some(PreFilter::superset(Command::empty(key).negate())),
            Strategy::Regex(regex) => {
                let needle = prefilter::regex_needle(regex.as_str())?;
                prefilter::contains_needle(key, &needle)
            }
            Strategy::Glob(_) => {
                prefilter::contains_needle(key, &prefilter::glob_needle(&self.source))
            }
            Strategy::Always | Strategy::Template(_) => None,
        }
    }
}

/// Matches when any file path of an item matches the glob.
#[derive(Debug)]
pub(crate) struct FilesFilter {
    glob: Glob,
}

impl FilesFilter {
    pub fn new(text: &str) -> Self {
        Self {
            glob: Glob::new(text),
        }
    }
}

impl Comparison for FilesFilter {
    fn kind(&self) -> &'static str {
        "FilesFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        Ok(match candidate.value()? {
            Value::None => false,
            Value::List(paths) => paths.iter().any(|path| self.glob.matches(path)),
            Value::Set(paths) => paths.iter().any(|path| self.glob.matches(path)),
            other => self.glob.matches(&other.as_text()),
        })
    }
}
