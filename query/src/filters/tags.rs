use super::{Comparison, Candidate};
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::prefilter::{self, PreFilter};
use std::collections::BTreeSet;

/// Case-insensitive filter on whitespace separated tag lists.
///
/// `tagged=foo` tests membership, `tagged=:foo` (or `=foo`) requires the tags
/// to be exactly `{foo}`, and an empty value matches untagged items.
#[derive(Debug)]
pub(crate) struct TaggedAsFilter {
    tag: String,
    exact: Option<BTreeSet<String>>,
}

impl TaggedAsFilter {
    pub fn new(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let (exact, tag) = match lowered.strip_prefix([':', '=']) {
            Some(rest) => (true, rest.to_string()),
            None => (lowered.is_empty(), lowered),
        };
        Self {
            exact: exact.then(|| tag.split_whitespace().map(str::to_string).collect()),
            tag,
        }
    }
}

impl Comparison for TaggedAsFilter {
    fn kind(&self) -> &'static str {
        "TaggedAsFilter"
    }

    fn eq(&self, candidate: &Candidate) -> Result<bool> {
        let tags: BTreeSet<String> = candidate
            .value()?
            .to_set()
            .into_iter()
            .map(|tag| tag.to_lowercase())
            .collect();
        Ok(match &self.exact {
            Some(wanted) => &tags == wanted,
            None => tags.contains(&self.tag),
        })
    }

    fn pre_filter_eq(&self, _field: &FieldDescriptor, key: &str) -> Option<PreFilter> {
        match &self.exact {
            // whitespace-only tag lists are untagged too, which `equal` cannot express
            Some(wanted) if wanted.is_empty() => None,
            Some(wanted) => {
                let longest = wanted.iter().max_by_key(|tag| tag.chars().count())?;
                prefilter::contains_needle(key, longest)
            }
            None => prefilter::contains_needle(key, &self.tag),
        }
    }
}
