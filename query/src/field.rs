use crate::error::Result;
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Native type of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    Set,
    List,
    Duration,
    Timestamp,
    ByteSize,
}

/// Which filter is built for conditions on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherKind {
    Pattern,
    Files,
    TaggedAs,
    Bool,
    Float,
    ByteSize,
    Time,
    TimeNotNull,
    Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub doc: String,
    pub value_type: ValueType,
    pub matcher: MatcherKind,
    /// Daemon-side expression for the value, e.g. `d.name=`.
    pub prefilter_key: Option<String>,
    /// Factor between the local value and the daemon's integer value.
    pub prefilter_scale: i64,
    /// Daemon calls to prefetch so the field can be read without extra round-trips.
    pub requires: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType, matcher: MatcherKind) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            value_type,
            matcher,
            prefilter_key: None,
            prefilter_scale: 1,
            requires: Vec::new(),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn with_prefilter(mut self, key: impl Into<String>) -> Self {
        self.prefilter_key = Some(key.into());
        self
    }

    pub fn with_scale(mut self, scale: i64) -> Self {
        self.prefilter_scale = scale;
        self
    }

    pub fn with_requires<S: AsRef<str>>(mut self, requires: &[S]) -> Self {
        self.requires = requires.iter().map(|r| r.as_ref().to_string()).collect();
        self
    }
}

/// Resolves field names for the compiler.
pub trait FieldLookup: Send + Sync {
    /// Find a field, generating it on first use where a dynamic prefix applies.
    fn lookup(&self, name: &str) -> Result<Option<Arc<FieldDescriptor>>>;

    /// Names of all currently known fields, used for "did you mean" hints.
    fn names(&self) -> Vec<String>;
}

/// Builds a descriptor for `name`, given the part after the generator's prefix.
/// Returns `Ok(None)` when the name does not apply.
pub type FieldGenerator = fn(name: &str, suffix: &str) -> Result<Option<FieldDescriptor>>;

/// Field registry with lazily generated dynamic fields.
///
/// Generated descriptors are inserted once and then behave like registered ones.
#[derive(Default)]
pub struct FieldRegistry {
    fields: RwLock<IndexMap<String, Arc<FieldDescriptor>>>,
    generators: Vec<(&'static str, FieldGenerator)>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(self, field: FieldDescriptor) -> Self {
        self.register(field);
        self
    }

    /// Generators are consulted in registration order.
    pub fn with_generator(mut self, prefix: &'static str, generator: FieldGenerator) -> Self {
        self.generators.push((prefix, generator));
        self
    }

    /// Register a field, keeping an existing entry of the same name.
    pub fn register(&self, field: FieldDescriptor) -> Arc<FieldDescriptor> {
        let mut fields = self.fields.write().unwrap_or_else(PoisonError::into_inner);
        fields
            .entry(field.name.clone())
            .or_insert_with(|| Arc::new(field))
            .clone()
    }

    /// Registered field, without consulting generators.
    pub fn get(&self, name: &str) -> Option<Arc<FieldDescriptor>> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fields(&self) -> Vec<Arc<FieldDescriptor>> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields.values().cloned().collect()
    }
}

impl FieldLookup for FieldRegistry {
    fn lookup(&self, name: &str) -> Result<Option<Arc<FieldDescriptor>>> {
        if let Some(field) = self.get(name) {
            return Ok(Some(field));
        }
        for (prefix, generator) in &self.generators {
            if let Some(suffix) = name.strip_prefix(prefix) {
                if let Some(field) = generator(name, suffix)? {
                    return Ok(Some(self.register(field)));
                }
            }
        }
        Ok(None)
    }

    fn names(&self) -> Vec<String> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        fields.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("fields", &self.names())
            .field(
                "generators",
                &self.generators.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            )
            .finish()
    }
}
