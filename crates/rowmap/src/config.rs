//! Database handle configuration.

use crate::record::FieldDescriptor;
use std::fmt;
use std::sync::Arc;

/// Positional placeholder syntax used when synthesizing statement text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `?` for every argument (MySQL, SQLite).
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    #[default]
    Numbered,
}

impl Placeholder {
    /// Pick the style a driver expects from its name.
    ///
    /// Any name containing `mysql` gets `?`; everything else is numbered.
    pub fn for_driver(driver: &str) -> Self {
        if driver.to_ascii_lowercase().contains("mysql") {
            Self::Question
        } else {
            Self::Numbered
        }
    }

    /// Render the placeholder for the 1-based argument position `index`.
    pub fn render(self, index: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Numbered => format!("${index}"),
        }
    }

    /// Whether `token` is exactly one placeholder of this style.
    pub fn is_placeholder(self, token: &str) -> bool {
        match self {
            Self::Question => token == "?",
            Self::Numbered => token
                .strip_prefix('$')
                .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())),
        }
    }
}

type ResolveFn = dyn Fn(&FieldDescriptor) -> Option<String> + Send + Sync;

/// Maps a record field to the external (column) name it binds to.
///
/// Returning `None` or an empty name means the field has no column.
#[derive(Clone)]
pub struct FieldNameResolver {
    inner: Arc<ResolveFn>,
}

impl FieldNameResolver {
    /// Resolve through the value of the `key` tag (`#[orm(key = "column")]`).
    pub fn by_tag(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::custom(move |field| field.tag(&key).map(str::to_string))
    }

    /// Resolve every field to its Rust field name.
    pub fn field_name() -> Self {
        Self::custom(|field| Some(field.name.to_string()))
    }

    /// Resolve with a caller-supplied function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&FieldDescriptor) -> Option<String> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// External name of `field`, lower-cased. `None` when the field has no column.
    pub fn resolve(&self, field: &FieldDescriptor) -> Option<String> {
        (self.inner)(field)
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
    }
}

impl Default for FieldNameResolver {
    fn default() -> Self {
        Self::by_tag(DEFAULT_TAG)
    }
}

impl fmt::Debug for FieldNameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldNameResolver").finish_non_exhaustive()
    }
}

/// Tag key consulted by the default resolver.
pub const DEFAULT_TAG: &str = "db";

/// Configuration for [`crate::Db`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Tag key the resolver reads, when the resolver is tag-based.
    pub tag: String,
    /// Placeholder style for synthesized statements.
    pub placeholder: Placeholder,
    /// Scan straight into field slots instead of coercing through scratch values.
    pub raw_scan: bool,
    /// Field-name resolver.
    pub resolver: FieldNameResolver,
    /// Maximum SQL length in log events (`None` logs the full text).
    pub log_max_sql_length: Option<usize>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            placeholder: Placeholder::default(),
            raw_scan: false,
            resolver: FieldNameResolver::default(),
            log_max_sql_length: Some(200),
        }
    }
}

impl DbConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a named driver (placeholder style from the name).
    pub fn for_driver(driver: &str) -> Self {
        Self::default().placeholder(Placeholder::for_driver(driver))
    }

    /// Resolve field names through the tag `key`.
    pub fn tag(mut self, key: impl Into<String>) -> Self {
        self.tag = key.into();
        self.resolver = FieldNameResolver::by_tag(self.tag.clone());
        self
    }

    /// Set the placeholder style.
    pub fn placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Enable or disable raw scanning.
    pub fn raw_scan(mut self, enabled: bool) -> Self {
        self.raw_scan = enabled;
        self
    }

    /// Replace the field-name resolver.
    pub fn field_name_resolver(mut self, resolver: FieldNameResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the maximum SQL length in log events.
    pub fn log_max_sql_length(mut self, max: Option<usize>) -> Self {
        self.log_max_sql_length = max;
        self
    }
}
