//! Key layout for index groups.
//!
//! ```text
//! foi[:<tenant>]:<group>:obj:<objectId>:lock
//! foi[:<tenant>]:<group>:obj:<objectId>:map
//! foi[:<tenant>]:<group>:idx:<index>:g
//! foi[:<tenant>]:<group>:idx:<index>:f:<filter>
//! foi[:<tenant>]:<group>:tmp:<uuid>
//! ```

use std::fmt;

/// Prefix for every key written by this crate.
pub const KEY_ROOT: &str = "foi";

/// Key namespace of one index group, optionally scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    tenant: Option<String>,
    group: String,
}

impl Namespace {
    /// Creates the namespace for `group`, optionally under `tenant`.
    ///
    /// An empty tenant string is treated as no tenant.
    #[must_use]
    pub fn new(group: impl Into<String>, tenant: Option<impl Into<String>>) -> Self {
        let tenant = tenant.map(Into::into).filter(|t: &String| !t.is_empty());
        Self {
            tenant,
            group: group.into(),
        }
    }

    /// Returns the group name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the tenant namespace, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Returns `foi` or `foi:<tenant>`.
    #[must_use]
    pub fn root(&self) -> String {
        match &self.tenant {
            Some(tenant) => format!("{KEY_ROOT}:{tenant}"),
            None => KEY_ROOT.to_string(),
        }
    }

    /// Fully qualifies a group-relative key.
    #[must_use]
    pub fn qualify(&self, key: &str) -> String {
        format!("{}:{}:{key}", self.root(), self.group)
    }

    fn qualify_object(&self, object_id: &str, key: &str) -> String {
        self.qualify(&format!("obj:{object_id}:{key}"))
    }

    fn qualify_index(&self, index: &str, key: &str) -> String {
        self.qualify(&format!("idx:{index}:{key}"))
    }

    /// Lock marker key for an object.
    #[must_use]
    pub fn object_lock_key(&self, object_id: &str) -> String {
        self.qualify_object(object_id, "lock")
    }

    /// Hash key mapping index name to the object's encoded filters.
    #[must_use]
    pub fn object_index_map_key(&self, object_id: &str) -> String {
        self.qualify_object(object_id, "map")
    }

    /// Set of every object assigned to `index`.
    #[must_use]
    pub fn index_global_set_key(&self, index: &str) -> String {
        self.qualify_index(index, "g")
    }

    /// Set of objects assigned to `index` with `filter`.
    #[must_use]
    pub fn index_filter_set_key(&self, index: &str, filter: &str) -> String {
        self.qualify_index(index, &format!("f:{filter}"))
    }

    /// Scan pattern matching every key of `index`.
    #[must_use]
    pub fn index_pattern(&self, index: &str) -> String {
        format!("{}:idx:{}:*", escape_glob(&self.to_string()), escape_glob(index))
    }

    /// Scan pattern matching every key of the group.
    #[must_use]
    pub fn group_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.to_string()))
    }

    /// Fresh collision-resistant key for a calculation result.
    #[must_use]
    pub fn temporary_key(&self) -> String {
        self.qualify(&format!("tmp:{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Escapes glob metacharacters so `text` matches itself in a scan pattern.
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root(), self.group)
    }
}
