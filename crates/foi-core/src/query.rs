//! Grouped filter queries.
//!
//! A [`FilterQuery`] is a conjunction of disjunctions: filters inside a
//! group are OR'd together, groups are AND'd together.
//!
//! ```rust,ignore
//! // (dinner OR vegetable) AND (dessert OR fruit)
//! let query = FilterQuery::new()
//!     .with_group(["dinner", "vegetable"])?
//!     .with_group(["dessert", "fruit"])?;
//! let ids = group.get_objects_in_index("recipe", &query)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered list of filter groups.
///
/// Serializes as a JSON array of arrays, e.g. `[["dinner","vegetable"],["dessert"]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<String>>", into = "Vec<Vec<String>>")]
pub struct FilterQuery {
    groups: Vec<Vec<String>>,
}

impl FilterQuery {
    /// Creates a query without groups, matching the whole index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a group of OR'd filters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the group is empty.
    pub fn add_group<I, S>(&mut self, filters: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: Vec<String> = filters.into_iter().map(Into::into).collect();
        if group.is_empty() {
            return Err(Error::InvalidArgument(
                "filter group must contain at least one filter".to_string(),
            ));
        }
        self.groups.push(group);
        Ok(self)
    }

    /// Builder form of [`FilterQuery::add_group`].
    pub fn with_group<I, S>(mut self, filters: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_group(filters)?;
        Ok(self)
    }

    /// Number of groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if the query has no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in insertion order.
    #[must_use]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    /// Iterates groups in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Vec<String>> {
        self.groups.iter()
    }
}

impl<'a> IntoIterator for &'a FilterQuery {
    type Item = &'a Vec<String>;
    type IntoIter = std::slice::Iter<'a, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl TryFrom<Vec<Vec<String>>> for FilterQuery {
    type Error = Error;

    fn try_from(groups: Vec<Vec<String>>) -> Result<Self> {
        let mut query = Self::new();
        for group in groups {
            query.add_group(group)?;
        }
        Ok(query)
    }
}

impl From<FilterQuery> for Vec<Vec<String>> {
    fn from(query: FilterQuery) -> Self {
        query.groups
    }
}
