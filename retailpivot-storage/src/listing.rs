// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Search and ordering for reference-data listings

use serde::Deserialize;

/// Listing parameters accepted by the reference endpoints
///
/// `search` is a case-insensitive substring match on the name. `ordering`
/// names one field, optionally prefixed with `-` for descending order.
/// Unknown ordering fields fall back to ordering by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl ListQuery {
    pub fn matches(&self, name: &str) -> bool {
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                name.to_lowercase().contains(&term.to_lowercase())
            }
            _ => true,
        }
    }

    /// Resolve `ordering` against the fields a listing supports
    pub fn sort_field(&self, allowed: &[&'static str]) -> (&'static str, SortOrder) {
        let raw = self.ordering.as_deref().unwrap_or("id").trim();
        let (field, order) = match raw.strip_prefix('-') {
            Some(rest) => (rest, SortOrder::Descending),
            None => (raw, SortOrder::Ascending),
        };
        match allowed.iter().find(|f| **f == field) {
            Some(f) => (*f, order),
            None => ("id", SortOrder::Ascending),
        }
    }
}
