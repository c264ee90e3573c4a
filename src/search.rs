// src/search.rs
use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::dataset::{Dataset, Record};

/// Which fields a query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Field(String),
    AllFields,
}

/// A literal, case-insensitive substring query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    needle: String,
    scope: Scope,
}

impl Query {
    pub fn new(text: &str, scope: Scope) -> Self {
        Self {
            needle: text.trim().to_lowercase(),
            scope,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn matches(&self, record: &Record) -> bool {
        if self.needle.is_empty() {
            return true;
        }
        match &self.scope {
            Scope::Field(field) => record
                .get(field)
                .map(|v| v.search_text().to_lowercase().contains(&self.needle))
                .unwrap_or(false),
            Scope::AllFields => record
                .iter()
                .any(|(_, v)| v.search_text().to_lowercase().contains(&self.needle)),
        }
    }
}

/// A transient subset of a dataset, by record position. Filtering never
/// touches the dataset itself.
#[derive(Debug, Clone)]
pub struct View<'a> {
    dataset: &'a Dataset,
    rows: Vec<usize>,
}

impl<'a> View<'a> {
    pub fn all(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            rows: (0..dataset.len()).collect(),
        }
    }

    /// Rows of this view that match `query`. Errors when the query targets a
    /// field the dataset does not have.
    pub fn filter(&self, query: &Query) -> Result<View<'a>> {
        if let Scope::Field(field) = query.scope() {
            if !self.dataset.schema.contains(field) {
                bail!("unknown search field `{}`", field);
            }
        }
        let rows = self
            .rows
            .iter()
            .copied()
            .filter(|&i| query.matches(&self.dataset.records[i]))
            .collect();
        Ok(View {
            dataset: self.dataset,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positions(&self) -> &[usize] {
        &self.rows
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Record> + '_ {
        let dataset = self.dataset;
        self.rows.iter().map(move |&i| &dataset.records[i])
    }

    /// Distinct display names in first-seen order.
    pub fn profiles(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|&i| self.dataset.display_name(i))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// First record in the view whose display name is `name`.
    pub fn find_profile(&self, name: &str) -> Option<&'a Record> {
        let dataset = self.dataset;
        self.rows
            .iter()
            .find(|&&i| dataset.display_name(i) == name)
            .map(|&i| &dataset.records[i])
    }
}

/// Filter the whole dataset in one call.
pub fn filter<'a>(dataset: &'a Dataset, query: &Query) -> Result<View<'a>> {
    View::all(dataset).filter(query)
}
