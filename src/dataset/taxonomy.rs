// src/dataset/taxonomy.rs
use std::collections::HashMap;

/// Field → group mapping inferred from the spreadsheet's group-label row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Taxonomy {
    /// Distinct groups in first-seen column order.
    groups: Vec<String>,
    /// `(field, group)` in column order.
    assignments: Vec<(String, String)>,
    lookup: HashMap<String, usize>,
}

/// Blank cells and the `nan` marker spreadsheets export for empty cells.
fn is_blank(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan")
}

impl Taxonomy {
    /// Walk the header pair column by column. A non-blank group cell opens a
    /// new group that covers every following column until the next non-blank
    /// cell; columns before the first label fall under `fallback`.
    pub fn parse(group_row: &[String], field_row: &[String], fallback: &str) -> Self {
        let mut tax = Taxonomy::default();
        let mut current = fallback.trim().to_string();

        for (idx, field) in field_row.iter().enumerate() {
            if let Some(label) = group_row.get(idx).filter(|g| !is_blank(g)) {
                current = label.trim().to_string();
            }
            if !tax.groups.contains(&current) {
                tax.groups.push(current.clone());
            }
            if is_blank(field) {
                continue;
            }
            let field = field.trim().to_string();
            match tax.lookup.get(&field) {
                // a repeated name keeps its latest group, in its first position
                Some(&pos) => tax.assignments[pos].1 = current.clone(),
                None => {
                    tax.lookup.insert(field.clone(), tax.assignments.len());
                    tax.assignments.push((field, current.clone()));
                }
            }
        }
        tax
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn group_of(&self, field: &str) -> Option<&str> {
        self.lookup
            .get(field)
            .map(|&i| self.assignments[i].1.as_str())
    }

    /// Fields of `group` in column order.
    pub fn fields_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.assignments
            .iter()
            .filter(move |(_, g)| g == group)
            .map(|(f, _)| f.as_str())
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(f, g)| (f.as_str(), g.as_str()))
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
