// src/dossier/mod.rs
pub mod pdf;
pub mod phone;
pub mod rating;
pub mod text;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    config::DossierConfig,
    dataset::{Record, Taxonomy},
};

/// Fields with this prefix come from blank header cells and are never shown.
const UNNAMED_PREFIX: &str = "Unnamed";

/// How an entry is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Plain,
    /// Free text, wrapped and placed after the plain entries of its group.
    LongText,
    /// Moved to the end of the highlighted group.
    Pinned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub field: String,
    pub value: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub group: String,
    pub highlighted: bool,
    pub entries: Vec<Entry>,
}

/// One record laid out as sections, ready for either renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Dossier {
    pub title: String,
    pub profile: String,
    pub generated_at: DateTime<Local>,
    pub sections: Vec<Section>,
}

impl Dossier {
    /// Lay out `record` group by group.
    pub fn build(record: &Record, taxonomy: &Taxonomy, profile: &str, cfg: &DossierConfig) -> Self {
        let marker = cfg.highlight_marker.to_lowercase();
        let is_highlighted =
            |group: &str| !marker.is_empty() && group.to_lowercase().contains(&marker);
        let pin_target = taxonomy
            .groups()
            .iter()
            .find(|g| is_highlighted(g.as_str()))
            .cloned();

        let mut pinned: Vec<Entry> = Vec::new();
        let mut sections: Vec<Section> = Vec::with_capacity(taxonomy.groups().len());

        for group in taxonomy.groups() {
            let mut plain = Vec::new();
            let mut long = Vec::new();
            for field in taxonomy.fields_in(group) {
                if field.starts_with(UNNAMED_PREFIX) {
                    continue;
                }
                let Some(value) = record.get(field) else {
                    continue;
                };
                let mut rendered = value.display_or_placeholder();
                if !value.is_missing() && cfg.phone_fields.iter().any(|f| f == field) {
                    rendered = phone::normalize(&rendered, &cfg.country_code);
                }
                let entry = |kind| Entry {
                    field: field.to_string(),
                    value: rendered.clone(),
                    kind,
                };
                if pin_target.is_some() && cfg.pinned_fields.iter().any(|f| f == field) {
                    pinned.push(entry(EntryKind::Pinned));
                } else if cfg.long_text_fields.iter().any(|f| f == field) {
                    long.push(entry(EntryKind::LongText));
                } else {
                    plain.push(entry(EntryKind::Plain));
                }
            }
            plain.extend(long);
            sections.push(Section {
                group: group.clone(),
                highlighted: is_highlighted(group.as_str()),
                entries: plain,
            });
        }

        // pinned fields keep their configured order
        pinned.sort_by_key(|e| cfg.pinned_fields.iter().position(|f| *f == e.field));
        if let Some(target) = pin_target {
            if let Some(section) = sections.iter_mut().find(|s| s.group == target) {
                section.entries.extend(pinned);
            }
        }

        Self {
            title: cfg.title.clone(),
            profile: profile.to_string(),
            generated_at: Local::now(),
            sections,
        }
    }

    /// Every entry in emission order.
    pub fn entries(&self) -> impl Iterator<Item = (&Section, &Entry)> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter().map(move |e| (s, e)))
    }
}

/// `<prefix>_Dossier_<profile>.<ext>` with anything but ASCII letters, digits,
/// `-` and `.` turned into `_`.
pub fn file_name(prefix: &str, profile: &str, ext: &str) -> String {
    let safe: String = profile
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_Dossier_{}.{}", prefix, safe, ext)
}
