// src/dossier/text.rs
use super::Dossier;

const RULE_WIDTH: usize = 50;
const SECTION_RULE_WIDTH: usize = 20;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Plain-text report: a header block, one `[GROUP]` section per group with
/// `field: value` lines, and a closing rule.
pub fn render(dossier: &Dossier) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let section_rule = "-".repeat(SECTION_RULE_WIDTH);

    let mut out = format!(
        "{} | DOSSIER EXPORT\nPROFILE: {}\nTIMESTAMP: {}\n{}\n\n",
        dossier.title,
        dossier.profile,
        dossier.generated_at.format(TIMESTAMP_FORMAT),
        rule
    );

    for section in &dossier.sections {
        out.push_str(&format!("[{}]\n{}\n", section.group.to_uppercase(), section_rule));
        for entry in &section.entries {
            out.push_str(&format!("{}: {}\n", entry.field, entry.value));
        }
        out.push('\n');
    }

    out.push_str(&rule);
    out.push_str("\nEND OF DOSSIER");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::DossierConfig, dossier::tests::dataset};
    use std::collections::HashMap;

    /// field → section heading, collected from a rendered report.
    fn index_report(report: &str) -> HashMap<String, Vec<String>> {
        let mut seen: HashMap<String, Vec<String>> = HashMap::new();
        let mut heading: Option<String> = None;
        for line in report.lines() {
            if line.starts_with('[') && line.ends_with(']') {
                heading = Some(line[1..line.len() - 1].to_string());
                continue;
            }
            if let (Some(h), Some((field, _))) = (&heading, line.split_once(": ")) {
                seen.entry(field.to_string()).or_default().push(h.clone());
            }
        }
        seen
    }

    #[test]
    fn template_shape() {
        let ds = dataset();
        let cfg = DossierConfig::default();
        let d = Dossier::build(&ds.records[0], &ds.taxonomy, "Alpha Agents", &cfg);
        let report = render(&d);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "AGENT DIRECTORY | DOSSIER EXPORT");
        assert_eq!(lines[1], "PROFILE: Alpha Agents");
        assert!(lines[2].starts_with("TIMESTAMP: "));
        assert_eq!(lines[3], "=".repeat(50));
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "[CORE]");
        assert_eq!(lines[6], "-".repeat(20));
        assert_eq!(lines[7], "Firm Name: Alpha Agents");
        assert!(report.ends_with(&format!("{}\nEND OF DOSSIER", "=".repeat(50))));
        assert!(report.contains("Harmonized Phone Number: +971501234567\n"));
        assert!(report.contains("Rating: ★★★★\n"));
    }

    #[test]
    fn every_rendered_field_appears_once_under_its_group() {
        let ds = dataset();
        let cfg = DossierConfig {
            highlight_marker: String::new(),
            ..DossierConfig::default()
        };
        for (i, record) in ds.records.iter().enumerate() {
            let d = Dossier::build(record, &ds.taxonomy, &ds.display_name(i), &cfg);
            let index = index_report(&render(&d));
            for (field, _) in record.iter() {
                if field.starts_with("Unnamed") {
                    assert!(!index.contains_key(field));
                    continue;
                }
                let group = ds.taxonomy.group_of(field).unwrap().to_uppercase();
                assert_eq!(index.get(field), Some(&vec![group]), "field {}", field);
            }
        }
    }

    #[test]
    fn pinned_fields_appear_once_in_highlighted_group() {
        let ds = dataset();
        let d = Dossier::build(&ds.records[0], &ds.taxonomy, "Alpha Agents", &DossierConfig::default());
        let index = index_report(&render(&d));
        assert_eq!(
            index.get("Address of License"),
            Some(&vec!["ENRICHED DATA".to_string()])
        );
        assert_eq!(index.len(), 8);
    }
}
