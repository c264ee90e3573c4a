// src/dataset/loader.rs
use anyhow::{bail, Context, Result};
use chrono::Utc;
use csv::{ByteRecord, ReaderBuilder};
use glob::glob;
use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

use super::{Dataset, Record, Schema, Taxonomy, Value};
use crate::{config::DataConfig, dossier::rating};

/// Row holding the group labels; row 0 is a banner and is ignored.
const GROUP_ROW: usize = 1;
/// Row holding the field names; data starts on the next row.
const HEADER_ROW: usize = 2;

/// Tokens spreadsheet exports use for an empty cell.
const NA_TOKENS: &[&str] = &[
    "", "nan", "NaN", "-nan", "-NaN", "NA", "N/A", "n/a", "<NA>", "#N/A", "#NA", "NULL", "null",
    "None",
];

/// Knobs applied while turning raw rows into records.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub display_field: String,
    pub banner_patterns: Vec<String>,
    pub fallback_group: String,
    pub rating_field: Option<String>,
}

impl From<&DataConfig> for LoadOptions {
    fn from(cfg: &DataConfig) -> Self {
        Self {
            display_field: cfg.display_field.clone(),
            banner_patterns: cfg.banner_patterns.clone(),
            fallback_group: cfg.fallback_group.clone(),
            rating_field: Some(cfg.rating_field.clone()).filter(|f| !f.trim().is_empty()),
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        (&DataConfig::default()).into()
    }
}

/// Trim whitespace and strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Classify one cleaned cell. Zero-padded and `+`-prefixed digit strings stay
/// text so phone and licence numbers keep their exact spelling.
pub fn infer_value(cell: &str) -> Value {
    if NA_TOKENS.contains(&cell) {
        return Value::Missing;
    }
    let bytes = cell.as_bytes();
    let zero_padded = bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit();
    let signed = bytes.first() == Some(&b'+');
    if !zero_padded && !signed {
        if let Ok(n) = cell.parse::<f64>() {
            if n.is_finite() {
                return Value::number(n, cell);
            }
        }
    }
    Value::Text(cell.to_string())
}

/// Column names as the data header row spells them: blank cells become
/// `Unnamed: <idx>`, repeated names get a `.<n>` suffix.
pub fn column_names(header_row: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(header_row.len());
    for (idx, raw) in header_row.iter().enumerate() {
        let cleaned = clean_str(raw);
        let base = if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") {
            format!("Unnamed: {}", idx)
        } else {
            cleaned
        };
        let count = seen.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base.clone()
        } else {
            format!("{}.{}", base, count)
        };
        *count += 1;
        names.push(name);
    }
    names
}

fn decode_row(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).into_owned())
        .collect()
}

fn is_banner(display: &str, patterns: &[String]) -> bool {
    let lowered = display.to_lowercase();
    patterns
        .iter()
        .any(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
}

/// Parse CSV bytes laid out with the 2-row-skip header convention.
pub fn parse_csv<R: Read>(reader: R, opts: &LoadOptions) -> Result<(Arc<Schema>, Taxonomy, Vec<Record>)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        rows.push(decode_row(&record));
    }
    if let Some(first) = rows.first_mut().and_then(|r| r.first_mut()) {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    if rows.len() <= HEADER_ROW {
        bail!(
            "expected a banner row, a group row and a header row; found {} rows",
            rows.len()
        );
    }

    let mut rows = rows.into_iter();
    let _banner = rows.next();
    let group_row = rows.next().unwrap_or_default();
    let header_row = rows.next().unwrap_or_default();
    debug!(
        group_row = GROUP_ROW,
        header_row = HEADER_ROW,
        columns = header_row.len(),
        "parsed header rows"
    );

    let names = column_names(&header_row);
    let taxonomy = Taxonomy::parse(&group_row, &names, &opts.fallback_group);
    let schema = Arc::new(Schema::new(names));

    let has_display = schema.contains(&opts.display_field);
    if !has_display {
        warn!(field = %opts.display_field, "display field not in header; keeping every row");
    }
    let rating_field = opts
        .rating_field
        .as_deref()
        .filter(|f| schema.contains(f));

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in rows {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let values: Vec<Value> = row
            .iter()
            .take(schema.len())
            .map(|c| infer_value(&clean_str(c)))
            .collect();
        let mut record = Record::new(Arc::clone(&schema), values);

        if has_display {
            let keep = match record.get(&opts.display_field) {
                Some(Value::Missing) | None => false,
                Some(v) => !is_banner(&v.to_string(), &opts.banner_patterns),
            };
            if !keep {
                dropped += 1;
                continue;
            }
        }
        if let Some(field) = rating_field {
            let stars = record.get(field).map(rating::stars).unwrap_or_default();
            record.set(field, Value::Text(stars));
        }
        records.push(record);
    }
    debug!(kept = records.len(), dropped, "filtered banner rows");

    Ok((schema, taxonomy, records))
}

/// Load one CSV file into a dataset.
#[tracing::instrument(level = "info", skip(path, opts), fields(path = %path.as_ref().display()))]
pub fn load_csv<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (schema, taxonomy, records) =
        parse_csv(file, opts).with_context(|| format!("parsing {}", path.display()))?;
    info!(
        records = records.len(),
        fields = schema.len(),
        groups = taxonomy.groups().len(),
        "loaded dataset"
    );
    Ok(Dataset {
        source: Some(path.to_path_buf()),
        schema,
        taxonomy,
        records,
        display_field: opts.display_field.clone(),
        loaded_at: Utc::now(),
    })
}

/// First existing file matching `source` (a path or a glob pattern), in sorted order.
pub fn resolve_source(source: &str) -> Result<Option<PathBuf>> {
    let direct = Path::new(source);
    if direct.is_file() {
        return Ok(Some(direct.to_path_buf()));
    }
    let mut matches: Vec<PathBuf> = glob(source)
        .with_context(|| format!("invalid source pattern {}", source))?
        .filter_map(|p| p.ok())
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Resolve and load the configured source. No matching file is not an error:
/// the result is an empty dataset.
pub fn load_source(source: &str, opts: &LoadOptions) -> Result<Dataset> {
    match resolve_source(source)? {
        Some(path) => load_csv(path, opts),
        None => {
            warn!(source, "no source file found; serving an empty dataset");
            Ok(Dataset::empty(&opts.display_field))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::{NamedTempFile, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,agentdir::dataset=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    pub(crate) const SAMPLE: &str = "\
AGENT DIRECTORY EXPORT,,,,,,
,Core,,,Enriched Data,,
Id,Firm Name,Emirate,Rating,Harmonized Phone Number,Address of License,
1,Alpha Agents,Dubai,4.0,0501234567,Office 1 Deira,x
2,Firm Name,,,,,
3,,Sharjah,5,,,
4,Beta Brokers,Abu Dhabi,n/a,00971501112233,,
5,ENRICHED CONTACTS,,,,,
6,Gamma Realty,Ajman
";

    #[test]
    fn parses_sample_with_banners_dropped() -> Result<()> {
        init_test_logging();
        let (schema, tax, records) = parse_csv(Cursor::new(SAMPLE), &LoadOptions::default())?;

        assert_eq!(
            schema.fields(),
            &[
                "Id",
                "Firm Name",
                "Emirate",
                "Rating",
                "Harmonized Phone Number",
                "Address of License",
                "Unnamed: 6"
            ]
        );
        assert_eq!(tax.groups(), &["General Info", "Core", "Enriched Data"]);
        assert_eq!(tax.group_of("Id"), Some("General Info"));
        assert_eq!(tax.group_of("Rating"), Some("Core"));
        assert_eq!(tax.group_of("Unnamed: 6"), Some("Enriched Data"));

        let names: Vec<String> = records
            .iter()
            .map(|r| r.get("Firm Name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Alpha Agents", "Beta Brokers", "Gamma Realty"]);

        let alpha = &records[0];
        assert_eq!(alpha.get("Id"), Some(&Value::number(1.0, "1")));
        assert_eq!(alpha.get("Rating"), Some(&Value::Text("★★★★".into())));
        assert_eq!(
            alpha.get("Harmonized Phone Number"),
            Some(&Value::Text("0501234567".into()))
        );
        assert_eq!(records[1].get("Rating"), Some(&Value::Text("—".into())));
        // ragged row padded
        assert_eq!(records[2].get("Rating"), Some(&Value::Text("—".into())));
        assert_eq!(records[2].get("Address of License"), Some(&Value::Missing));
        Ok(())
    }

    #[test]
    fn duplicate_and_blank_headers_are_disambiguated() {
        let names = column_names(&[
            "Phone".into(),
            " ".into(),
            "Phone".into(),
            "nan".into(),
            "Phone".into(),
        ]);
        assert_eq!(
            names,
            vec!["Phone", "Unnamed: 1", "Phone.1", "Unnamed: 3", "Phone.2"]
        );
    }

    #[test]
    fn infer_value_keeps_padded_digits_as_text() {
        assert_eq!(infer_value("42"), Value::number(42.0, "42"));
        assert_eq!(infer_value("4.5"), Value::number(4.5, "4.5"));
        assert_eq!(infer_value("0"), Value::number(0.0, "0"));
        assert_eq!(infer_value("0.5"), Value::number(0.5, "0.5"));
        assert_eq!(infer_value("0501234567"), Value::Text("0501234567".into()));
        assert_eq!(infer_value("+971501234567"), Value::Text("+971501234567".into()));
        assert_eq!(infer_value("inf"), Value::Text("inf".into()));
        assert_eq!(infer_value("NaN"), Value::Missing);
        assert_eq!(infer_value(""), Value::Missing);
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let err = parse_csv(Cursor::new("banner\ngroups\n"), &LoadOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn numeric_cells_keep_their_source_text() -> Result<()> {
        let csv = "banner\nCore\nFirm Name,Licence,Code,Fee\n\
                   Alpha,12345678901234567890,1E5,1.50\n";
        let (_, _, records) = parse_csv(Cursor::new(csv), &LoadOptions::default())?;
        let alpha = &records[0];
        assert_eq!(alpha.get("Licence").unwrap().to_string(), "12345678901234567890");
        assert_eq!(alpha.get("Code").unwrap().to_string(), "1E5");
        assert_eq!(alpha.get("Fee").unwrap().to_string(), "1.50");
        assert_eq!(alpha.get("Code").unwrap().search_text(), "1E5");
        assert!(matches!(alpha.get("Fee"), Some(Value::Number { value, .. }) if *value == 1.5));

        let json = serde_json::to_value(alpha)?;
        assert_eq!(json["Fee"], 1.5);
        Ok(())
    }

    #[test]
    fn bom_and_latin1_bytes_are_tolerated() -> Result<()> {
        let mut bytes = b"\xEF\xBB\xBFbanner\n,Core\nFirm Name,City\n".to_vec();
        bytes.extend_from_slice(b"Caf\xE9 Realty,Dubai\n");
        let (_, _, records) = parse_csv(Cursor::new(bytes), &LoadOptions::default())?;
        assert_eq!(records.len(), 1);
        assert!(records[0].get("Firm Name").unwrap().to_string().starts_with("Caf"));
        Ok(())
    }

    #[test]
    fn missing_display_field_keeps_rows() -> Result<()> {
        let csv = "banner\nCore\nName,City\nDATA row,Dubai\n";
        let (_, _, records) = parse_csv(Cursor::new(csv), &LoadOptions::default())?;
        assert_eq!(records.len(), 1);
        Ok(())
    }

    #[test]
    fn load_source_resolves_glob_and_tolerates_absence() -> Result<()> {
        let dir = TempDir::new()?;
        let pattern = format!("{}/*.csv", dir.path().display());

        let empty = load_source(&pattern, &LoadOptions::default())?;
        assert!(empty.is_empty());
        assert!(empty.source.is_none());

        let mut file = File::create(dir.path().join("agents.csv"))?;
        file.write_all(SAMPLE.as_bytes())?;
        let ds = load_source(&pattern, &LoadOptions::default())?;
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.source.as_deref(), Some(dir.path().join("agents.csv").as_path()));
        Ok(())
    }

    #[test]
    fn load_csv_by_path() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(SAMPLE.as_bytes())?;
        let ds = load_csv(tmp.path(), &LoadOptions::default())?;
        assert_eq!(ds.display_name(0), "Alpha Agents");
        assert_eq!(ds.fields().len(), 7);
        Ok(())
    }
}
