//! Persistence of pipeline tables.
//!
//! Hierarchical structures are stored as pretty JSON; tables are CSV with
//! null numerics written as empty fields. Any CSV can optionally be
//! gzip-compressed on write (`.gz` is appended to the path).

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::metrics::MetricTable;
use crate::analyzers::types::{AggregatedRow, CellValue, ColumnKey, FlattenedRow, MetricFamily, SummaryRow};
use crate::config::RaceType;

const NAME_SEPARATOR: &str = "; ";

/// Writes `value` as pretty-printed JSON.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Data saved");
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_slice(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

/// Writes `bytes` to `path`, gzip-compressing them first if requested.
/// Returns the path actually written.
fn persist(path: &Path, bytes: Vec<u8>, gzip: bool) -> Result<PathBuf> {
    let (body, target) = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;

        let mut target = path.as_os_str().to_owned();
        target.push(".gz");
        (compressed, PathBuf::from(target))
    } else {
        (bytes, path.to_path_buf())
    };

    std::fs::write(&target, body).with_context(|| format!("writing {}", target.display()))?;
    info!(path = %target.display(), "Data saved");
    Ok(target)
}

/// Opens a table written by [`persist`]. A `.gz` path is decompressed, and a
/// plain path that does not exist falls back to its `.gz` sibling.
fn open_table(path: &Path) -> Result<(Box<dyn Read>, PathBuf)> {
    let target = if path.exists() {
        path.to_path_buf()
    } else {
        let mut gz = path.as_os_str().to_owned();
        gz.push(".gz");
        let gz = PathBuf::from(gz);
        if gz.exists() { gz } else { path.to_path_buf() }
    };

    let file = File::open(&target).with_context(|| format!("opening {}", target.display()))?;
    let reader: Box<dyn Read> = if target.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok((reader, target))
}

/// One line of the grouped table.
#[derive(Debug, Serialize, Deserialize)]
struct GroupedRecord {
    election_year: u16,
    election_type: String,
    state_code: String,
    county: String,
    dem_candidate: Option<String>,
    rep_candidate: Option<String>,
    other_candidate: Option<String>,
    reported_pct: Option<f64>,
    votes_total: u64,
    votes_dem: u64,
    votes_rep: u64,
    votes_other: u64,
    votes_dem_pct: Option<f64>,
    votes_rep_pct: Option<f64>,
    votes_other_pct: Option<f64>,
}

fn join_names(names: &[String]) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        Some(names.join(NAME_SEPARATOR))
    }
}

fn split_names(joined: Option<String>) -> Vec<String> {
    joined
        .map(|s| s.split(NAME_SEPARATOR).map(str::to_string).collect())
        .unwrap_or_default()
}

impl From<&AggregatedRow> for GroupedRecord {
    fn from(row: &AggregatedRow) -> Self {
        Self {
            election_year: row.year,
            election_type: row.race.code().to_string(),
            state_code: row.state_code.clone(),
            county: row.county.clone(),
            dem_candidate: join_names(&row.dem_candidates),
            rep_candidate: join_names(&row.rep_candidates),
            other_candidate: join_names(&row.other_candidates),
            reported_pct: row.reported_pct,
            votes_total: row.total_votes,
            votes_dem: row.dem_votes,
            votes_rep: row.rep_votes,
            votes_other: row.other_votes,
            votes_dem_pct: row.dem_pct(),
            votes_rep_pct: row.rep_pct(),
            votes_other_pct: row.other_pct(),
        }
    }
}

impl TryFrom<GroupedRecord> for AggregatedRow {
    type Error = anyhow::Error;

    fn try_from(record: GroupedRecord) -> Result<Self> {
        let race = RaceType::from_code(&record.election_type)
            .with_context(|| format!("unsupported election type '{}'", record.election_type))?;
        let bucket_sum = record
            .votes_dem
            .checked_add(record.votes_rep)
            .and_then(|sum| sum.checked_add(record.votes_other));
        match bucket_sum {
            None => anyhow::bail!(
                "vote buckets overflow for {} {} {} {}",
                record.election_year,
                record.election_type,
                record.state_code,
                record.county
            ),
            Some(sum) if sum != record.votes_total => anyhow::bail!(
                "vote buckets do not sum to total for {} {} {} {}",
                record.election_year,
                record.election_type,
                record.state_code,
                record.county
            ),
            Some(_) => {}
        }
        Ok(Self {
            year: record.election_year,
            race,
            state_code: record.state_code,
            county: record.county,
            dem_candidates: split_names(record.dem_candidate),
            rep_candidates: split_names(record.rep_candidate),
            other_candidates: split_names(record.other_candidate),
            dem_votes: record.votes_dem,
            rep_votes: record.votes_rep,
            other_votes: record.votes_other,
            total_votes: record.votes_total,
            reported_pct: record.reported_pct,
        })
    }
}

pub fn write_grouped_csv(path: &Path, rows: &[AggregatedRow], gzip: bool) -> Result<PathBuf> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for row in rows {
        writer.serialize(GroupedRecord::from(row))?;
    }
    let bytes = writer.into_inner().context("flushing grouped CSV")?;
    persist(path, bytes, gzip)
}

pub fn read_grouped_csv(path: &Path) -> Result<Vec<AggregatedRow>> {
    let (input, path) = open_table(path)?;
    let mut reader = ReaderBuilder::new().from_reader(input);

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let record: GroupedRecord = result?;
        rows.push(AggregatedRow::try_from(record)?);
    }
    debug!(path = %path.display(), rows = rows.len(), "Loaded grouped table");
    Ok(rows)
}

fn format_count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_float(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_cell(value: CellValue) -> String {
    match value {
        CellValue::Count(v) => format_count(v),
        CellValue::Float(v) => format_float(v),
    }
}

fn flattened_header(years: &[u16]) -> (Vec<String>, Vec<ColumnKey>) {
    let layout = ColumnKey::layout(years);
    let mut header = vec!["state_code".to_string(), "county".to_string()];
    header.extend(layout.iter().map(ColumnKey::name));
    (header, layout)
}

fn flattened_fields(row: &FlattenedRow, layout: &[ColumnKey]) -> Vec<String> {
    let mut fields = vec![row.state_code.clone(), row.county.clone()];
    fields.extend(layout.iter().map(|&key| format_cell(row.cell(key))));
    fields
}

/// Writes one row per county with the column groups of `years`.
pub fn write_flattened_csv(path: &Path, rows: &[FlattenedRow], years: &[u16], gzip: bool) -> Result<PathBuf> {
    let (header, layout) = flattened_header(years);
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(flattened_fields(row, &layout))?;
    }
    let bytes = writer.into_inner().context("flushing flattened CSV")?;
    persist(path, bytes, gzip)
}

/// Reads a flattened (or metric) table. Columns outside the flattened layout
/// are ignored, so derived columns are always recomputed from the base.
pub fn read_flattened_csv(path: &Path) -> Result<Vec<FlattenedRow>> {
    let (input, path) = open_table(path)?;
    let mut reader = ReaderBuilder::new().from_reader(input);

    let headers = reader.headers()?.clone();
    let state_idx = headers
        .iter()
        .position(|h| h == "state_code")
        .context("missing state_code column")?;
    let county_idx = headers
        .iter()
        .position(|h| h == "county")
        .context("missing county column")?;
    let columns: Vec<(usize, ColumnKey)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| ColumnKey::parse(h).map(|key| (i, key)))
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let mut row = FlattenedRow::new(&record[state_idx], &record[county_idx]);

        for &(i, key) in &columns {
            let raw = record[i].trim();
            if raw.is_empty() {
                continue;
            }
            let value = if key.field.is_count() {
                CellValue::Count(Some(parse_count(raw).with_context(|| {
                    format!("row {}: column {} is not a vote count: '{raw}'", line + 1, key.name())
                })?))
            } else {
                CellValue::Float(Some(raw.parse::<f64>().with_context(|| {
                    format!("row {}: column {} is not a number: '{raw}'", line + 1, key.name())
                })?))
            };
            row.set_cell(key, value);
        }
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "Loaded flattened table");
    Ok(rows)
}

/// Accepts `123` and the `123.0` form some spreadsheet tools write.
fn parse_count(raw: &str) -> Result<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    let v: f64 = raw.parse()?;
    if v.fract() != 0.0 || v < 0.0 {
        anyhow::bail!("not a whole non-negative number");
    }
    Ok(v as u64)
}

/// Writes the flattened columns followed by every derived column.
pub fn write_metrics_csv(path: &Path, table: &MetricTable, gzip: bool) -> Result<PathBuf> {
    let years = table.years();
    let (mut header, layout) = flattened_header(&years);
    for year in years {
        header.push(format!("pres_house_ratio_{year}"));
        header.push(format!("split_ticket_pct_{year}"));
        header.push(format!("total_two_race_voters_{year}"));
        header.push(format!("straight_ticket_voters_{year}"));
        header.push(format!("split_ticket_voters_{year}"));
    }
    header.extend(
        [
            "pres_house_ratio_change",
            "abs_ratio_change",
            "split_ticket_change",
            "abs_split_ticket_change",
        ]
        .map(str::to_string),
    );

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut fields = flattened_fields(&row.base, &layout);
        for year in years {
            match row.derived.years.get(&year) {
                Some(m) => fields.extend(
                    [
                        m.pres_house_ratio,
                        m.split_ticket_pct,
                        m.total_two_race_voters,
                        m.straight_ticket_voters,
                        m.split_ticket_voters,
                    ]
                    .map(|v| v.to_string()),
                ),
                None => fields.extend(std::iter::repeat_n(String::new(), 5)),
            }
        }
        fields.extend(
            [
                row.derived.pres_house_ratio_change,
                row.derived.abs_ratio_change,
                row.derived.split_ticket_change,
                row.derived.abs_split_ticket_change,
            ]
            .map(|v| v.to_string()),
        );
        writer.write_record(&fields)?;
    }

    let bytes = writer.into_inner().context("flushing metrics CSV")?;
    persist(path, bytes, gzip)
}

/// Header of a summary table, with `category, state_code, county` leading.
pub fn summary_header(family: MetricFamily, current_year: u16, prior_year: u16) -> Vec<String> {
    let f = family.label();
    vec![
        "category".to_string(),
        "state_code".to_string(),
        "county".to_string(),
        "county_count".to_string(),
        format!("avg_{f}_{current_year}"),
        format!("avg_{f}_{prior_year}"),
        format!("avg_{f}_change"),
        format!("max_{f}_change"),
        format!("min_{f}_change"),
        format!("std_{f}_change"),
    ]
}

pub fn write_summary_csv(
    path: &Path,
    rows: &[SummaryRow],
    family: MetricFamily,
    current_year: u16,
    prior_year: u16,
    gzip: bool,
) -> Result<PathBuf> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(summary_header(family, current_year, prior_year))?;

    for row in rows {
        writer.write_record([
            row.category.clone(),
            row.state_code.clone(),
            row.county.clone().unwrap_or_default(),
            row.county_count.to_string(),
            row.avg_current.to_string(),
            row.avg_prior.to_string(),
            row.avg_change.to_string(),
            format_float(row.max_change),
            format_float(row.min_change),
            format_float(row.std_change),
        ])?;
    }

    let bytes = writer.into_inner().context("flushing summary CSV")?;
    persist(path, bytes, gzip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::{PartyBucket, RaceColumns};
    use crate::config::AnalysisConfig;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_grouped_csv_keeps_candidates_and_nulls() {
        let path = temp_path("split_ticket_test_grouped.csv");
        let _ = fs::remove_file(&path);

        let mut house = AggregatedRow::empty(2024, RaceType::House, "AL", "Mobile");
        house.add_candidate(PartyBucket::Democratic, "[1]Holmes".to_string(), 10);
        house.add_candidate(PartyBucket::Democratic, "[2]Figures".to_string(), 30);
        house.reported_pct = Some(92.5);
        let empty = AggregatedRow::empty(2024, RaceType::House, "AL", "Baldwin");

        write_grouped_csv(&path, &[house.clone(), empty.clone()], false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[1]Holmes; [2]Figures"));

        let rows = read_grouped_csv(&path).unwrap();
        assert_eq!(rows, vec![house, empty]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_flattened_csv_nulls_are_empty_not_zero() {
        let path = temp_path("split_ticket_test_flattened.csv");
        let _ = fs::remove_file(&path);

        let mut row = FlattenedRow::new("PA", "Erie");
        row.groups.insert(
            (RaceType::President, 2024),
            RaceColumns {
                total_votes: Some(1000),
                dem_votes: Some(500),
                rep_votes: Some(500),
                other_votes: Some(0),
                dem_pct: Some(50.0),
                rep_pct: Some(50.0),
                other_pct: Some(0.0),
                pct_reported: Some(99.5),
            },
        );

        write_flattened_csv(&path, &[row.clone()], &[2024, 2020], false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), 2 + 2 * 4 * 8);
        assert_eq!(header[2], "pres_total_votes_2024");
        assert_eq!(header[3], "pres_total_votes_dem_2024");
        assert!(header.contains(&"house_total_votes_dem_pct_2020"));

        let data: Vec<&str> = lines.next().unwrap().split(',').collect();
        let senate = header.iter().position(|h| *h == "senate_total_votes_2024").unwrap();
        assert_eq!(data[senate], "");

        let back = read_flattened_csv(&path).unwrap();
        assert_eq!(back, vec![row]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_metrics_csv_appends_derived_columns() {
        let path = temp_path("split_ticket_test_metrics.csv");
        let _ = fs::remove_file(&path);

        let mut row = FlattenedRow::new("PA", "Erie");
        for (race, total) in [(RaceType::President, 1000), (RaceType::House, 800)] {
            row.groups.insert(
                (race, 2024),
                RaceColumns {
                    total_votes: Some(total),
                    ..Default::default()
                },
            );
        }
        let table = MetricTable::from_flattened(vec![row], &AnalysisConfig::default());
        write_metrics_csv(&path, &table, false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        let data: Vec<&str> = lines.next().unwrap().split(',').collect();
        let ratio = header.iter().position(|h| *h == "pres_house_ratio_2024").unwrap();
        assert_eq!(data[ratio], "1.25");
        let change = header.iter().position(|h| *h == "pres_house_ratio_change").unwrap();
        assert_eq!(data[change], "NaN");
        assert_eq!(header.last(), Some(&"abs_split_ticket_change"));

        // Derived columns are ignored when reading back.
        let back = read_flattened_csv(&path).unwrap();
        assert_eq!(back[0].groups.len(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_summary_csv_gzip() {
        let path = temp_path("split_ticket_test_summary.csv");
        let gz = temp_path("split_ticket_test_summary.csv.gz");
        let _ = fs::remove_file(&gz);

        let rows = vec![SummaryRow {
            category: "Nationwide".to_string(),
            state_code: "ALL".to_string(),
            county: None,
            county_count: 0,
            avg_current: f64::NAN,
            avg_prior: f64::NAN,
            avg_change: f64::NAN,
            max_change: Some(f64::NAN),
            min_change: Some(f64::NAN),
            std_change: Some(f64::NAN),
        }];
        let written = write_summary_csv(&path, &rows, MetricFamily::SplitTicket, 2024, 2020, true).unwrap();
        assert_eq!(written, gz);

        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(&gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with(
            "category,state_code,county,county_count,avg_split_ticket_2024,avg_split_ticket_2020"
        ));
        assert!(decoded.contains("Nationwide,ALL,,0,NaN"));

        fs::remove_file(&gz).unwrap();
    }

    #[test]
    fn test_grouped_csv_rejects_overflowing_buckets() {
        let path = temp_path("split_ticket_test_grouped_overflow.csv");
        let header = "election_year,election_type,state_code,county,dem_candidate,rep_candidate,\
other_candidate,reported_pct,votes_total,votes_dem,votes_rep,votes_other,votes_dem_pct,\
votes_rep_pct,votes_other_pct";
        let line = "2024,P,PA,Erie,,,,,1,18446744073709551615,1,0,,,";
        fs::write(&path, format!("{header}\n{line}\n")).unwrap();

        let err = read_grouped_csv(&path).unwrap_err();
        assert!(err.to_string().contains("overflow"), "{err}");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_gzip_tables_read_back() {
        let grouped_path = temp_path("split_ticket_test_grouped_gz.csv");
        let flat_path = temp_path("split_ticket_test_flattened_gz.csv");

        let mut row = AggregatedRow::empty(2024, RaceType::President, "PA", "Erie");
        row.add_candidate(PartyBucket::Democratic, "Harris".to_string(), 300);
        row.add_candidate(PartyBucket::Republican, "Trump".to_string(), 600);
        row.reported_pct = Some(99.0);

        let written = write_grouped_csv(&grouped_path, &[row.clone()], true).unwrap();
        assert_eq!(written, temp_path("split_ticket_test_grouped_gz.csv.gz"));
        // Both the written path and the plain one it was asked for resolve.
        assert_eq!(read_grouped_csv(&written).unwrap(), vec![row.clone()]);
        assert_eq!(read_grouped_csv(&grouped_path).unwrap(), vec![row.clone()]);

        let flattened = crate::analyzers::flatten::flatten_rows(&[row]);
        let written_flat = write_flattened_csv(&flat_path, &flattened, &[2024, 2020], true).unwrap();
        assert_eq!(read_flattened_csv(&flat_path).unwrap(), flattened);

        fs::remove_file(&written).unwrap();
        fs::remove_file(&written_flat).unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let path = temp_path("split_ticket_test_config.json");
        let config = AnalysisConfig::default();
        save_json(&path, &config).unwrap();
        let back: AnalysisConfig = load_json(&path).unwrap();
        assert_eq!(back.swing_states, config.swing_states);
        fs::remove_file(&path).unwrap();
    }
}
