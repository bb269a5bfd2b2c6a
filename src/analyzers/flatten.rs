use crate::analyzers::types::{AggregatedRow, FlattenedRow, RaceColumns};
use std::collections::HashMap;
use tracing::debug;

/// Pivots aggregated rows into one [`FlattenedRow`] per (state, county),
/// ordered by first appearance.
///
/// Each aggregated row fills the column group named by its race and year.
/// Groups with no input row stay absent (null), so a county without a Senate
/// race keeps null Senate columns rather than zero votes.
pub fn flatten_rows(rows: &[AggregatedRow]) -> Vec<FlattenedRow> {
    let mut flattened: Vec<FlattenedRow> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for row in rows {
        let slot = *index
            .entry((row.state_code.as_str(), row.county.as_str()))
            .or_insert_with(|| {
                flattened.push(FlattenedRow::new(&row.state_code, &row.county));
                flattened.len() - 1
            });

        flattened[slot].groups.insert((row.race, row.year), race_columns(row));
    }

    debug!(input = rows.len(), counties = flattened.len(), "Flattened aggregated rows");
    flattened
}

fn race_columns(row: &AggregatedRow) -> RaceColumns {
    RaceColumns {
        total_votes: Some(row.total_votes),
        dem_votes: Some(row.dem_votes),
        rep_votes: Some(row.rep_votes),
        other_votes: Some(row.other_votes),
        dem_pct: row.dem_pct(),
        rep_pct: row.rep_pct(),
        other_pct: row.other_pct(),
        pct_reported: row.reported_pct,
    }
}
