//! Bulk entry of serial and batch allocations.

use crate::allocation::resolver::RecomputeTask;
use crate::allocation::row::RowId;
use crate::allocation::session::AllocationSession;
use crate::config::DEFAULT_MAX_SERIAL_RANGE;
use crate::error::{CoreError, Result};
use crate::types::non_empty;
use serde::Deserialize;

/// Header of the CSV import template.
pub const CSV_HEADER: &str = "serial_no,batch_no,qty";

/// How the dialog reads its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// One serial number per line, or a range such as `SN-01::10`.
    SerialEntry,
    /// `batch,qty` per line.
    BatchEntry,
    /// CSV with a `serial_no,batch_no,qty` header.
    CsvImport,
}

/// One parsed allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationEntry {
    pub serial_no: Option<String>,
    pub batch_no: Option<String>,
    pub quantity: f64,
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(default)]
    serial_no: Option<String>,
    #[serde(default)]
    batch_no: Option<String>,
    #[serde(default)]
    qty: Option<f64>,
}

/// Allocation dialog bound to one item and strategy.
#[derive(Clone, Debug)]
pub struct AllocationDialog {
    strategy: AllocationStrategy,
    item_code: String,
    warehouse: Option<String>,
    range_limit: usize,
}

impl AllocationDialog {
    pub fn new(strategy: AllocationStrategy, item_code: impl Into<String>) -> Self {
        Self {
            strategy,
            item_code: item_code.into(),
            warehouse: None,
            range_limit: DEFAULT_MAX_SERIAL_RANGE,
        }
    }

    /// Source warehouse applied to every created row.
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = non_empty(Some(&warehouse.into()));
        self
    }

    /// Cap on how many serials one range line may produce.
    pub fn with_range_limit(mut self, limit: usize) -> Self {
        self.range_limit = limit;
        self
    }

    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Template offered for download in CSV mode.
    pub fn csv_template(&self) -> String {
        format!("{}\n", CSV_HEADER)
    }

    /// Parse dialog input into entries.
    pub fn parse(&self, input: &str) -> Result<Vec<AllocationEntry>> {
        match self.strategy {
            AllocationStrategy::SerialEntry => parse_serials(input, self.range_limit),
            AllocationStrategy::BatchEntry => parse_batches(input),
            AllocationStrategy::CsvImport => parse_csv(input),
        }
    }

    /// Add one row per entry to the session.
    ///
    /// Returns the new row ids and the recompute tasks they need.
    pub fn apply(
        &self,
        session: &mut AllocationSession,
        entries: &[AllocationEntry],
    ) -> Result<(Vec<RowId>, Vec<RecomputeTask>)> {
        let mut ids = Vec::with_capacity(entries.len());
        let mut tasks = Vec::new();

        for entry in entries {
            let id = session.add_row();
            tasks.extend(session.set_item_code(id, Some(&self.item_code))?);
            if let Some(warehouse) = &self.warehouse {
                tasks.extend(session.set_warehouse(id, Some(warehouse))?);
            }
            session.set_quantity(id, entry.quantity)?;
            if let Some(batch_no) = &entry.batch_no {
                tasks.extend(session.set_batch_no(id, Some(batch_no))?);
            }
            if let Some(serial_no) = &entry.serial_no {
                tasks.extend(session.set_serial_no(id, Some(serial_no))?);
            }
            ids.push(id);
        }

        // Only the newest ticket per row and stage survives in the session,
        // so earlier tasks from the same loop would be discarded anyway.
        let mut latest = std::collections::HashMap::new();
        for task in tasks {
            let ticket = task.ticket();
            latest.insert((ticket.row, ticket.stage), task);
        }
        let mut tasks: Vec<RecomputeTask> = latest.into_values().collect();
        tasks.sort_by_key(|t| t.ticket().row);

        Ok((ids, tasks))
    }
}

fn parse_serials(input: &str, range_limit: usize) -> Result<Vec<AllocationEntry>> {
    let mut entries = Vec::new();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let serials = if line.contains("::") {
            expand_serial_range(line, range_limit)?
        } else {
            vec![line.to_string()]
        };

        entries.extend(serials.into_iter().map(|serial_no| AllocationEntry {
            serial_no: Some(serial_no),
            batch_no: None,
            quantity: 1.0,
        }));
    }
    Ok(entries)
}

fn parse_batches(input: &str) -> Result<Vec<AllocationEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (batch, qty) = line.split_once(',').ok_or_else(|| {
            CoreError::InvalidFormat(format!("line {}: expected `batch,qty`", line_no + 1))
        })?;

        let quantity: f64 = qty.trim().parse().map_err(|_| {
            CoreError::InvalidFormat(format!("line {}: invalid quantity {:?}", line_no + 1, qty.trim()))
        })?;

        entries.push(AllocationEntry {
            serial_no: None,
            batch_no: non_empty(Some(batch)),
            quantity,
        });
    }
    Ok(entries)
}

fn parse_csv(input: &str) -> Result<Vec<AllocationEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let mut entries = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        let row = record?;
        let serial_no = non_empty(row.serial_no.as_deref());
        let batch_no = non_empty(row.batch_no.as_deref());
        if serial_no.is_none() && batch_no.is_none() {
            continue;
        }

        let quantity = if serial_no.is_some() {
            1.0
        } else {
            row.qty.unwrap_or(0.0)
        };

        entries.push(AllocationEntry {
            serial_no,
            batch_no,
            quantity,
        });
    }
    Ok(entries)
}

/// Expand `SN-01::10` into `SN-01` through `SN-10`.
///
/// The trailing digits of the start set the counter and its padding.
/// Ranges longer than `limit` are rejected before anything is allocated.
pub fn expand_serial_range(range: &str, limit: usize) -> Result<Vec<String>> {
    let invalid = || CoreError::InvalidFormat(format!("invalid serial range {:?}", range));

    let (start, end) = range.split_once("::").ok_or_else(invalid)?;
    let start = start.trim();
    let end = end.trim();

    let digits_at = start.len() - start.chars().rev().take_while(char::is_ascii_digit).count();
    let (prefix, start_digits) = start.split_at(digits_at);
    if start_digits.is_empty() {
        return Err(invalid());
    }

    let first: u64 = start_digits.parse().map_err(|_| invalid())?;
    let last: u64 = end.parse().map_err(|_| invalid())?;
    if last < first {
        return Err(invalid());
    }

    let count = (last - first).saturating_add(1);
    if count > limit as u64 {
        return Err(CoreError::InvalidFormat(format!(
            "serial range {:?} expands to {} serials, limit is {}",
            range, count, limit
        )));
    }

    let width = start_digits.len();
    Ok((first..=last)
        .map(|n| format!("{}{:0width$}", prefix, n, width = width))
        .collect())
}
