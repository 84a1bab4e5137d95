//! Shared export specification models.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::conf::{
    N_INTERVAL_FLUSH_DEFAULT, N_SIZE_WINDOW_DEFAULT, N_WIDTH_COL_FALLBACK, N_WIDTH_COL_MAX,
    N_WIDTH_COL_MIN, C_SHEET_NAME_DEFAULT,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueModel

/// Render location of one cell, used to select its resolved style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRenderLocation {
    /// Header rows (primary label row and sub-label row).
    Header,
    /// Data rows.
    Body,
}

/// Closed tagged cell value produced by field accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value, written as a styled blank cell.
    Empty,
    /// Text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Calendar date, rendered in its canonical ISO-8601 text form.
    Date(NaiveDate),
}

impl EnumCellValue {
    /// Text form of the value as it appears in the sheet.
    ///
    /// Used for column width measurement alongside rendering.
    pub fn display_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(value) => value.clone(),
            Self::Number(value) => value.to_string(),
            Self::Date(value) => value.to_string(),
        }
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for EnumCellValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<NaiveDate> for EnumCellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<V: Into<EnumCellValue>> From<Option<V>> for EnumCellValue {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Self::Empty,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatModel

/// Column declaration metadata attached to one exportable field.
///
/// Presence of this metadata on a declared field is the sole inclusion test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnMeta {
    /// Header label text; may contain newlines for multi-line headers.
    pub header_name: String,
    /// Request merged header cells for this field.
    pub merge_cells: bool,
}

/// Resolved cell format returned by the style resolution port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Horizontal alignment keyword (`left`, `center`, `right`, ...).
    pub align: Option<String>,
    /// Vertical alignment keyword (`top`, `vcenter`, `bottom`).
    pub valign: Option<String>,
    /// Border style index for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,
    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Column width scan strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumWidthScanRule {
    /// Measure every rendered body row (default).
    #[default]
    Exhaustive,
    /// Measure every Nth body row; header cells are always measured.
    Sampled {
        /// Sampling interval in body rows; values below 1 behave as 1.
        interval_rows: usize,
    },
}

/// Column width policy for one export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecWidthPolicy {
    /// Body scan strategy.
    pub rule_scan: EnumWidthScanRule,
    /// Minimum final width, in engine character units.
    pub width_col_min: usize,
    /// Maximum final width, in engine character units.
    pub width_col_max: usize,
    /// Per-column fallback width when the engine rejects an assignment.
    pub width_col_fallback: usize,
}

impl Default for SpecWidthPolicy {
    fn default() -> Self {
        Self {
            rule_scan: EnumWidthScanRule::Exhaustive,
            width_col_min: N_WIDTH_COL_MIN,
            width_col_max: N_WIDTH_COL_MAX,
            width_col_fallback: N_WIDTH_COL_FALLBACK,
        }
    }
}

/// Session-wide export options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExportOptions {
    /// Sheet name used by the single-sheet convenience path.
    pub sheet_name: String,
    /// Maximum pending rendered rows kept in the session window.
    pub size_window: usize,
    /// Periodic flush interval, counted in rendered body rows.
    pub interval_flush: usize,
    /// Freeze the header rows after rendering them.
    pub if_freeze_header: bool,
    /// Column width policy.
    pub policy_width: SpecWidthPolicy,
}

impl Default for SpecExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            size_window: N_SIZE_WINDOW_DEFAULT,
            interval_flush: N_INTERVAL_FLUSH_DEFAULT,
            if_freeze_header: true,
            policy_width: SpecWidthPolicy::default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderPlanModel

/// One horizontal merge span on the primary header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHeaderSpan {
    /// Start column index (inclusive).
    pub col_start: usize,
    /// End column index (inclusive).
    pub col_end: usize,
    /// Merge display text (the group label).
    pub text: String,
}

/// Planned two-row header layout for one analyzed schema.
///
/// All vectors are indexed by sheet column; the plan carries no engine state
/// and is discarded after the header rows are committed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecHeaderPlan {
    /// Primary row text per column; group labels repeat across their span.
    pub cells_row_primary: Vec<String>,
    /// Sub row text per column; empty for scalar columns.
    pub cells_row_sub: Vec<String>,
    /// Parent field name per column, the style resolution key.
    pub fields_by_col: Vec<String>,
    /// Columns carrying a rows-0..1 vertical merge (merged scalar fields).
    pub merges_vertical_cols: Vec<usize>,
    /// Horizontal merge spans on the primary row (multi-column groups only).
    pub merges_horizontal: Vec<SpecHeaderSpan>,
    /// Max newline-delimited line count across primary row labels.
    pub n_lines_primary: usize,
    /// Max newline-delimited line count across sub row labels.
    pub n_lines_sub: usize,
    /// Provisional column widths recorded from the header labels.
    pub widths_seed: BTreeMap<usize, usize>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StreamingWindow

/// One flattened data row, buffered until the window drains it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRenderedRow {
    /// Flattened cell values in column order.
    pub cells: Vec<EnumCellValue>,
}

/// Bounded pending-row buffer owned by the export session.
///
/// Rows accumulate here and drain to the engine worksheet when the window is
/// full or the periodic flush interval elapses; draining an empty window is a
/// no-op, so redundant flush calls are safe.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRowWindow {
    /// Rendered rows not yet committed to the engine.
    pub rows_pending: Vec<SpecRenderedRow>,
    /// Absolute sheet row index the next drain writes to.
    pub n_row_commit_next: usize,
    /// Total rows pushed since the last reset.
    pub n_rows_seen: usize,
    /// Maximum pending rows before a drain is forced.
    pub size_window: usize,
    /// Periodic flush interval in pushed rows.
    pub interval_flush: usize,
}

impl SpecRowWindow {
    /// Create a window; zero sizes are clamped to 1.
    pub fn create(size_window: usize, interval_flush: usize) -> Self {
        Self {
            rows_pending: Vec::new(),
            n_row_commit_next: 0,
            n_rows_seen: 0,
            size_window: usize::max(1, size_window),
            interval_flush: usize::max(1, interval_flush),
        }
    }

    /// Clear pending rows and rebase the commit cursor for a new sheet.
    pub fn reset(&mut self, n_row_start: usize) {
        self.rows_pending.clear();
        self.n_row_commit_next = n_row_start;
        self.n_rows_seen = 0;
    }

    /// Buffer one rendered row.
    pub fn push(&mut self, row: SpecRenderedRow) {
        self.rows_pending.push(row);
        self.n_rows_seen += 1;
    }

    /// Whether the pending buffer should drain now.
    pub fn if_flush_due(&self) -> bool {
        !self.rows_pending.is_empty()
            && (self.rows_pending.len() >= self.size_window
                || self.n_rows_seen % self.interval_flush == 0)
    }

    /// Take all pending rows together with their first sheet row index.
    pub fn drain_pending(&mut self) -> (usize, Vec<SpecRenderedRow>) {
        let n_row_start = self.n_row_commit_next;
        self.n_row_commit_next += self.rows_pending.len();
        (n_row_start, std::mem::take(&mut self.rows_pending))
    }

    /// Drop pending rows without committing them.
    pub fn clear(&mut self) {
        self.rows_pending.clear();
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthAccumulator

/// Monotonic max-width tracker per column index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecWidthAccumulator {
    /// Max observed width units by column index.
    pub dict_width_by_col: BTreeMap<usize, usize>,
}

impl SpecWidthAccumulator {
    /// Record one measurement; keeps the per-column maximum.
    pub fn observe(&mut self, idx_col: usize, n_width: usize) {
        let entry = self.dict_width_by_col.entry(idx_col).or_insert(0);
        *entry = usize::max(*entry, n_width);
    }

    /// Max observed width for one column, if any cell was measured there.
    pub fn width_at(&self, idx_col: usize) -> Option<usize> {
        self.dict_width_by_col.get(&idx_col).copied()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportModel

/// Per-sheet outcome summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetReport {
    /// Actual unique sheet name in the workbook.
    pub sheet_name: String,
    /// Number of data rows written (headers excluded).
    pub n_rows_data: usize,
    /// Number of columns in the sheet.
    pub n_cols: usize,
}

/// Aggregate report for one export session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecExportReport {
    /// One entry per rendered sheet, in render order.
    pub sheets: Vec<SpecSheetReport>,
    /// Non-fatal warnings (width fallbacks and similar).
    pub warnings: Vec<String>,
}

impl SpecExportReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ErrorTaxonomy

/// Fatal export failures surfaced to the caller.
///
/// Width assignment failures are deliberately absent: they degrade to a
/// per-column fallback width and a report warning instead of aborting.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Degenerate input (row-limit overflow, invalid options).
    #[error("invalid export input: {0}")]
    Schema(String),
    /// A declared field could not be read from a record instance.
    #[error("failed to read field {field:?}: {message}")]
    FieldAccess {
        /// Field identity, `parent.sub` for nested sub-fields.
        field: String,
        /// Accessor failure text.
        message: String,
    },
    /// The style resolution port returned no style.
    #[error("style resolution returned no style for field {field:?} at {location:?}")]
    StyleResolution {
        /// Field name the resolution was keyed by.
        field: String,
        /// Render location the resolution was keyed by.
        location: EnumRenderLocation,
    },
    /// Spreadsheet engine write or save failure.
    #[error("spreadsheet engine error: {0}")]
    SheetWrite(String),
    /// Write or close attempted after close/dispose.
    #[error("export session is already closed or disposed")]
    SessionClosed,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_from_conversions() {
        assert_eq!(EnumCellValue::from("ab"), EnumCellValue::Text("ab".to_string()));
        assert_eq!(EnumCellValue::from(3_i64), EnumCellValue::Number(3.0));
        assert_eq!(EnumCellValue::from(None::<i64>), EnumCellValue::Empty);
        assert_eq!(
            EnumCellValue::from(Some("x".to_string())),
            EnumCellValue::Text("x".to_string())
        );
    }

    #[test]
    fn test_cell_value_display_text() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        assert_eq!(EnumCellValue::Date(date).display_text(), "2024-12-20");
        assert_eq!(EnumCellValue::Number(3.0).display_text(), "3");
        assert_eq!(EnumCellValue::Number(3.5).display_text(), "3.5");
        assert_eq!(EnumCellValue::Empty.display_text(), "");
    }

    #[test]
    fn test_cell_format_merge_prefers_right_side() {
        let base = SpecCellFormat {
            bold: Some(false),
            align: Some("left".to_string()),
            border: Some(1),
            ..Default::default()
        };
        let patch = SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            ..Default::default()
        };

        let merged = base.merge(&patch);
        assert_eq!(merged.bold, Some(true));
        assert_eq!(merged.align.as_deref(), Some("center"));
        assert_eq!(merged.border, Some(1));
    }

    #[test]
    fn test_row_window_flush_cadence() {
        let mut window = SpecRowWindow::create(3, 2);
        window.reset(2);
        assert!(!window.if_flush_due());

        window.push(SpecRenderedRow { cells: vec![] });
        assert!(!window.if_flush_due());

        window.push(SpecRenderedRow { cells: vec![] });
        assert!(window.if_flush_due());

        let (n_row_start, l_rows) = window.drain_pending();
        assert_eq!(n_row_start, 2);
        assert_eq!(l_rows.len(), 2);
        assert!(!window.if_flush_due());

        let (n_row_start_again, l_rows_empty) = window.drain_pending();
        assert_eq!(n_row_start_again, 4);
        assert!(l_rows_empty.is_empty());
    }

    #[test]
    fn test_row_window_forces_drain_at_capacity() {
        let mut window = SpecRowWindow::create(2, 1000);
        window.reset(0);
        window.push(SpecRenderedRow { cells: vec![] });
        assert!(!window.if_flush_due());
        window.push(SpecRenderedRow { cells: vec![] });
        assert!(window.if_flush_due());
    }

    #[test]
    fn test_width_accumulator_keeps_max() {
        let mut acc = SpecWidthAccumulator::default();
        acc.observe(0, 5);
        acc.observe(0, 3);
        acc.observe(0, 9);
        acc.observe(1, 2);
        assert_eq!(acc.width_at(0), Some(9));
        assert_eq!(acc.width_at(1), Some(2));
        assert_eq!(acc.width_at(2), None);
    }
}
