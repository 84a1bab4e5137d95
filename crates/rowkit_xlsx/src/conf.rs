//! Export constants and default style presets.

use crate::spec::SpecCellFormat;

/// Default worksheet name when the caller supplies none.
pub const C_SHEET_NAME_DEFAULT: &str = "Sheet1";

/// Number of header rows produced for every non-empty schema.
pub const N_NROWS_HEADER: usize = 2;

/// Default bounded row window kept in memory before draining to the engine.
pub const N_SIZE_WINDOW_DEFAULT: usize = 1000;
/// Default periodic flush interval, counted in rendered body rows.
pub const N_INTERVAL_FLUSH_DEFAULT: usize = 1000;

/// Height of one text line in a header row, in points.
pub const N_HEIGHT_LINE_POINTS: usize = 17;

/// Base width offset added to every non-empty cell text measurement.
pub const N_WIDTH_PAD_BASE: usize = 2;
/// Minimum final column width, in engine character units.
pub const N_WIDTH_COL_MIN: usize = 4;
/// Maximum final column width, in engine character units.
pub const N_WIDTH_COL_MAX: usize = 50;
/// Column width applied when the engine rejects the computed width.
pub const N_WIDTH_COL_FALLBACK: usize = 15;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel sheet name maximum length.
pub const N_LEN_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];

/// Build the default body cell format preset.
pub fn derive_default_body_format() -> SpecCellFormat {
    SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        border: Some(1),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    }
}

/// Build the default header cell format preset.
///
/// Header cells overlay bold + centered alignment onto the body preset.
pub fn derive_default_header_format() -> SpecCellFormat {
    derive_default_body_format().merge(&SpecCellFormat {
        bold: Some(true),
        align: Some("center".to_string()),
        ..Default::default()
    })
}
