//! `rowkit_xlsx`:
//! Declaration-driven XLSX export kernel with a two-tier merged header.
//!
//! Record types describe their exportable fields through a static
//! declared-field table; the session analyzes the table once per sheet,
//! renders a two-row header (vertical merges for merged scalar labels,
//! horizontal merges for nested-group spans), streams data rows through a
//! bounded window, and finalizes column widths from observed content.
//!
//! Module layout:
//! - `conf`   : constants and default presets
//! - `spec`   : specs/models/options/errors
//! - `schema` : declared-field tables and schema analysis
//! - `style`  : style resolution port and engine format mapping
//! - `util`   : pure helper functions
//! - `writer` : streaming export session
pub mod conf;
pub mod schema;
pub mod spec;
pub mod style;
pub mod util;
pub mod writer;

pub use conf::{
    C_SHEET_NAME_DEFAULT, N_INTERVAL_FLUSH_DEFAULT, N_NROWS_EXCEL_MAX, N_NROWS_HEADER,
    N_SIZE_WINDOW_DEFAULT, N_WIDTH_COL_FALLBACK, N_WIDTH_COL_MAX, N_WIDTH_COL_MIN,
};
pub use schema::{
    derive_sheet_schema, EnumFieldKind, FnAccessValue, SheetRecord, SpecDeclaredField,
    SpecFieldDescriptor, SpecSheetSchema, SpecSubField,
};
pub use spec::{
    EnumCellValue, EnumRenderLocation, EnumWidthScanRule, ExportError, SpecCellFormat,
    SpecColumnMeta, SpecExportOptions, SpecExportReport, SpecHeaderPlan, SpecHeaderSpan,
    SpecSheetReport, SpecWidthPolicy,
};
pub use style::{derive_cell_format, SpecDefaultStyleResolver, StyleResolver};
pub use util::{count_text_lines, estimate_content_width, sanitize_sheet_name};
pub use writer::{
    export_records_to_file, export_sheets_to_file, plan_header_layout, render_record_cells,
    ExportSession, SpecSheetEntry,
};
