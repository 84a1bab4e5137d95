//! Streaming export session and row/header rendering kernel.

use std::collections::BTreeSet;
use std::path::PathBuf;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::conf::{N_HEIGHT_LINE_POINTS, N_LEN_SHEET_NAME_MAX, N_NROWS_EXCEL_MAX, N_NROWS_HEADER};
use crate::schema::{derive_sheet_schema, EnumFieldKind, SheetRecord, SpecSheetSchema};
use crate::spec::{
    EnumCellValue, EnumRenderLocation, EnumWidthScanRule, ExportError, SpecExportOptions,
    SpecExportReport, SpecHeaderPlan, SpecHeaderSpan, SpecRenderedRow, SpecRowWindow,
    SpecSheetReport, SpecWidthAccumulator,
};
use crate::style::{resolve_location_formats, StyleResolver};
use crate::util::{
    count_text_lines, create_sheet_identifier, derive_final_column_widths, estimate_content_width,
    sanitize_sheet_name, validate_width_policy,
};

////////////////////////////////////////////////////////////////////////////////
// #region LayoutPlanning

/// Plan the two-row header layout for one analyzed schema.
///
/// Column assignment here is the single source of truth: the body renderer
/// walks the same schema in the same order, so header and data columns align
/// by construction.
pub fn plan_header_layout<T>(schema: &SpecSheetSchema<T>) -> SpecHeaderPlan {
    let mut plan = SpecHeaderPlan {
        n_lines_primary: 1,
        n_lines_sub: 1,
        ..Default::default()
    };

    let mut idx_col = 0;
    for field in &schema.fields {
        match &field.kind {
            EnumFieldKind::Scalar(_) => {
                plan.cells_row_primary.push(field.header_text.clone());
                plan.cells_row_sub.push(String::new());
                plan.fields_by_col.push(field.name.to_string());
                plan.widths_seed
                    .insert(idx_col, estimate_content_width(&field.header_text));
                plan.n_lines_primary = usize::max(
                    plan.n_lines_primary,
                    count_text_lines(&field.header_text),
                );
                if field.if_merge_cells {
                    plan.merges_vertical_cols.push(idx_col);
                }
                idx_col += 1;
            }
            EnumFieldKind::NestedGroup(l_subs) => {
                let idx_col_start = idx_col;
                for sub in l_subs {
                    plan.cells_row_primary.push(field.header_text.clone());
                    plan.cells_row_sub.push(sub.header_text.clone());
                    plan.fields_by_col.push(field.name.to_string());
                    plan.widths_seed
                        .insert(idx_col, estimate_content_width(&sub.header_text));
                    plan.n_lines_sub =
                        usize::max(plan.n_lines_sub, count_text_lines(&sub.header_text));
                    idx_col += 1;
                }
                plan.n_lines_primary = usize::max(
                    plan.n_lines_primary,
                    count_text_lines(&field.header_text),
                );
                // The engine rejects single-cell merge regions; a one-column
                // group writes its label as a plain cell instead.
                if idx_col - idx_col_start >= 2 {
                    plan.merges_horizontal.push(SpecHeaderSpan {
                        col_start: idx_col_start,
                        col_end: idx_col - 1,
                        text: field.header_text.clone(),
                    });
                }
            }
        }
    }

    plan
}

/// Flatten one record into its cell values, in schema column order.
pub fn render_record_cells<T>(
    record: &T,
    schema: &SpecSheetSchema<T>,
) -> Result<Vec<EnumCellValue>, ExportError> {
    let mut l_cells = Vec::with_capacity(schema.count_columns());

    for field in &schema.fields {
        match &field.kind {
            EnumFieldKind::Scalar(access) => {
                let value = access(record).map_err(|message| ExportError::FieldAccess {
                    field: field.name.to_string(),
                    message,
                })?;
                l_cells.push(value);
            }
            EnumFieldKind::NestedGroup(l_subs) => {
                for sub in l_subs {
                    let value =
                        (sub.access)(record).map_err(|message| ExportError::FieldAccess {
                            field: format!("{}.{}", field.name, sub.name),
                            message,
                        })?;
                    l_cells.push(value);
                }
            }
        }
    }

    Ok(l_cells)
}

/// Whether a body row at `idx_row` participates in width measurement.
pub fn if_observe_row_width(rule: EnumWidthScanRule, idx_row: usize) -> bool {
    match rule {
        EnumWidthScanRule::Exhaustive => true,
        EnumWidthScanRule::Sampled { interval_rows } => {
            idx_row % usize::max(1, interval_rows) == 0
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetEntry

/// One sheet of a multi-sheet export, carrying its records type-erased.
pub struct SpecSheetEntry {
    sheet_name: String,
    render: Box<dyn FnOnce(&mut ExportSession, &str, &dyn StyleResolver) -> Result<(), ExportError>>,
}

impl SpecSheetEntry {
    /// Bind a sheet name to a record list of one concrete type.
    pub fn create<T: SheetRecord + 'static>(
        sheet_name: impl Into<String>,
        records: Vec<T>,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            render: Box::new(
                move |session: &mut ExportSession, name: &str, styles: &dyn StyleResolver| {
                    session.export_sheet(name, &records, styles)
                },
            ),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportSession

/// Stateful export session owning the workbook and the streaming window.
///
/// The workbook is buffered through the engine until [`Self::close`] saves it
/// to the bound path; the document is not durable before that. [`Self::dispose`]
/// releases the window and the workbook buffers without saving and never
/// fails; dropping the session disposes it.
pub struct ExportSession {
    path_file_out: PathBuf,
    workbook: Option<Workbook>,
    options: SpecExportOptions,
    window: SpecRowWindow,
    set_sheet_names_existing: BTreeSet<String>,
    report: SpecExportReport,
    if_closed: bool,
}

impl ExportSession {
    /// Create a session bound to an output path.
    pub fn create(path_file_out: PathBuf, options: SpecExportOptions) -> Self {
        let window = SpecRowWindow::create(options.size_window, options.interval_flush);
        Self {
            path_file_out,
            workbook: Some(Workbook::new()),
            options,
            window,
            set_sheet_names_existing: BTreeSet::new(),
            report: SpecExportReport::default(),
            if_closed: false,
        }
    }

    /// Return the bound output path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Return a snapshot of the per-sheet report.
    pub fn report(&self) -> SpecExportReport {
        self.report.clone()
    }

    /// Render one sheet under the session's default sheet name.
    pub fn export_records<T: SheetRecord>(
        &mut self,
        records: &[T],
        styles: &dyn StyleResolver,
    ) -> Result<(), ExportError> {
        let c_sheet_name = self.options.sheet_name.clone();
        self.export_sheet(&c_sheet_name, records, styles)
    }

    /// Render every entry as its own sheet, in order.
    ///
    /// An empty record list still creates its (empty-bodied) sheet.
    pub fn export_sheets(
        &mut self,
        entries: Vec<SpecSheetEntry>,
        styles: &dyn StyleResolver,
    ) -> Result<(), ExportError> {
        for entry in entries {
            let SpecSheetEntry { sheet_name, render } = entry;
            render(self, &sheet_name, styles)?;
        }
        Ok(())
    }

    /// Render one sheet: analyze, write headers, stream the body through the
    /// window, finalize column widths.
    pub fn export_sheet<T: SheetRecord>(
        &mut self,
        sheet_name: &str,
        records: &[T],
        styles: &dyn StyleResolver,
    ) -> Result<(), ExportError> {
        if self.if_closed || self.workbook.is_none() {
            return Err(ExportError::SessionClosed);
        }
        validate_width_policy(&self.options.policy_width).map_err(ExportError::Schema)?;
        if records.len() > N_NROWS_EXCEL_MAX - N_NROWS_HEADER {
            return Err(ExportError::Schema(format!(
                "record count {} exceeds the sheet row capacity {}",
                records.len(),
                N_NROWS_EXCEL_MAX - N_NROWS_HEADER
            )));
        }

        let schema = derive_sheet_schema::<T>();
        let n_cols = schema.count_columns();
        let c_sheet_name = self.derive_unique_sheet_name(&sanitize_sheet_name(sheet_name));

        let workbook = self.workbook.as_mut().ok_or(ExportError::SessionClosed)?;
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&c_sheet_name)
            .map_err(derive_engine_error)?;

        if n_cols == 0 {
            tracing::debug!(sheet = %c_sheet_name, "no eligible columns; sheet left bare");
            self.report.sheets.push(SpecSheetReport {
                sheet_name: c_sheet_name,
                n_rows_data: 0,
                n_cols: 0,
            });
            return Ok(());
        }

        let plan = plan_header_layout(&schema);
        let l_fmt_header_by_col =
            resolve_location_formats(styles, &plan.fields_by_col, EnumRenderLocation::Header)?;
        let l_fmt_body_by_col =
            resolve_location_formats(styles, &plan.fields_by_col, EnumRenderLocation::Body)?;

        let mut acc = SpecWidthAccumulator::default();
        for (idx_col, n_width) in &plan.widths_seed {
            acc.observe(*idx_col, *n_width);
        }

        write_header_rows(worksheet, &plan, &l_fmt_header_by_col)?;
        if self.options.if_freeze_header {
            worksheet
                .set_freeze_panes(N_NROWS_HEADER as u32, 0)
                .map_err(derive_engine_error)?;
        }

        self.window.reset(N_NROWS_HEADER);
        for (idx_row, record) in records.iter().enumerate() {
            let l_cells = render_record_cells(record, &schema)?;

            if if_observe_row_width(self.options.policy_width.rule_scan, idx_row) {
                for (idx_col, cell) in l_cells.iter().enumerate() {
                    acc.observe(idx_col, estimate_content_width(&cell.display_text()));
                }
            }

            self.window.push(SpecRenderedRow { cells: l_cells });
            if self.window.if_flush_due() {
                flush_window_rows(&mut self.window, worksheet, &l_fmt_body_by_col)?;
            }
        }
        flush_window_rows(&mut self.window, worksheet, &l_fmt_body_by_col)?;

        let l_widths_final =
            derive_final_column_widths(&acc, &self.options.policy_width, n_cols);
        for (idx_col, n_width) in l_widths_final.iter().enumerate() {
            let col = cast_col_num(idx_col)?;
            if let Err(err) = worksheet.set_column_width(col, *n_width as f64) {
                tracing::warn!(column = idx_col, error = %err, "column width assignment failed; using fallback");
                self.report.warn(format!(
                    "column {idx_col}: width fallback after engine error: {err}"
                ));
                if let Err(err_fallback) = worksheet
                    .set_column_width(col, self.options.policy_width.width_col_fallback as f64)
                {
                    tracing::warn!(column = idx_col, error = %err_fallback, "fallback column width failed as well");
                }
            }
        }

        tracing::debug!(
            sheet = %c_sheet_name,
            rows = records.len(),
            cols = n_cols,
            "sheet rendered"
        );
        self.report.sheets.push(SpecSheetReport {
            sheet_name: c_sheet_name,
            n_rows_data: records.len(),
            n_cols,
        });
        Ok(())
    }

    /// Save the workbook to the bound path. Idempotent.
    pub fn close(&mut self) -> Result<(), ExportError> {
        if self.if_closed {
            return Ok(());
        }
        let workbook = self.workbook.as_mut().ok_or(ExportError::SessionClosed)?;
        workbook
            .save(&self.path_file_out)
            .map_err(derive_engine_error)?;
        self.if_closed = true;
        Ok(())
    }

    /// Release the window and the workbook buffers without saving.
    ///
    /// Idempotent and infallible; runs on drop for error paths that never
    /// reach an explicit call.
    pub fn dispose(&mut self) {
        if self.workbook.take().is_some() {
            tracing::debug!(path = %self.path_file_out.display(), "export session disposed");
        }
        self.window.clear();
    }

    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if self.set_sheet_names_existing.insert(name.to_string()) {
            return name.to_string();
        }

        let mut n_idx = 2usize;
        loop {
            let c_candidate = create_sheet_identifier(name, n_idx);
            debug_assert!(c_candidate.chars().count() <= N_LEN_SHEET_NAME_MAX);
            if self.set_sheet_names_existing.insert(c_candidate.clone()) {
                return c_candidate;
            }
            n_idx += 1;
        }
    }
}

impl Drop for ExportSession {
    fn drop(&mut self) {
        if self.workbook.is_some() && !self.if_closed {
            tracing::warn!(
                path = %self.path_file_out.display(),
                "export session dropped before close; output was not saved"
            );
        }
        self.dispose();
    }
}

/// One-call export: render `records` as a single sheet and save to the path.
///
/// The session is closed on success and disposed on every path; callers who
/// need multiple sheets of one type or incremental control use
/// [`ExportSession`] directly.
pub fn export_records_to_file<T: SheetRecord>(
    path_file_out: PathBuf,
    records: &[T],
    options: SpecExportOptions,
    styles: &dyn StyleResolver,
) -> Result<SpecExportReport, ExportError> {
    let mut session = ExportSession::create(path_file_out, options);
    session.export_records(records, styles)?;
    session.close()?;
    Ok(session.report())
}

/// One-call multi-sheet export: render every entry as its own sheet and save.
pub fn export_sheets_to_file(
    path_file_out: PathBuf,
    entries: Vec<SpecSheetEntry>,
    options: SpecExportOptions,
    styles: &dyn StyleResolver,
) -> Result<SpecExportReport, ExportError> {
    let mut session = ExportSession::create(path_file_out, options);
    session.export_sheets(entries, styles)?;
    session.close()?;
    Ok(session.report())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorksheetCommit

fn write_header_rows(
    worksheet: &mut Worksheet,
    plan: &SpecHeaderPlan,
    l_fmt_by_col: &[Format],
) -> Result<(), ExportError> {
    worksheet
        .set_row_height(0, (N_HEIGHT_LINE_POINTS * plan.n_lines_primary) as f64)
        .map_err(derive_engine_error)?;
    worksheet
        .set_row_height(1, (N_HEIGHT_LINE_POINTS * plan.n_lines_sub) as f64)
        .map_err(derive_engine_error)?;

    let set_cols_vertical: BTreeSet<usize> = plan.merges_vertical_cols.iter().copied().collect();
    let set_cols_spanned: BTreeSet<usize> = plan
        .merges_horizontal
        .iter()
        .flat_map(|span| span.col_start..=span.col_end)
        .collect();

    for idx_col in 0..plan.cells_row_primary.len() {
        let col = cast_col_num(idx_col)?;
        let fmt = &l_fmt_by_col[idx_col];

        // Vertically merged columns are written whole by their merge below.
        if set_cols_vertical.contains(&idx_col) {
            continue;
        }

        if !set_cols_spanned.contains(&idx_col) {
            write_text_or_blank(worksheet, 0, col, &plan.cells_row_primary[idx_col], fmt)?;
        }
        write_text_or_blank(worksheet, 1, col, &plan.cells_row_sub[idx_col], fmt)?;
    }

    for idx_col in &plan.merges_vertical_cols {
        let col = cast_col_num(*idx_col)?;
        worksheet
            .merge_range(0, col, 1, col, &plan.cells_row_primary[*idx_col], &l_fmt_by_col[*idx_col])
            .map_err(derive_engine_error)?;
    }
    for span in &plan.merges_horizontal {
        worksheet
            .merge_range(
                0,
                cast_col_num(span.col_start)?,
                0,
                cast_col_num(span.col_end)?,
                &span.text,
                &l_fmt_by_col[span.col_start],
            )
            .map_err(derive_engine_error)?;
    }

    Ok(())
}

fn write_text_or_blank(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    fmt: &Format,
) -> Result<(), ExportError> {
    if text.is_empty() {
        worksheet.write_blank(row, col, fmt).map_err(derive_engine_error)?;
    } else {
        worksheet
            .write_string_with_format(row, col, text, fmt)
            .map_err(derive_engine_error)?;
    }
    Ok(())
}

fn flush_window_rows(
    window: &mut SpecRowWindow,
    worksheet: &mut Worksheet,
    l_fmt_by_col: &[Format],
) -> Result<(), ExportError> {
    let (n_row_start, l_rows) = window.drain_pending();

    for (idx_row, row) in l_rows.iter().enumerate() {
        let n_row = cast_row_num(n_row_start + idx_row)?;
        for (idx_col, cell) in row.cells.iter().enumerate() {
            write_cell_with_format(worksheet, n_row, cast_col_num(idx_col)?, cell, &l_fmt_by_col[idx_col])?;
        }
    }

    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), ExportError> {
    match value {
        EnumCellValue::Empty => {
            worksheet.write_blank(row, col, format).map_err(derive_engine_error)?;
        }
        EnumCellValue::Text(val) => {
            worksheet
                .write_string_with_format(row, col, val, format)
                .map_err(derive_engine_error)?;
        }
        EnumCellValue::Number(val) => {
            worksheet
                .write_number_with_format(row, col, *val, format)
                .map_err(derive_engine_error)?;
        }
        EnumCellValue::Date(val) => {
            worksheet
                .write_string_with_format(row, col, &val.to_string(), format)
                .map_err(derive_engine_error)?;
        }
    }
    Ok(())
}

fn cast_row_num(value: usize) -> Result<u32, ExportError> {
    u32::try_from(value).map_err(|_| ExportError::SheetWrite(format!("row index overflow: {value}")))
}

fn cast_col_num(value: usize) -> Result<u16, ExportError> {
    u16::try_from(value).map_err(|_| ExportError::SheetWrite(format!("column index overflow: {value}")))
}

fn derive_engine_error(err: XlsxError) -> ExportError {
    ExportError::SheetWrite(err.to_string())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
