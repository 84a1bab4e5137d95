//! Style resolution port and engine format mapping.

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder};

use crate::conf::{derive_default_body_format, derive_default_header_format};
use crate::spec::{EnumRenderLocation, ExportError, SpecCellFormat};

////////////////////////////////////////////////////////////////////////////////
// #region ResolutionPort

/// Cell style collaborator, keyed by field name and render location.
///
/// Resolution must be deterministic for a given (field, location) pair within
/// one export; returning `None` is a contract violation and aborts the export.
pub trait StyleResolver {
    /// Resolve the style for one field at one render location.
    fn resolve_style(
        &self,
        field_name: &str,
        location: EnumRenderLocation,
    ) -> Option<SpecCellFormat>;
}

/// Field-agnostic resolver backed by the default presets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDefaultStyleResolver {
    /// Format returned for header cells.
    pub fmt_header: SpecCellFormat,
    /// Format returned for body cells.
    pub fmt_body: SpecCellFormat,
}

impl Default for SpecDefaultStyleResolver {
    fn default() -> Self {
        Self {
            fmt_header: derive_default_header_format(),
            fmt_body: derive_default_body_format(),
        }
    }
}

impl StyleResolver for SpecDefaultStyleResolver {
    fn resolve_style(
        &self,
        _field_name: &str,
        location: EnumRenderLocation,
    ) -> Option<SpecCellFormat> {
        match location {
            EnumRenderLocation::Header => Some(self.fmt_header.clone()),
            EnumRenderLocation::Body => Some(self.fmt_body.clone()),
        }
    }
}

/// Resolve one engine format per column for a render location.
///
/// Header formats get wrap-text forced on regardless of what the resolver
/// returned.
pub fn resolve_location_formats(
    styles: &dyn StyleResolver,
    fields_by_col: &[String],
    location: EnumRenderLocation,
) -> Result<Vec<Format>, ExportError> {
    let mut l_fmts = Vec::with_capacity(fields_by_col.len());
    for c_field in fields_by_col {
        let mut fmt_spec = styles.resolve_style(c_field, location).ok_or_else(|| {
            ExportError::StyleResolution {
                field: c_field.clone(),
                location,
            }
        })?;

        if location == EnumRenderLocation::Header {
            fmt_spec = fmt_spec.merge(&SpecCellFormat {
                text_wrap: Some(true),
                ..Default::default()
            });
        }

        l_fmts.push(derive_cell_format(&fmt_spec));
    }
    Ok(l_fmts)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EngineFormatMapping

/// Convert a resolved format spec into the engine format object.
pub fn derive_cell_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(value) = &spec.font_name {
        format = format.set_font_name(value.clone());
    }
    if let Some(value) = spec.font_size {
        format = format.set_font_size(value as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    if let Some(value) = &spec.align
        && let Some(align) = derive_format_align(value)
    {
        format = format.set_align(align);
    }
    if let Some(value) = &spec.valign
        && let Some(align) = derive_format_align(value)
    {
        format = format.set_align(align);
    }

    if let Some(value) = &spec.num_format {
        format = format.set_num_format(value.clone());
    }
    if let Some(value) = &spec.bg_color {
        format = format.set_background_color(value.as_str());
    }
    if let Some(value) = &spec.font_color {
        format = format.set_font_color(value.as_str());
    }
    if let Some(value) = spec.border {
        format = format.set_border(derive_format_border(value));
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        0 => FormatBorder::None,
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "justify" => Some(FormatAlign::Justify),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    struct NoneResolver;

    impl StyleResolver for NoneResolver {
        fn resolve_style(
            &self,
            _field_name: &str,
            _location: EnumRenderLocation,
        ) -> Option<SpecCellFormat> {
            None
        }
    }

    #[test]
    fn test_default_resolver_is_deterministic_per_location() {
        let resolver = SpecDefaultStyleResolver::default();
        let fmt_a = resolver.resolve_style("name", EnumRenderLocation::Header);
        let fmt_b = resolver.resolve_style("name", EnumRenderLocation::Header);
        assert_eq!(fmt_a, fmt_b);

        let fmt_header = fmt_a.unwrap();
        assert_eq!(fmt_header.bold, Some(true));
        assert_eq!(fmt_header.align.as_deref(), Some("center"));

        let fmt_body = resolver.resolve_style("name", EnumRenderLocation::Body).unwrap();
        assert_eq!(fmt_body.bold, None);
        assert_eq!(fmt_body.align.as_deref(), Some("left"));
    }

    #[test]
    fn test_resolve_location_formats_surfaces_missing_style() {
        let l_fields = vec!["name".to_string()];
        let result =
            resolve_location_formats(&NoneResolver, &l_fields, EnumRenderLocation::Header);

        match result {
            Err(ExportError::StyleResolution { field, location }) => {
                assert_eq!(field, "name");
                assert_eq!(location, EnumRenderLocation::Header);
            }
            Err(other) => panic!("expected style resolution failure, got {other}"),
            Ok(_) => panic!("expected style resolution failure, got formats"),
        }
    }

    #[test]
    fn test_resolve_location_formats_returns_one_format_per_column() {
        let resolver = SpecDefaultStyleResolver::default();
        let l_fields = vec!["name".to_string(), "addr".to_string(), "addr".to_string()];
        let l_fmts =
            resolve_location_formats(&resolver, &l_fields, EnumRenderLocation::Body).unwrap();
        assert_eq!(l_fmts.len(), 3);
    }
}
