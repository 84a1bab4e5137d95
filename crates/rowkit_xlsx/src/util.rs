//! Stateless helper utilities used by the export session.

use crate::conf::{N_LEN_SHEET_NAME_MAX, N_WIDTH_PAD_BASE, TUP_SHEET_NAME_ILLEGAL};
use crate::spec::{SpecWidthAccumulator, SpecWidthPolicy};

////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Whether one character renders at double width in a proportional grid.
///
/// Covers Han ideographs and Hangul syllables/jamo; everything else counts
/// as single width.
pub fn if_wide_script_char(chr: char) -> bool {
    matches!(chr,
        // Han: unified ideographs, extension A, compatibility, supplementary planes.
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2FA1F}'
        // Hangul: syllables, jamo, compatibility jamo, extended jamo.
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{1100}'..='\u{11FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{A960}'..='\u{A97F}'
        | '\u{D7B0}'..='\u{D7FF}'
    )
}

/// Estimate the displayed width of one cell text, in width units.
///
/// A narrow character contributes 1 unit, a wide-script character 2 units,
/// and every non-empty text carries a fixed base offset. Multi-line text is
/// measured by its widest line only; empty text measures 0.
pub fn estimate_content_width(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                0
            } else {
                N_WIDTH_PAD_BASE
                    + line
                        .chars()
                        .map(|chr| if if_wide_script_char(chr) { 2 } else { 1 })
                        .sum::<usize>()
            }
        })
        .max()
        .unwrap_or(0)
}

/// Number of newline-delimited lines in a label; at least 1.
pub fn count_text_lines(text: &str) -> usize {
    usize::max(1, text.split('\n').count())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthFinalization

/// Validate a width policy before any cell is written.
pub fn validate_width_policy(policy: &SpecWidthPolicy) -> Result<(), String> {
    if policy.width_col_min == 0 {
        return Err("policy_width.width_col_min must be >= 1.".to_string());
    }
    if policy.width_col_max < policy.width_col_min {
        return Err("policy_width.width_col_max must be >= width_col_min.".to_string());
    }
    Ok(())
}

/// Derive final per-column widths from the accumulator, clamped to policy.
///
/// Pure over its inputs, so repeating the computation over an unchanged
/// accumulator yields identical widths.
pub fn derive_final_column_widths(
    acc: &SpecWidthAccumulator,
    policy: &SpecWidthPolicy,
    n_cols: usize,
) -> Vec<usize> {
    (0..n_cols)
        .map(|idx_col| {
            let n_width_observed = acc.width_at(idx_col).unwrap_or(0);
            usize::min(policy.width_col_max, usize::max(policy.width_col_min, n_width_observed))
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNameNormalization

/// Replace illegal characters and trim to a valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str) -> String {
    let c_name: String = name
        .chars()
        .map(|chr| {
            if TUP_SHEET_NAME_ILLEGAL.contains(&chr) {
                '_'
            } else {
                chr
            }
        })
        .collect();

    let c_name = c_name.trim();
    if c_name.is_empty() {
        return "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_SHEET_NAME_MAX).collect()
}

/// Create a suffixed sheet name (`base_2`, `base_3`, ...), respecting the
/// engine length cap.
pub fn create_sheet_identifier(base_name: &str, n_idx: usize) -> String {
    let c_suffix = format!("_{n_idx}");
    let n_len_base_max = N_LEN_SHEET_NAME_MAX.saturating_sub(c_suffix.len());

    let c_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_max))
        .collect();

    format!("{c_base}{c_suffix}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::EnumWidthScanRule;

    #[test]
    fn test_estimate_content_width_counts_wide_scripts_double() {
        assert_eq!(estimate_content_width(""), 0);
        assert_eq!(estimate_content_width("abcd"), 2 + 4);
        // Two Hangul syllables.
        assert_eq!(estimate_content_width("이름"), 2 + 4);
        // Two Han ideographs.
        assert_eq!(estimate_content_width("排产"), 2 + 4);
        // Mixed narrow + wide: 2 narrow, 1 wide.
        assert_eq!(estimate_content_width("ab漢"), 2 + 2 + 2);
    }

    #[test]
    fn test_estimate_content_width_uses_widest_line_only() {
        assert_eq!(
            estimate_content_width("short\nlonger한"),
            estimate_content_width("longer한")
        );
        assert_eq!(estimate_content_width("a\n"), 2 + 1);
    }

    #[test]
    fn test_estimate_content_width_is_monotonic_in_length() {
        assert!(estimate_content_width("aaaa") >= estimate_content_width("aaa"));
        assert!(estimate_content_width("한한") >= estimate_content_width("한"));
    }

    #[test]
    fn test_count_text_lines() {
        assert_eq!(count_text_lines(""), 1);
        assert_eq!(count_text_lines("one"), 1);
        assert_eq!(count_text_lines("one\ntwo\nthree"), 3);
    }

    #[test]
    fn test_derive_final_column_widths_clamps_and_defaults() {
        let mut acc = SpecWidthAccumulator::default();
        acc.observe(0, 120);
        acc.observe(1, 10);
        let policy = SpecWidthPolicy {
            rule_scan: EnumWidthScanRule::Exhaustive,
            width_col_min: 4,
            width_col_max: 50,
            width_col_fallback: 15,
        };

        let l_widths = derive_final_column_widths(&acc, &policy, 3);
        // Over-long outlier clamped, observed kept, unobserved raised to min.
        assert_eq!(l_widths, vec![50, 10, 4]);

        // Pure computation: repeating it changes nothing.
        assert_eq!(derive_final_column_widths(&acc, &policy, 3), l_widths);
    }

    #[test]
    fn test_validate_width_policy_rejects_degenerate_bounds() {
        let mut policy = SpecWidthPolicy::default();
        policy.width_col_min = 0;
        assert!(validate_width_policy(&policy).is_err());

        policy.width_col_min = 20;
        policy.width_col_max = 10;
        assert!(validate_width_policy(&policy).is_err());

        assert!(validate_width_policy(&SpecWidthPolicy::default()).is_ok());
    }

    #[test]
    fn test_sanitize_sheet_name_replaces_illegal_and_caps_length() {
        assert_eq!(sanitize_sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name(""), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).chars().count(), 31);
    }

    #[test]
    fn test_create_sheet_identifier_respects_length_cap() {
        assert_eq!(create_sheet_identifier("data", 2), "data_2");
        let c_long = "y".repeat(40);
        let c_name = create_sheet_identifier(&c_long, 12);
        assert!(c_name.chars().count() <= 31);
        assert!(c_name.ends_with("_12"));
    }
}
