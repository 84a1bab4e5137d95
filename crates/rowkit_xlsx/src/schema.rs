//! Declared-field tables and schema analysis.
//!
//! A record type describes its exportable fields through a statically
//! declared table ([`SheetRecord::declared_fields`]) instead of runtime type
//! introspection: each entry binds a field name to optional column metadata
//! and an accessor producing a tagged [`EnumCellValue`]. Analysis selects the
//! entries carrying metadata, classifies them as scalar or nested group, and
//! expands groups exactly one level deep.

use crate::spec::{EnumCellValue, SpecColumnMeta};

////////////////////////////////////////////////////////////////////////////////
// #region DeclaredFieldTable

/// Boxed accessor reading one cell value out of a record.
pub type FnAccessValue<T> = Box<dyn Fn(&T) -> Result<EnumCellValue, String>>;

/// A record type exportable as sheet rows.
pub trait SheetRecord: Sized {
    /// Declared fields in declaration order.
    ///
    /// Rebuilt per sheet; entries without column metadata are declared here
    /// all the same and silently excluded during analysis.
    fn declared_fields() -> Vec<SpecDeclaredField<Self>>;
}

/// One declared field of a record type.
///
/// Construct through [`SpecDeclaredField::scalar`],
/// [`SpecDeclaredField::scalar_try`], [`SpecDeclaredField::bare`] or
/// [`SpecDeclaredField::group`]; the constructors keep the group/merge
/// invariant (nesting is only meaningful under merge semantics).
pub struct SpecDeclaredField<T> {
    name: &'static str,
    metadata: Option<SpecColumnMeta>,
    binding: EnumFieldBinding<T>,
}

enum EnumFieldBinding<T> {
    Scalar(FnAccessValue<T>),
    Group(Vec<SpecDeclaredField<T>>),
}

impl<T: 'static> SpecDeclaredField<T> {
    /// Declare a scalar column with an infallible accessor.
    pub fn scalar(
        name: &'static str,
        header_text: &str,
        if_merge_cells: bool,
        access: impl Fn(&T) -> EnumCellValue + 'static,
    ) -> Self {
        Self {
            name,
            metadata: Some(SpecColumnMeta {
                header_name: header_text.to_string(),
                merge_cells: if_merge_cells,
            }),
            binding: EnumFieldBinding::Scalar(Box::new(move |row: &T| Ok(access(row)))),
        }
    }

    /// Declare a scalar column whose accessor can fail.
    ///
    /// An `Err` from the accessor aborts the whole export as a field access
    /// failure; it is never retried or skipped.
    pub fn scalar_try(
        name: &'static str,
        header_text: &str,
        if_merge_cells: bool,
        access: impl Fn(&T) -> Result<EnumCellValue, String> + 'static,
    ) -> Self {
        Self {
            name,
            metadata: Some(SpecColumnMeta {
                header_name: header_text.to_string(),
                merge_cells: if_merge_cells,
            }),
            binding: EnumFieldBinding::Scalar(Box::new(access)),
        }
    }

    /// Declare a field without column metadata.
    ///
    /// The field exists on the record but is excluded from the export.
    pub fn bare(name: &'static str, access: impl Fn(&T) -> EnumCellValue + 'static) -> Self {
        Self {
            name,
            metadata: None,
            binding: EnumFieldBinding::Scalar(Box::new(move |row: &T| Ok(access(row)))),
        }
    }

    /// Declare a nested group flattened into adjacent sub-columns.
    ///
    /// The nested record's own declared fields are lifted through `select`
    /// one level deep; an absent nested value reads as empty for every
    /// sub-column. Group columns always use merged header semantics.
    pub fn group<U: SheetRecord + 'static>(
        name: &'static str,
        header_text: &str,
        select: fn(&T) -> Option<&U>,
    ) -> Self {
        let l_fields_nested = U::declared_fields()
            .into_iter()
            .map(|field| field.lift(select))
            .collect();

        Self {
            name,
            metadata: Some(SpecColumnMeta {
                header_name: header_text.to_string(),
                merge_cells: true,
            }),
            binding: EnumFieldBinding::Group(l_fields_nested),
        }
    }

    /// Rebind a declared field of `T` onto the enclosing record type `P`.
    fn lift<P: 'static>(self, select: fn(&P) -> Option<&T>) -> SpecDeclaredField<P> {
        let binding = match self.binding {
            EnumFieldBinding::Scalar(access) => {
                EnumFieldBinding::Scalar(Box::new(move |row: &P| match select(row) {
                    Some(nested) => access(nested),
                    None => Ok(EnumCellValue::Empty),
                }))
            }
            // Groups within groups are not flattened; analysis ignores the
            // entry, so the lifted sub-list is irrelevant.
            EnumFieldBinding::Group(_) => EnumFieldBinding::Group(Vec::new()),
        };

        SpecDeclaredField {
            name: self.name,
            metadata: self.metadata,
            binding,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AnalyzedSchema

/// One analyzed exportable field.
pub struct SpecFieldDescriptor<T> {
    /// Field name; the style resolution key for every column it produces.
    pub name: &'static str,
    /// Declared header label.
    pub header_text: String,
    /// Merged header cells requested.
    pub if_merge_cells: bool,
    /// Scalar column or expanded nested group.
    pub kind: EnumFieldKind<T>,
}

/// Field classification after analysis.
pub enum EnumFieldKind<T> {
    /// One column read by one accessor.
    Scalar(FnAccessValue<T>),
    /// Adjacent sub-columns flattened from a nested record; never empty.
    NestedGroup(Vec<SpecSubField<T>>),
}

/// One sub-column of an expanded nested group.
pub struct SpecSubField<T> {
    /// Sub-field name within the nested record.
    pub name: &'static str,
    /// Declared sub-header label.
    pub header_text: String,
    /// Accessor lifted onto the outer record type.
    pub access: FnAccessValue<T>,
}

/// Ordered analysis result for one record type, rebuilt per sheet.
pub struct SpecSheetSchema<T> {
    /// Analyzed fields in declaration order.
    pub fields: Vec<SpecFieldDescriptor<T>>,
}

impl<T> SpecSheetSchema<T> {
    /// Total sheet columns: one per scalar, one per group sub-field.
    pub fn count_columns(&self) -> usize {
        self.fields
            .iter()
            .map(|field| match &field.kind {
                EnumFieldKind::Scalar(_) => 1,
                EnumFieldKind::NestedGroup(l_subs) => l_subs.len(),
            })
            .sum()
    }
}

/// Analyze a record type's declared fields into an export schema.
///
/// Fields without metadata are excluded silently; group entries expand one
/// level deep, ignoring nested groups-of-groups; a group left with no
/// eligible sub-field contributes no columns and is dropped whole. A type
/// with no eligible fields yields an empty schema; analysis never fails.
pub fn derive_sheet_schema<T: SheetRecord>() -> SpecSheetSchema<T> {
    let mut l_fields = Vec::new();

    for declared in T::declared_fields() {
        let Some(meta) = declared.metadata else {
            continue;
        };

        match declared.binding {
            EnumFieldBinding::Scalar(access) => {
                l_fields.push(SpecFieldDescriptor {
                    name: declared.name,
                    header_text: meta.header_name,
                    if_merge_cells: meta.merge_cells,
                    kind: EnumFieldKind::Scalar(access),
                });
            }
            EnumFieldBinding::Group(l_declared_subs) => {
                let mut l_subs = Vec::new();
                for sub in l_declared_subs {
                    let Some(meta_sub) = sub.metadata else {
                        continue;
                    };
                    // One level deep only.
                    let EnumFieldBinding::Scalar(access_sub) = sub.binding else {
                        continue;
                    };
                    l_subs.push(SpecSubField {
                        name: sub.name,
                        header_text: meta_sub.header_name,
                        access: access_sub,
                    });
                }

                if l_subs.is_empty() {
                    continue;
                }
                l_fields.push(SpecFieldDescriptor {
                    name: declared.name,
                    header_text: meta.header_name,
                    if_merge_cells: meta.merge_cells,
                    kind: EnumFieldKind::NestedGroup(l_subs),
                });
            }
        }
    }

    SpecSheetSchema { fields: l_fields }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    struct SpecimenAddress {
        city: String,
        zip: String,
        note_internal: String,
    }

    impl SheetRecord for SpecimenAddress {
        fn declared_fields() -> Vec<SpecDeclaredField<Self>> {
            vec![
                SpecDeclaredField::scalar("city", "city", false, |row: &Self| {
                    row.city.as_str().into()
                }),
                SpecDeclaredField::scalar("zip", "zip", false, |row: &Self| {
                    row.zip.as_str().into()
                }),
                SpecDeclaredField::bare("note_internal", |row: &Self| {
                    row.note_internal.as_str().into()
                }),
            ]
        }
    }

    struct SpecimenPerson {
        name: String,
        age: i64,
        addr: Option<SpecimenAddress>,
        code_internal: String,
    }

    impl SheetRecord for SpecimenPerson {
        fn declared_fields() -> Vec<SpecDeclaredField<Self>> {
            vec![
                SpecDeclaredField::scalar("name", "name", true, |row: &Self| {
                    row.name.as_str().into()
                }),
                SpecDeclaredField::scalar("age", "age", false, |row: &Self| row.age.into()),
                SpecDeclaredField::group("addr", "addr", |row: &Self| row.addr.as_ref()),
                SpecDeclaredField::bare("code_internal", |row: &Self| {
                    row.code_internal.as_str().into()
                }),
            ]
        }
    }

    // Outer record nesting SpecimenPerson, which itself declares a group.
    struct SpecimenTeamEntry {
        team: String,
        lead: Option<SpecimenPerson>,
    }

    impl SheetRecord for SpecimenTeamEntry {
        fn declared_fields() -> Vec<SpecDeclaredField<Self>> {
            vec![
                SpecDeclaredField::scalar("team", "team", false, |row: &Self| {
                    row.team.as_str().into()
                }),
                SpecDeclaredField::group("lead", "lead", |row: &Self| row.lead.as_ref()),
            ]
        }
    }

    struct SpecimenOpaque {
        hidden: i64,
    }

    impl SheetRecord for SpecimenOpaque {
        fn declared_fields() -> Vec<SpecDeclaredField<Self>> {
            vec![SpecDeclaredField::bare("hidden", |row: &Self| row.hidden.into())]
        }
    }

    fn specimen_person(name: &str, age: i64, addr: Option<(&str, &str)>) -> SpecimenPerson {
        SpecimenPerson {
            name: name.to_string(),
            age,
            addr: addr.map(|(city, zip)| SpecimenAddress {
                city: city.to_string(),
                zip: zip.to_string(),
                note_internal: "n/a".to_string(),
            }),
            code_internal: "x".to_string(),
        }
    }

    #[test]
    fn test_schema_excludes_fields_without_metadata() {
        let schema = derive_sheet_schema::<SpecimenPerson>();
        let l_names: Vec<&str> = schema.fields.iter().map(|field| field.name).collect();
        assert_eq!(l_names, vec!["name", "age", "addr"]);
    }

    #[test]
    fn test_schema_classifies_merge_scalar_without_expansion() {
        let schema = derive_sheet_schema::<SpecimenPerson>();
        let field = &schema.fields[0];
        assert!(field.if_merge_cells);
        assert!(matches!(field.kind, EnumFieldKind::Scalar(_)));
    }

    #[test]
    fn test_schema_expands_group_one_level_with_eligible_subs_only() {
        let schema = derive_sheet_schema::<SpecimenPerson>();
        let field = &schema.fields[2];
        assert!(field.if_merge_cells);

        let EnumFieldKind::NestedGroup(l_subs) = &field.kind else {
            panic!("addr should analyze as a nested group");
        };
        let l_names: Vec<&str> = l_subs.iter().map(|sub| sub.name).collect();
        // note_internal carries no metadata and is excluded.
        assert_eq!(l_names, vec!["city", "zip"]);
    }

    #[test]
    fn test_schema_ignores_groups_nested_in_groups() {
        let schema = derive_sheet_schema::<SpecimenTeamEntry>();
        let field = &schema.fields[1];

        let EnumFieldKind::NestedGroup(l_subs) = &field.kind else {
            panic!("lead should analyze as a nested group");
        };
        let l_names: Vec<&str> = l_subs.iter().map(|sub| sub.name).collect();
        // The inner addr group of SpecimenPerson is not flattened further.
        assert_eq!(l_names, vec!["name", "age"]);
    }

    #[test]
    fn test_schema_with_no_eligible_fields_is_empty() {
        let schema = derive_sheet_schema::<SpecimenOpaque>();
        assert!(schema.fields.is_empty());
        assert_eq!(schema.count_columns(), 0);
    }

    #[test]
    fn test_count_columns_sums_scalars_and_group_subs() {
        let schema = derive_sheet_schema::<SpecimenPerson>();
        assert_eq!(schema.count_columns(), 4);
    }

    #[test]
    fn test_lifted_accessor_reads_through_present_nested_value() {
        let schema = derive_sheet_schema::<SpecimenPerson>();
        let EnumFieldKind::NestedGroup(l_subs) = &schema.fields[2].kind else {
            panic!("addr should analyze as a nested group");
        };

        let row = specimen_person("kim", 30, Some(("Seoul", "04524")));
        assert_eq!(
            (l_subs[0].access)(&row).unwrap(),
            EnumCellValue::Text("Seoul".to_string())
        );

        let row_absent = specimen_person("lee", 41, None);
        assert_eq!((l_subs[0].access)(&row_absent).unwrap(), EnumCellValue::Empty);
        assert_eq!((l_subs[1].access)(&row_absent).unwrap(), EnumCellValue::Empty);
    }
}
