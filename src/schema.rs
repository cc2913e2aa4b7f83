//! Schema normalization
//!
//! Maps arbitrary export headers onto the canonical column set:
//! - Header text is trimmed, separator runs collapse to `_`, and case folds to lower
//! - A fixed alias table resolves known header variants
//! - Missing required columns fail the run with [`AnalyticsError::Schema`]

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::{Attributes, CanonicalField, CanonicalRow, CanonicalTable, Dimension, RawTable};
use std::collections::BTreeMap;

/// Target of an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTarget {
    Required(CanonicalField),
    Optional(Dimension),
}

impl ColumnTarget {
    pub fn key(&self) -> &'static str {
        match self {
            ColumnTarget::Required(field) => field.key(),
            ColumnTarget::Optional(dimension) => dimension.key(),
        }
    }
}

/// Immutable mapping from normalized header text to canonical columns
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTable {
    aliases: BTreeMap<String, ColumnTarget>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        for field in CanonicalField::ALL {
            aliases.insert(field.key().to_string(), ColumnTarget::Required(field));
        }
        for dimension in Dimension::ALL {
            aliases.insert(dimension.key().to_string(), ColumnTarget::Optional(dimension));
        }

        let variants: [(&str, ColumnTarget); 17] = [
            ("userid", ColumnTarget::Required(CanonicalField::UserId)),
            ("player_id", ColumnTarget::Required(CanonicalField::UserId)),
            ("lastlogin", ColumnTarget::Required(CanonicalField::LastLogin)),
            ("last_login_date", ColumnTarget::Required(CanonicalField::LastLogin)),
            ("last_active", ColumnTarget::Required(CanonicalField::LastLogin)),
            ("signup", ColumnTarget::Required(CanonicalField::SignUp)),
            ("sign_up_date", ColumnTarget::Required(CanonicalField::SignUp)),
            ("signup_date", ColumnTarget::Required(CanonicalField::SignUp)),
            ("total_revenue_usd", ColumnTarget::Required(CanonicalField::Revenue)),
            ("total_revenue", ColumnTarget::Required(CanonicalField::Revenue)),
            ("revenue_usd", ColumnTarget::Required(CanonicalField::Revenue)),
            ("subscription_tier", ColumnTarget::Optional(Dimension::Tier)),
            ("device", ColumnTarget::Optional(Dimension::DeviceType)),
            ("device_os", ColumnTarget::Optional(Dimension::DeviceType)),
            ("preferred_game_mode", ColumnTarget::Optional(Dimension::GameMode)),
            ("segment", ColumnTarget::Optional(Dimension::UserSegment)),
            ("customer_segment", ColumnTarget::Optional(Dimension::UserSegment)),
        ];
        for (alias, target) in variants {
            aliases.insert(alias.to_string(), target);
        }

        Self { aliases }
    }
}

impl AliasTable {
    /// Return a copy with one more alias; `header` is normalized first
    pub fn with_alias(mut self, header: &str, target: ColumnTarget) -> Self {
        self.aliases.insert(normalize_header(header), target);
        self
    }

    pub fn resolve(&self, header: &str) -> Option<ColumnTarget> {
        self.aliases.get(&normalize_header(header)).copied()
    }

    /// All (alias, canonical key) pairs in alias order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.aliases.iter().map(|(alias, target)| (alias.as_str(), target.key()))
    }
}

/// Trim, collapse non-alphanumeric runs to `_`, and lowercase
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_separator = false;
    for c in header.trim().trim_start_matches('\u{feff}').chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

/// Input positions of the canonical columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub user_id: usize,
    pub last_login: usize,
    pub sign_up: usize,
    pub revenue: usize,
    pub dimensions: BTreeMap<Dimension, usize>,
}

/// Schema normalizer bound to one alias table
pub struct SchemaNormalizer {
    aliases: AliasTable,
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self::new(AliasTable::default())
    }
}

impl SchemaNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    /// Resolve each canonical column to its input position
    ///
    /// The first header mapping to a column wins; later duplicates are ignored.
    pub fn resolve_columns(&self, headers: &[String]) -> AnalyticsResult<ColumnLayout> {
        let mut required: BTreeMap<CanonicalField, usize> = BTreeMap::new();
        let mut dimensions = BTreeMap::new();

        for (idx, header) in headers.iter().enumerate() {
            let Some(target) = self.aliases.resolve(header) else {
                continue;
            };
            let inserted = match target {
                ColumnTarget::Required(field) => {
                    if required.contains_key(&field) {
                        false
                    } else {
                        required.insert(field, idx);
                        true
                    }
                }
                ColumnTarget::Optional(dimension) => {
                    if dimensions.contains_key(&dimension) {
                        false
                    } else {
                        dimensions.insert(dimension, idx);
                        true
                    }
                }
            };
            if !inserted {
                log::warn!(
                    "header '{}' duplicates canonical column '{}'; keeping the first occurrence",
                    header,
                    target.key()
                );
            }
        }

        let column = |field: CanonicalField| required.get(&field).copied();
        match (
            column(CanonicalField::UserId),
            column(CanonicalField::LastLogin),
            column(CanonicalField::SignUp),
            column(CanonicalField::Revenue),
        ) {
            (Some(user_id), Some(last_login), Some(sign_up), Some(revenue)) => Ok(ColumnLayout {
                user_id,
                last_login,
                sign_up,
                revenue,
                dimensions,
            }),
            _ => Err(AnalyticsError::Schema {
                missing: CanonicalField::ALL
                    .iter()
                    .filter(|field| !required.contains_key(field))
                    .map(|field| field.display_name().to_string())
                    .collect(),
            }),
        }
    }

    /// Produce canonical rows, or fail if a required column is absent
    pub fn normalize(&self, table: &RawTable) -> AnalyticsResult<CanonicalTable> {
        let layout = self.resolve_columns(&table.headers)?;

        let rows = (0..table.rows.len())
            .filter(|&row| !table.is_unreadable(row))
            .map(|row| {
                let mut attributes = Attributes::default();
                for (&dimension, &col) in &layout.dimensions {
                    let value = table.cell(row, col).trim();
                    let value = (!value.is_empty()).then(|| value.to_string());
                    attributes.set(dimension, value);
                }

                CanonicalRow {
                    row_index: row,
                    user_id: table.cell(row, layout.user_id).trim().to_string(),
                    last_login: table.cell(row, layout.last_login).trim().to_string(),
                    sign_up: table.cell(row, layout.sign_up).trim().to_string(),
                    revenue: table.cell(row, layout.revenue).trim().to_string(),
                    attributes,
                }
            })
            .collect();

        let dimensions: Vec<Dimension> = layout.dimensions.keys().copied().collect();
        log::info!(
            "schema: {} rows normalized, optional dimensions {:?}",
            table.rows.len(),
            dimensions
        );

        Ok(CanonicalTable {
            rows,
            dimensions,
            unreadable_rows: table.unreadable_rows.clone(),
        })
    }
}
