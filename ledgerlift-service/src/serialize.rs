//! Tabular serialization of extraction results.

use crate::error::StageError;
use crate::extract::ExtractionOutcome;

/// Turns an extraction outcome into a flat tabular byte stream.
/// Implementations must be deterministic given identical input order.
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, outcome: &ExtractionOutcome) -> Result<Vec<u8>, StageError>;
}

/// CSV serializer with a fixed header and category-then-record row
/// order. Output depends only on the records and metadata fields it
/// writes, so identical inputs produce byte-identical output.
pub struct CsvSerializer;

const HEADER: &str = "Category,Type,Description,Amount,Fund,Municipality,Fiscal_Year";

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Plain decimal formatting; CSV consumers choke on scientific notation.
fn csv_amount(amount: f64) -> String {
    if amount == amount.trunc() && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        format!("{amount}")
    }
}

impl RecordSerializer for CsvSerializer {
    fn serialize(&self, outcome: &ExtractionOutcome) -> Result<Vec<u8>, StageError> {
        let municipality = csv_field(&outcome.metadata.municipality);
        let fiscal_year = csv_field(&outcome.metadata.fiscal_year);

        let mut rows = Vec::with_capacity(outcome.records.record_count() + 1);
        rows.push(HEADER.to_string());

        for category in &outcome.records.categories {
            let category_name = csv_field(&category.name);
            for record in &category.records {
                rows.push(format!(
                    "{},{},{},{},{},{},{}",
                    csv_field(&record.label),
                    category_name,
                    csv_field(&record.description),
                    csv_amount(record.amount),
                    csv_field(record.fund.as_deref().unwrap_or("")),
                    municipality,
                    fiscal_year,
                ));
            }
        }

        Ok(rows.join("\n").into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionMetadata, FinancialRecord, RecordCategory, RecordSet};
    use chrono::Utc;

    fn sample_outcome() -> ExtractionOutcome {
        ExtractionOutcome {
            records: RecordSet {
                categories: vec![
                    RecordCategory {
                        name: "Revenue".to_string(),
                        records: vec![FinancialRecord {
                            label: "Property taxes".to_string(),
                            amount: 1_200_000.0,
                            description: "General levy, \"restricted\"".to_string(),
                            fund: Some("General Fund".to_string()),
                        }],
                    },
                    RecordCategory {
                        name: "Expenditure".to_string(),
                        records: vec![FinancialRecord {
                            label: "Public works".to_string(),
                            amount: 456_789.5,
                            description: String::new(),
                            fund: None,
                        }],
                    },
                ],
            },
            metadata: ExtractionMetadata {
                municipality: "Springfield".to_string(),
                fiscal_year: "2023".to_string(),
                report_type: "ACFR".to_string(),
                extracted_at: Utc::now(),
            },
        }
    }

    #[test]
    fn writes_header_and_one_row_per_record() {
        let bytes = CsvSerializer.serialize(&sample_outcome()).unwrap();
        let csv = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(
            lines[1],
            "\"Property taxes\",\"Revenue\",\"General levy, \"\"restricted\"\"\",1200000,\"General Fund\",\"Springfield\",\"2023\""
        );
        assert_eq!(
            lines[2],
            "\"Public works\",\"Expenditure\",\"\",456789.5,\"\",\"Springfield\",\"2023\""
        );
    }

    #[test]
    fn serialization_is_deterministic() {
        let outcome = sample_outcome();
        let first = CsvSerializer.serialize(&outcome).unwrap();
        let second = CsvSerializer.serialize(&outcome).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_outcome_is_header_only() {
        let outcome = ExtractionOutcome {
            records: RecordSet::default(),
            metadata: ExtractionMetadata {
                municipality: "Unknown".to_string(),
                fiscal_year: "Unknown".to_string(),
                report_type: "CAFR".to_string(),
                extracted_at: Utc::now(),
            },
        };

        let bytes = CsvSerializer.serialize(&outcome).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), HEADER);
    }
}
