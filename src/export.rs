//! Tabular export: one row per successfully extracted document, as an Excel
//! workbook or CSV.

use crate::error::ExportError;
use crate::metrics::FinalMetricRecord;
use crate::pipeline::normalize::format_number;
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Record keys and their display labels, in column order.
pub const COLUMNS: [(&str, &str); 10] = [
    ("company_name", "Company Name"),
    ("quarter", "Quarter"),
    ("total_revenue", "Total revenue"),
    ("earnings_per_share", "Earnings per share"),
    ("net_income", "Net income"),
    ("operating_income", "Operating income"),
    ("gross_margin", "Gross margin"),
    ("operating_expenses", "Operating expenses"),
    ("buybacks_and_dividends", "Buybacks and dividends"),
    ("performance", "Performance"),
];

/// Content type of [`to_csv`] output.
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Content type of [`to_xlsx`] output.
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// The single worksheet of an exported workbook.
pub const SHEET_NAME: &str = "Sheet1";

/// Export format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Excel workbook with one sheet.
    #[default]
    Xlsx,
    /// Comma-separated values.
    Csv,
}

impl ExportFormat {
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }

    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Xlsx => XLSX_CONTENT_TYPE,
            Self::Csv => CSV_CONTENT_TYPE,
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }

    /// Serialize `records` in this format.
    pub fn export<'a>(
        &self,
        records: impl IntoIterator<Item = &'a FinalMetricRecord>,
    ) -> Result<Vec<u8>, ExportError> {
        match self {
            Self::Xlsx => to_xlsx(records),
            Self::Csv => to_csv(records),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Serialize records as CSV with a display-label header row.
///
/// Null fields become empty cells.
pub fn to_csv<'a>(records: impl IntoIterator<Item = &'a FinalMetricRecord>) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS.iter().map(|(_, label)| *label))?;

    for record in records {
        writer.write_record(row(record))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))
}

/// Serialize records as an Excel workbook: one sheet, bold header row,
/// performance as a number cell. Null fields are left blank.
pub fn to_xlsx<'a>(records: impl IntoIterator<Item = &'a FinalMetricRecord>) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, (_, label)) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *label, &header)?;
    }

    for (idx, record) in records.into_iter().enumerate() {
        let r = idx as u32 + 1;
        let texts = [
            &record.company_name,
            &record.quarter,
            &record.total_revenue,
            &record.earnings_per_share,
            &record.net_income,
            &record.operating_income,
            &record.gross_margin,
            &record.operating_expenses,
        ];
        for (col, text) in texts.into_iter().enumerate() {
            if let Some(text) = text {
                sheet.write_string(r, col as u16, text)?;
            }
        }
        if !record.buybacks_and_dividends.is_empty() {
            sheet.write_string(r, 8, &record.buybacks_and_dividends)?;
        }
        if let Some(p) = record.performance {
            sheet.write_number(r, 9, p)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn row(record: &FinalMetricRecord) -> [String; 10] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        text(&record.company_name),
        text(&record.quarter),
        text(&record.total_revenue),
        text(&record.earnings_per_share),
        text(&record.net_income),
        text(&record.operating_income),
        text(&record.gross_margin),
        text(&record.operating_expenses),
        record.buybacks_and_dividends.clone(),
        record.performance.map(format_number).unwrap_or_default(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx};
    use std::io::Cursor;

    fn acme() -> FinalMetricRecord {
        FinalMetricRecord {
            company_name: Some("Acme, Inc.".into()),
            quarter: Some("Q3 2024".into()),
            total_revenue: Some("12.3% YoY, 4.1% QoQ".into()),
            earnings_per_share: Some("$1.25".into()),
            net_income: None,
            operating_income: None,
            gross_margin: Some("42.5%".into()),
            operating_expenses: None,
            buybacks_and_dividends: "$900M Buybacks and Dividends".into(),
            performance: Some(2.0),
        }
    }

    #[test]
    fn header_uses_display_labels_in_order() {
        let csv = String::from_utf8(to_csv(std::iter::empty()).unwrap()).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Company Name,Quarter,Total revenue,Earnings per share,Net income,\
Operating income,Gross margin,Operating expenses,Buybacks and dividends,Performance"
        );
    }

    #[test]
    fn rows_quote_commas_and_blank_nulls() {
        let records = vec![acme(), FinalMetricRecord::default()];
        let csv = String::from_utf8(to_csv(&records).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "\"Acme, Inc.\",Q3 2024,\"12.3% YoY, 4.1% QoQ\",$1.25,,,42.5%,,$900M Buybacks and Dividends,2"
        );
        assert_eq!(lines[2], ",,,,,,,,,");
    }

    fn xlsx_rows(bytes: Vec<u8>) -> Vec<Vec<Data>> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        range.rows().map(<[Data]>::to_vec).collect()
    }

    #[test]
    fn xlsx_reads_back() {
        let rows = xlsx_rows(to_xlsx(&[acme(), FinalMetricRecord::default()]).unwrap());

        let header: Vec<String> = rows[0].iter().map(|c| c.to_string()).collect();
        let labels: Vec<String> = COLUMNS.iter().map(|(_, l)| l.to_string()).collect();
        assert_eq!(header, labels);

        assert_eq!(rows[1][0], Data::String("Acme, Inc.".into()));
        assert_eq!(rows[1][2], Data::String("12.3% YoY, 4.1% QoQ".into()));
        assert_eq!(rows[1][4], Data::Empty);
        assert_eq!(rows[1][8], Data::String("$900M Buybacks and Dividends".into()));
        assert_eq!(rows[1][9], Data::Float(2.0));
        // An all-null record writes no cells, so the sheet ends after Acme.
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn xlsx_without_records_has_header_only() {
        let rows = xlsx_rows(to_xlsx(std::iter::empty()).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][9], Data::String("Performance".into()));
    }

    #[test]
    fn format_parsing_and_paths() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xls".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::from_path(Path::new("q3.xlsx")), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::from_path(Path::new("q3")), None);
        assert_eq!(ExportFormat::default(), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::Csv.content_type(), CSV_CONTENT_TYPE);
    }

    #[test]
    fn csv_reads_back() {
        let bytes = to_csv(&[acme()]).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("Company Name"));
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.get(2), Some("12.3% YoY, 4.1% QoQ"));
        assert_eq!(row.get(9), Some("2"));
    }
}
