use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Deserialize;

use crate::{
    models::referralmodel::{ReferralRecord, NOT_AVAILABLE},
    service::error::ServiceError,
    utils::{
        currency::{round_to_cents, CurrencyFormat},
        date::{format_display_date, format_display_timestamp},
    },
};

pub const DATA_SHEET: &str = "data";
pub const SUMMARY_SHEET: &str = "summary";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Which records the caller wants serialized. The formatter itself never filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    #[default]
    Filtered,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportLocale {
    #[default]
    En,
    Fr,
}

struct Labels {
    name: &'static str,
    purchase_date: &'static str,
    status: &'static str,
    commission: &'static str,
    referral_code: &'static str,
    active: &'static str,
    inactive: &'static str,
    expired: &'static str,
    field: &'static str,
    value: &'static str,
    generation: &'static str,
    exported_at: &'static str,
    record_count: &'static str,
    total_commission: &'static str,
}

static EN_LABELS: Labels = Labels {
    name: "Name",
    purchase_date: "Purchase date",
    status: "Status",
    commission: "Commission",
    referral_code: "Referral code",
    active: "Active",
    inactive: "Inactive",
    expired: "Expired",
    field: "Field",
    value: "Value",
    generation: "Generation",
    exported_at: "Exported at",
    record_count: "Number of referrals",
    total_commission: "Total commission",
};

static FR_LABELS: Labels = Labels {
    name: "Nom",
    purchase_date: "Date d'achat",
    status: "Statut",
    commission: "Commission",
    referral_code: "Code de parrainage",
    active: "Actif",
    inactive: "Inactif",
    expired: "Expiré",
    field: "Champ",
    value: "Valeur",
    generation: "Génération",
    exported_at: "Exporté le",
    record_count: "Nombre de filleuls",
    total_commission: "Commission totale",
};

impl ExportLocale {
    fn labels(&self) -> &'static Labels {
        match self {
            ExportLocale::En => &EN_LABELS,
            ExportLocale::Fr => &FR_LABELS,
        }
    }

    pub fn generation_label(&self, generation: usize) -> String {
        format!("{} {}", self.labels().generation, generation)
    }

    /// Three-way label: anything that is neither active nor inactive reads as expired.
    pub fn status_label(&self, status: Option<&str>) -> &'static str {
        let labels = self.labels();
        match status {
            Some("active") => labels.active,
            Some("inactive") => labels.inactive,
            _ => labels.expired,
        }
    }
}

impl FromStr for ExportLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(ExportLocale::En),
            "fr" => Ok(ExportLocale::Fr),
            other => Err(format!("Unsupported export locale: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub locale: ExportLocale,
    pub currency: CurrencyFormat,
    pub exported_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSheets {
    pub data: ExportTable,
    pub summary: Vec<SummaryRow>,
    pub summary_headers: [String; 2],
    pub total_commission: f64,
}

/// Turn exactly the given records into localized rows plus a summary.
pub fn format_for_export(
    records: &[ReferralRecord],
    generation_label: &str,
    options: &ExportOptions,
) -> ExportSheets {
    let labels = options.locale.labels();

    let headers = [
        labels.name,
        labels.purchase_date,
        labels.status,
        labels.commission,
        labels.referral_code,
    ]
    .iter()
    .map(|label| label.to_string())
    .collect();

    let rows = records
        .iter()
        .map(|record| {
            vec![
                record.display_name().to_string(),
                record
                    .purchased_at()
                    .map(format_display_date)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                options.locale.status_label(record.effective_status()).to_string(),
                options.currency.format(record.commission_amount()),
                record.referral_code_or_default().to_string(),
            ]
        })
        .collect();

    let total_commission =
        round_to_cents(records.iter().map(ReferralRecord::commission_amount).sum());

    let summary = vec![
        SummaryRow {
            label: labels.generation.to_string(),
            value: generation_label.to_string(),
        },
        SummaryRow {
            label: labels.exported_at.to_string(),
            value: format_display_timestamp(options.exported_at),
        },
        SummaryRow {
            label: labels.record_count.to_string(),
            value: records.len().to_string(),
        },
        SummaryRow {
            label: labels.total_commission.to_string(),
            value: options.currency.format(total_commission),
        },
    ];

    ExportSheets {
        data: ExportTable { headers, rows },
        summary,
        summary_headers: [labels.field.to_string(), labels.value.to_string()],
        total_commission,
    }
}

/// One spreadsheet file holding the `data` and `summary` worksheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub sheet_names: [&'static str; 2],
    pub content: Vec<u8>,
}

pub fn export_file_name(generation: usize, date: NaiveDate) -> String {
    format!("downline_generation_{}_{}.xlsx", generation, date.format("%Y-%m-%d"))
}

/// Write both sheets into a single xlsx workbook named after the generation
/// and export date.
pub fn render_workbook(
    sheets: &ExportSheets,
    generation: usize,
    date: NaiveDate,
) -> Result<ExportFile, ServiceError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let data = workbook.add_worksheet();
    data.set_name(DATA_SHEET)?;
    write_row(data, 0, &sheets.data.headers, Some(&header))?;
    for (index, row) in sheets.data.rows.iter().enumerate() {
        write_row(data, index as u32 + 1, row, None)?;
    }

    let summary = workbook.add_worksheet();
    summary.set_name(SUMMARY_SHEET)?;
    write_row(summary, 0, &sheets.summary_headers, Some(&header))?;
    for (index, row) in sheets.summary.iter().enumerate() {
        write_row(summary, index as u32 + 1, &[row.label.clone(), row.value.clone()], None)?;
    }

    Ok(ExportFile {
        file_name: export_file_name(generation, date),
        content_type: XLSX_CONTENT_TYPE,
        sheet_names: [DATA_SHEET, SUMMARY_SHEET],
        content: workbook.save_to_buffer()?,
    })
}

fn write_row(
    sheet: &mut Worksheet,
    row: u32,
    cells: &[String],
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    for (col, value) in cells.iter().enumerate() {
        let col = col as u16;
        match format {
            Some(format) => sheet.write_string_with_format(row, col, value.as_str(), format)?,
            None => sheet.write_string(row, col, value.as_str())?,
        };
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use calamine::{open_workbook_from_rs, Reader, Xlsx};
    use serde_json::json;
    use std::io::Cursor;

    /// Worksheet names of an xlsx file, in workbook order.
    pub fn sheet_names(content: &[u8]) -> Vec<String> {
        let book: Xlsx<_> = open_workbook_from_rs(Cursor::new(content.to_vec())).unwrap();
        book.sheet_names()
    }

    /// Cell text of one worksheet, row by row.
    pub fn read_sheet(content: &[u8], name: &str) -> Vec<Vec<String>> {
        let mut book: Xlsx<_> = open_workbook_from_rs(Cursor::new(content.to_vec())).unwrap();
        let range = book.worksheet_range(name).unwrap();
        range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    fn records() -> Vec<ReferralRecord> {
        serde_json::from_value(json!([
            { "name": "Alice", "status": "active", "commission": 10.25, "purchaseDate": "15/01/2024", "referralCode": "A1" },
            { "name": "Bob", "packStatus": "inactive", "commission": 5 },
            { "status": "pending", "totalCommission": "2.5", "purchaseDate": "2024-02-03T09:00:00Z" },
            { "name": "Dan", "status": "expired", "commission": 100 }
        ]))
        .unwrap()
    }

    fn options(locale: ExportLocale) -> ExportOptions {
        ExportOptions {
            locale,
            currency: CurrencyFormat::new("€"),
            exported_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn rows_use_display_defaults() {
        let sheets = format_for_export(&records(), "Generation 1", &options(ExportLocale::En));

        assert_eq!(
            sheets.data.headers,
            vec!["Name", "Purchase date", "Status", "Commission", "Referral code"]
        );
        assert_eq!(
            sheets.data.rows[0],
            vec!["Alice", "15/01/2024", "Active", "10.25 €", "A1"]
        );
        assert_eq!(sheets.data.rows[1], vec!["Bob", "N/A", "Inactive", "5.00 €", "N/A"]);
        assert_eq!(sheets.data.rows[2], vec!["Unknown", "03/02/2024", "Expired", "2.50 €", "N/A"]);
    }

    #[test]
    fn summary_covers_exactly_the_given_records() {
        let all = records();
        let subset = &all[..3];
        let sheets = format_for_export(subset, "Generation 2", &options(ExportLocale::En));

        assert_eq!(sheets.total_commission, 17.75);
        let values: Vec<&str> = sheets.summary.iter().map(|row| row.value.as_str()).collect();
        assert_eq!(values, vec!["Generation 2", "01/03/2024 09:30:00", "3", "17.75 €"]);
    }

    #[test]
    fn french_labels() {
        let sheets = format_for_export(&records(), "Génération 1", &options(ExportLocale::Fr));
        assert_eq!(sheets.data.headers[0], "Nom");
        assert_eq!(sheets.data.rows[0][2], "Actif");
        assert_eq!(sheets.summary[2].label, "Nombre de filleuls");
        assert_eq!(ExportLocale::Fr.generation_label(3), "Génération 3");
    }

    #[test]
    fn empty_export_has_headers_and_zero_summary() {
        let sheets = format_for_export(&[], "Generation 4", &options(ExportLocale::En));
        assert!(sheets.data.rows.is_empty());
        assert_eq!(sheets.summary[2].value, "0");
        assert_eq!(sheets.summary[3].value, "0.00 €");
    }

    #[test]
    fn workbook_has_named_data_and_summary_sheets() {
        let sheets = format_for_export(&records()[..1], "Generation 1", &options(ExportLocale::En));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let file = render_workbook(&sheets, 1, date).unwrap();

        assert_eq!(file.file_name, "downline_generation_1_2024-03-01.xlsx");
        assert_eq!(file.content_type, XLSX_CONTENT_TYPE);
        assert_eq!(file.sheet_names, [DATA_SHEET, SUMMARY_SHEET]);
        assert_eq!(sheet_names(&file.content), vec!["data", "summary"]);

        assert_eq!(
            read_sheet(&file.content, DATA_SHEET),
            vec![
                vec!["Name", "Purchase date", "Status", "Commission", "Referral code"],
                vec!["Alice", "15/01/2024", "Active", "10.25 €", "A1"],
            ]
        );

        let summary = read_sheet(&file.content, SUMMARY_SHEET);
        assert_eq!(summary[0], vec!["Field", "Value"]);
        assert_eq!(summary[1], vec!["Generation", "Generation 1"]);
        assert_eq!(summary[4], vec!["Total commission", "10.25 €"]);
    }

    #[test]
    fn empty_workbook_still_has_both_sheets() {
        let sheets = format_for_export(&[], "Generation 2", &options(ExportLocale::En));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let file = render_workbook(&sheets, 2, date).unwrap();

        assert_eq!(sheet_names(&file.content), vec!["data", "summary"]);
        assert_eq!(read_sheet(&file.content, DATA_SHEET).len(), 1);
    }

    #[test]
    fn locale_parsing() {
        assert_eq!("FR".parse::<ExportLocale>(), Ok(ExportLocale::Fr));
        assert!("de".parse::<ExportLocale>().is_err());
    }
}
