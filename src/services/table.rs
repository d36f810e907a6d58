use std::collections::HashMap;
use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{AddressRecord, MatchResult, PoiRecord, SourceRow};

/// Errors that can occur reading or writing tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel write error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Invalid table: {0}")]
    InvalidTable(String),
}

/// One table row: (header, cell) pairs in source column order
pub type Row = SourceRow;

const RESULT_HEADERS: [&str; 9] = [
    "order_id",
    "raw_address",
    "matched_poi_id",
    "matched_poi_name",
    "latitude",
    "longitude",
    "score",
    "source",
    "candidates",
];

/// Prefix for source columns whose header clashes with a result field
const ORIGINAL_PREFIX: &str = "original_";

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Spreadsheet,
    Csv,
    Json,
}

fn table_format(path: &Path) -> Result<TableFormat, TableError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(TableFormat::Spreadsheet),
        "csv" | "txt" => Ok(TableFormat::Csv),
        "json" => Ok(TableFormat::Json),
        _ => Err(TableError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Read every data row of a table; the first spreadsheet/CSV row holds headers
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Row>, TableError> {
    match table_format(path)? {
        TableFormat::Spreadsheet => read_spreadsheet(path, sheet),
        TableFormat::Csv => read_csv(path),
        TableFormat::Json => read_json(path),
    }
}

/// Cell lookup by header
pub fn cell<'r>(row: &'r Row, header: &str) -> Option<&'r str> {
    row.iter()
        .find(|(h, _)| h == header)
        .map(|(_, value)| value.as_str())
}

fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> Result<Vec<Row>, TableError> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| TableError::InvalidTable(format!("{} has no sheets", path.display())))?,
    };

    if !workbook.sheet_names().contains(&sheet_name) {
        return Err(TableError::SheetNotFound(sheet_name));
    }

    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();

    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells.iter())
                .map(|(header, cell)| (header.clone(), cell_to_string(cell)))
                .collect()
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// UTF-8 CSV, with or without a leading byte order mark
fn read_csv(path: &Path) -> Result<Vec<Row>, TableError> {
    let content = fs::read_to_string(path)?;
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.clone(), value.trim().to_string()))
                .collect(),
        );
    }

    Ok(rows)
}

fn read_json(path: &Path) -> Result<Vec<Row>, TableError> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let Value::Array(items) = value else {
        return Err(TableError::InvalidTable(format!(
            "{} must contain a JSON array of objects",
            path.display()
        )));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| (key, json_to_string(value)))
                .collect()),
            _ => Err(TableError::InvalidTable(format!(
                "{} contains a non-object row",
                path.display()
            ))),
        })
        .collect()
}

fn json_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Picks logical fields out of a row through the column mapping
struct ColumnMapper<'a> {
    mapping: &'a HashMap<String, String>,
}

impl<'a> ColumnMapper<'a> {
    fn get<'r>(&self, row: &'r Row, logical: &str) -> Option<&'r str> {
        let source = self.mapping.get(logical).map(String::as_str).unwrap_or(logical);
        cell(row, source).filter(|v| !v.is_empty())
    }

    fn text(&self, row: &Row, logical: &str) -> String {
        self.get(row, logical).unwrap_or_default().to_string()
    }

    fn number(&self, row: &Row, logical: &str) -> Option<f64> {
        self.get(row, logical).and_then(|v| v.parse::<f64>().ok())
    }
}

/// Read the POI catalog
///
/// Rows without parseable coordinates are skipped with a warning.
pub fn read_pois(
    path: &Path,
    sheet: Option<&str>,
    mapping: &HashMap<String, String>,
) -> Result<Vec<PoiRecord>, TableError> {
    let rows = read_rows(path, sheet)?;
    let columns = ColumnMapper { mapping };
    let mut pois = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let position = idx + 1;
        let (Some(latitude), Some(longitude)) =
            (columns.number(row, "latitude"), columns.number(row, "longitude"))
        else {
            tracing::warn!("Skipping POI row {} without coordinates", position);
            continue;
        };

        let id = columns
            .get(row, "poi_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("POI_{}", position));

        pois.push(PoiRecord {
            id,
            name: columns.text(row, "name"),
            province: columns.text(row, "province"),
            city: columns.text(row, "city"),
            district: columns.text(row, "district"),
            street: columns.text(row, "street"),
            house_number: columns.text(row, "house_number"),
            latitude,
            longitude,
            category: columns.get(row, "poi_type").map(str::to_string),
            normalized: None,
        });
    }

    tracing::info!("Read {} POIs from {} ({} rows)", pois.len(), path.display(), rows.len());
    Ok(pois)
}

/// Read the addresses to match; every row yields a record
///
/// The full source row is kept on the record so the export can write it back.
pub fn read_addresses(
    path: &Path,
    sheet: Option<&str>,
    mapping: &HashMap<String, String>,
) -> Result<Vec<AddressRecord>, TableError> {
    let rows = read_rows(path, sheet)?;
    let columns = ColumnMapper { mapping };

    let addresses: Vec<AddressRecord> = rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| AddressRecord {
            order_id: AddressRecord::ensure_order_id(columns.get(&row, "order_id"), idx + 1),
            raw_address: columns.text(&row, "raw_address"),
            province: columns.text(&row, "province"),
            city: columns.text(&row, "city"),
            district: columns.text(&row, "district"),
            street: columns.text(&row, "street"),
            house_number: columns.text(&row, "house_number"),
            normalized: None,
            original_row: row,
        })
        .collect();

    tracing::info!("Read {} addresses from {}", addresses.len(), path.display());
    Ok(addresses)
}

/// Output header for a source column; clashes with result fields get a prefix
fn export_column(header: &str) -> String {
    if RESULT_HEADERS.contains(&header) {
        format!("{}{}", ORIGINAL_PREFIX, header)
    } else {
        header.to_string()
    }
}

/// Source columns across all results, in first-seen order
fn source_columns(results: &[MatchResult]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for result in results {
        for (header, _) in &result.original_row {
            let column = export_column(header);
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

/// Result fields followed by the source row's cells
fn export_object(result: &MatchResult) -> Result<Map<String, Value>, TableError> {
    let Value::Object(mut object) = serde_json::to_value(result)? else {
        return Err(TableError::InvalidTable("match result is not an object".to_string()));
    };

    for (header, value) in &result.original_row {
        object.insert(export_column(header), Value::String(value.clone()));
    }

    Ok(object)
}

/// Write match results as JSON or as an Excel sheet, by extension
pub fn write_results(path: &Path, results: &[MatchResult]) -> Result<(), TableError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match table_format(path)? {
        TableFormat::Json => {
            let objects = results
                .iter()
                .map(export_object)
                .collect::<Result<Vec<_>, _>>()?;
            fs::write(path, serde_json::to_string_pretty(&objects)?)?;
        }
        TableFormat::Spreadsheet => write_xlsx(path, results)?,
        TableFormat::Csv => return Err(TableError::UnsupportedFormat(path.display().to_string())),
    }

    Ok(())
}

fn write_xlsx(path: &Path, results: &[MatchResult]) -> Result<(), TableError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !ext.eq_ignore_ascii_case("xlsx") {
        return Err(TableError::UnsupportedFormat(path.display().to_string()));
    }

    let extra = source_columns(results);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();

    let headers = RESULT_HEADERS.iter().copied().chain(extra.iter().map(String::as_str));
    for (col, header) in headers.enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (idx, result) in results.iter().enumerate() {
        let row = idx as u32 + 1;
        worksheet.write_string(row, 0, &result.order_id)?;
        worksheet.write_string(row, 1, &result.raw_address)?;
        if let Some(id) = &result.matched_poi_id {
            worksheet.write_string(row, 2, id)?;
        }
        if let Some(name) = &result.matched_poi_name {
            worksheet.write_string(row, 3, name)?;
        }
        if let Some(lat) = result.latitude {
            worksheet.write_number(row, 4, lat)?;
        }
        if let Some(lon) = result.longitude {
            worksheet.write_number(row, 5, lon)?;
        }
        worksheet.write_number(row, 6, result.score)?;
        worksheet.write_string(row, 7, result.source.as_str())?;
        worksheet.write_string(row, 8, serde_json::to_string(&result.candidates)?)?;

        for (header, value) in &result.original_row {
            let column = export_column(header);
            if let Some(offset) = extra.iter().position(|c| *c == column) {
                worksheet.write_string(row, (RESULT_HEADERS.len() + offset) as u16, value)?;
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchSource, ScoredCandidate};

    fn write_json(dir: &tempfile::TempDir, name: &str, value: Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn value<'r>(row: &'r Row, header: &str) -> &'r str {
        cell(row, header).unwrap_or_else(|| panic!("missing column {}", header))
    }

    #[test]
    fn test_unsupported_extension() {
        let err = read_rows(Path::new("addresses.parquet"), None).unwrap_err();
        assert!(matches!(err, TableError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_read_csv_addresses_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        fs::write(
            &path,
            "\u{feff}order_id,raw_address,备注\nSF1,北京市海淀区中关村大街1号,前台\n,\"学院路15号, 2层\",\n",
        )
        .unwrap();

        let addresses = read_addresses(&path, None, &HashMap::new()).unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].order_id, "SF1");
        assert_eq!(addresses[0].raw_address, "北京市海淀区中关村大街1号");
        assert_eq!(addresses[1].order_id, "ROW_2");
        assert_eq!(addresses[1].raw_address, "学院路15号, 2层");

        let headers: Vec<&str> = addresses[0].original_row.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headers, vec!["order_id", "raw_address", "备注"]);
    }

    #[test]
    fn test_read_txt_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poi.txt");
        fs::write(&path, "poi_id,name,latitude,longitude\nP1,中关村大街1号,39.9,116.3\n").unwrap();

        let pois = read_pois(&path, None, &HashMap::new()).unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].id, "P1");
        assert_eq!(pois[0].longitude, 116.3);
    }

    #[test]
    fn test_read_pois_with_mapping_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "poi.json",
            serde_json::json!([
                {"编号": "P1", "名称": "中关村大街1号", "latitude": 39.9, "longitude": 116.3, "house_number": 1},
                {"编号": "P2", "名称": "无坐标", "latitude": null, "longitude": 116.3},
                {"名称": "学院路15号", "latitude": "39.98", "longitude": "116.35"}
            ]),
        );
        let mapping = HashMap::from([
            ("poi_id".to_string(), "编号".to_string()),
            ("name".to_string(), "名称".to_string()),
        ]);

        let pois = read_pois(&path, None, &mapping).unwrap();
        assert_eq!(pois.len(), 2);
        assert_eq!(pois[0].id, "P1");
        assert_eq!(pois[0].house_number, "1");
        assert_eq!(pois[1].id, "POI_3");
        assert_eq!(pois[1].latitude, 39.98);
    }

    #[test]
    fn test_read_addresses_assigns_row_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "orders.json",
            serde_json::json!([
                {"order_id": "SF1", "raw_address": "北京市海淀区中关村大街1号"},
                {"raw_address": ""},
                {"order_id": 42, "raw_address": "学院路15号"}
            ]),
        );

        let addresses = read_addresses(&path, None, &HashMap::new()).unwrap();
        let ids: Vec<&str> = addresses.iter().map(|a| a.order_id.as_str()).collect();
        assert_eq!(ids, vec!["SF1", "ROW_2", "42"]);
        assert!(addresses[1].raw_address.is_empty());
    }

    #[test]
    fn test_non_array_json_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir, "bad.json", serde_json::json!({"poi_id": "P1"}));
        assert!(matches!(read_rows(&path, None), Err(TableError::InvalidTable(_))));
    }

    fn sample_results() -> Vec<MatchResult> {
        let mut matched = MatchResult::unmatched("A1", "中关村大街1号");
        matched.matched_poi_id = Some("P1".to_string());
        matched.matched_poi_name = Some("中关村大街1号".to_string());
        matched.latitude = Some(39.9);
        matched.longitude = Some(116.3);
        matched.score = 1.0;
        matched.candidates.push(ScoredCandidate {
            poi_id: "P1".to_string(),
            poi_name: "中关村大街1号".to_string(),
            score: 1.0,
            coverage: 1.0,
            edit_distance: 1.0,
            doorplate: 1.0,
        });
        vec![matched, MatchResult::degraded("A2", "")]
    }

    fn results_with_source_rows() -> Vec<MatchResult> {
        let mut results = sample_results();
        results[0].original_row = vec![
            ("运单号".to_string(), "SF1".to_string()),
            ("score".to_string(), "VIP".to_string()),
        ];
        results[1].original_row = vec![
            ("运单号".to_string(), "SF2".to_string()),
            ("备注".to_string(), "夜间".to_string()),
        ];
        results
    }

    #[test]
    fn test_write_json_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");

        write_results(&path, &sample_results()).unwrap();

        let written: Vec<MatchResult> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, sample_results());
        assert_eq!(written[1].source, MatchSource::Degraded);
    }

    #[test]
    fn test_json_export_merges_source_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        write_results(&path, &results_with_source_rows()).unwrap();

        let written: Vec<Map<String, Value>> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["运单号"], "SF1");
        assert_eq!(written[0]["score"], 1.0);
        assert_eq!(written[0]["original_score"], "VIP");
        assert_eq!(written[1]["备注"], "夜间");
        assert!(!written[1].contains_key("original_score"));
    }

    #[test]
    fn test_write_and_read_xlsx_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");

        write_results(&path, &sample_results()).unwrap();

        let rows = read_rows(&path, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(value(&rows[0], "matched_poi_id"), "P1");
        assert_eq!(value(&rows[0], "source"), "RULE");
        assert_eq!(value(&rows[1], "source"), "DEGRADED");
        assert_eq!(value(&rows[1], "matched_poi_id"), "");
    }

    #[test]
    fn test_xlsx_export_appends_source_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");

        write_results(&path, &results_with_source_rows()).unwrap();

        let rows = read_rows(&path, None).unwrap();
        let headers: Vec<&str> = rows[0].iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(&headers[..RESULT_HEADERS.len()], &RESULT_HEADERS[..]);
        assert_eq!(&headers[RESULT_HEADERS.len()..], &["运单号", "original_score", "备注"]);

        assert_eq!(value(&rows[0], "运单号"), "SF1");
        assert_eq!(value(&rows[0], "original_score"), "VIP");
        assert_eq!(value(&rows[0], "备注"), "");
        assert_eq!(value(&rows[1], "运单号"), "SF2");
        assert_eq!(value(&rows[1], "备注"), "夜间");
    }

    #[test]
    fn test_missing_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");
        write_results(&path, &sample_results()).unwrap();

        let err = read_rows(&path, Some("不存在")).unwrap_err();
        assert!(matches!(err, TableError::SheetNotFound(_)));
    }
}
