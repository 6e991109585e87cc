use crate::error::{AppError, Result};
use crate::types::{Dataset, LoadReport, ParkingMapping, RawMapping, RouteSheet};
use crate::util::{parse_f64_safe, parse_i64_safe, split_pair};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

pub const COL_ROUTE_CODE: &str = "Лог. маршрут";
pub const COL_SHEET_NUMBER: &str = "№";
pub const COL_DRIVER: &str = "ФИО Водителя";
pub const COL_OPEN_DATE: &str = "Дата открытия";
pub const COL_SHEET_AMOUNT: &str = "Сумма путевого листа";
pub const COL_FINES: &str = "Сумма штрафов";
pub const COL_ITEMS: &str = "Кол-во шк.";
pub const COL_RETURNS: &str = "Возвраты: всего/доставлено";
pub const COL_BOXES: &str = "Коробки : всего / доставлено";

/// Headers the upstream export must carry, in the order they are reported.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    COL_ROUTE_CODE,
    COL_SHEET_NUMBER,
    COL_DRIVER,
    COL_OPEN_DATE,
    COL_SHEET_AMOUNT,
    COL_FINES,
    COL_ITEMS,
    COL_RETURNS,
    COL_BOXES,
];

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// A sheet reduced to strings: one header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

enum SourceKind {
    Workbook,
    Csv,
}

fn source_kind(path: &Path) -> Result<SourceKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        Ok(SourceKind::Workbook)
    } else if ext == "csv" {
        Ok(SourceKind::Csv)
    } else {
        Err(AppError::Format(format!(
            "{} is not a spreadsheet (expected .xlsx, .xls, .ods or .csv)",
            path.display()
        )))
    }
}

/// Read the first worksheet of a workbook, or a csv file, into a `Table`.
pub fn read_table(path: &Path) -> Result<Table> {
    match source_kind(path)? {
        SourceKind::Workbook => read_workbook_table(path),
        SourceKind::Csv => read_csv_table(path),
    }
}

fn read_workbook_table(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::Format(format!("{}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Format(format!("{}: workbook has no sheets", path.display())))?
        .map_err(|e| AppError::Format(format!("{}: {}", path.display(), e)))?;

    let mut rows = range
        .rows()
        .map(|r| r.iter().map(cell_to_string).collect::<Vec<_>>())
        .skip_while(|r| is_blank(r));
    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers: clean_headers(headers),
        rows: rows.collect(),
    })
}

fn read_csv_table(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Format(format!("{}: {}", path.display(), e)))?;
    let delimiter = sniff_delimiter(text.lines().next().unwrap_or_default());
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| AppError::Format(format!("{}: {}", path.display(), e)))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| AppError::Format(format!("{}: {}", path.display(), e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table {
        headers: clean_headers(headers),
        rows,
    })
}

// Exports from Russian-locale tools use `;`.
fn sniff_delimiter(header_line: &str) -> u8 {
    if header_line.matches(';').count() > header_line.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn clean_headers(headers: Vec<String>) -> Vec<String> {
    headers
        .into_iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect()
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => excel_serial_to_string(v.as_f64()),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

/// Excel stores dates as days since 1899-12-30.
fn excel_serial_to_string(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return serial.to_string();
    };
    let secs = (serial * 86_400.0).round() as i64;
    match epoch.checked_add_signed(Duration::seconds(secs)) {
        Some(dt) if secs % 86_400 == 0 => dt.date().format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => serial.to_string(),
    }
}

/// Blank money cells mean "nothing charged"; anything else must parse.
fn parse_amount(s: Option<&str>) -> Option<f64> {
    match s.map(str::trim) {
        None | Some("") => Some(0.0),
        other => parse_f64_safe(other),
    }
}

/// Turn a raw table into route sheets.
///
/// Fails on missing columns (all of them reported at once) and on repeated
/// sheet numbers. Rows whose scalar fields do not parse are skipped and
/// counted; composite returns/boxes cells never fail a row.
pub fn parse_route_sheets(table: &Table) -> Result<(Vec<RouteSheet>, LoadReport)> {
    let index: HashMap<&str, usize> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !index.contains_key(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Schema { missing });
    }
    let col = |name: &str| index[name];

    let mut report = LoadReport::default();
    let mut seen = HashSet::new();
    let mut sheets = Vec::new();

    for row in table.rows.iter().filter(|r| !is_blank(r)) {
        report.total_rows += 1;
        let cell = |name: &str| row.get(col(name)).map(String::as_str);

        let sheet_number = match parse_i64_safe(cell(COL_SHEET_NUMBER)) { Some(v) => v, None => { report.parse_errors += 1; continue; } };
        let sheet_amount = match parse_amount(cell(COL_SHEET_AMOUNT)) { Some(v) => v, None => { report.parse_errors += 1; continue; } };
        let fines_amount = match parse_amount(cell(COL_FINES)) { Some(v) => v, None => { report.parse_errors += 1; continue; } };
        let item_count = match parse_i64_safe(cell(COL_ITEMS)) { Some(v) => v, None => { report.parse_errors += 1; continue; } };

        if !seen.insert(sheet_number) {
            return Err(AppError::DuplicateKey(format!("sheet number {sheet_number}")));
        }

        let returns_raw = cell(COL_RETURNS).unwrap_or_default().trim().to_string();
        let boxes_raw = cell(COL_BOXES).unwrap_or_default().trim().to_string();
        let (returns_total, returns_delivered) = split_pair(Some(returns_raw.as_str()), '/');
        let boxes_sep = if boxes_raw.contains(':') { ':' } else { '/' };
        let (boxes_total, boxes_delivered) = split_pair(Some(boxes_raw.as_str()), boxes_sep);

        sheets.push(RouteSheet {
            route_code: cell(COL_ROUTE_CODE).unwrap_or_default().trim().to_string(),
            sheet_number,
            driver_name: cell(COL_DRIVER).unwrap_or_default().trim().to_string(),
            open_date: cell(COL_OPEN_DATE).unwrap_or_default().trim().to_string(),
            sheet_amount,
            fines_amount,
            item_count,
            returns_raw,
            boxes_raw,
            returns_total,
            returns_delivered,
            boxes_total,
            boxes_delivered,
        });
    }

    report.loaded_rows = sheets.len();
    Ok((sheets, report))
}

pub fn load_route_sheets(path: &Path) -> Result<(Vec<RouteSheet>, LoadReport)> {
    let table = read_table(path)?;
    tracing::debug!(
        path = %path.display(),
        columns = table.headers.len(),
        rows = table.rows.len(),
        "read route sheet table"
    );
    parse_route_sheets(&table)
}

/// Read the `route_id,parking_number` csv.
pub fn load_parking_mapping(path: &Path) -> Result<Vec<ParkingMapping>> {
    let format_err = |e: csv::Error| AppError::Format(format!("{}: {}", path.display(), e));
    let mut rdr = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(format_err)?;

    let headers = rdr.headers().map_err(format_err)?.clone();
    let has = |name: &str| headers.iter().any(|h| h.trim_start_matches('\u{feff}') == name);
    if !has("route_id") || !has("parking_number") {
        return Err(AppError::Format(format!(
            "{}: expected route_id and parking_number columns",
            path.display()
        )));
    }
    // Match the BOM-stripped names so serde finds the fields.
    let cleaned: csv::StringRecord = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}'))
        .collect();
    rdr.set_headers(cleaned);

    let mut mappings = Vec::new();
    for (line, result) in rdr.deserialize::<RawMapping>().enumerate() {
        let raw = result.map_err(format_err)?;
        let route_id = raw.route_id.unwrap_or_default().trim().to_string();
        match parse_i64_safe(raw.parking_number.as_deref()) {
            Some(parking_number) if !route_id.is_empty() => {
                mappings.push(ParkingMapping { route_id, parking_number })
            }
            _ => tracing::warn!(
                line = line + 2,
                "skipping mapping row without route id or parking number"
            ),
        }
    }
    Ok(mappings)
}

/// Build a complete dataset from the two source files.
///
/// A mapping file that does not exist yields an empty mapping; one that
/// exists but cannot be read fails the whole load.
pub fn load_dataset(sheet_path: &Path, mapping_path: &Path) -> Result<(Dataset, LoadReport)> {
    let (sheets, report) = load_route_sheets(sheet_path)?;
    let parkings = if mapping_path.exists() {
        load_parking_mapping(mapping_path)?
    } else {
        tracing::warn!(
            path = %mapping_path.display(),
            "parking mapping not found, continuing without it"
        );
        Vec::new()
    };
    Ok((Dataset { sheets, parkings }, report))
}
