// Text templates for everything the bot says, plus the snapshot export.
use crate::error::Result;
use crate::navigator::PageView;
use crate::types::{LoadReport, Report, RouteExportRow, RouteSheet};
use crate::util::{format_int, format_number, format_opt_int, format_opt_number, MISSING};
use serde::Serialize;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

const RULE: &str = "------------------------------------";

fn pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{}%", format_number(v, 2)),
        None => MISSING.to_string(),
    }
}

fn or_missing(s: &str) -> &str {
    if s.trim().is_empty() {
        MISSING
    } else {
        s
    }
}

pub fn render_report(title: &str, r: &Report) -> String {
    [
        format!("📊 {title}"),
        RULE.to_string(),
        format!("💰 Route sheet total: {}", format_number(r.total_amount, 2)),
        format!("⚠️ Fines total: {}", format_number(r.total_fines, 2)),
        format!("📦 Average items: {}", format_opt_number(r.avg_items)),
        format!("🚗 Route sheets: {}", format_int(r.route_count as u64)),
        format!(
            "🔄 Route sheets without returns: {}",
            format_int(r.routes_without_returns as u64)
        ),
        String::new(),
        "🚚 Returns:".to_string(),
        format!("   • Total: {}", format_int(r.returns_total_sum)),
        format!("   • Delivered: {}", format_int(r.returns_delivered_sum)),
        format!("   • Delivery rate: {}", pct(Some(r.returns_delivery_rate))),
        String::new(),
        "📦 Boxes:".to_string(),
        format!("   • Delivery rate: {}", pct(r.boxes_delivery_rate)),
        String::new(),
        format!("📈 Average route sheet amount: {}", format_opt_number(r.avg_sheet_amount)),
        format!("💵 Net profit (total - fines): {}", format_number(r.net_profit, 2)),
    ]
    .join("\n")
}

pub fn render_sheet(s: &RouteSheet, parking: Option<i64>) -> String {
    let parking = parking
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unknown parking".to_string());
    [
        format!("📋 Route sheet №{}", s.sheet_number),
        RULE.to_string(),
        format!("🚗 Parking: {parking}"),
        format!("👨‍✈️ Driver: {}", or_missing(&s.driver_name)),
        format!("📅 Opened: {}", or_missing(&s.open_date)),
        String::new(),
        format!("💰 Route sheet amount: {}", format_number(s.sheet_amount, 2)),
        format!("⚠️ Fines: {}", format_number(s.fines_amount, 2)),
        format!("📦 Items: {}", format_int(s.item_count)),
        String::new(),
        format!(
            "🔄 Returns: {} / {} ({})",
            format_opt_int(s.returns_total),
            format_opt_int(s.returns_delivered),
            pct(s.returns_delivery_pct())
        ),
        format!(
            "📦 Boxes: {} / {} ({})",
            format_opt_int(s.boxes_total),
            format_opt_int(s.boxes_delivered),
            pct(s.boxes_delivery_pct())
        ),
    ]
    .join("\n")
}

pub fn render_driver_sheets(driver: &str, sheets: &[&RouteSheet]) -> String {
    let mut out = format!("👨‍✈️ Route sheets of {driver}:\n");
    for s in sheets {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "-\n📋 Route sheet №{}\n🚗 Parking: {}\n📅 Opened: {}\n💰 Route sheet amount: {}\n⚠️ Fines: {}\n📦 Items: {}\n🔄 Returns: {}\n📦 Boxes: {}\n",
            s.sheet_number,
            or_missing(s.route_prefix()),
            or_missing(&s.open_date),
            format_number(s.sheet_amount, 2),
            format_number(s.fines_amount, 2),
            format_int(s.item_count),
            or_missing(&s.returns_raw),
            or_missing(&s.boxes_raw),
        );
    }
    out
}

pub fn route_label(s: &RouteSheet) -> String {
    format!(
        "🚗 Parking {}, №{}, {}, 📅 {}",
        or_missing(s.route_prefix()),
        s.sheet_number,
        or_missing(&s.driver_name),
        or_missing(&s.open_date)
    )
}

pub fn parking_label(parking_number: i64) -> String {
    format!("📍 Parking {parking_number}")
}

pub fn page_title<T>(title: &str, view: &PageView<'_, T>) -> String {
    if view.page_count == 0 {
        format!("{title}: nothing to show")
    } else {
        format!("{title} (page {}/{}):", view.page_index + 1, view.page_count)
    }
}

pub fn render_load_summary(load: &LoadReport, parkings: usize) -> String {
    let mut out = format!(
        "✅ Data loaded: {} route sheets, {} parking mappings.",
        format_int(load.loaded_rows as u64),
        format_int(parkings as u64)
    );
    if load.parse_errors > 0 {
        let _ = write!(
            out,
            "\nNote: {} of {} rows skipped due to unreadable values.",
            format_int(load.parse_errors as u64),
            format_int(load.total_rows as u64)
        );
    }
    out
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(io::Error::from)?;
    for r in rows {
        wtr.serialize(r).map_err(io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Write `summary.json` and `routes.csv` for the freshly loaded data.
pub fn export_snapshot(dir: &Path, report: &Report, sheets: &[RouteSheet]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_json(&dir.join("summary.json"), report)?;
    let rows: Vec<RouteExportRow<'_>> = sheets.iter().map(RouteExportRow::from).collect();
    write_csv(&dir.join("routes.csv"), &rows)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::page;
    use crate::reports::summarize;
    use crate::types::sheet;

    #[test]
    fn report_uses_two_decimals_and_placeholders() {
        let mut s = sheet(1, "MSK01-A", "Ivanov", 1234.5, 34.5);
        s.returns_total = Some(10);
        s.returns_delivered = Some(8);
        let text = render_report("Overall", &summarize(&[s]));
        assert!(text.contains("💰 Route sheet total: 1,234.50"));
        assert!(text.contains("🚗 Route sheets: 1\n"));
        assert!(text.contains("Delivery rate: 80.00%"));
        assert!(text.contains("📦 Boxes:\n   • Delivery rate: N/A"));
        assert!(text.contains("Net profit (total - fines): 1,200.00"));
        assert!(!text.contains("NaN") && !text.contains("None"));
    }

    #[test]
    fn empty_report_renders_placeholders() {
        let text = render_report("Empty", &summarize(&Vec::<RouteSheet>::new()));
        assert!(text.contains("Average items: N/A"));
        assert!(text.contains("Average route sheet amount: N/A"));
    }

    #[test]
    fn sheet_card_shows_unknown_parking() {
        let s = sheet(7, "MSK01-A", "Ivanov", 10.0, 0.0);
        let text = render_sheet(&s, None);
        assert!(text.starts_with("📋 Route sheet №7"));
        assert!(text.contains("Parking: unknown parking"));
        assert!(text.contains("Returns: N/A / N/A (N/A)"));
        assert!(render_sheet(&s, Some(4)).contains("Parking: 4"));
    }

    #[test]
    fn labels_and_titles() {
        let s = sheet(7, "MSK01-A", "Ivanov", 10.0, 0.0);
        assert_eq!(route_label(&s), "🚗 Parking MSK01, №7, Ivanov, 📅 2024-03-01");
        let items = [1, 2, 3, 4, 5, 6];
        assert_eq!(page_title("Drivers", &page(&items, 1, 5)), "Drivers (page 2/2):");
        let none: [u8; 0] = [];
        assert_eq!(page_title("Drivers", &page(&none, 0, 5)), "Drivers: nothing to show");
    }

    #[test]
    fn driver_listing_contains_each_sheet() {
        let a = sheet(1, "MSK01-A", "Ivanov", 10.0, 0.0);
        let b = sheet(2, "MSK02-A", "Ivanov", 20.0, 1.0);
        let text = render_driver_sheets("Ivanov", &[&a, &b]);
        assert!(text.contains("№1") && text.contains("№2"));
        assert!(text.contains("Parking: MSK02"));
    }

    #[test]
    fn load_summary_mentions_skipped_rows() {
        let load = LoadReport { total_rows: 10, loaded_rows: 9, parse_errors: 1 };
        let text = render_load_summary(&load, 3);
        assert!(text.contains("9 route sheets, 3 parking mappings"));
        assert!(text.contains("1 of 10 rows skipped"));
    }

    #[test]
    fn snapshot_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sheets = vec![sheet(1, "MSK01-A", "Ivanov", 10.0, 0.0)];
        export_snapshot(dir.path(), &summarize(&sheets), &sheets).unwrap();

        let json = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
        assert!(json.contains("\"route_count\": 1"));
        let csv = std::fs::read_to_string(dir.path().join("routes.csv")).unwrap();
        assert!(csv.starts_with("route_code,sheet_number,driver_name"));
        assert!(csv.contains("MSK01-A,1,Ivanov"));
    }
}
