use crate::util::{char_prefix, percent};
use serde::{Deserialize, Serialize};

/// Number of leading route-code characters that identify a parking lot.
pub const ROUTE_PREFIX_LEN: usize = 5;

/// One delivery run.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSheet {
    pub route_code: String,
    pub sheet_number: i64,
    pub driver_name: String,
    pub open_date: String,
    pub sheet_amount: f64,
    pub fines_amount: f64,
    pub item_count: i64,
    pub returns_raw: String,
    pub boxes_raw: String,
    pub returns_total: Option<i64>,
    pub returns_delivered: Option<i64>,
    pub boxes_total: Option<i64>,
    pub boxes_delivered: Option<i64>,
}

impl RouteSheet {
    pub fn route_prefix(&self) -> &str {
        char_prefix(&self.route_code, ROUTE_PREFIX_LEN)
    }

    pub fn returns_delivery_pct(&self) -> Option<f64> {
        percent(self.returns_delivered, self.returns_total)
    }

    pub fn boxes_delivery_pct(&self) -> Option<f64> {
        percent(self.boxes_delivered, self.boxes_total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingMapping {
    pub route_id: String,
    pub parking_number: i64,
}

/// Row of the mapping csv as it appears on disk.
#[derive(Debug, Deserialize)]
pub struct RawMapping {
    #[serde(rename = "route_id")]
    pub route_id: Option<String>,
    #[serde(rename = "parking_number")]
    pub parking_number: Option<String>,
}

/// Everything one successful load produced. Never mutated after creation.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub sheets: Vec<RouteSheet>,
    pub parkings: Vec<ParkingMapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_amount: f64,
    pub total_fines: f64,
    pub avg_items: Option<f64>,
    pub route_count: usize,
    pub routes_without_returns: usize,
    pub returns_total_sum: i64,
    pub returns_delivered_sum: i64,
    pub returns_delivery_rate: f64,
    pub boxes_delivery_rate: Option<f64>,
    pub avg_sheet_amount: Option<f64>,
    pub net_profit: f64,
}

/// Route sheet as written to the export csv.
#[derive(Debug, Serialize)]
pub struct RouteExportRow<'a> {
    pub route_code: &'a str,
    pub sheet_number: i64,
    pub driver_name: &'a str,
    pub open_date: &'a str,
    pub sheet_amount: f64,
    pub fines_amount: f64,
    pub item_count: i64,
    pub returns_total: Option<i64>,
    pub returns_delivered: Option<i64>,
    pub returns_delivery_pct: Option<f64>,
    pub boxes_total: Option<i64>,
    pub boxes_delivered: Option<i64>,
    pub boxes_delivery_pct: Option<f64>,
}

impl<'a> From<&'a RouteSheet> for RouteExportRow<'a> {
    fn from(s: &'a RouteSheet) -> Self {
        Self {
            route_code: &s.route_code,
            sheet_number: s.sheet_number,
            driver_name: &s.driver_name,
            open_date: &s.open_date,
            sheet_amount: s.sheet_amount,
            fines_amount: s.fines_amount,
            item_count: s.item_count,
            returns_total: s.returns_total,
            returns_delivered: s.returns_delivered,
            returns_delivery_pct: s.returns_delivery_pct(),
            boxes_total: s.boxes_total,
            boxes_delivered: s.boxes_delivered,
            boxes_delivery_pct: s.boxes_delivery_pct(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sheet(number: i64, route: &str, driver: &str, amount: f64, fines: f64) -> RouteSheet {
    RouteSheet {
        route_code: route.to_string(),
        sheet_number: number,
        driver_name: driver.to_string(),
        open_date: "2024-03-01".to_string(),
        sheet_amount: amount,
        fines_amount: fines,
        item_count: 10,
        returns_raw: String::new(),
        boxes_raw: String::new(),
        returns_total: None,
        returns_delivered: None,
        boxes_total: None,
        boxes_delivered: None,
    }
}
