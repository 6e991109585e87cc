use crate::error::{AppError, Result};
use crate::types::{Dataset, ParkingMapping, Report, RouteSheet};
use crate::util::average;
use std::collections::HashSet;

/// Aggregate statistics over any set of route sheets.
///
/// Empty input yields zero counts and sums with `None` for the means.
pub fn summarize<'a, I>(rows: I) -> Report
where
    I: IntoIterator<Item = &'a RouteSheet>,
{
    let mut total_amount = 0.0;
    let mut total_fines = 0.0;
    let mut amounts = Vec::new();
    let mut items = Vec::new();
    let mut box_pcts = Vec::new();
    let mut routes_without_returns = 0usize;
    let mut returns_total_sum = 0i64;
    let mut returns_delivered_sum = 0i64;

    for r in rows {
        total_amount += r.sheet_amount;
        total_fines += r.fines_amount;
        amounts.push(r.sheet_amount);
        items.push(r.item_count as f64);

        let pct = r.returns_delivery_pct();
        let nothing_to_return = r.returns_total == Some(0) && r.returns_delivered == Some(0);
        if nothing_to_return || pct == Some(0.0) || r.returns_total.is_none() {
            routes_without_returns += 1;
        }
        // Counts come straight from cells; saturate rather than overflow.
        returns_total_sum = returns_total_sum.saturating_add(r.returns_total.unwrap_or(0));
        returns_delivered_sum =
            returns_delivered_sum.saturating_add(r.returns_delivered.unwrap_or(0));

        if let Some(p) = r.boxes_delivery_pct() {
            box_pcts.push(p);
        }
    }

    let returns_delivery_rate = if returns_total_sum > 0 {
        returns_delivered_sum as f64 / returns_total_sum as f64 * 100.0
    } else {
        0.0
    };

    Report {
        total_amount,
        total_fines,
        avg_items: average(&items),
        route_count: amounts.len(),
        routes_without_returns,
        returns_total_sum,
        returns_delivered_sum,
        returns_delivery_rate,
        boxes_delivery_rate: average(&box_pcts),
        avg_sheet_amount: average(&amounts),
        net_profit: total_amount - total_fines,
    }
}

/// Resolve a parking number to its single mapping entry.
pub fn resolve_parking(data: &Dataset, parking_number: i64) -> Result<&ParkingMapping> {
    let mut matches = data.parkings.iter().filter(|p| p.parking_number == parking_number);
    let first = matches
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Parking {parking_number}")))?;
    if matches.next().is_some() {
        return Err(AppError::DuplicateKey(format!(
            "parking {parking_number} in the parking mapping"
        )));
    }
    Ok(first)
}

pub fn sheets_for_parking(data: &Dataset, parking_number: i64) -> Result<Vec<&RouteSheet>> {
    let mapping = resolve_parking(data, parking_number)?;
    let rows: Vec<&RouteSheet> = data
        .sheets
        .iter()
        .filter(|s| s.route_prefix() == mapping.route_id)
        .collect();
    if rows.is_empty() {
        return Err(AppError::EmptyResult(format!(
            "parking {parking_number} (route {})",
            mapping.route_id
        )));
    }
    Ok(rows)
}

pub fn summarize_for_parking(data: &Dataset, parking_number: i64) -> Result<Report> {
    Ok(summarize(sheets_for_parking(data, parking_number)?))
}

pub fn find_sheet(data: &Dataset, sheet_number: i64) -> Result<&RouteSheet> {
    data.sheets
        .iter()
        .find(|s| s.sheet_number == sheet_number)
        .ok_or_else(|| AppError::NotFound(format!("Route sheet №{sheet_number}")))
}

pub fn sheets_for_driver<'a>(data: &'a Dataset, driver: &str) -> Result<Vec<&'a RouteSheet>> {
    let rows: Vec<&RouteSheet> = data.sheets.iter().filter(|s| s.driver_name == driver).collect();
    if rows.is_empty() {
        return Err(AppError::NotFound(format!("Driver {driver}")));
    }
    Ok(rows)
}

/// Distinct driver names in order of first appearance.
pub fn driver_names(data: &Dataset) -> Vec<&str> {
    let mut seen = HashSet::new();
    data.sheets
        .iter()
        .map(|s| s.driver_name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}

pub fn parking_for_route(data: &Dataset, route_code: &str) -> Option<i64> {
    let prefix = crate::util::char_prefix(route_code, crate::types::ROUTE_PREFIX_LEN);
    data.parkings
        .iter()
        .find(|p| p.route_id == prefix)
        .map(|p| p.parking_number)
}

/// Parking numbers, in mapping order, that cover at least one loaded sheet.
pub fn parkings_in_use(data: &Dataset) -> Result<Vec<i64>> {
    let prefixes: HashSet<&str> = data.sheets.iter().map(|s| s.route_prefix()).collect();
    let mut seen = HashSet::new();
    let numbers: Vec<i64> = data
        .parkings
        .iter()
        .filter(|p| prefixes.contains(p.route_id.as_str()))
        .map(|p| p.parking_number)
        .filter(|n| seen.insert(*n))
        .collect();
    if numbers.is_empty() {
        return Err(AppError::EmptyResult("any parking in the current data".to_string()));
    }
    Ok(numbers)
}
