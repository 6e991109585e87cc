use crate::error::{AppError, Result};
use crate::loader;
use crate::navigator::{page, PageView};
use crate::output;
use crate::reports;
use crate::source::{DataSource, SourceFiles};
use crate::types::{Dataset, LoadReport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Everything an operator can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    RequestDownload,
    ListRoutes(usize),
    ListDrivers(usize),
    SelectRoute(i64),
    SelectDriver(String),
    ListParkings,
    SelectParking(i64),
}

impl Action {
    /// Encoding carried by inline buttons.
    pub fn callback_data(&self) -> String {
        match self {
            Action::Start => "start".to_string(),
            Action::RequestDownload => "download_previous_day".to_string(),
            Action::ListRoutes(p) => format!("all_routes_page_{p}"),
            Action::ListDrivers(p) => format!("drivers_page_{p}"),
            Action::SelectRoute(n) => format!("route_{n}"),
            Action::SelectDriver(name) => format!("driver:{name}"),
            Action::ListParkings => "choose_parking".to_string(),
            Action::SelectParking(n) => format!("parking_{n}"),
        }
    }

    pub fn parse(data: &str) -> Option<Action> {
        let data = data.trim();
        match data {
            "start" | "/start" => return Some(Action::Start),
            "download_previous_day" => return Some(Action::RequestDownload),
            "show_all_routes" => return Some(Action::ListRoutes(0)),
            "show_drivers_list" => return Some(Action::ListDrivers(0)),
            "choose_parking" => return Some(Action::ListParkings),
            _ => {}
        }
        if let Some(p) = data.strip_prefix("all_routes_page_") {
            return p.parse().ok().map(Action::ListRoutes);
        }
        if let Some(p) = data.strip_prefix("drivers_page_") {
            return p.parse().ok().map(Action::ListDrivers);
        }
        if let Some(n) = data.strip_prefix("route_") {
            return n.parse().ok().map(Action::SelectRoute);
        }
        if let Some(name) = data.strip_prefix("driver:") {
            return (!name.is_empty()).then(|| Action::SelectDriver(name.to_string()));
        }
        if let Some(n) = data.strip_prefix("parking_") {
            return n.parse().ok().map(Action::SelectParking);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self { label: label.into(), action }
    }
}

/// What goes back to the chat: text plus rows of inline buttons.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), buttons: Vec::new() }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<Button>>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// Owner of the current dataset.
///
/// Loads are serialised and swap the whole dataset in one step; readers
/// work on the `Arc` they took at the start of their call.
#[derive(Default)]
pub struct AppState {
    dataset: RwLock<Option<Arc<Dataset>>>,
    load_lock: Mutex<()>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Arc<Dataset>> {
        self.dataset
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AppError::NotLoaded)
    }

    /// Build a dataset from `files` and make it current. On error the
    /// previous dataset stays in place.
    pub fn load(&self, files: &SourceFiles) -> Result<(Arc<Dataset>, LoadReport)> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (dataset, report) = loader::load_dataset(&files.sheet, &files.mapping)?;
        let dataset = Arc::new(dataset);
        *self.dataset.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&dataset));
        tracing::info!(
            sheets = dataset.sheets.len(),
            parkings = dataset.parkings.len(),
            skipped = report.parse_errors,
            "dataset replaced"
        );
        Ok((dataset, report))
    }
}

pub struct Bot<S> {
    state: AppState,
    source: S,
    page_size: usize,
    export_dir: Option<PathBuf>,
}

impl<S: DataSource> Bot<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        Self {
            state: AppState::new(),
            source,
            page_size: page_size.max(1),
            export_dir: None,
        }
    }

    pub fn with_export_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.export_dir = dir;
        self
    }

    /// Run one action. Errors never escape: they become the reply text.
    pub fn dispatch(&self, action: &Action) -> Reply {
        tracing::debug!(action = %action.callback_data(), "dispatch");
        let result = match action {
            Action::Start => Ok(self.start()),
            Action::RequestDownload => self.request_download(),
            Action::ListRoutes(p) => self.list_routes(*p),
            Action::ListDrivers(p) => self.list_drivers(*p),
            Action::SelectRoute(n) => self.select_route(*n),
            Action::SelectDriver(name) => self.select_driver(name),
            Action::ListParkings => self.list_parkings(),
            Action::SelectParking(n) => self.select_parking(*n),
        };
        result.unwrap_or_else(|e| {
            tracing::error!(action = %action.callback_data(), error = %e, "action failed");
            Reply::text(e.user_message())
        })
    }

    fn start(&self) -> Reply {
        let download = Button::new("📥 Download previous day", Action::RequestDownload);
        let mut buttons = vec![vec![download]];
        if self.state.snapshot().is_ok() {
            buttons.extend(main_menu());
        }
        Reply::text("👋 Hi! I analyse route sheets.\nChoose an action:").with_buttons(buttons)
    }

    fn request_download(&self) -> Result<Reply> {
        let files = self.source.fetch()?;
        let (data, load) = self.state.load(&files)?;
        let report = reports::summarize(&data.sheets);

        if let Some(dir) = &self.export_dir {
            if let Err(e) = output::export_snapshot(dir, &report, &data.sheets) {
                tracing::warn!(dir = %dir.display(), error = %e, "snapshot export failed");
            }
        }

        let text = format!(
            "{}\n\n{}\n\nChoose an action:",
            output::render_load_summary(&load, data.parkings.len()),
            output::render_report("Route sheet analysis", &report)
        );
        Ok(Reply::text(text).with_buttons(main_menu()))
    }

    fn list_routes(&self, page_index: usize) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let view = page(&data.sheets, page_index, self.page_size);
        let mut buttons: Vec<Vec<Button>> = view
            .items
            .iter()
            .map(|s| vec![Button::new(output::route_label(s), Action::SelectRoute(s.sheet_number))])
            .collect();
        buttons.extend(nav_row(&view, Action::ListRoutes));
        Ok(Reply::text(output::page_title("📋 Route sheets", &view)).with_buttons(buttons))
    }

    fn list_drivers(&self, page_index: usize) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let names = reports::driver_names(&data);
        let view = page(&names, page_index, self.page_size);
        let mut buttons: Vec<Vec<Button>> = view
            .items
            .iter()
            .map(|name| vec![Button::new(*name, Action::SelectDriver(name.to_string()))])
            .collect();
        buttons.extend(nav_row(&view, Action::ListDrivers));
        Ok(Reply::text(output::page_title("👥 Drivers", &view)).with_buttons(buttons))
    }

    fn select_route(&self, sheet_number: i64) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let sheet = reports::find_sheet(&data, sheet_number)?;
        let parking = reports::parking_for_route(&data, &sheet.route_code);
        Ok(Reply::text(output::render_sheet(sheet, parking)))
    }

    fn select_driver(&self, driver: &str) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let sheets = reports::sheets_for_driver(&data, driver)?;
        Ok(Reply::text(output::render_driver_sheets(driver, &sheets)))
    }

    fn list_parkings(&self) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let buttons = reports::parkings_in_use(&data)?
            .into_iter()
            .map(|n| vec![Button::new(output::parking_label(n), Action::SelectParking(n))])
            .collect();
        Ok(Reply::text("Choose a parking:").with_buttons(buttons))
    }

    fn select_parking(&self, parking_number: i64) -> Result<Reply> {
        let data = self.state.snapshot()?;
        let report = reports::summarize_for_parking(&data, parking_number)?;
        Ok(Reply::text(output::render_report(
            &format!("Analysis for parking {parking_number}"),
            &report,
        )))
    }
}

fn main_menu() -> Vec<Vec<Button>> {
    vec![
        vec![Button::new("All route sheets", Action::ListRoutes(0))],
        vec![Button::new("Drivers", Action::ListDrivers(0))],
        vec![Button::new("Choose parking", Action::ListParkings)],
    ]
}

fn nav_row<T>(view: &PageView<'_, T>, make: fn(usize) -> Action) -> Option<Vec<Button>> {
    let mut row = Vec::new();
    if view.has_prev {
        row.push(Button::new("⬅️ Back", make(view.page_index - 1)));
    }
    if view.has_next {
        row.push(Button::new("➡️ Next", make(view.page_index + 1)));
    }
    (!row.is_empty()).then_some(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    const HEADER: &str = "Лог. маршрут,№,ФИО Водителя,Дата открытия,Сумма путевого листа,Сумма штрафов,Кол-во шк.,Возвраты: всего/доставлено,Коробки : всего / доставлено";

    /// Hands out whatever files the test queued last.
    struct StubSource {
        next: RefCell<Option<SourceFiles>>,
    }

    impl DataSource for StubSource {
        fn fetch(&self) -> Result<SourceFiles> {
            self.next
                .borrow()
                .clone()
                .ok_or(AppError::NoFileAvailable { attempts: 1 })
        }
    }

    fn fixture(dir: &Path) -> SourceFiles {
        let mut body = HEADER.to_string();
        for i in 1..=7 {
            let driver = if i % 2 == 0 { "Petrov" } else { "Ivanov" };
            let route = if i <= 4 { "MSK01-A" } else { "MSK02-B" };
            body.push_str(&format!("\n{route},{i},{driver},2024-03-01,100,10,5,4/2,10 : 10"));
        }
        let sheet = dir.join("sheets.csv");
        fs::write(&sheet, body).unwrap();
        let mapping = dir.join("parking_mapping.csv");
        fs::write(&mapping, "route_id,parking_number\nMSK01,1\nMSK02,2\nSPB01,3\n").unwrap();
        SourceFiles { sheet, mapping }
    }

    fn bot_with(files: Option<SourceFiles>) -> Bot<StubSource> {
        Bot::new(StubSource { next: RefCell::new(files) }, 5)
    }

    fn labels(reply: &Reply) -> Vec<&str> {
        reply.buttons.iter().flatten().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn callback_data_round_trips() {
        let actions = [
            Action::Start,
            Action::RequestDownload,
            Action::ListRoutes(3),
            Action::ListDrivers(0),
            Action::SelectRoute(123),
            Action::SelectDriver("Ivanov I_I".to_string()),
            Action::ListParkings,
            Action::SelectParking(7),
        ];
        for a in actions {
            assert_eq!(Action::parse(&a.callback_data()), Some(a));
        }
        assert_eq!(Action::parse("show_all_routes"), Some(Action::ListRoutes(0)));
        assert_eq!(Action::parse("route_abc"), None);
        assert_eq!(Action::parse("whatever"), None);
    }

    #[test]
    fn driver_names_shaped_like_page_callbacks_stay_drivers() {
        for name in ["s_page_2", "drivers_page_1", "route_5"] {
            let action = Action::SelectDriver(name.to_string());
            assert_eq!(Action::parse(&action.callback_data()), Some(action));
        }
        assert_eq!(Action::parse("drivers_page_2"), Some(Action::ListDrivers(2)));
        assert_eq!(Action::parse("driver:"), None);
    }

    #[test]
    fn queries_before_load_report_not_loaded() {
        let bot = bot_with(None);
        let actions = [
            Action::ListRoutes(0),
            Action::ListDrivers(0),
            Action::SelectRoute(1),
            Action::ListParkings,
        ];
        for action in actions {
            let reply = bot.dispatch(&action);
            assert_eq!(reply.text, AppError::NotLoaded.user_message());
        }
        assert_eq!(labels(&bot.dispatch(&Action::Start)), vec!["📥 Download previous day"]);
    }

    #[test]
    fn download_loads_and_summarises() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_with(Some(fixture(dir.path())));
        let reply = bot.dispatch(&Action::RequestDownload);
        assert!(reply.text.starts_with("✅ Data loaded: 7 route sheets, 3 parking mappings."));
        assert!(reply.text.contains("💰 Route sheet total: 700.00"));
        assert!(reply.text.contains("Net profit (total - fines): 630.00"));
        assert_eq!(labels(&reply), vec!["All route sheets", "Drivers", "Choose parking"]);
    }

    #[test]
    fn route_pages_and_selection() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_with(Some(fixture(dir.path())));
        bot.dispatch(&Action::RequestDownload);

        let first = bot.dispatch(&Action::ListRoutes(0));
        assert_eq!(first.text, "📋 Route sheets (page 1/2):");
        assert_eq!(first.buttons.len(), 6);
        assert_eq!(first.buttons.last().unwrap()[0].action, Action::ListRoutes(1));

        let second = bot.dispatch(&Action::ListRoutes(1));
        assert_eq!(second.buttons.len(), 3);
        assert_eq!(second.buttons.last().unwrap()[0].action, Action::ListRoutes(0));

        let clamped = bot.dispatch(&Action::ListRoutes(40));
        assert_eq!(clamped.text, first.text);

        let card = bot.dispatch(&Action::SelectRoute(6));
        assert!(card.text.contains("Route sheet №6"));
        assert!(card.text.contains("Parking: 2"));
        let missing = bot.dispatch(&Action::SelectRoute(99));
        assert!(missing.text.starts_with("❌") && missing.text.contains("№99"));
    }

    #[test]
    fn drivers_and_parkings() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_with(Some(fixture(dir.path())));
        bot.dispatch(&Action::RequestDownload);

        let drivers = bot.dispatch(&Action::ListDrivers(0));
        assert_eq!(labels(&drivers), vec!["Ivanov", "Petrov"]);
        let ivanov = bot.dispatch(&Action::SelectDriver("Ivanov".to_string()));
        assert_eq!(ivanov.text.matches("📋 Route sheet №").count(), 4);

        let parkings = bot.dispatch(&Action::ListParkings);
        assert_eq!(labels(&parkings), vec!["📍 Parking 1", "📍 Parking 2"]);
        let report = bot.dispatch(&Action::SelectParking(2));
        assert!(report.text.starts_with("📊 Analysis for parking 2"));
        assert!(report.text.contains("🚗 Route sheets: 3\n"));
        assert!(bot.dispatch(&Action::SelectParking(3)).text.contains("No data for parking 3"));
        assert!(bot.dispatch(&Action::SelectParking(9)).text.contains("Parking 9 not found"));
    }

    #[test]
    fn failed_load_keeps_previous_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let bot = bot_with(Some(fixture(dir.path())));
        bot.dispatch(&Action::RequestDownload);

        let broken = dir.path().join("broken.csv");
        fs::write(&broken, "Лог. маршрут,№\nMSK01-A,1\n").unwrap();
        *bot.source.next.borrow_mut() = Some(SourceFiles {
            sheet: broken,
            mapping: dir.path().join("parking_mapping.csv"),
        });
        let reply = bot.dispatch(&Action::RequestDownload);
        assert!(reply.text.contains("Missing required columns"));
        assert!(reply.text.contains("ФИО Водителя"));
        assert_eq!(bot.state.snapshot().unwrap().sheets.len(), 7);
    }

    #[test]
    fn export_dir_receives_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("export");
        let bot = bot_with(Some(fixture(dir.path()))).with_export_dir(Some(out.clone()));
        bot.dispatch(&Action::RequestDownload);
        assert!(out.join("summary.json").exists());
        assert!(out.join("routes.csv").exists());
    }
}
