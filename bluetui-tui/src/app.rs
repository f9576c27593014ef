use bluetui_core::{AdapterInfo, AdapterSession, CancellationToken, Device, ErrorKind};
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tui_input::{Input, InputRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Pair,
    Trust,
    Connect,
    Disconnect,
}

impl DeviceAction {
    fn verb(&self) -> &'static str {
        match self {
            DeviceAction::Pair => "Pairing with",
            DeviceAction::Trust => "Trusting",
            DeviceAction::Connect => "Connecting to",
            DeviceAction::Disconnect => "Disconnecting from",
        }
    }

    fn done(&self) -> &'static str {
        match self {
            DeviceAction::Pair => "Paired",
            DeviceAction::Trust => "Trusted",
            DeviceAction::Connect => "Connected to",
            DeviceAction::Disconnect => "Disconnected from",
        }
    }
}

/// Work a key press asks the event loop to run against the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    Quit,
    Scan,
    Device(DeviceAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Busy,
    Error,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

const DEFAULT_PAGE_SIZE: usize = 10;

pub struct App {
    pub devices: Vec<Device>,
    pub selected: usize,
    pub mode: Mode,
    pub filter: Input,
    pub status: Status,
    pub show_help: bool,
    pub adapter: Option<AdapterInfo>,
    pub last_scan: Option<DateTime<Local>>,
    /// Rows the device list can show; set from the terminal height
    pub page_size: usize,
    session: AdapterSession,
}

impl App {
    pub async fn new(session: AdapterSession) -> Self {
        let adapter = match session.adapter_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Could not read adapter properties: {}", e);
                None
            }
        };

        Self {
            devices: Vec::new(),
            selected: 0,
            mode: Mode::Browse,
            filter: Input::default(),
            status: Status {
                level: StatusLevel::Info,
                message: "Press s to scan for devices".to_string(),
            },
            show_help: false,
            adapter,
            last_scan: None,
            page_size: DEFAULT_PAGE_SIZE,
            session,
        }
    }

    pub fn session(&self) -> &AdapterSession {
        &self.session
    }

    /// Devices matching the filter, in display order.
    pub fn visible(&self) -> Vec<&Device> {
        let needle = self.filter.value().to_lowercase();
        self.devices
            .iter()
            .filter(|d| {
                needle.is_empty()
                    || d.name().to_lowercase().contains(&needle)
                    || d.address().to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.visible().get(self.selected).copied()
    }

    pub fn next_device(&mut self) {
        let len = self.visible().len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn previous_device(&mut self) {
        let len = self.visible().len();
        if len > 0 {
            self.selected = if self.selected == 0 { len - 1 } else { self.selected - 1 };
        }
    }

    pub fn first_device(&mut self) {
        self.selected = 0;
    }

    pub fn last_device(&mut self) {
        self.selected = self.visible().len().saturating_sub(1);
    }

    pub fn next_page(&mut self) {
        let len = self.visible().len();
        self.selected = (self.selected + self.page_size.max(1)).min(len.saturating_sub(1));
    }

    pub fn previous_page(&mut self) {
        self.selected = self.selected.saturating_sub(self.page_size.max(1));
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub fn set_status(&mut self, level: StatusLevel, message: impl Into<String>) {
        self.status = Status {
            level,
            message: message.into(),
        };
    }

    /// Applies navigation and filter keys directly; returns anything that
    /// needs the session.
    pub fn handle_key(&mut self, key: KeyEvent) -> Command {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Command::Quit;
        }

        match self.mode {
            Mode::Filter => {
                match key.code {
                    KeyCode::Esc => {
                        self.filter.reset();
                        self.mode = Mode::Browse;
                    }
                    KeyCode::Enter => self.mode = Mode::Browse,
                    KeyCode::Backspace => {
                        self.filter.handle(InputRequest::DeletePrevChar);
                    }
                    KeyCode::Char(c) => {
                        self.filter.handle(InputRequest::InsertChar(c));
                    }
                    _ => {}
                }
                self.clamp_selection();
                Command::None
            }
            Mode::Browse => match key.code {
                KeyCode::Char('q') => Command::Quit,
                KeyCode::Char('s') => Command::Scan,
                KeyCode::Char('p') => Command::Device(DeviceAction::Pair),
                KeyCode::Char('t') => Command::Device(DeviceAction::Trust),
                KeyCode::Char('c') => Command::Device(DeviceAction::Connect),
                KeyCode::Char('x') => Command::Device(DeviceAction::Disconnect),
                KeyCode::Up | KeyCode::Char('k') => {
                    self.previous_device();
                    Command::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.next_device();
                    Command::None
                }
                KeyCode::PageUp | KeyCode::Left | KeyCode::Char('h') => {
                    self.previous_page();
                    Command::None
                }
                KeyCode::PageDown | KeyCode::Right | KeyCode::Char('l') => {
                    self.next_page();
                    Command::None
                }
                KeyCode::Home | KeyCode::Char('g') => {
                    self.first_device();
                    Command::None
                }
                KeyCode::End | KeyCode::Char('G') => {
                    self.last_device();
                    Command::None
                }
                KeyCode::Char('/') => {
                    self.mode = Mode::Filter;
                    Command::None
                }
                KeyCode::Esc => {
                    self.filter.reset();
                    self.clamp_selection();
                    Command::None
                }
                KeyCode::Char('?') => {
                    self.show_help = !self.show_help;
                    Command::None
                }
                _ => Command::None,
            },
        }
    }

    /// Status shown while `command` runs.
    pub fn begin(&mut self, command: Command) {
        match command {
            Command::Scan => self.set_status(StatusLevel::Busy, "Scanning for devices..."),
            Command::Device(action) => {
                if let Some(device) = self.selected_device() {
                    let message = format!("{} {}...", action.verb(), device.name());
                    self.set_status(StatusLevel::Busy, message);
                }
            }
            Command::None | Command::Quit => {}
        }
    }

    pub async fn execute(&mut self, command: Command) {
        match command {
            Command::Scan => self.scan().await,
            Command::Device(action) => self.run_action(action).await,
            Command::None | Command::Quit => {}
        }
    }

    pub async fn scan(&mut self) {
        let result = self.session.discover(&CancellationToken::new()).await;
        self.last_scan = Some(Local::now());
        self.reload_devices();

        match result {
            Ok(()) if self.devices.is_empty() => self.set_status(StatusLevel::Info, "No devices found"),
            Ok(()) => {
                let message = format!("Found {} device(s)", self.devices.len());
                self.set_status(StatusLevel::Info, message);
            }
            Err(e) => self.set_status(StatusLevel::Error, e.to_string()),
        }
    }

    pub async fn run_action(&mut self, action: DeviceAction) {
        let Some(device) = self.selected_device().cloned() else {
            self.set_status(StatusLevel::Error, "No device selected");
            return;
        };

        let result = match action {
            DeviceAction::Pair => self.session.pair(device.address()).await,
            DeviceAction::Trust => self.session.trust(device.address()).await,
            DeviceAction::Connect => self.session.connect(device.address()).await,
            DeviceAction::Disconnect => self.session.disconnect(device.address()).await,
        };

        match result {
            Ok(()) => {
                let message = format!("{} {}", action.done(), device.name());
                self.set_status(StatusLevel::Info, message);
                if let Err(e) = self.session.refresh().await {
                    tracing::warn!("Failed to refresh devices: {}", e);
                }
                self.reload_devices();
            }
            Err(e) => self.set_status(StatusLevel::Error, e.to_string()),
        }
    }

    /// Copies the session cache into display order, keeping the selection on
    /// the same address when it is still present.
    fn reload_devices(&mut self) {
        let selected = self.selected_device().map(|d| d.address().to_string());

        self.devices = match self.session.devices() {
            Ok(mut devices) => {
                devices.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.address().cmp(b.address())));
                devices
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to list devices: {}", e);
                Vec::new()
            }
        };

        self.selected = selected
            .and_then(|address| self.visible().iter().position(|d| d.address() == address))
            .unwrap_or(0);
        self.clamp_selection();
    }

    pub fn close(&mut self) {
        if let Err(e) = self.session.close() {
            tracing::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluetui_core::{BusConfig, CallError, MockConnection, PropertyMap, PropertyValue};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn mock_with(devices: &[(&str, &str, &str)]) -> MockConnection {
        let mock = MockConnection::new();
        for (path, address, name) in devices {
            let mut props = PropertyMap::new();
            props.insert("Address".to_string(), PropertyValue::from(*address));
            props.insert("Name".to_string(), PropertyValue::from(*name));
            mock.insert_interface(path, "org.bluez.Device1", props);
        }
        mock
    }

    async fn app(mock: &MockConnection) -> App {
        let config = BusConfig {
            settle_ms: 0,
            ..BusConfig::default()
        };
        let session = AdapterSession::with_config(config, mock.factory()).unwrap();
        App::new(session).await
    }

    async fn scanned(mock: &MockConnection) -> App {
        let mut app = app(mock).await;
        app.scan().await;
        mock.clear_history();
        app
    }

    fn three() -> MockConnection {
        mock_with(&[
            ("/dev_s", "CC:CC", "Speaker"),
            ("/dev_k", "AA:AA", "Keyboard"),
            ("/dev_m", "BB:BB", "Mouse"),
        ])
    }

    #[tokio::test]
    async fn test_scan_sorts_by_name() {
        let mock = three();
        let app = scanned(&mock).await;

        let names: Vec<&str> = app.devices.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Keyboard", "Mouse", "Speaker"]);
        assert_eq!(app.status.message, "Found 3 device(s)");
        assert!(app.last_scan.is_some());
    }

    #[tokio::test]
    async fn test_scan_without_devices() {
        let mock = MockConnection::new();
        let app = scanned(&mock).await;
        assert!(app.devices.is_empty());
        assert_eq!(app.status.message, "No devices found");
        assert!(app.selected_device().is_none());
    }

    #[tokio::test]
    async fn test_navigation_wraps() {
        let mock = three();
        let mut app = scanned(&mock).await;

        assert_eq!(app.handle_key(key(KeyCode::Up)), Command::None);
        assert_eq!(app.selected_device().unwrap().name(), "Speaker");
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(app.selected_device().unwrap().name(), "Keyboard");
        app.handle_key(key(KeyCode::Char('G')));
        assert_eq!(app.selected, 2);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn test_paging_stops_at_the_ends() {
        let mock = three();
        let mut app = scanned(&mock).await;
        app.page_size = 2;

        app.handle_key(key(KeyCode::PageDown));
        assert_eq!(app.selected, 2);
        app.handle_key(key(KeyCode::Char('l')));
        assert_eq!(app.selected, 2);

        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.selected, 0);
        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn test_filter_narrows_and_clears() {
        let mock = three();
        let mut app = scanned(&mock).await;
        app.handle_key(key(KeyCode::End));

        app.handle_key(key(KeyCode::Char('/')));
        assert_eq!(app.mode, Mode::Filter);
        for c in "mou".chars() {
            assert_eq!(app.handle_key(key(KeyCode::Char(c))), Command::None);
        }
        assert_eq!(app.visible().len(), 1);
        assert_eq!(app.selected_device().unwrap().address(), "BB:BB");

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.filter.value(), "mou");

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.visible().len(), 3);
    }

    #[tokio::test]
    async fn test_filter_matches_address() {
        let mock = three();
        let mut app = scanned(&mock).await;

        app.handle_key(key(KeyCode::Char('/')));
        for c in "cc:".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.selected_device().unwrap().name(), "Speaker");
    }

    #[tokio::test]
    async fn test_action_keys() {
        let mock = three();
        let mut app = scanned(&mock).await;

        assert_eq!(app.handle_key(key(KeyCode::Char('p'))), Command::Device(DeviceAction::Pair));
        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), Command::Device(DeviceAction::Disconnect));
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), Command::Scan);
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Command::Quit
        );
    }

    #[tokio::test]
    async fn test_connect_selected_device() {
        let mock = three();
        let mut app = scanned(&mock).await;
        app.next_device();

        let command = app.handle_key(key(KeyCode::Char('c')));
        app.begin(command);
        assert_eq!(app.status.level, StatusLevel::Busy);
        app.execute(command).await;

        assert_eq!(app.status.message, "Connected to Mouse");
        let calls = mock.calls_on("/dev_m");
        assert_eq!(calls[0].method, "org.bluez.Device1.Connect");
        assert_eq!(app.selected_device().unwrap().name(), "Mouse");
    }

    #[tokio::test]
    async fn test_failed_action_reports_error() {
        let mock = three();
        mock.fail_method("/dev_k", "org.bluez.Device1.Pair", CallError::new("Authentication Failed"));
        let mut app = scanned(&mock).await;

        app.run_action(DeviceAction::Pair).await;
        assert_eq!(app.status.level, StatusLevel::Error);
        assert_eq!(app.status.message, "pair failed for AA:AA: Authentication Failed");
    }

    #[tokio::test]
    async fn test_action_without_selection() {
        let mock = MockConnection::new();
        let mut app = app(&mock).await;

        app.run_action(DeviceAction::Trust).await;
        assert_eq!(app.status.message, "No device selected");
        assert!(mock.calls_on("/dev_k").is_empty());
    }

    #[tokio::test]
    async fn test_help_toggle_and_quit() {
        let mock = MockConnection::new();
        let mut app = app(&mock).await;

        app.handle_key(key(KeyCode::Char('?')));
        assert!(app.show_help);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), Command::Quit);

        app.close();
        assert!(app.session().is_closed());
    }
}
