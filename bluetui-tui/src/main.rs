/*!
 * bluetui
 * Interactive Bluetooth device manager over BlueZ
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor,
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::io::{self, Stdout};
use std::sync::Mutex;
use tokio::time::Duration;

mod app;
mod ui;

use app::{App, Command};
use bluetui_core::{AdapterSession, BusConfig, DbusConnection};
use ui::render_ui;

type Term = Terminal<CrosstermBackend<Stdout>>;

#[derive(Parser)]
#[command(name = "bluetui")]
#[command(about = "Interactive Bluetooth device manager")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/bluetui/config.toml")]
    config: String,

    /// Enable debug logging to the log file
    #[arg(short, long)]
    debug: bool,

    /// Where debug logs are written
    #[arg(long, default_value = "bluetui.log")]
    log_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to a file so they never tear the alternate screen
    if cli.debug {
        let file = File::create(&cli.log_file).with_context(|| format!("failed to create {}", cli.log_file))?;
        tracing_subscriber::fmt()
            .with_env_filter("bluetui=debug,bluetui_core=debug")
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let config = BusConfig::load(&cli.config)?;
    let session =
        AdapterSession::with_config(config, DbusConnection::connect).context("failed to get bluetooth adapter")?;
    let mut app = App::new(session).await;

    let result = match setup_terminal() {
        Ok(mut terminal) => run(&mut terminal, &mut app).await,
        Err(e) => Err(e),
    };

    finish(&mut app, result, restore_terminal)
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

/// Attempts every restore step even when an earlier one fails.
fn restore_terminal() -> Result<()> {
    let raw = disable_raw_mode();
    let mut stdout = io::stdout();
    let screen = execute!(stdout, LeaveAlternateScreen, cursor::Show);
    raw?;
    screen?;
    Ok(())
}

/// Restores the terminal and closes the session whatever `result` holds.
/// The run error takes precedence over a restore error.
fn finish(app: &mut App, result: Result<()>, restore: impl FnOnce() -> Result<()>) -> Result<()> {
    let restored = restore();
    app.close();
    result.and(restored)
}

async fn run(terminal: &mut Term, app: &mut App) -> Result<()> {
    dispatch(terminal, app, Command::Scan).await?;

    loop {
        // Header, status, help and list borders take five rows
        app.page_size = usize::from(terminal.size()?.height.saturating_sub(5)).max(1);
        terminal.draw(|f| render_ui(f, app))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key) {
            Command::Quit => return Ok(()),
            Command::None => {}
            command => dispatch(terminal, app, command).await?,
        }
    }
}

/// Shows the busy status, then runs `command` to completion before taking
/// more input.
async fn dispatch(terminal: &mut Term, app: &mut App, command: Command) -> Result<()> {
    app.begin(command);
    terminal.draw(|f| render_ui(f, app))?;
    app.execute(command).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use bluetui_core::MockConnection;

    async fn app(mock: &MockConnection) -> App {
        let session = AdapterSession::with_config(BusConfig::default(), mock.factory()).unwrap();
        App::new(session).await
    }

    #[tokio::test]
    async fn test_finish_closes_session_when_restore_fails() {
        let mock = MockConnection::new();
        let mut app = app(&mock).await;

        let err = finish(&mut app, Ok(()), || Err(anyhow!("tty gone"))).unwrap_err();
        assert_eq!(err.to_string(), "tty gone");
        assert!(app.session().is_closed());
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_restores_after_run_error() {
        let mock = MockConnection::new();
        let mut app = app(&mock).await;
        let mut restored = false;

        let err = finish(&mut app, Err(anyhow!("draw failed")), || {
            restored = true;
            Err(anyhow!("tty gone"))
        })
        .unwrap_err();

        assert!(restored);
        assert_eq!(err.to_string(), "draw failed");
        assert!(app.session().is_closed());
    }
}
