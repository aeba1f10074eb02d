use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{self, ConfigError};
use crate::contract::DisplayEvent;
use crate::core_service::{CoreService, HostEffect, ServiceError, ServiceEvent};
use crate::model::ActionHandle;
use crate::store::StateStore;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub query: Option<String>,
    pub json: bool,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, RuntimeError> {
    let mut options = RuntimeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--config requires a path".into()))?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--query" => {
                let value = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--query requires text".into()))?;
                options.query = Some(value.clone());
            }
            "--json" => options.json = true,
            other => {
                if let Some(value) = other.strip_prefix("--config=") {
                    options.config_path = Some(PathBuf::from(value));
                } else if let Some(value) = other.strip_prefix("--query=") {
                    options.query = Some(value.to_string());
                } else {
                    return Err(RuntimeError::Usage(format!(
                        "unknown argument '{other}'; usage: sift-core [--config PATH] [--query TEXT] [--json]"
                    )));
                }
            }
        }
    }
    Ok(options)
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let config = config::load(options.config_path.as_deref())?;
    if !config.config_path.exists() {
        config::save(&config)?;
    }
    if let Err(error) = crate::logging::init(&config) {
        crate::logging::init_stderr(&config.log_level);
        warn!(%error, "file logging unavailable");
    }
    info!(
        config_path = %config.config_path.display(),
        state_db_path = %config.state_db_path.display(),
        "starting"
    );

    let mut store = match StateStore::open_file(&config.state_db_path) {
        Ok(store) => store,
        Err(error) => {
            warn!(%error, "state store unavailable; history will not persist");
            StateStore::open_memory().map_err(ServiceError::from)?
        }
    };

    let mut service = CoreService::with_configured_sources(config, None)?;
    service.load_state(&store);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match options.query {
        Some(query) => {
            service.on_query_changed(&query);
            service.run_until_settled(SETTLE_TIMEOUT);
            print_list(&mut out, &service, options.json)?;
        }
        None => run_line_loop(&mut service, &mut out, options.json)?,
    }

    service.save_state(&mut store)?;
    Ok(())
}

// Each stdin line is a new input state; lines starting with `:` are commands.
fn run_line_loop(
    service: &mut CoreService,
    out: &mut impl Write,
    json: bool,
) -> Result<(), RuntimeError> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let Some(command) = line.strip_prefix(':') else {
            service.on_query_changed(&line);
            for event in service.run_until_settled(SETTLE_TIMEOUT) {
                if let ServiceEvent::StillSearching { generation } = event {
                    if json {
                        let event = DisplayEvent::StillSearching { generation };
                        writeln!(out, "{}", serde_json::to_string(&event)?)?;
                    } else {
                        writeln!(out, "searching...")?;
                    }
                }
            }
            print_list(out, service, json)?;
            continue;
        };

        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        match name {
            "quit" | "q" => break,
            "next" => {
                service.select_next();
                print_list(out, service, json)?;
            }
            "prev" => {
                service.select_prev();
                print_list(out, service, json)?;
            }
            "pgdn" => {
                service.select_next_page();
                print_list(out, service, json)?;
            }
            "pgup" => {
                service.select_prev_page();
                print_list(out, service, json)?;
            }
            "open" => match service.commit_selection() {
                Some(ActionHandle::ChangeQuery { query }) => {
                    service.on_query_changed(&query);
                    service.run_until_settled(SETTLE_TIMEOUT);
                    print_list(out, service, json)?;
                }
                Some(action) => writeln!(out, "action: {action:?}")?,
                None => writeln!(out, "nothing selected")?,
            },
            "menu" => {
                let index = service.displayed().selected_index().unwrap_or(0);
                match service.load_context_menu(index) {
                    Ok(menu) => {
                        for entry in menu {
                            writeln!(out, "  > {} | {}", entry.title, entry.subtitle)?;
                        }
                    }
                    Err(error) => writeln!(out, "{error}")?,
                }
            }
            "pin" => {
                let index = service.displayed().selected_index().unwrap_or(0);
                match service.toggle_pin(index) {
                    Ok(pinned) => writeln!(out, "pinned: {pinned}")?,
                    Err(error) => writeln!(out, "{error}")?,
                }
                print_list(out, service, json)?;
            }
            "host" => match service.handle_host_json(rest) {
                Ok(HostEffect::Message { title, subtitle }) if json => {
                    let event = DisplayEvent::Message { title, subtitle };
                    writeln!(out, "{}", serde_json::to_string(&event)?)?;
                }
                Ok(effect) => {
                    writeln!(out, "host: {effect:?}")?;
                    if let HostEffect::QueryChanged { generation: Some(_) } = effect {
                        service.run_until_settled(SETTLE_TIMEOUT);
                    }
                    print_list(out, service, json)?;
                }
                Err(error) => writeln!(out, "{error}")?,
            },
            other => writeln!(out, "unknown command ':{other}'")?,
        }
    }
    Ok(())
}

fn print_list(out: &mut impl Write, service: &CoreService, json: bool) -> Result<(), RuntimeError> {
    if json {
        let event = DisplayEvent::Updated(service.snapshot());
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
        return Ok(());
    }

    let selected = service.displayed().selected_index();
    for (index, entry) in service.displayed().entries().iter().enumerate() {
        let marker = if Some(index) == selected { '>' } else { ' ' };
        let pin = if entry.result.pinned { " [pinned]" } else { "" };
        writeln!(
            out,
            "{marker}{index:>3} {} | {} ({}){pin}",
            entry.result.title(),
            entry.result.subtitle(),
            entry.result.score
        )?;
    }
    out.flush()?;
    Ok(())
}
