//! examportal - a command-line front-end for the government examination portal.
//!
//! Log in, browse the exam catalog, apply, check the credit balance and
//! talk to the study assistant from a terminal.

mod app;
mod prompt;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use examportal_core::models::{ExamFilter, PaperFilter};
use examportal_core::Config;

/// Log file written in the data directory
const LOG_FILE: &str = "examportal.log";

const USAGE: &str = "\
Usage: examportal <command> [args]

Commands:
  status                      Show who is logged in
  login [email]               Log in
  logout                      Forget the stored credentials
  register                    Create an account (interactive)
  exams [--refresh] [--search <text>] [--status <status>]
                              List exams
  papers [--search <text>] [--exam <name>] [--year <year>]
                              List previous-year question papers
  apply <exam id>             Apply for an exam
  profile                     Show profile, applications and certificates
  certificate <application>   Generate the certificate for an application
  admit-card <application>    Download the admit card for an application
  credit                      Show the credit balance
  notifications [read <id> | read-all]
  settings                    Change email or phone
  ask <message>               Ask the public help bot
  assistant                   Chat with the study assistant
  open <path>                 Open a portal page, logging in first if needed";

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Logs go to stderr and,
/// when the data directory is usable, to a file there as well.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _log_guard = init_tracing(config.data_dir().ok().as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    info!(command = %command, "examportal starting");
    let mut app = App::new(config)?;

    match command.as_str() {
        "status" => app.status(),
        "login" => app.login(rest.first().map(String::as_str)).await,
        "logout" => app.logout(),
        "register" => app.register().await,
        "exams" => {
            let filter = ExamFilter {
                search: flag(rest, "--search")?.map(str::to_string),
                status: flag(rest, "--status")?.map(str::to_string),
            };
            app.exams(rest.iter().any(|a| a == "--refresh"), &filter).await
        }
        "papers" => {
            let filter = PaperFilter {
                search: flag(rest, "--search")?.map(str::to_string),
                exam: flag(rest, "--exam")?.map(str::to_string),
                year: flag(rest, "--year")?.map(parse_year).transpose()?,
            };
            app.papers(&filter)
        }
        "apply" => app.apply(parse_id(required(rest, "exam id")?)?).await,
        "profile" => app.profile().await,
        "certificate" => app.certificate(required(rest, "application id")?).await,
        "admit-card" => app.admit_card(required(rest, "application id")?).await,
        "credit" => app.credit().await,
        "notifications" => app.notifications(rest),
        "settings" => app.settings().await,
        "ask" => app.ask(&rest.join(" ")).await,
        "assistant" => app.assistant().await,
        "open" => app.open(required(rest, "path")?).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing argument: <{}>", name))
}

/// Value following `name`, e.g. `--year 2023`.
fn flag<'a>(args: &'a [String], name: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|a| a == name) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|value| Some(value.as_str()))
            .ok_or_else(|| anyhow::anyhow!("Missing value for {}", name)),
    }
}

fn parse_year(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Not a valid year: {}", value))
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Not a valid id: {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_values() {
        let rest = args(&["--refresh", "--search", "defence", "--status", "open"]);
        assert_eq!(flag(&rest, "--search").unwrap(), Some("defence"));
        assert_eq!(flag(&rest, "--status").unwrap(), Some("open"));
        assert_eq!(flag(&rest, "--year").unwrap(), None);
        assert!(flag(&args(&["--exam"]), "--exam").is_err());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2023").unwrap(), 2023);
        assert!(parse_year("last").is_err());
    }

    #[test]
    fn test_usage_lists_catalog_commands() {
        assert!(USAGE.contains("papers [--search <text>]"));
        assert!(USAGE.contains("--status <status>"));
    }
}
