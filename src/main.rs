use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap::error::ErrorKind;

use mb_service::ServiceError;
use mb_service::cli::{Args, Cmd};
use mb_service::config::Settings;
use mb_service::control::{Backend, SystemRunner};
use mb_service::identity::{HostContext, SystemAccounts};
use mb_service::lifecycle::LifecycleManager;

fn main() -> ExitCode {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            eprintln!("\n{}", Args::command().render_help());
            return ExitCode::from(1);
        }
    };

    let Some(command) = args.command else {
        println!("{}", Args::command().render_help());
        return ExitCode::SUCCESS;
    };

    match run(command, &args) {
        Ok(code) => code,
        Err(e) => {
            log::debug!("{e:?}");
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<ServiceError>()
                .map(ServiceError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(command: Cmd, args: &Args) -> Result<ExitCode> {
    let settings = Settings::load()?;
    let backend = Backend::for_host(SystemRunner, &settings)?;
    let manager = LifecycleManager::new(
        backend,
        SystemRunner,
        SystemAccounts,
        HostContext::capture(),
        settings,
    );

    match command {
        Cmd::Install => {
            let mut stdout = io::stdout().lock();
            manager.install(&args.daemon_options(), &mut stdout)?;
            stdout.flush().context("flushing stdout")?;
        }
        Cmd::Uninstall => manager.uninstall()?,
        Cmd::Start => manager.start()?,
        Cmd::Stop => manager.stop()?,
        Cmd::Restart => manager.restart()?,
        Cmd::Pid => match manager.pid()? {
            Some(pid) => println!("{pid}"),
            None => {
                eprintln!("No PID available: the service is not running");
                return Ok(ExitCode::from(1));
            }
        },
        Cmd::Tail => manager.tail()?,
    }
    Ok(ExitCode::SUCCESS)
}
