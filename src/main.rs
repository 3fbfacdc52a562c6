use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use log::{error, info, LevelFilter};

use clap::parser::ValueSource;
use clap::ArgMatches;
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use landscape_server_lib::config::{cli, ServerConfig};
use landscape_server_lib::world::RegionModel;
use landscape_server_lib::{load_region_model, spawn_server};


fn print_region(model: &RegionModel, region_x: u8, region_y: u8) -> ExitCode {
    let region = match model.region(region_x, region_y) {
        Ok(region) => region,
        Err(err) => {
            error!("region {region_x}_{region_y}: {err}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&region.summary()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("cannot serialize summary: {err}");
            ExitCode::FAILURE
        }
    }
}


fn run_service(config: ServerConfig) -> ExitCode {
    let start = Instant::now();

    info!("loading cache from {}...", config.cache_dir.display());
    let model = Arc::new(load_region_model(&config));
    info!("the loading completed in {:?}", start.elapsed());

    if let Some((region_x, region_y)) = config.region {
        return print_region(&model, region_x, region_y);
    }

    let (http_stop_tx, handle) = spawn_server(model, config.port);

    // wait for ctrl-c
    let waited = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|rt| rt.block_on(tokio::signal::ctrl_c()));
    match waited {
        Ok(Ok(())) => info!("interrupted"),
        Ok(Err(err)) => error!("cannot listen for ctrl-c: {err}"),
        Err(err) => error!("cannot start signal runtime: {err}"),
    }

    info!("app stopped");
    if http_stop_tx.send(()).is_err() {
        info!("server already stopped");
    }
    if handle.join().is_err() {
        error!("server thread panicked");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}


fn initialize_logging(matches: &ArgMatches) {
    let loglevel = match matches.get_one::<String>("loglevel") {
        None => LevelFilter::Off,
        Some(level) => {
            match level.as_str() {
                "trace" => LevelFilter::Trace,
                "debug" => LevelFilter::Debug,
                "info" => LevelFilter::Info,
                "warn" => LevelFilter::Warn,
                "error" => LevelFilter::Error,
                _ => LevelFilter::Off,
            }
        }
    };
    let quiet = matches.get_flag("quiet");
    let term_loglevel = if quiet { LevelFilter::Off } else { loglevel };

    let logfile = match (matches.value_source("logfile"), matches.get_one::<String>("logfile")) {
        (Some(ValueSource::CommandLine), Some(file_name)) => {
            Some(file_name)
        },
        _ => None,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(term_loglevel, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
    ];
    if let Some(logfile) = logfile {
        match File::create(logfile) {
            Ok(file) => loggers.push(WriteLogger::new(loglevel, Config::default(), file)),
            Err(err) => eprintln!("cannot create log file {logfile}: {err}"),
        }
    }

    if let Err(err) = CombinedLogger::init(loggers) {
        eprintln!("cannot initialize logging: {err}");
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    initialize_logging(&matches);
    run_service(ServerConfig::from_matches(&matches))
}
