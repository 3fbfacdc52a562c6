use std::path::PathBuf;

use clap::{arg, command, value_parser, ArgAction, ArgMatches, Command};

use crate::cache::modeldata::DecodeStrategy;
use crate::world::colour::DEFAULT_BRIGHTNESS;


#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub cache_dir: PathBuf,
    pub keys: Option<PathBuf>,
    /// palette gamma exponent
    pub brightness: f64,
    pub port: u16,
    /// decode models with the two byte texture stream
    pub hd_models: bool,
    /// decode one region, print it and exit
    pub region: Option<(u8, u8)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            keys: None,
            brightness: DEFAULT_BRIGHTNESS,
            port: 3000,
            hd_models: false,
            region: None,
        }
    }
}

impl ServerConfig {
    pub fn model_strategy(&self) -> DecodeStrategy {
        if self.hd_models {
            DecodeStrategy::HD
        } else {
            DecodeStrategy::LEGACY
        }
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: matches.get_one::<PathBuf>("cache").cloned().unwrap_or(defaults.cache_dir),
            keys: matches.get_one::<PathBuf>("keys").cloned(),
            brightness: matches.get_one::<f64>("brightness").copied().unwrap_or(defaults.brightness),
            port: matches.get_one::<u16>("port").copied().unwrap_or(defaults.port),
            hd_models: matches.get_flag("hd"),
            region: matches.get_one::<(u8, u8)>("region").copied(),
        }
    }
}


/// Parses `X_Y` region coordinates.
pub fn parse_region(value: &str) -> Result<(u8, u8), String> {
    let (x, y) = value.split_once('_').ok_or_else(|| format!("expected X_Y, got {value}"))?;
    let x = x.trim().parse::<u8>().map_err(|err| format!("bad region x {x}: {err}"))?;
    let y = y.trim().parse::<u8>().map_err(|err| format!("bad region y {y}: {err}"))?;
    Ok((x, y))
}

/// Command line of the server binary, logging flags included.
pub fn cli() -> Command {
    command!()
        .next_line_help(true)
        .arg(
            arg!(--cache <DIR>)
                .required(false)
                .default_value("cache")
                .value_parser(value_parser!(PathBuf))
                .help("Unpacked cache directory")
        )
        .arg(
            arg!(--keys <FILE>)
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .help("JSON file with region keys")
        )
        .arg(
            arg!(--brightness <F>)
                .required(false)
                .default_value("0.6")
                .value_parser(value_parser!(f64))
        )
        .arg(
            arg!(--port <PORT>)
                .required(false)
                .default_value("3000")
                .value_parser(value_parser!(u16))
        )
        .arg(
            arg!(--hd)
                .required(false)
                .action(ArgAction::SetTrue)
                .help("Models use the two byte texture stream")
        )
        .arg(
            arg!(--region <X_Y>)
                .required(false)
                .value_parser(parse_region)
                .help("Decode a single region, print its summary and exit")
        )
        .arg(
            arg!(--loglevel <LEVEL>)
                .required(false)
                .default_value("info")
                .value_parser(["trace", "debug", "info", "warn", "error", "off" ])
                .action(ArgAction::Set)
        )
        .arg(
            arg!(--logfile [FILE_NAME])
                .required(false)
                .default_value("landscape_server.log")
                .action(ArgAction::Set)
                .help("Enables logging to a file. Disabled by default")
        )
        .arg(
            arg!(-q --quiet)
                .required(false)
                .action(ArgAction::SetTrue)
                .help("Disables output to the terminal")
        )
}
