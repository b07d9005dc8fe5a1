use std::path::PathBuf;

use ecrypto_config::{
    apply_env_overrides, load_from_env, load_from_path, parse_port, EcryptoConfig,
};

use crate::error::{ShellError, ShellResult};

pub const CLI_HELP: &str = "\
ecrypto-shell: hosts the ecrypto engine bridge over stdin/stdout

USAGE:
    ecrypto-shell [--config <path>] [--engine-bin <path>] [--port <port>]

Each stdin line is {\"id\", \"channel\", \"payload\"}; each reply is {\"id\", \"envelope\"}.
Progress notifications are pushed as {\"event\": \"progress-update\", \"notification\"}.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliFlags {
    pub config_path: Option<PathBuf>,
    pub engine_bin: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Run(CliFlags),
    Help,
}

pub fn parse_cli_args<I>(args: I) -> ShellResult<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut flags = CliFlags::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline_value) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_owned(), Some(value.to_owned()))
            }
            _ => (arg.clone(), None),
        };
        match flag.as_str() {
            "--config" => {
                let value = flag_value(&flag, inline_value, &mut args)?;
                flags.config_path = Some(PathBuf::from(value));
            }
            "--engine-bin" => {
                flags.engine_bin = Some(flag_value(&flag, inline_value, &mut args)?);
            }
            "--port" => {
                let raw = flag_value(&flag, inline_value, &mut args)?;
                flags.port = Some(
                    parse_port(raw.as_str())
                        .map_err(|reason| ShellError::cli(format!("--port {reason}")))?,
                );
            }
            "--help" | "-h" => return Ok(CliCommand::Help),
            value if value.starts_with("--") => {
                return Err(ShellError::cli(format!(
                    "Unknown flag '{value}'. Run with --help for valid flags."
                )));
            }
            unknown => {
                return Err(ShellError::cli(format!(
                    "Unexpected argument '{unknown}'. Run with --help for valid flags."
                )));
            }
        }
    }

    Ok(CliCommand::Run(flags))
}

fn flag_value(
    flag: &str,
    inline_value: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> ShellResult<String> {
    let value = inline_value
        .or_else(|| args.next())
        .ok_or_else(|| ShellError::cli(format!("Missing value after {flag}.")))?;
    let value = value.trim();
    if value.is_empty() || value.starts_with("--") {
        return Err(ShellError::cli(format!("Missing value after {flag}.")));
    }
    Ok(value.to_owned())
}

/// Config file, then environment overrides, then command-line flags.
pub fn resolve_config(flags: &CliFlags) -> ShellResult<EcryptoConfig> {
    let mut config = match &flags.config_path {
        Some(path) => {
            let mut config = load_from_path(path)?;
            apply_env_overrides(&mut config)?;
            config
        }
        None => load_from_env()?,
    };
    if let Some(binary) = &flags.engine_bin {
        config.engine.binary = binary.clone();
    }
    if let Some(port) = flags.port {
        config.engine.port = port;
    }
    Ok(config)
}
