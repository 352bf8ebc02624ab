mod select;
mod show;

use crate::argparse::Cli;
use rtcontrol::CliError;
use rtq_engine::Settings;
use rtq_query::{join_cli_args, parse_query, FieldLookup, MatcherBuilder, MatcherNode, Query};
pub use select::handle_select_command;
pub use show::{handle_show_keys_command, handle_show_prefilter_command};

pub fn handle_command(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;
    let filter = join_cli_args(&cli.filter);

    if cli.show_prefilter {
        handle_show_prefilter_command(&filter, &settings)
    } else if cli.show_keys {
        handle_show_keys_command(&filter, &cli.output)
    } else {
        handle_select_command(&filter, &cli.view, &cli.output, settings)
    }
}

/// Configuration file values with command line overrides applied.
fn load_settings(cli: &Cli) -> Result<Settings, CliError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).map_err(|e| CliError::ConfigLoad(path.clone(), e))?,
        None => Settings::load_default().map_err(|e| {
            let path = rtq_engine::config::default_config_path().unwrap_or_default();
            CliError::ConfigLoad(path, e)
        })?,
    };
    if let Some(url) = &cli.scgi_url {
        settings.scgi_url = Some(url.clone());
    }
    if let Some(level) = cli.fast_query {
        settings.fast_query = level;
    }
    Ok(settings)
}

/// Parse a filter and compile it against `fields`.
fn compile_filter(filter: &str, fields: &dyn FieldLookup) -> Result<(Query, MatcherNode), CliError> {
    let query = parse_query(filter).map_err(CliError::InvalidFilter)?;
    let matcher = MatcherBuilder::new(fields)
        .build(&query)
        .map_err(CliError::InvalidFilter)?;
    Ok((query, matcher))
}
