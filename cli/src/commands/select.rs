use super::compile_filter;
use anyhow::Context;
use log::{debug, info};
use rtcontrol::output::{format_row, referenced_fields};
use rtcontrol::CliError;
use rtq_engine::{prefetch_calls, Engine, Settings};

/// Query the daemon and print one tab-separated line per matching item.
pub fn handle_select_command(
    filter: &str,
    view: &str,
    output: &[String],
    settings: Settings,
) -> anyhow::Result<()> {
    let engine = Engine::connect(settings).map_err(CliError::Connect)?;
    let (query, matcher) = compile_filter(filter, engine.fields())?;
    debug!("Matcher for '{}': {}", filter, matcher);

    let mut names = referenced_fields(&query);
    names.extend(output.iter().cloned());
    let prefetch = prefetch_calls(&names, engine.fields()).context("Invalid output field")?;

    let items = engine.items(view, Some(&matcher), &prefetch)?;
    for item in &items {
        println!("{}", format_row(item, output)?);
    }
    info!("Selected {} items from view '{}'", items.len(), view);
    Ok(())
}
