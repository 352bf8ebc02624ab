use super::compile_filter;
use rtcontrol::output::{keys_table, referenced_fields};
use rtq_engine::{fields, prefetch_calls, Settings};

/// Print what the daemon would be asked to pre-filter, without connecting.
pub fn handle_show_prefilter_command(filter: &str, settings: &Settings) -> anyhow::Result<()> {
    let fields = fields::registry();
    let (_, matcher) = compile_filter(filter, &fields)?;
    let level = settings.fast_query;

    let pre_filter = matcher.pre_filter(level);
    if pre_filter.is_empty() {
        log::info!("Filter '{}' has no pre-filter at fast-query level {}", matcher, level);
    }
    println!("{}", pre_filter);
    Ok(())
}

/// Print the fields a filter and the output columns read, and what gets prefetched for them.
pub fn handle_show_keys_command(filter: &str, output: &[String]) -> anyhow::Result<()> {
    let fields = fields::registry();
    let (query, _) = compile_filter(filter, &fields)?;

    let mut names = referenced_fields(&query);
    for name in output {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    print!("{}", keys_table(&names, &fields)?);
    println!();
    println!("Prefetch: {}", prefetch_calls(&names, &fields)?.join(" "));
    Ok(())
}
