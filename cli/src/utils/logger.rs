/// Log to stderr through `pretty_env_logger`.
///
/// An explicit `RUST_LOG` wins, otherwise `--verbose` selects debug output.
pub fn init_logger(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }
    pretty_env_logger::init();
}
