pub mod output;

use std::path::PathBuf;

/// Error type for CLI setup failures
#[derive(Debug)]
pub enum CliError {
    ConfigLoad(PathBuf, anyhow::Error),
    Connect(anyhow::Error),
    InvalidFilter(rtq_query::QueryError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::ConfigLoad(path, e) => {
                write!(
                    f,
                    "Failed to load configuration from {}: {:#}\n\nPossible fixes:\n  - Check the file is valid TOML\n  - Use --config to specify a different file\n  - Remove the file to run with defaults",
                    path.display(),
                    e
                )
            }
            CliError::Connect(e) => {
                write!(
                    f,
                    "Failed to connect to rTorrent: {:#}\n\nPossible fixes:\n  - Ensure rTorrent is running with an SCGI port or socket\n  - Use --scgi-url to specify the endpoint, e.g. localhost:5000 or ~/rtorrent/.scgi_local\n  - Set scgi_url in the configuration file",
                    e
                )
            }
            CliError::InvalidFilter(e) => {
                write!(
                    f,
                    "Invalid filter: {}\n\nFilter conditions look like name=*linux*, ratio>1 or size<1G, combined with OR, NOT and [ ]",
                    e
                )
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigLoad(_, e) => Some(e.as_ref()),
            CliError::Connect(e) => Some(e.as_ref()),
            CliError::InvalidFilter(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_error_config_load_display() {
        let error = CliError::ConfigLoad(
            PathBuf::from("/etc/rtq/config.toml"),
            anyhow::anyhow!("expected `=`"),
        );
        let display_msg = format!("{}", error);

        assert!(display_msg.contains("Failed to load configuration from /etc/rtq/config.toml"));
        assert!(display_msg.contains("expected `=`"));
        assert!(display_msg.contains("Possible fixes"));
        assert!(display_msg.contains("--config"));
    }

    #[test]
    fn test_cli_error_connect_display_keeps_context_chain() {
        let underlying = anyhow::anyhow!("Connection refused").context("Failed to set up a connection");
        let error = CliError::Connect(underlying);
        let display_msg = format!("{}", error);

        assert!(display_msg.contains("Failed to connect to rTorrent"));
        assert!(display_msg.contains("Failed to set up a connection: Connection refused"));
        assert!(display_msg.contains("--scgi-url"));
    }

    #[test]
    fn test_cli_error_invalid_filter_display() {
        let error = CliError::InvalidFilter(rtq_query::QueryError::invalid_value(
            "size",
            "big",
            "not a byte size",
        ));
        let display_msg = format!("{}", error);

        assert!(display_msg.starts_with("Invalid filter: "));
        assert!(display_msg.contains("big"));
        assert!(display_msg.contains("ratio>1"));
    }

    #[test]
    fn test_cli_error_debug() {
        let error = CliError::Connect(anyhow::anyhow!("Test error"));
        let debug_msg = format!("{:?}", error);

        assert!(debug_msg.contains("Connect"));
        assert!(debug_msg.contains("Test error"));
    }

    #[test]
    fn test_cli_error_implements_std_error() {
        let error: Box<dyn std::error::Error> = CliError::Connect(anyhow::anyhow!("underlying")).into();
        assert!(error.source().is_some());

        let error: Box<dyn std::error::Error> =
            CliError::InvalidFilter(rtq_query::QueryError::attribute("name", "gone")).into();
        assert!(error.source().is_some());
    }
}
