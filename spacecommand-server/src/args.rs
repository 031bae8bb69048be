//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file name.
pub const DEFAULT_CONFIG: &str = "spacecommand.json5";

/// Command line arguments for the server.
#[derive(Parser, Debug, Clone)]
#[command(name = "spacecommand-server", version, about = "SpaceCommand sensor server")]
pub struct ServerArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ServerArgs {
    /// Parse the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let args = ServerArgs::try_parse_from(["spacecommand-server"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = ServerArgs::try_parse_from([
            "spacecommand-server",
            "-c",
            "/etc/spacecommand/server.json5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/spacecommand/server.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
