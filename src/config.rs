use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap_serde_derive::ClapSerde;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "ManusRunner.toml";

#[derive(ClapSerde, Debug, Clone)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub(crate) address: String,

    /// The port the listener binds to
    #[default(25566)]
    #[arg(short, long, env)]
    pub(crate) port: u16,

    /// Directory the OpenManus project is located under, used as working directory and PYTHONPATH entry
    #[default(".".to_string())]
    #[arg(long, env)]
    pub(crate) project_root: String,

    /// Entry script of the OpenManus project, relative to the project root
    #[default("OpenManus/main.py".to_string())]
    #[arg(long, env)]
    pub(crate) entry_script: String,

    /// Program used to run the entry script
    #[default("python3".to_string())]
    #[arg(long, env)]
    pub(crate) interpreter: String,

    /// Seconds to wait for the script before killing it, 0 waits forever
    #[default(300)]
    #[arg(long, env)]
    pub(crate) timeout_secs: u64,

    /// Check that the interpreter can be started before serving
    #[default(true)]
    #[arg(long, env)]
    pub(crate) probe_interpreter: bool,

    /// Keep serving with 503 responses when the application could not be built
    #[default(true)]
    #[arg(long, env)]
    pub(crate) fail_open: bool,

    /// Maximum accepted request body size in bytes
    #[default(1_000_000)]
    #[arg(long, env)]
    pub(crate) body_limit: usize,

    /// OTLP collector endpoint, telemetry is only logged to the console when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) otlp_endpoint: String,

    /// Log to the console even when exporting to an OTLP collector
    #[default(true)]
    #[arg(long, env)]
    pub(crate) log_console: bool,

    /// PEM certificate file, HTTPS is served when both certificate and key are set
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_cert: String,

    /// PEM private key file
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_key: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let opt: <Config as ClapSerde>::Opt = toml::from_str(&str)?;
        Ok(Config::from(opt))
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub(crate) fn tls_files(&self) -> Option<(PathBuf, PathBuf)> {
        if self.tls_cert.is_empty() || self.tls_key.is_empty() {
            return None;
        }
        Some((PathBuf::from(&self.tls_cert), PathBuf::from(&self.tls_key)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_the_original_deployment() {
        let config = Config::default();
        assert_eq!(config.entry_script, "OpenManus/main.py");
        assert_eq!(config.port, 25566);
        assert_eq!(config.timeout(), Some(Duration::from_secs(300)));
        assert!(config.fail_open);
        assert!(config.tls_files().is_none());
    }

    #[test]
    fn toml_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 8080\ninterpreter = \"python3.12\"\ntimeout_secs = 0").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.interpreter, "python3.12");
        assert_eq!(config.timeout(), None);
        assert_eq!(config.address, "0.0.0.0");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::from_toml("/nonexistent/ManusRunner.toml").is_err());
    }
}
