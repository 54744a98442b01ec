//! TOML configuration for the greeter server and demo client.
//!
//! ```toml
//! [server]
//! workers = 2
//!
//! [greeter]
//! stream_replies = 1000
//!
//! [demo]
//! name = "world"
//! client_stream_messages = 10
//! bidi_messages = 10000
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};

use cqrpc_dispatch::ServerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML or does not match the schema.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Greeter service behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GreeterConfig {
	/// Replies sent by `SayHello2` per request.
	pub stream_replies: usize,
}

impl Default for GreeterConfig {
	fn default() -> Self {
		Self { stream_replies: 1000 }
	}
}

/// What the demo client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
	/// Name sent in every request.
	pub name: String,
	/// Requests streamed to `SayHello3`.
	pub client_stream_messages: usize,
	/// Requests streamed to `SayHello4`.
	pub bidi_messages: usize,
}

impl Default for DemoConfig {
	fn default() -> Self {
		Self {
			name: "world".to_owned(),
			client_stream_messages: 10,
			bidi_messages: 10_000,
		}
	}
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// Dispatcher settings.
	pub server: ServerConfig,
	/// Service settings.
	pub greeter: GreeterConfig,
	/// Demo client settings.
	pub demo: DemoConfig,
}

impl Config {
	/// Reads and parses `path`.
	///
	/// # Errors
	///
	/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
	/// if it is not a valid configuration.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::parse(&text)?;
		tracing::debug!(path = %path.display(), ?config, "config.loaded");
		Ok(config)
	}

	/// Parses configuration text.
	///
	/// # Errors
	///
	/// [`ConfigError::Parse`] on invalid TOML or unknown keys.
	pub fn parse(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_file_is_all_defaults() {
		assert_eq!(Config::parse("").expect("parse"), Config::default());
		assert_eq!(Config::default().server.workers, 1);
	}

	#[test]
	fn sections_override_defaults() {
		let config = Config::parse(
			r#"
			[server]
			workers = 4

			[demo]
			name = "rust"
			"#,
		)
		.expect("parse");

		assert_eq!(config.server.workers, 4);
		assert_eq!(config.demo.name, "rust");
		assert_eq!(config.demo.client_stream_messages, 10);
		assert_eq!(config.greeter, GreeterConfig::default());
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = Config::parse("[greeter]\nreplies = 3\n").expect_err("unknown key");
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn misspelled_server_key_is_rejected() {
		let err = Config::parse("[server]\nworker = 4\n").expect_err("unknown key");
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn load_reads_file() {
		let mut file = tempfile::NamedTempFile::new().expect("tempfile");
		writeln!(file, "[greeter]\nstream_replies = 7").expect("write");

		let config = Config::load(file.path()).expect("load");

		assert_eq!(config.greeter.stream_replies, 7);
	}

	#[test]
	fn missing_file_reports_path() {
		let dir = tempfile::tempdir().expect("tempdir");
		let path = dir.path().join("absent.toml");

		let err = Config::load(&path).expect_err("missing");

		assert!(matches!(err, ConfigError::Io { path: ref p, .. } if *p == path));
	}
}
