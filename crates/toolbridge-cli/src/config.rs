//! Registry configuration loading for the `toolbridge` binary.

use std::path::Path;
use toolbridge_mcp::{RegistryConfig, ServerConfig};

/// Adds an SSE server named `sse` pointing at this URL.
pub const SSE_URL_VAR: &str = "TOOLBRIDGE_SSE_URL";
/// Adds a stdio server named `stdio`; the value is split on whitespace into
/// command and arguments.
pub const STDIO_COMMAND_VAR: &str = "TOOLBRIDGE_STDIO_COMMAND";

/// Servers supplied through the environment rather than the config file.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    pub sse_url: Option<String>,
    pub stdio_command: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            sse_url: non_empty_var(SSE_URL_VAR),
            stdio_command: non_empty_var(STDIO_COMMAND_VAR),
        }
    }

    /// Appends the overriding servers after the ones from the file.
    pub fn apply(self, config: &mut RegistryConfig) {
        if let Some(url) = self.sse_url {
            config.servers.push(ServerConfig::sse("sse", url));
        }
        if let Some(command) = self.stdio_command {
            let mut parts = command.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                config
                    .servers
                    .push(ServerConfig::stdio("stdio", program, parts.collect()));
            }
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Reads `path` as TOML. A missing file yields the empty default config.
pub async fn load(path: &Path) -> anyhow::Result<RegistryConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => toml::from_str(&raw).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {e}", path.display())
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(RegistryConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            path.display()
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toolbridge_mcp::{LocalToolPlacement, TransportConfig, TransportKind};

    const SAMPLE: &str = r#"
local_tools = "prepend"

[[servers]]
name = "files"
transport = "stdio"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]

[[servers]]
name = "search"
transport = "http"
url = "http://localhost:9000/mcp"
bearer_token = "t0k"
call_timeout_ms = 5000

[servers.headers]
X-Team = "core"
"#;

    #[tokio::test]
    async fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolbridge.toml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = load(&path).await.unwrap();
        assert_eq!(config.local_tools, LocalToolPlacement::Prepend);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].kind(), TransportKind::Stdio);
        assert_eq!(config.servers[1].call_timeout(), Duration::from_secs(5));
        match &config.servers[1].transport {
            TransportConfig::Http(p) => {
                assert_eq!(p.headers["X-Team"], "core");
                assert_eq!(p.bearer_token.as_deref(), Some("t0k"));
            }
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[[servers]]\nname = \"x\"\ntransport = \"pigeon\"\n")
            .await
            .unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_overrides_append_servers() {
        let mut config = RegistryConfig::default();
        EnvOverrides {
            sse_url: Some("http://localhost:8080/sse".into()),
            stdio_command: Some("python  server.py --verbose".into()),
        }
        .apply(&mut config);

        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].name, "sse");
        assert_eq!(config.servers[0].kind(), TransportKind::Sse);
        assert_eq!(config.servers[1].name, "stdio");
        match &config.servers[1].transport {
            TransportConfig::Stdio(p) => {
                assert_eq!(p.command, "python");
                assert_eq!(p.args, vec!["server.py", "--verbose"]);
            }
            other => panic!("unexpected transport {other:?}"),
        }
    }

    #[test]
    fn test_blank_stdio_command_ignored() {
        let mut config = RegistryConfig::default();
        EnvOverrides {
            sse_url: None,
            stdio_command: Some("   ".into()),
        }
        .apply(&mut config);
        assert!(config.servers.is_empty());
    }
}
