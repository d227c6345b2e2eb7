use anyhow::Context;
use serde::Deserialize;

/// Settings for the `pullhttp` downloader.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub url: String,
    /// Output file; derived from the URL path when absent.
    #[serde(default)]
    pub output: Option<String>,
    /// `host[:port]` of an HTTP proxy.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Extra raw header text sent with the request.
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_max_redirects() -> u32 {
    5
}

fn default_buffer_size() -> usize {
    16 * 1024
}

impl Config {
    /// Load from the YAML file named by `PULLHTTP_CONFIG`, or from the
    /// environment when it is unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("PULLHTTP_CONFIG") {
            Ok(path) => Self::from_yaml_file(&path),
            Err(_) => Ok(Self::from_env()),
        }
    }

    pub fn from_env() -> Self {
        let url = std::env::var("URL").unwrap_or_else(|_| "http://127.0.0.1:8080/".to_string());
        let wait_ms = std::env::var("WAIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_wait_ms);
        let max_redirects = std::env::var("MAX_REDIRECTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_max_redirects);

        Self {
            url,
            output: std::env::var("OUTPUT").ok(),
            proxy: std::env::var("PROXY").ok(),
            headers: None,
            wait_ms,
            max_redirects,
            buffer_size: default_buffer_size(),
        }
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("Invalid configuration")
    }

    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_yaml_str(&text)
    }

    /// Where the download is written.
    pub fn output_path(&self) -> String {
        if let Some(output) = &self.output {
            return output.clone();
        }
        ::url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "index.html".to_string())
    }
}
