use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use repomirror_types::{
    CommitScan, HostingConfig, IndexBackend, IndexConfig, IndexNames, MirrorConfig, MirrorError,
    Result, RetryPolicy, RunConfig,
};

pub const DEFAULT_CONFIG_FILE: &str = "repomirror.toml";
pub const CONFIG_ENV: &str = "REPOMIRROR_CONFIG";
pub const TOKEN_ENV: &str = "REPOMIRROR_TOKEN";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

// ── Raw file layout ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    hosting: RawHosting,
    #[serde(default)]
    index: RawIndex,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    run: RawRun,
}

#[derive(Debug, Default, Deserialize)]
struct RawHosting {
    api_endpoint: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
    page_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIndex {
    backend: Option<String>,
    host: Option<String>,
    path: Option<PathBuf>,
    repo_index: Option<String>,
    file_index: Option<String>,
    commit_index: Option<String>,
    bulk_chunk_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRun {
    history_file: Option<PathBuf>,
    commit_scan: Option<CommitScan>,
}

// ── Loading ───────────────────────────────────────────────────────────────

/// `--config`, then `$REPOMIRROR_CONFIG`, then `./repomirror.toml`.
pub fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(v) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(v);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Read and validate the config file. `token_override` (from
/// `$REPOMIRROR_TOKEN`) replaces `hosting.token` when set.
pub fn load(path: &Path, token_override: Option<String>) -> Result<MirrorConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MirrorError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&text, token_override)
}

pub fn parse(text: &str, token_override: Option<String>) -> Result<MirrorConfig> {
    let mut raw: RawConfig =
        toml::from_str(text).map_err(|e| MirrorError::Config(e.to_string()))?;
    if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
        raw.hosting.token = Some(token);
    }
    validate(raw)
}

// ── Validation ────────────────────────────────────────────────────────────

fn required(key: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MirrorError::Config(format!("{key} is missing"))),
    }
}

fn http_url(key: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| MirrorError::Config(format!("{key} '{value}' is not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(MirrorError::Config(format!(
            "{key} must be an http(s) URL, got scheme '{other}'"
        ))),
    }
}

fn validate(raw: RawConfig) -> Result<MirrorConfig> {
    let api_endpoint = required("hosting.api_endpoint", raw.hosting.api_endpoint)?;
    http_url("hosting.api_endpoint", &api_endpoint)?;
    let token = required("hosting.token", raw.hosting.token)?;
    let timeout_secs = raw.hosting.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(MirrorError::Config("hosting.timeout_secs must be at least 1".into()));
    }
    if raw.hosting.page_limit == Some(0) {
        return Err(MirrorError::Config("hosting.page_limit must be at least 1".into()));
    }

    let backend = match required("index.backend", raw.index.backend)?.as_str() {
        "elasticsearch" => {
            let host = required("index.host", raw.index.host)?;
            http_url("index.host", &host)?;
            IndexBackend::Elasticsearch { host }
        }
        "sqlite" => match raw.index.path {
            Some(path) if !path.as_os_str().is_empty() => IndexBackend::Sqlite { path },
            _ => return Err(MirrorError::Config("index.path is missing".into())),
        },
        other => {
            return Err(MirrorError::Config(format!(
                "index.backend must be 'elasticsearch' or 'sqlite', got '{other}'"
            )))
        }
    };
    let names = IndexNames {
        repo: required("index.repo_index", raw.index.repo_index)?,
        file: required("index.file_index", raw.index.file_index)?,
        commit: required("index.commit_index", raw.index.commit_index)?,
    };
    let bulk_chunk_size = raw.index.bulk_chunk_size.unwrap_or(DEFAULT_BULK_CHUNK_SIZE);
    if bulk_chunk_size == 0 {
        return Err(MirrorError::Config("index.bulk_chunk_size must be at least 1".into()));
    }

    let defaults = RetryPolicy::default();
    let retry = RetryPolicy {
        max_attempts: raw.retry.max_attempts.unwrap_or(defaults.max_attempts),
        base_delay_ms: raw.retry.base_delay_ms.unwrap_or(defaults.base_delay_ms),
        max_delay_ms: raw.retry.max_delay_ms.unwrap_or(defaults.max_delay_ms),
    };
    if retry.max_attempts == 0 {
        return Err(MirrorError::Config("retry.max_attempts must be at least 1".into()));
    }

    let run_defaults = RunConfig::default();
    let run = RunConfig {
        history_file: raw.run.history_file.unwrap_or(run_defaults.history_file),
        commit_scan: raw.run.commit_scan.unwrap_or(run_defaults.commit_scan),
    };

    Ok(MirrorConfig {
        hosting: HostingConfig {
            api_endpoint,
            token,
            timeout: Duration::from_secs(timeout_secs),
            page_limit: raw.hosting.page_limit,
        },
        index: IndexConfig {
            backend,
            names,
            bulk_chunk_size,
        },
        retry,
        run,
    })
}
