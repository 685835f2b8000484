use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::store::path::validate_space_name;

pub const DEFAULT_PORT: u16 = 1965;
pub const DEFAULT_TOKEN: &str = "hello";
pub const DEFAULT_PAGE_SIZE_LIMIT: usize = 10_000;

/// A served hostname together with its certificate pair.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub name: String,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// A wiki space declaration, optionally bound to a single host.
#[derive(Debug, Clone)]
pub struct SpaceConfig {
    pub host: Option<String>,
    pub name: String,
}

/// Immutable server configuration, assembled once at startup and swapped
/// wholesale on reload. Handlers receive an `Arc<Config>` captured at
/// accept time.
#[derive(Debug, Clone)]
pub struct Config {
    pub hosts: Vec<HostConfig>,
    pub ports: Vec<u16>,
    pub wiki_dir: PathBuf,
    pub spaces: Vec<SpaceConfig>,
    pub tokens: Vec<String>,
    pub space_tokens: HashMap<String, Vec<String>>,
    pub fingerprints: Vec<String>,
    pub pages: Vec<String>,
    pub main_page: Option<String>,
    pub mime_types: Vec<String>,
    pub page_size_limit: usize,
    pub extensions: Vec<String>,
}

/// Values carried over from the command line. Kept by the server so a
/// hangup reload can rebuild the configuration from the same invocation.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub hosts: Vec<String>,
    pub ports: Vec<u16>,
    pub cert_files: Vec<PathBuf>,
    pub key_files: Vec<PathBuf>,
    pub wiki_dir: Option<PathBuf>,
    pub spaces: Vec<String>,
    pub tokens: Vec<String>,
    pub pages: Vec<String>,
    pub main_page: Option<String>,
    pub mime_types: Vec<String>,
    pub page_size_limit: Option<usize>,
    pub fingerprints: Vec<String>,
    pub extensions: Vec<String>,
}

/// Optional `config.toml` in the wiki directory. Every field may be
/// omitted; command-line flags win over file values.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    hosts: Vec<String>,
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    cert_files: Vec<PathBuf>,
    #[serde(default)]
    key_files: Vec<PathBuf>,
    #[serde(default)]
    spaces: Vec<String>,
    #[serde(default)]
    tokens: Vec<String>,
    #[serde(default)]
    space_tokens: HashMap<String, Vec<String>>,
    #[serde(default)]
    fingerprints: Vec<String>,
    #[serde(default)]
    pages: Vec<String>,
    main_page: Option<String>,
    #[serde(default)]
    mime_types: Vec<String>,
    page_size_limit: Option<usize>,
    #[serde(default)]
    extensions: Vec<String>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }
}

fn pick<T: Clone>(cli: &[T], file: &[T]) -> Vec<T> {
    if cli.is_empty() {
        file.to_vec()
    } else {
        cli.to_vec()
    }
}

impl Config {
    /// Assemble the effective configuration.
    ///
    /// Priority: CLI args > `<wiki_dir>/config.toml` > defaults.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let wiki_dir = overrides
            .wiki_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./wiki"));

        let file_path = wiki_dir.join("config.toml");
        let file = if file_path.is_file() {
            ConfigFile::load(&file_path)?
        } else {
            ConfigFile::default()
        };

        let mut host_names = pick(&overrides.hosts, &file.hosts);
        if host_names.is_empty() {
            host_names.push("localhost".to_string());
        }

        let cert_files = pick(&overrides.cert_files, &file.cert_files);
        let key_files = pick(&overrides.key_files, &file.key_files);
        if cert_files.len() != key_files.len() {
            return Err(Error::Config(
                "cert_file and key_file must be given in pairs".to_string(),
            ));
        }

        let hosts = host_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                // The i-th cert pair serves the i-th host; a single pair
                // serves every host.
                let (cert_file, key_file) = match (cert_files.get(i), key_files.get(i)) {
                    (Some(c), Some(k)) => (c.clone(), k.clone()),
                    _ => (
                        cert_files
                            .first()
                            .cloned()
                            .unwrap_or_else(|| PathBuf::from("cert.pem")),
                        key_files
                            .first()
                            .cloned()
                            .unwrap_or_else(|| PathBuf::from("key.pem")),
                    ),
                };
                HostConfig {
                    name: name.clone(),
                    cert_file,
                    key_file,
                }
            })
            .collect();

        let mut ports = pick(&overrides.ports, &file.ports);
        if ports.is_empty() {
            ports.push(DEFAULT_PORT);
        }

        let mut tokens = pick(&overrides.tokens, &file.tokens);
        if tokens.is_empty() {
            tokens.push(DEFAULT_TOKEN.to_string());
        }

        let spaces = pick(&overrides.spaces, &file.spaces)
            .iter()
            .map(|decl| parse_space_decl(decl))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            hosts,
            ports,
            wiki_dir,
            spaces,
            tokens,
            space_tokens: file.space_tokens,
            fingerprints: pick(&overrides.fingerprints, &file.fingerprints),
            pages: pick(&overrides.pages, &file.pages),
            main_page: overrides.main_page.clone().or(file.main_page),
            mime_types: pick(&overrides.mime_types, &file.mime_types),
            page_size_limit: overrides
                .page_size_limit
                .or(file.page_size_limit)
                .unwrap_or(DEFAULT_PAGE_SIZE_LIMIT),
            extensions: pick(&overrides.extensions, &file.extensions),
        })
    }

    #[must_use]
    pub fn is_known_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h.name == host)
    }

    /// First configured port; used when generating canonical URLs.
    #[must_use]
    pub fn primary_port(&self) -> u16 {
        self.ports.first().copied().unwrap_or(DEFAULT_PORT)
    }

    /// Space names visible on the given host, root space excluded.
    #[must_use]
    pub fn spaces_for_host(&self, host: &str) -> Vec<&str> {
        self.spaces
            .iter()
            .filter(|s| s.host.as_deref().is_none_or(|h| h == host))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Match the first path segment against the spaces declared for the
    /// host. Returns the space name when it is one.
    #[must_use]
    pub fn resolve_space(&self, host: &str, segment: &str) -> Option<&str> {
        self.spaces_for_host(host).into_iter().find(|s| *s == segment)
    }

    /// Tokens accepted for writes into the given space: the global list
    /// plus any per-space additions.
    #[must_use]
    pub fn tokens_for_space(&self, space: &str) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.tokens.iter().map(String::as_str).collect();
        if let Some(extra) = self.space_tokens.get(space) {
            tokens.extend(extra.iter().map(String::as_str));
        }
        tokens
    }

    /// Whether a Titan upload with this MIME type is accepted for file
    /// targets. A configured bare type such as `image` matches any
    /// subtype of that major type.
    #[must_use]
    pub fn mime_allowed(&self, mime: &str) -> bool {
        let major = mime.split('/').next().unwrap_or(mime);
        self.mime_types
            .iter()
            .any(|allowed| allowed == mime || (!allowed.contains('/') && allowed == major))
    }
}

fn parse_space_decl(decl: &str) -> Result<SpaceConfig> {
    let (host, name) = match decl.split_once('/') {
        Some((host, name)) => (Some(host.to_string()), name),
        None => (None, decl),
    };
    validate_space_name(name)?;
    Ok(SpaceConfig {
        host,
        name: name.to_string(),
    })
}
