//! URL safety validation.
//!
//! # Checks (in order, each a hard rejection)
//! 1. Scheme is `https`; `http` only for allow-listed hosts
//! 2. No embedded username or password
//! 3. Literal IP hosts are classified directly
//! 4. Hostnames are resolved to *all* addresses; any private answer rejects
//!
//! Local-only hostnames (`localhost`, `*.local`, ...) are refused before DNS
//! unless allow-listed. Resolution failures are upstream errors, not
//! validation errors.
//!
//! The guard is also the outbound client's DNS resolver, so the lookup made
//! when a connection is opened goes through the same address checks.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

use crate::error::{ProxyError, UpstreamError, ValidationError};
use crate::security::address::{is_private_ip, is_private_literal};
use crate::security::allow_list::{normalize_host, AllowListPolicy};
use crate::security::resolver::HostResolver;

const LOCAL_SUFFIXES: &[&str] = &[".localhost", ".local", ".localdomain", ".internal"];

/// A URL that passed every check, with the addresses it may connect to.
#[derive(Debug, Clone)]
pub struct ValidatedTarget {
    pub url: Url,
    /// Host as it appears in the URL (brackets stripped for IPv6).
    pub host: String,
    pub addrs: Vec<SocketAddr>,
    pub allow_listed: bool,
}

/// Parse a caller-supplied URL string, mapping failures to validation errors.
pub fn parse_target(raw: &str) -> Result<Url, ValidationError> {
    Url::parse(raw.trim()).map_err(|e| ValidationError::MalformedUrl(e.to_string()))
}

/// Validates outbound URLs against the allow-list and address classifier.
#[derive(Debug, Clone)]
pub struct UrlGuard {
    allow_list: Arc<AllowListPolicy>,
    resolver: Arc<dyn HostResolver>,
}

impl UrlGuard {
    pub fn new(allow_list: Arc<AllowListPolicy>, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            allow_list,
            resolver,
        }
    }

    /// Every check that needs no network access.
    ///
    /// Returns the normalized host and whether it is allow-listed.
    pub fn check_static(&self, url: &Url) -> Result<(String, bool), ValidationError> {
        let raw_host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ValidationError::MalformedUrl("URL has no host".to_string()))?;
        let host = normalize_host(raw_host);
        let allow_listed = self.allow_list.is_allowed(&host);

        match url.scheme() {
            "https" => {}
            "http" if allow_listed => {}
            other => return Err(ValidationError::DisallowedProtocol(other.to_string())),
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(ValidationError::EmbeddedCredentials);
        }

        if allow_listed {
            return Ok((host, true));
        }

        match url.host() {
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
                if is_private_literal(&host) {
                    return Err(ValidationError::PrivateAddress {
                        address: host.clone(),
                        host,
                    });
                }
            }
            Some(Host::Domain(_)) => {
                if is_local_hostname(&host) {
                    return Err(ValidationError::DisallowedHost(host));
                }
            }
            None => return Err(ValidationError::MalformedUrl("URL has no host".to_string())),
        }

        Ok((host, false))
    }

    /// Run the full validation chain, resolving hostnames as needed.
    pub async fn validate(&self, url: &Url) -> Result<ValidatedTarget, ProxyError> {
        let (host, allow_listed) = self.check_static(url)?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ValidationError::MalformedUrl("URL has no port".to_string()))?;

        let literal = match url.host() {
            Some(Host::Ipv4(ip)) => Some(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => Some(IpAddr::V6(ip)),
            _ => None,
        };
        if let Some(ip) = literal {
            return Ok(ValidatedTarget {
                url: url.clone(),
                host,
                addrs: vec![SocketAddr::new(ip, port)],
                allow_listed,
            });
        }

        let ips = self.resolve_checked(&host, port, allow_listed).await?;

        Ok(ValidatedTarget {
            url: url.clone(),
            host,
            addrs: ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect(),
            allow_listed,
        })
    }

    /// Resolve `host` to every address, rejecting it if any answer is
    /// private and the host is not allow-listed.
    async fn resolve_checked(
        &self,
        host: &str,
        port: u16,
        allow_listed: bool,
    ) -> Result<Vec<IpAddr>, ProxyError> {
        let ips = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|e| UpstreamError::Dns {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        if ips.is_empty() {
            return Err(UpstreamError::Dns {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            }
            .into());
        }

        if !allow_listed {
            if let Some(private) = ips.iter().find(|ip| is_private_ip(ip)) {
                return Err(ValidationError::PrivateAddress {
                    host: host.to_string(),
                    address: private.to_string(),
                }
                .into());
            }
        }
        Ok(ips)
    }
}

impl UrlGuard {
    /// Lookup made by the HTTP client when it opens a connection.
    async fn lookup_for_connect(&self, host: &str) -> Result<Vec<IpAddr>, ProxyError> {
        let allow_listed = self.allow_list.is_allowed(host);
        if !allow_listed && is_local_hostname(host) {
            return Err(ValidationError::DisallowedHost(host.to_string()).into());
        }
        // The connector fills in the real port.
        self.resolve_checked(host, 0, allow_listed).await
    }
}

impl Resolve for UrlGuard {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.clone();
        let host = normalize_host(name.as_str());
        Box::pin(async move {
            let ips = guard
                .lookup_for_connect(&host)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

fn is_local_hostname(host: &str) -> bool {
    host == "localhost" || LOCAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}
