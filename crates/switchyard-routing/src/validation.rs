//! Target validation
//!
//! A target is routable when its provider exists and is enabled, its model
//! exists and is enabled, and the provider's endpoint is not the proxy itself
//! (which would loop requests back into the proxy forever).

use std::net::IpAddr;
use std::sync::Arc;
use switchyard_core::{Error, ProviderDirectory, Result, TargetRef};
use tracing::{debug, warn};
use url::Url;

/// Host/port pair used to compare endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    host: String,
    port: Option<u16>,
}

impl Origin {
    fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        let host = url
            .host_str()?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();

        // All local addresses reach the same listener
        let is_local = host == "localhost"
            || host
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified());

        Some(Self {
            host: if is_local { "localhost".to_string() } else { host },
            port: url.port_or_known_default(),
        })
    }
}

/// Checks alias targets against the provider directory
#[derive(Clone)]
pub struct TargetValidator {
    directory: Arc<dyn ProviderDirectory>,
    proxy_origin: Option<Origin>,
}

impl TargetValidator {
    /// Create a validator
    ///
    /// `proxy_endpoint` is the proxy's own listening URL. If it cannot be
    /// parsed the self-routing check is skipped.
    pub fn new(directory: Arc<dyn ProviderDirectory>, proxy_endpoint: &str) -> Self {
        let proxy_origin = Origin::parse(proxy_endpoint);
        if proxy_origin.is_none() {
            warn!(
                "Proxy endpoint '{}' is not a valid URL; self-routing check disabled",
                proxy_endpoint
            );
        }
        Self {
            directory,
            proxy_origin,
        }
    }

    /// Whether a provider base URL points back at the proxy
    pub fn is_proxy_endpoint(&self, base_url: &str) -> bool {
        match (&self.proxy_origin, Origin::parse(base_url)) {
            (Some(proxy), Some(target)) => *proxy == target,
            _ => false,
        }
    }

    /// Validate a target list and return it deduplicated, order preserved
    pub fn validate(&self, targets: &[TargetRef]) -> Result<Vec<TargetRef>> {
        if targets.is_empty() {
            return Err(Error::validation(
                "targets",
                "at least one target is required",
            ));
        }

        let mut accepted: Vec<TargetRef> = Vec::with_capacity(targets.len());
        for target in targets {
            if accepted.contains(target) {
                debug!("Dropping duplicate target {}", target);
                continue;
            }
            self.check(target)?;
            accepted.push(target.clone());
        }

        Ok(accepted)
    }

    fn check(&self, target: &TargetRef) -> Result<()> {
        let provider = self.directory.provider(&target.provider_id).ok_or_else(|| {
            Error::validation(
                "targets",
                format!("unknown provider '{}'", target.provider_id),
            )
        })?;

        if !provider.enabled {
            return Err(Error::validation(
                "targets",
                format!("provider '{}' is disabled", target.provider_id),
            ));
        }

        if self.is_proxy_endpoint(&provider.base_url) {
            warn!(
                "Rejecting target {}: provider endpoint {} is the proxy itself",
                target, provider.base_url
            );
            return Err(Error::validation(
                "targets",
                format!(
                    "provider '{}' points at the proxy's own endpoint",
                    target.provider_id
                ),
            ));
        }

        match provider.model(&target.model_id) {
            Some(model) if model.enabled => Ok(()),
            Some(_) => Err(Error::validation(
                "targets",
                format!("model '{}' is disabled", target),
            )),
            None => Err(Error::validation(
                "targets",
                format!("unknown model '{}'", target),
            )),
        }
    }
}

impl std::fmt::Debug for TargetValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetValidator")
            .field("proxy_origin", &self.proxy_origin)
            .finish_non_exhaustive()
    }
}
