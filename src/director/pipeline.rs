//! Builds the top-level director chain from configuration.
//!
//! # Chain Layout
//! ```text
//! correlation → token exchange → rate limit → router
//!                                               └─ per route: [rate limit →] upstream
//! ```
//! Disabled stages are left out. The limiter outlives individual chains so
//! per-identity state survives a config reload when a group's policy is
//! unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::schema::{ProxyConfig, RateLimitConfig};
use crate::director::correlation::Correlation;
use crate::director::rate_limit::{GroupSource, IdentitySource, RateLimitDirector};
use crate::director::token_exchange::TokenExchange;
use crate::director::{Chain, Director, SingleHost};
use crate::error::{ProxyError, ProxyResult};
use crate::routing::RouterDirector;
use crate::security::rate_limit::{GroupRateLimiter, RateLimitPolicy};
use crate::security::token::{InMemoryTokenStore, RandomTokenIssuer, TokenIssuer};

/// Long-lived collaborators shared by every chain built from config.
pub struct Pipeline {
    limiter: Arc<GroupRateLimiter>,
    issuer: Arc<dyn TokenIssuer>,
}

impl Pipeline {
    pub fn new(limiter: Arc<GroupRateLimiter>) -> Self {
        Self {
            limiter,
            issuer: Arc::new(RandomTokenIssuer),
        }
    }

    /// Replace the correlation token source.
    pub fn with_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn limiter(&self) -> &Arc<GroupRateLimiter> {
        &self.limiter
    }

    /// Build a fresh chain and reconcile limiter groups with `config`.
    ///
    /// Limiter groups are reconciled last; a rejected config leaves them
    /// unchanged.
    pub fn build_chain(&self, config: &ProxyConfig) -> ProxyResult<Chain> {
        let chain = self.assemble(config)?;
        self.apply_rate_limit_groups(&config.rate_limit)?;
        tracing::info!(chain = ?chain, routes = config.routes.len(), "Director chain built");
        Ok(chain)
    }

    /// Check that `config` would build, without touching the limiter.
    pub fn check(&self, config: &ProxyConfig) -> ProxyResult<()> {
        self.assemble(config)?;
        group_policies(&config.rate_limit)?;
        Ok(())
    }

    fn assemble(&self, config: &ProxyConfig) -> ProxyResult<Chain> {
        let mut directors: Vec<Arc<dyn Director>> = Vec::new();

        if config.correlation.enabled {
            directors.push(Arc::new(Correlation::new(
                self.issuer.clone(),
                header_name(&config.correlation.header)?,
                config.correlation.token_length,
            )));
        }

        if config.token_exchange.enabled {
            let store: InMemoryTokenStore = config.token_exchange.tokens.clone().into_iter().collect();
            directors.push(Arc::new(TokenExchange::new(
                Arc::new(store),
                config.token_exchange.required,
            )));
        }

        let identity = identity_source(&config.rate_limit)?;
        if config.rate_limit.enabled {
            let group = match &config.rate_limit.group_header {
                Some(name) => GroupSource::Header {
                    name: header_name(name)?,
                    default: config.rate_limit.default_group.clone(),
                },
                None => GroupSource::Fixed(config.rate_limit.default_group.clone()),
            };
            directors.push(Arc::new(RateLimitDirector::new(
                self.limiter.clone(),
                group,
                identity.clone(),
            )));
        }

        let mut routes: Vec<(String, Arc<dyn Director>)> = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let upstream: Arc<dyn Director> = Arc::new(SingleHost::parse(&route.upstream)?);
            let director = match route.rate_limit_group.as_ref().filter(|_| config.rate_limit.enabled) {
                Some(group) => {
                    let limit: Arc<dyn Director> = Arc::new(RateLimitDirector::new(
                        self.limiter.clone(),
                        GroupSource::Fixed(group.clone()),
                        identity.clone(),
                    ));
                    Arc::new(Chain::new(vec![limit, upstream]))
                }
                None => upstream,
            };
            routes.push((route.pattern.clone(), director));
        }
        directors.push(Arc::new(RouterDirector::new(routes)));

        Ok(Chain::new(directors))
    }

    /// Create or update configured groups and drop the ones no longer listed.
    ///
    /// A group whose policy did not change keeps its per-identity state.
    pub fn apply_rate_limit_groups(&self, config: &RateLimitConfig) -> ProxyResult<()> {
        if config.unknown_group != self.limiter.unknown_group_policy() {
            tracing::warn!(
                configured = ?config.unknown_group,
                active = ?self.limiter.unknown_group_policy(),
                "unknown_group changes take effect after a restart"
            );
        }

        let policies = group_policies(config)?;

        let mut wanted = HashSet::new();
        for (name, policy) in policies {
            let current = self.limiter.group(name).map(|limiter| *limiter.policy());
            if current != Some(policy) {
                self.limiter.set_group(name, policy)?;
            }
            wanted.insert(name);
        }

        for (name, _) in self.limiter.groups() {
            if !wanted.contains(name.as_str()) {
                self.limiter.del_group(&name);
            }
        }
        Ok(())
    }
}

fn group_policies(config: &RateLimitConfig) -> ProxyResult<Vec<(&str, RateLimitPolicy)>> {
    config
        .groups
        .iter()
        .map(|group| {
            RateLimitPolicy::new(group.expiration(), group.max_rps, group.burst)
                .map(|policy| (group.name.as_str(), policy))
        })
        .collect()
}

fn header_name(name: &str) -> ProxyResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ProxyError::Construction(format!("invalid header name '{}'", name)))
}

fn identity_source(config: &RateLimitConfig) -> ProxyResult<IdentitySource> {
    Ok(match &config.identity_header {
        Some(name) => IdentitySource::Header(header_name(name)?),
        None => IdentitySource::RemoteAddr,
    })
}
