//! Invalidation trigger.
//!
//! Authenticates invalidation requests, bumps the registry, and hands the
//! resulting [`RevalidationPlan`] to every configured regeneration hook.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use inkshop_api_types::{InvalidateRequest, RegistrySnapshot};
use metrics::counter;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::clock::format_instant;
use super::error::{CacheError, RegenerationError};
use super::keys::ResourceType;
use super::planner::RevalidationPlan;
use super::registry::TimestampRegistry;

pub(crate) const METRIC_CACHE_INVALIDATION_TOTAL: &str = "inkshop_cache_invalidation_total";
pub(crate) const METRIC_CACHE_REGENERATION_FAILURE_TOTAL: &str =
    "inkshop_cache_regeneration_failure_total";

/// Downstream page regeneration, run after every accepted invalidation.
#[async_trait]
pub trait RegenerationHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn regenerate(&self, plan: &RevalidationPlan) -> Result<(), RegenerationError>;
}

/// Hook that only records the plan. Used when no renderer is configured.
pub struct NoopRegenerator;

#[async_trait]
impl RegenerationHook for NoopRegenerator {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn regenerate(&self, plan: &RevalidationPlan) -> Result<(), RegenerationError> {
        debug!(plan = %plan, "regeneration skipped: no renderer configured");
        Ok(())
    }
}

/// Outcome of one accepted invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub resource: ResourceType,
    pub timestamp: u64,
    /// Hooks that failed; the invalidation itself still stands.
    pub failed_hooks: Vec<&'static str>,
}

pub struct CacheTrigger {
    registry: Arc<TimestampRegistry>,
    secret: Option<String>,
    hooks: Vec<Arc<dyn RegenerationHook>>,
}

impl CacheTrigger {
    /// `secret = None` rejects every invalidation.
    pub fn new(registry: Arc<TimestampRegistry>, secret: Option<String>) -> Self {
        Self {
            registry,
            secret,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn RegenerationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn registry(&self) -> &Arc<TimestampRegistry> {
        &self.registry
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Validate `request` and record the invalidation.
    ///
    /// The secret is checked before the type, so an unauthenticated caller
    /// learns nothing about accepted values. Regeneration failures are logged
    /// and counted but never fail the call.
    pub async fn invalidate(&self, request: &InvalidateRequest) -> Result<Invalidation, CacheError> {
        if !self.secret_matches(request.secret_str()) {
            warn!(
                provided = request.secret.is_some(),
                configured = self.secret.is_some(),
                "cache invalidation rejected: bad secret"
            );
            return Err(CacheError::Unauthorized);
        }

        let resource = match &request.resource {
            None | Some(Value::Null) => return Err(CacheError::unknown_type(None)),
            Some(Value::String(value)) => value
                .parse::<ResourceType>()
                .map_err(|_| CacheError::unknown_type(Some(value.as_str())))?,
            Some(other) => return Err(CacheError::unknown_type(Some(other.to_string().as_str()))),
        };

        let timestamp = self.registry.bump(resource);
        counter!(METRIC_CACHE_INVALIDATION_TOTAL, "resource" => resource.as_str()).increment(1);
        info!(
            resource = resource.as_str(),
            timestamp,
            at = %format_instant(timestamp),
            "cache invalidated"
        );

        let failed_hooks = self.regenerate(resource).await;

        Ok(Invalidation {
            resource,
            timestamp,
            failed_hooks,
        })
    }

    fn secret_matches(&self, provided: Option<&str>) -> bool {
        match (self.secret.as_deref(), provided) {
            (Some(expected), Some(provided)) => {
                expected.as_bytes().ct_eq(provided.as_bytes()).into()
            }
            _ => false,
        }
    }

    async fn regenerate(&self, resource: ResourceType) -> Vec<&'static str> {
        if self.hooks.is_empty() {
            return Vec::new();
        }

        let plan = RevalidationPlan::for_resource(resource);
        let results = join_all(self.hooks.iter().map(|hook| {
            let plan = &plan;
            async move { (hook.name(), hook.regenerate(plan).await) }
        }))
        .await;

        let mut failed = Vec::new();
        for (hook, result) in results {
            match result {
                Ok(()) => debug!(hook, plan = %plan, "regeneration requested"),
                Err(err) => {
                    counter!(METRIC_CACHE_REGENERATION_FAILURE_TOTAL, "hook" => hook).increment(1);
                    warn!(hook, plan = %plan, error = %err, "regeneration failed");
                    failed.push(hook);
                }
            }
        }
        failed
    }
}
