//! Validation pipeline
//!
//! Ordered predicates evaluated before every primary invocation. The first
//! rule to reject ends the pipeline; later rules, the permission gate and the
//! handler do not run. Each rule is invoked in isolation: an error or panic
//! inside one rule is attributed to that rule and ends the pipeline with a
//! [`ValidationOutcome::Failed`].

pub mod rules;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::command::CommandDefinition;
use crate::context::InvocationContext;
use crate::loader::{module_origin, Manifest, SkippedModule};

pub use rules::{BlocklistRule, CooldownRule};

#[async_trait]
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` passes, `Ok(Some(message))` rejects with a message shown to
    /// the invoker. Side effects must be idempotent: a rule may run again
    /// for a retried dispatch.
    async fn check(
        &self,
        ctx: &InvocationContext,
        command: &CommandDefinition,
    ) -> anyhow::Result<Option<String>>;
}

/// Adapter for plain predicate functions.
pub struct FnRule<F> {
    name: String,
    predicate: F,
}

#[async_trait]
impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&InvocationContext, &CommandDefinition) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        ctx: &InvocationContext,
        command: &CommandDefinition,
    ) -> anyhow::Result<Option<String>> {
        (self.predicate)(ctx, command)
    }
}

pub fn rule_fn<F>(name: impl Into<String>, predicate: F) -> Arc<dyn ValidationRule>
where
    F: Fn(&InvocationContext, &CommandDefinition) -> anyhow::Result<Option<String>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnRule {
        name: name.into(),
        predicate,
    })
}

/// What a rule module exports.
#[derive(Clone, Default)]
pub struct RuleModule {
    pub origin: String,
    pub predicate: Option<Arc<dyn ValidationRule>>,
}

impl RuleModule {
    pub fn new(origin: impl Into<String>, predicate: Arc<dyn ValidationRule>) -> Self {
        Self {
            origin: origin.into(),
            predicate: Some(predicate),
        }
    }
}

#[derive(Debug)]
pub enum ValidationOutcome {
    Pass,
    Rejected { rule: String, message: String },
    Failed { rule: String },
}

#[derive(Clone, Default)]
pub struct ValidationPipeline {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl ValidationPipeline {
    pub fn new(rules: Vec<Arc<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    pub async fn evaluate(
        &self,
        ctx: &InvocationContext,
        command: &CommandDefinition,
    ) -> ValidationOutcome {
        for rule in &self.rules {
            let result = AssertUnwindSafe(rule.check(ctx, command))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(None)) => continue,
                Ok(Ok(Some(message))) => {
                    debug!(
                        "[Validation] Rule '{}' rejected /{} for {}",
                        rule.name(),
                        command.name,
                        ctx.invoker.id
                    );
                    return ValidationOutcome::Rejected {
                        rule: rule.name().to_string(),
                        message,
                    };
                }
                Ok(Err(e)) => {
                    error!(
                        "[Validation] Rule '{}' failed for /{} (invoker {}): {:#}",
                        rule.name(),
                        command.name,
                        ctx.invoker.id,
                        e
                    );
                    return ValidationOutcome::Failed {
                        rule: rule.name().to_string(),
                    };
                }
                Err(_) => {
                    error!(
                        "[Validation] Rule '{}' panicked for /{} (invoker {})",
                        rule.name(),
                        command.name,
                        ctx.invoker.id
                    );
                    return ValidationOutcome::Failed {
                        rule: rule.name().to_string(),
                    };
                }
            }
        }
        ValidationOutcome::Pass
    }
}

/// Build the pipeline from a rule manifest, in manifest order. Modules
/// without a predicate are skipped with a warning.
pub fn load_rules(manifest: Manifest<RuleModule>) -> (ValidationPipeline, Vec<SkippedModule>) {
    let mut rules = Vec::new();
    let mut skipped = Vec::new();

    for (path, module) in manifest.into_entries() {
        let origin = module_origin(&path, &module.origin);
        match module.predicate {
            Some(rule) => {
                debug!("[Validation] Loaded rule '{}' from {}", rule.name(), origin);
                rules.push(rule);
            }
            None => {
                let reason = "module does not export a predicate";
                warn!("[Validation] Skipping {}: {}", origin, reason);
                skipped.push(SkippedModule {
                    origin,
                    reason: reason.to_string(),
                });
            }
        }
    }

    info!("[Validation] Loaded {} rule(s)", rules.len());
    (ValidationPipeline::new(rules), skipped)
}
