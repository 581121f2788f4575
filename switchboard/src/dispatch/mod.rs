//! Event routing
//!
//! Primary invocations go through validation, then the permission gate, then
//! the handler inside [`isolation::run_isolated`]. Suggestion requests go
//! straight to the command's suggestion handler: no validation or
//! permission checks run on that path, so suggestion handlers must not
//! expose privileged data. Unknown event kinds and unknown command names are
//! dropped without a response.
//!
//! The dispatcher holds only read-only state, so events are handled
//! concurrently without locking; two invocations of the same command never
//! wait on each other.

pub mod isolation;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::command::{CommandDefinition, Registry};
use crate::context::{InvocationContext, SuggestionContext};
use crate::permissions::PermissionGate;
use crate::response::{respond, ResponsePayload};
use crate::validation::{ValidationOutcome, ValidationPipeline};

pub use isolation::GENERIC_FAILURE_MESSAGE;

pub enum InboundEvent {
    Invocation(InvocationContext),
    Suggestion(SuggestionContext),
    /// Any other interaction kind delivered by the transport
    Unsupported { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Unknown event kind or command name; nothing was sent
    Ignored,
    /// Validation or permission check refused; the message was sent
    Rejected { message: String },
    Completed,
    /// Handler or rule failed; the generic failure message was sent
    Failed,
    SuggestionsSent,
    /// Suggestion handler failed; nothing was sent
    SuggestionFailed,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    pipeline: ValidationPipeline,
    gate: PermissionGate,
    dispatch_retired: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, pipeline: ValidationPipeline, gate: PermissionGate) -> Self {
        Self {
            registry,
            pipeline,
            gate,
            dispatch_retired: true,
        }
    }

    /// Whether retired commands remain invocable (default `true`).
    pub fn with_dispatch_retired(mut self, dispatch_retired: bool) -> Self {
        self.dispatch_retired = dispatch_retired;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn handle_event(&self, event: InboundEvent) -> DispatchOutcome {
        match event {
            InboundEvent::Invocation(ctx) => self.handle_invocation(ctx).await,
            InboundEvent::Suggestion(ctx) => self.handle_suggestion(ctx).await,
            InboundEvent::Unsupported { kind } => {
                trace!("[Dispatcher] Ignoring {} event", kind);
                DispatchOutcome::Ignored
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        let definition = self.registry.get(name)?;
        if definition.policy.retired && !self.dispatch_retired {
            return None;
        }
        Some(definition)
    }

    async fn handle_invocation(&self, ctx: InvocationContext) -> DispatchOutcome {
        let Some(definition) = self.lookup(&ctx.command_name) else {
            trace!("[Dispatcher] No command named '{}'", ctx.command_name);
            return DispatchOutcome::Ignored;
        };
        debug!(
            "[Dispatcher] /{} invoked by {}",
            definition.name, ctx.invoker.id
        );

        match self.pipeline.evaluate(&ctx, &definition).await {
            ValidationOutcome::Pass => {}
            ValidationOutcome::Rejected { message, .. } => {
                return self.reject(&ctx, &definition, message).await;
            }
            ValidationOutcome::Failed { .. } => {
                isolation::notify_failure(ctx.channel.as_ref(), &definition.name, &ctx.invoker.id)
                    .await;
                return DispatchOutcome::Failed;
            }
        }

        if let Err(rejection) = self.gate.check(&ctx, &definition) {
            return self.reject(&ctx, &definition, rejection.message()).await;
        }

        isolation::run_isolated(&definition, ctx).await
    }

    async fn reject(
        &self,
        ctx: &InvocationContext,
        definition: &CommandDefinition,
        message: String,
    ) -> DispatchOutcome {
        if let Err(e) = respond(ctx.channel.as_ref(), ResponsePayload::ephemeral(message.clone())).await {
            warn!(
                "[Dispatcher] Could not deliver rejection of /{} to {}: {:#}",
                definition.name, ctx.invoker.id, e
            );
        }
        DispatchOutcome::Rejected { message }
    }

    async fn handle_suggestion(&self, ctx: SuggestionContext) -> DispatchOutcome {
        let Some(definition) = self.lookup(&ctx.command_name) else {
            return DispatchOutcome::Ignored;
        };
        let Some(handler) = definition.suggestion_handler.clone() else {
            return DispatchOutcome::Ignored;
        };

        let sink = ctx.sink.clone();
        let choices = match AssertUnwindSafe(handler(ctx)).catch_unwind().await {
            Ok(Ok(choices)) => choices,
            Ok(Err(e)) => {
                debug!("[Dispatcher] Suggestions for /{} failed: {:#}", definition.name, e);
                return DispatchOutcome::SuggestionFailed;
            }
            Err(panic) => {
                debug!(
                    "[Dispatcher] Suggestions for /{} panicked: {}",
                    definition.name,
                    isolation::panic_message(panic.as_ref())
                );
                return DispatchOutcome::SuggestionFailed;
            }
        };

        match sink.suggest(choices).await {
            Ok(()) => DispatchOutcome::SuggestionsSent,
            Err(e) => {
                debug!("[Dispatcher] Could not deliver suggestions for /{}: {:#}", definition.name, e);
                DispatchOutcome::SuggestionFailed
            }
        }
    }
}
