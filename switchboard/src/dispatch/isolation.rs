//! Error isolation around a single handler invocation.
//!
//! A failing handler, whether it returns an error or panics, is logged once
//! with the command name and invoker, and the invoker gets a generic message.
//! If that message cannot be delivered the secondary failure is logged and
//! dropped. Nothing escapes to the event loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, warn};

use super::DispatchOutcome;
use crate::command::CommandDefinition;
use crate::context::InvocationContext;
use crate::response::{respond, ResponseChannel, ResponsePayload};

/// The only failure text ever shown to an invoker.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while running this command.";

pub async fn run_isolated(definition: &CommandDefinition, ctx: InvocationContext) -> DispatchOutcome {
    let channel = ctx.channel.clone();
    let invoker = ctx.invoker.id.clone();

    let result = AssertUnwindSafe((definition.handler)(ctx)).catch_unwind().await;
    let failure = match result {
        Ok(Ok(())) => return DispatchOutcome::Completed,
        Ok(Err(e)) => format!("{:#}", e),
        Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
    };

    error!(
        "[Dispatcher] /{} failed for invoker {}: {}",
        definition.name, invoker, failure
    );
    notify_failure(channel.as_ref(), &definition.name, &invoker).await;
    DispatchOutcome::Failed
}

/// Tell the invoker something went wrong, without leaking details.
pub async fn notify_failure(channel: &dyn ResponseChannel, command: &str, invoker: &str) {
    if let Err(e) = respond(channel, ResponsePayload::ephemeral(GENERIC_FAILURE_MESSAGE)).await {
        warn!(
            "[Dispatcher] Could not notify {} about failed /{}: {:#}",
            invoker, command, e
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
