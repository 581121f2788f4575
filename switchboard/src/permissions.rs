//! Permission gate
//!
//! Three independent checks run in a fixed order after validation passed:
//! restricted-scope allow-list, invoker capabilities, executor capabilities.
//! The first failing check decides the rejection.

use std::collections::HashSet;

use tracing::debug;

use crate::command::CommandDefinition;
use crate::context::InvocationContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Restricted-scope command and the invoker is not on the allow-list
    OperatorOnly,
    MissingInvokerCapabilities(Vec<String>),
    MissingExecutorCapabilities(Vec<String>),
}

impl Rejection {
    /// Text shown to the invoker.
    pub fn message(&self) -> String {
        match self {
            Rejection::OperatorOnly => "This command is only available to bot operators.".to_string(),
            Rejection::MissingInvokerCapabilities(missing) => format!(
                "You need the following permission(s) to use this command: {}",
                missing.join(", ")
            ),
            Rejection::MissingExecutorCapabilities(missing) => format!(
                "I lack the permission(s) required to run this command: {}",
                missing.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    developer_ids: HashSet<String>,
    developer_groups: HashSet<String>,
}

impl PermissionGate {
    pub fn new<I, G>(developer_ids: I, developer_groups: G) -> Self
    where
        I: IntoIterator<Item = String>,
        G: IntoIterator<Item = String>,
    {
        Self {
            developer_ids: developer_ids.into_iter().collect(),
            developer_groups: developer_groups.into_iter().collect(),
        }
    }

    fn is_operator(&self, ctx: &InvocationContext) -> bool {
        self.developer_ids.contains(&ctx.invoker.id)
            || ctx
                .invoker
                .groups
                .iter()
                .any(|g| self.developer_groups.contains(g))
    }

    pub fn check(&self, ctx: &InvocationContext, command: &CommandDefinition) -> Result<(), Rejection> {
        if command.is_restricted() && !self.is_operator(ctx) {
            debug!(
                "[Permissions] {} is not an operator, refusing /{}",
                ctx.invoker.id, command.name
            );
            return Err(Rejection::OperatorOnly);
        }

        let required = &command.policy.required_invoker_capabilities;
        if !required.is_empty() {
            let missing = ctx.invoker.capabilities.missing(required);
            if !missing.is_empty() {
                return Err(Rejection::MissingInvokerCapabilities(missing));
            }
        }

        let required = &command.policy.required_executor_capabilities;
        if !required.is_empty() {
            // Unresolved agent snapshot: skip rather than fail closed.
            match &ctx.executor_capabilities {
                Some(held) => {
                    let missing = held.missing(required);
                    if !missing.is_empty() {
                        return Err(Rejection::MissingExecutorCapabilities(missing));
                    }
                }
                None => debug!(
                    "[Permissions] Executor capabilities unavailable for /{}, skipping check",
                    command.name
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_handler, CapabilitySet, CommandPolicy};
    use crate::context::Invoker;
    use crate::response::BufferedResponseChannel;
    use std::sync::Arc;

    fn command(policy: CommandPolicy) -> CommandDefinition {
        CommandDefinition {
            name: "purge".to_string(),
            descriptor: serde_json::json!({ "name": "purge" }),
            handler: command_handler(|_ctx| async { Ok(()) }),
            suggestion_handler: None,
            policy,
            origin: "purge".to_string(),
        }
    }

    fn ctx(invoker: Invoker) -> InvocationContext {
        InvocationContext::new("purge", invoker, Arc::new(BufferedResponseChannel::new()))
    }

    fn gate() -> PermissionGate {
        PermissionGate::new(vec!["dev-1".to_string()], vec!["core-team".to_string()])
    }

    #[test]
    fn restricted_scope_checked_before_capabilities() {
        let cmd = command(CommandPolicy::restricted().with_invoker_capabilities(["manage_messages"]));
        let invoker = Invoker::new("u-1").with_capabilities(["manage_messages"]);
        assert_eq!(gate().check(&ctx(invoker), &cmd), Err(Rejection::OperatorOnly));
    }

    #[test]
    fn operator_by_identity_or_group() {
        let cmd = command(CommandPolicy::restricted());
        assert!(gate().check(&ctx(Invoker::new("dev-1")), &cmd).is_ok());
        assert!(gate()
            .check(&ctx(Invoker::new("u-9").with_groups(["core-team"])), &cmd)
            .is_ok());
    }

    #[test]
    fn missing_invoker_capabilities_are_listed() {
        let cmd = command(CommandPolicy::default().with_invoker_capabilities(["ban_members", "kick_members"]));
        let invoker = Invoker::new("u-1").with_capabilities(["kick_members"]);
        let rejection = gate().check(&ctx(invoker), &cmd).unwrap_err();
        assert_eq!(
            rejection,
            Rejection::MissingInvokerCapabilities(vec!["ban_members".to_string()])
        );
        assert!(rejection.message().contains("ban_members"));
    }

    #[test]
    fn executor_check_rejects_when_snapshot_known() {
        let cmd = command(CommandPolicy::default().with_executor_capabilities(["manage_roles"]));
        let context = ctx(Invoker::new("u-1")).with_executor_capabilities(CapabilitySet::new());
        assert_eq!(
            gate().check(&context, &cmd),
            Err(Rejection::MissingExecutorCapabilities(vec!["manage_roles".to_string()]))
        );
    }

    #[test]
    fn executor_check_fails_open_without_snapshot() {
        let cmd = command(CommandPolicy::default().with_executor_capabilities(["manage_roles"]));
        assert!(gate().check(&ctx(Invoker::new("u-1")), &cmd).is_ok());
    }
}
