//! Switchboard: command registry, catalog synchronization and dispatch.
//!
//! Command modules are loaded into an immutable [`Registry`], mirrored to a
//! [`RemoteCatalog`] by the [`CatalogSynchronizer`], and invoked through the
//! [`Dispatcher`], which runs validation rules and permission checks before
//! handing the event to the command's handler.

pub mod catalog;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
#[cfg(feature = "server")]
pub mod gateway;
pub mod loader;
pub mod permissions;
pub mod response;
pub mod sync;
pub mod validation;

pub use catalog::{CatalogScope, HttpCatalog, InMemoryCatalog, RemoteCatalog, RemoteCommandRecord};
pub use command::{
    command_handler, suggestion_handler, CapabilitySet, CommandDefinition, CommandHandler, CommandPolicy,
    Registry, ScopePolicy, SuggestionHandler,
};
pub use config::SwitchboardConfig;
pub use context::{CommandOption, InvocationContext, Invoker, SuggestionContext};
pub use dispatch::{DispatchOutcome, Dispatcher, InboundEvent, GENERIC_FAILURE_MESSAGE};
pub use engine::{Engine, EngineOptions};
pub use error::{CatalogError, ConfigError, EngineError, EngineResult};
pub use loader::{load_commands, CommandModule, HandlerTable, LoadReport, Manifest};
pub use permissions::{PermissionGate, Rejection};
pub use response::{
    respond, BufferedResponseChannel, BufferedSuggestionSink, ResponseChannel, ResponsePayload, ResponseState,
    SuggestionChoice, SuggestionSink,
};
pub use sync::{CatalogSynchronizer, SyncMode, SyncReport};
pub use validation::{load_rules, rule_fn, RuleModule, ValidationOutcome, ValidationPipeline, ValidationRule};
