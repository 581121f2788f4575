use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use switchboard::catalog::CatalogCall;
use switchboard::{
    command_handler, CatalogError, CatalogScope, CatalogSynchronizer, CommandModule, CommandPolicy, Engine,
    EngineError, EngineOptions, InMemoryCatalog, InvocationContext, Manifest, SyncMode,
};

fn module(name: &str, description: &str, policy: CommandPolicy) -> CommandModule {
    CommandModule::new(format!("{}.rs", name))
        .descriptor(json!({ "name": name, "description": description, "options": [] }))
        .policy(policy)
        .handler(command_handler(|_ctx: InvocationContext| async move { Ok(()) }))
}

fn standard_manifest() -> Manifest<CommandModule> {
    Manifest::new()
        .group("general", |g| {
            g.register(module("ping", "Check latency", CommandPolicy::default()))
                .register(module("help", "List commands", CommandPolicy::default()))
        })
        .group("admin", |g| g.register(module("reload", "Reload modules", CommandPolicy::restricted())))
}

fn engine_with(catalog: Arc<InMemoryCatalog>, manifest: Manifest<CommandModule>, targets: &[&str]) -> Engine {
    let options = EngineOptions {
        restricted_targets: targets.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    };
    let (engine, _) = Engine::load_all(options, manifest, Manifest::new(), catalog);
    engine
}

fn names(catalog: &InMemoryCatalog, scope: &CatalogScope) -> Vec<String> {
    let mut names: Vec<_> = catalog
        .records(scope)
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_first_incremental_sync_creates_global_and_restricted_commands() {
    let catalog = Arc::new(InMemoryCatalog::new().with_target("D1"));
    let engine = engine_with(catalog.clone(), standard_manifest(), &["D1"]);

    let report = engine.synchronize(SyncMode::Incremental).await.expect("sync");

    assert_eq!(names(&catalog, &CatalogScope::Global), vec!["help", "ping"]);
    assert_eq!(
        names(&catalog, &CatalogScope::Restricted("D1".to_string())),
        vec!["reload"]
    );
    assert_eq!(report.created(), 3);
    assert_eq!(report.updated(), 0);
}

#[tokio::test]
async fn test_second_incremental_sync_writes_nothing() {
    let catalog = Arc::new(InMemoryCatalog::new().with_target("D1"));
    let engine = engine_with(catalog.clone(), standard_manifest(), &["D1"]);

    engine.synchronize(SyncMode::Incremental).await.expect("first sync");
    catalog.clear_calls();
    let report = engine.synchronize(SyncMode::Incremental).await.expect("second sync");

    assert!(catalog.write_calls().is_empty());
    assert_eq!(report.created() + report.updated(), 0);
    let global = report.scope(&CatalogScope::Global).expect("global report");
    assert_eq!(global.skipped, vec!["help".to_string(), "ping".to_string()]);
}

#[tokio::test]
async fn test_drifted_description_is_updated() {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.seed(
        CatalogScope::Global,
        vec![json!({ "name": "ping", "description": "Old text", "options": [] })],
    );
    let engine = engine_with(
        catalog.clone(),
        Manifest::new().register(module("ping", "Check latency", CommandPolicy::default())),
        &[],
    );

    let report = engine.synchronize(SyncMode::Incremental).await.expect("sync");

    assert_eq!(report.updated(), 1);
    assert_eq!(
        catalog.write_calls(),
        vec![CatalogCall::Update {
            scope: CatalogScope::Global,
            id: "1".to_string(),
            name: "ping".to_string()
        }]
    );
    let records = catalog.records(&CatalogScope::Global).expect("global scope");
    assert_eq!(records[0].descriptor["description"], "Check latency");
}

#[tokio::test]
async fn test_scenario_a_only_missing_command_is_created() {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.seed(
        CatalogScope::Global,
        vec![json!({ "name": "ban", "description": "Ban a member", "options": [] })],
    );
    let manifest = Manifest::new()
        .register(module("ban", "Ban a member", CommandPolicy::default()))
        .register(module("kick", "Kick a member", CommandPolicy::default()));
    let engine = engine_with(catalog.clone(), manifest, &[]);

    engine.synchronize(SyncMode::Incremental).await.expect("sync");

    assert_eq!(
        catalog.write_calls(),
        vec![CatalogCall::Create {
            scope: CatalogScope::Global,
            name: "kick".to_string()
        }]
    );
}

#[tokio::test]
async fn test_incremental_sync_never_deletes_remote_only_commands() {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.seed(
        CatalogScope::Global,
        vec![json!({ "name": "orphan", "description": "No longer local", "options": [] })],
    );
    let engine = engine_with(
        catalog.clone(),
        Manifest::new().register(module("ping", "Check latency", CommandPolicy::default())),
        &[],
    );

    engine.synchronize(SyncMode::Incremental).await.expect("sync");

    assert_eq!(names(&catalog, &CatalogScope::Global), vec!["orphan", "ping"]);
}

#[tokio::test]
async fn test_bulk_sync_replaces_each_scope_once() {
    let catalog = Arc::new(InMemoryCatalog::new().with_target("D1"));
    catalog.seed(
        CatalogScope::Global,
        vec![json!({ "name": "orphan", "description": "stale", "options": [] })],
    );
    let engine = engine_with(catalog.clone(), standard_manifest(), &["D1"]);

    let report = engine.synchronize(SyncMode::Bulk).await.expect("sync");

    assert_eq!(
        catalog.calls(),
        vec![
            CatalogCall::BulkReplace {
                scope: CatalogScope::Global,
                count: 2
            },
            CatalogCall::BulkReplace {
                scope: CatalogScope::Restricted("D1".to_string()),
                count: 1
            },
        ]
    );
    assert_eq!(names(&catalog, &CatalogScope::Global), vec!["help", "ping"]);
    assert_eq!(
        report.scope(&CatalogScope::Global).and_then(|s| s.replaced),
        Some(2)
    );
}

#[tokio::test]
async fn test_retired_commands_are_not_published() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let manifest = Manifest::new()
        .register(module("ping", "Check latency", CommandPolicy::default()))
        .register(module("legacy", "Old command", CommandPolicy::default().retired()));
    let engine = engine_with(catalog.clone(), manifest, &[]);

    engine.synchronize(SyncMode::Incremental).await.expect("incremental");
    assert_eq!(names(&catalog, &CatalogScope::Global), vec!["ping"]);

    engine.synchronize(SyncMode::Bulk).await.expect("bulk");
    assert_eq!(names(&catalog, &CatalogScope::Global), vec!["ping"]);
    assert_eq!(engine.registry().len(), 2);
}

#[tokio::test]
async fn test_restricted_commands_stay_out_of_global_scope() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let engine = engine_with(catalog.clone(), standard_manifest(), &[]);

    engine.synchronize(SyncMode::Incremental).await.expect("sync");

    assert!(!names(&catalog, &CatalogScope::Global).contains(&"reload".to_string()));
}

#[tokio::test]
async fn test_unknown_restricted_target_is_skipped() {
    let catalog = Arc::new(InMemoryCatalog::new().with_target("D1"));
    let engine = engine_with(catalog.clone(), standard_manifest(), &["D1", "GONE"]);

    for mode in [SyncMode::Incremental, SyncMode::Bulk] {
        let report = engine.synchronize(mode).await.expect("sync");
        let gone = report
            .scope(&CatalogScope::Restricted("GONE".to_string()))
            .expect("report for unknown target");
        assert!(gone.unreachable);
        assert_eq!(
            names(&catalog, &CatalogScope::Restricted("D1".to_string())),
            vec!["reload"]
        );
    }
}

#[tokio::test]
async fn test_unavailable_catalog_propagates() {
    let catalog = Arc::new(InMemoryCatalog::unavailable());
    let engine = engine_with(catalog, standard_manifest(), &[]);

    for mode in [SyncMode::Incremental, SyncMode::Bulk] {
        let err = engine.synchronize(mode).await.expect_err("catalog is down");
        assert!(matches!(err, EngineError::Catalog(CatalogError::Transport(_))));
    }
}

#[tokio::test]
async fn test_clear_all_propagates_unavailable_catalog() {
    let synchronizer = CatalogSynchronizer::new(Arc::new(InMemoryCatalog::unavailable()), vec!["D1".to_string()]);
    let err = synchronizer.clear_all().await.expect_err("catalog is down");
    assert!(matches!(err, EngineError::Catalog(CatalogError::Transport(_))));
}

#[tokio::test]
async fn test_clear_all_empties_every_scope() {
    let catalog = Arc::new(InMemoryCatalog::new().with_target("D1"));
    let engine = engine_with(catalog.clone(), standard_manifest(), &["D1", "GONE"]);
    engine.synchronize(SyncMode::Incremental).await.expect("sync");

    let report = engine.clear_all().await.expect("clear");

    assert!(names(&catalog, &CatalogScope::Global).is_empty());
    assert!(names(&catalog, &CatalogScope::Restricted("D1".to_string())).is_empty());
    assert!(report.scope(&CatalogScope::Global).expect("global").cleared);
    assert!(
        report
            .scope(&CatalogScope::Restricted("GONE".to_string()))
            .expect("gone")
            .unreachable
    );
}
