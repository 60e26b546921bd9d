//! Access control required-mode tests

use cretoai_perm::{
    ActionRequest, DenialCode, Dispatcher, DispatcherBuilder, Entity, EntityCommand, EntityId,
    MemoryStore, PermConfig, PermPlugin, PermSpec, StoreHandler,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn object(value: Value) -> Entity {
    value.as_object().unwrap().clone()
}

fn setup(extra: Value) -> (PermPlugin, Dispatcher, Arc<MemoryStore>) {
    let mut config = json!({
        "accessControls": [{
            "name": "can delete foobar",
            "roles": ["foobar"],
            "entities": [{"name": "foobar"}],
            "control": "required",
            "actions": ["remove"],
            "conditions": []
        }],
        "allowedProperties": [{
            "entity": {"name": "item"},
            "fields": ["id", "name", "number"]
        }]
    });
    if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        config.extend(extra.clone());
    }
    let config: PermConfig = serde_json::from_value(config).unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut builder = DispatcherBuilder::new();
    StoreHandler::register(&mut builder, store.clone());
    let plugin = PermPlugin::new(config, store.clone()).unwrap();
    let dispatcher = plugin.install(builder).unwrap();
    (plugin, dispatcher, store)
}

async fn saved_foobar(dispatcher: &Dispatcher, perm: PermSpec) -> Value {
    let foobar = EntityId::new("foobar");
    let pf1 = dispatcher
        .act(
            ActionRequest::entity(EntityCommand::Save, &foobar)
                .with_ent(object(json!({"region": "EMEA"})))
                .with_perm(perm.clone()),
        )
        .await
        .unwrap();
    assert_eq!(pf1["region"], json!("EMEA"));

    let loaded = dispatcher
        .act(
            ActionRequest::entity(EntityCommand::Load, &foobar)
                .with_query(object(json!({"id": pf1["id"].clone()})))
                .with_perm(perm),
        )
        .await
        .unwrap();
    assert_eq!(loaded["region"], json!("EMEA"));
    pf1
}

fn remove(id: &Value, perm: PermSpec) -> ActionRequest {
    ActionRequest::entity(EntityCommand::Remove, &EntityId::new("foobar"))
        .with_query(object(json!({"id": id})))
        .with_perm(perm)
}

#[tokio::test]
async fn test_remove_granted() {
    let (_, dispatcher, store) = setup(json!({}));
    let pf1 = saved_foobar(&dispatcher, PermSpec::roles(["foobar"])).await;

    let removed = dispatcher
        .act(remove(&pf1["id"], PermSpec::roles(["foobar"])))
        .await
        .unwrap();
    assert_eq!(removed["id"], pf1["id"]);
    assert_eq!(removed["region"], json!("EMEA"));
    assert_eq!(store.count(&EntityId::new("foobar")).await, 0);
}

#[tokio::test]
async fn test_remove_denied() {
    let (plugin, dispatcher, store) = setup(json!({}));
    let pf1 = saved_foobar(&dispatcher, PermSpec::roles(["foobar"])).await;

    let err = dispatcher
        .act(remove(&pf1["id"], PermSpec::roles(Vec::<String>::new())))
        .await
        .unwrap_err();
    let denial = err.denial().unwrap();
    assert_eq!(denial.code, DenialCode::FailAcl);
    assert_eq!(denial.rule.as_deref(), Some("can delete foobar"));
    assert_eq!(denial.need.as_deref(), Some("foobar"));
    assert_eq!(denial.status, Some(401));

    assert_eq!(store.count(&EntityId::new("foobar")).await, 1);
    assert_eq!(plugin.metrics().snapshot().denied_with(DenialCode::FailAcl), 1);
}

#[tokio::test]
async fn test_non_role_permission_has_no_roles() {
    let (_, dispatcher, _) = setup(json!({}));
    let pf1 = saved_foobar(&dispatcher, PermSpec::allow(true)).await;

    let result = dispatcher.act(remove(&pf1["id"], PermSpec::allow(true))).await;
    assert_eq!(result.unwrap_err().denial().unwrap().code, DenialCode::FailAcl);
}

#[tokio::test]
async fn test_entity_gate_runs_before_access_controls() {
    let (plugin, dispatcher, _) = setup(json!({"entity": true, "status": {"denied": 403}}));
    let pf1 = saved_foobar(&dispatcher, PermSpec::roles(["foobar"])).await;

    let err = dispatcher
        .act(remove(&pf1["id"], PermSpec::roles(["guest"])))
        .await
        .unwrap_err();
    let denial = err.denial().unwrap();
    assert_eq!(denial.code, DenialCode::FailAcl);
    assert_eq!(denial.status, Some(403));

    let entity_perm: PermSpec = serde_json::from_value(json!({"entity": {"foobar": "r"}})).unwrap();
    let err = dispatcher
        .act(remove(&pf1["id"], entity_perm))
        .await
        .unwrap_err();
    assert_eq!(err.denial().unwrap().code, DenialCode::FailEntityOperation);

    assert_eq!(plugin.metrics().snapshot().role_gaps, 0);
}
