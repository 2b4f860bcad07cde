//! End-to-end tests for the configuration service.

use quillon_config::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn default_env() -> Env {
    Env::new(
        "/quillon",
        PackageInfo {
            version: "8.0.0".to_string(),
            branch: "master".to_string(),
            build_num: 42,
            build_sha: "one".to_string(),
            dist: false,
        },
        EnvOptions::default(),
    )
}

fn service_over(raw: Value) -> (RawConfigSource, ConfigService) {
    let source = RawConfigSource::new(raw);
    let service = ConfigService::new(Arc::new(source.clone()), default_env());
    (source, service)
}

#[test]
fn returns_config_at_path_as_live_values() {
    let (_source, service) = service_over(json!({"key": "foo"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let subscription = service.at_path("key").unwrap();
    let value = subscription.recv().unwrap().unwrap();
    assert_eq!(*value, json!("foo"));
}

#[test]
fn delivers_an_error_if_config_at_path_does_not_match_schema() {
    let (_source, service) = service_over(json!({"key": 123}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let subscription = service.at_path("key").unwrap();
    let error = subscription.recv().unwrap().unwrap_err();
    assert_eq!(
        error.to_string(),
        "[config validation of [key]]: expected value of type [string] but got [number]"
    );
}

#[test]
fn revalidates_config_when_updated() {
    let (source, service) = service_over(json!({"key": "value"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let subscription = service.at_path("key").unwrap();

    source.push(json!({"key": 123}));

    assert_eq!(*subscription.recv().unwrap().unwrap(), json!("value"));
    let error = subscription.recv().unwrap().unwrap_err();
    assert_eq!(
        error.to_string(),
        "[config validation of [key]]: expected value of type [string] but got [number]"
    );
}

#[test]
fn does_not_push_new_configs_when_the_value_at_path_has_not_changed() {
    let (source, service) = service_over(json!({"key": "value"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let subscription = service.at_path("key").unwrap();
    source.push(json!({"key": "value"}));

    assert_eq!(*subscription.try_recv().unwrap().unwrap(), json!("value"));
    assert!(subscription.try_recv().is_none());
}

#[test]
fn pushes_new_config_when_the_value_at_path_has_changed() {
    let (source, service) = service_over(json!({"key": "value"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let subscription = service.at_path("key").unwrap();
    source.push(json!({"key": "new value"}));

    assert_eq!(*subscription.try_recv().unwrap().unwrap(), json!("value"));
    assert_eq!(*subscription.try_recv().unwrap().unwrap(), json!("new value"));
}

#[test]
fn fails_if_no_schema_is_defined_for_a_key() {
    let (_source, service) = service_over(json!({"key": "value"}));

    let error = service.at_path("key").unwrap_err();
    assert_eq!(error.to_string(), "No validation schema has been defined for [key]");
}

#[test]
fn fails_if_set_schema_is_called_twice_for_the_same_key() {
    let (_source, service) = service_over(json!({"key": "value"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let error = service.set_schema("key", StringSchema::new()).unwrap_err();
    assert_eq!(error.to_string(), "Validation schema for [key] was already registered.");
}

#[test]
fn flags_schema_paths_as_handled_when_registering_a_schema() {
    let (_source, service) = service_over(json!({
        "service": {"string": "str", "number": 42},
    }));
    service
        .set_schema(
            "service",
            ObjectSchema::new()
                .field("string", StringSchema::new())
                .field("number", NumberSchema::new()),
        )
        .unwrap();

    assert_eq!(service.used_paths(), vec!["service.string", "service.number"]);
}

#[test]
fn tracks_unhandled_paths() {
    let (_source, service) = service_over(json!({
        "service": {"string": "str", "number": 42},
        "plugin": {"foo": "bar"},
        "unknown": {"hello": "dolly", "number": 9000},
    }));
    service
        .set_schema(
            "service",
            ObjectSchema::new()
                .field("string", StringSchema::new())
                .field("number", NumberSchema::new()),
        )
        .unwrap();
    service
        .set_schema("plugin", ObjectSchema::new().field("foo", StringSchema::new()))
        .unwrap();

    assert_eq!(service.unused_paths(), vec!["unknown.hello", "unknown.number"]);
}

#[test]
fn passes_the_process_context_into_schema_defaults() {
    let source = RawConfigSource::new(json!({"foo": {}}));
    let env = Env::new(
        "/quillon",
        PackageInfo {
            version: "v1".to_string(),
            branch: "feature-v1".to_string(),
            build_num: 100,
            build_sha: "feature-v1-build-sha".to_string(),
            dist: true,
        },
        EnvOptions::default(),
    );
    let service = ConfigService::new(Arc::new(source), env);

    service
        .set_schema(
            "foo",
            ObjectSchema::new()
                .field("branch_ref", StringSchema::new().with_default(ContextRef::Branch))
                .field("build_num_ref", NumberSchema::new().with_default(ContextRef::BuildNum))
                .field("build_sha_ref", StringSchema::new().with_default(ContextRef::BuildSha))
                .field("dev_ref", BooleanSchema::new().with_default(ContextRef::Dev))
                .field("prod_ref", BooleanSchema::new().with_default(ContextRef::Prod))
                .field("version_ref", StringSchema::new().with_default(ContextRef::Version)),
        )
        .unwrap();

    let subscription = service.at_path("foo").unwrap();
    let value = subscription.recv().unwrap().unwrap();
    assert_eq!(
        *value,
        json!({
            "branch_ref": "feature-v1",
            "build_num_ref": 100,
            "build_sha_ref": "feature-v1-build-sha",
            "dev_ref": false,
            "prod_ref": true,
            "version_ref": "v1",
        })
    );
}

#[test]
fn handles_enabled_path_but_only_marks_the_enabled_path_as_used() {
    let (_source, service) = service_over(json!({
        "pid": {"enabled": true, "file": "/some/file.pid"},
    }));

    assert!(service.is_enabled_at_path("pid").unwrap());
    assert_eq!(service.unused_paths(), vec!["pid.file"]);
}

#[test]
fn handles_enabled_path_when_path_is_segmented() {
    let (_source, service) = service_over(json!({
        "pid": {"enabled": true, "file": "/some/file.pid"},
    }));

    assert!(service.is_enabled_at_path(["pid"]).unwrap());
    assert_eq!(service.unused_paths(), vec!["pid.file"]);
}

#[test]
fn handles_disabled_path_and_marks_the_whole_subtree_as_used() {
    let (_source, service) = service_over(json!({
        "pid": {"enabled": false, "file": "/some/file.pid"},
    }));

    assert!(!service.is_enabled_at_path("pid").unwrap());
    assert_eq!(service.unused_paths(), Vec::<String>::new());
}

#[test]
fn treats_a_path_absent_from_config_as_enabled() {
    let (_source, service) = service_over(json!({}));

    assert!(service.is_enabled_at_path("pid").unwrap());
    assert_eq!(service.unused_paths(), Vec::<String>::new());
}

#[test]
fn reads_enabled_even_without_a_schema_and_records_a_deprecation() {
    let (_source, service) = service_over(json!({"foo": {"enabled": true}}));

    assert!(service.is_enabled_at_path("foo").unwrap());

    let deprecations = service.handled_deprecated_configs();
    assert_eq!(deprecations.len(), 1);
    let (path, records) = &deprecations[0];
    assert_eq!(path, "foo");
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].message,
        "Configuring \"foo.enabled\" is deprecated and will be removed in the next major version."
    );
    assert!(records[0].manual_steps[0].contains("Remove \"foo.enabled\""));

    // A second read does not append a duplicate record.
    assert!(service.is_enabled_at_path("foo").unwrap());
    assert_eq!(service.handled_deprecated_configs()[0].1.len(), 1);
}

#[test]
fn schemas_may_declare_the_enabled_flag_with_defaults() {
    let (_source, service) = service_over(json!({}));

    service
        .set_schema("foo", ObjectSchema::new().field("enabled", BooleanSchema::new().with_default(false)))
        .unwrap();
    assert!(!service.is_enabled_at_path("foo").unwrap());

    service
        .set_schema("bar", ObjectSchema::new().field("enabled", BooleanSchema::new().with_default(true)))
        .unwrap();
    assert!(service.is_enabled_at_path("bar").unwrap());

    service
        .set_schema("baz", ObjectSchema::new().field("different", BooleanSchema::new().with_default(true)))
        .unwrap();
    assert!(service.is_enabled_at_path("baz").unwrap());
}

#[test]
fn a_schema_without_an_enabled_field_yields_no_enabled_value() {
    let (_source, service) = service_over(json!({"pid": {"file": "/some/file.pid"}}));
    service
        .set_schema("pid", ObjectSchema::new().field("file", StringSchema::new()))
        .unwrap();

    let subscription = service.at_path("pid").unwrap();
    let value = subscription.recv().unwrap().unwrap();
    assert_eq!(value.get("enabled"), None);
}

#[test]
fn validate_succeeds_when_every_schema_is_valid() {
    let (_source, service) = service_over(json!({"string_key": "foo", "number_key": 42}));
    service.set_schema("string_key", StringSchema::new()).unwrap();
    service.set_schema("number_key", NumberSchema::new()).unwrap();

    service.validate().unwrap();
}

#[test]
fn validate_fails_fast_in_registration_order() {
    let (_source, service) = service_over(json!({"string_key": 123, "number_key": "nope"}));
    service.set_schema("string_key", StringSchema::new()).unwrap();
    service.set_schema("number_key", NumberSchema::new()).unwrap();

    let error = service.validate().unwrap_err();
    assert_eq!(
        error.to_string(),
        "[config validation of [string_key]]: expected value of type [string] but got [number]"
    );
}

#[test]
fn validate_records_deprecations_grouped_by_path() {
    let (_source, service) = service_over(json!({"base": {"unused": "unused_config"}}));
    service.add_deprecation_provider("base", |d| vec![d.unused("unused")]);

    service.validate().unwrap();

    let deprecations = service.handled_deprecated_configs();
    assert_eq!(deprecations.len(), 1);
    let (path, records) = &deprecations[0];
    assert_eq!(path, "base");
    assert_eq!(records[0].message, "You no longer need to configure \"base.unused\".");
    assert!(!records[0].silent);
}

#[test]
fn silent_deprecations_are_recorded_but_flagged() {
    let (_source, service) = service_over(json!({
        "svc": {"auto": 1, "old": 2},
    }));
    service.add_deprecation_provider("svc", |d| {
        vec![d.unused("auto").silent(), d.renamed("old", "new")]
    });

    service.validate().unwrap();

    let records = &service.handled_deprecated_configs()[0].1;
    assert_eq!(records.len(), 2);
    assert!(records[0].silent);
    assert!(!records[1].silent);
}

#[test]
fn validate_without_deprecation_logging_skips_the_pass_entirely() {
    let (_source, service) = service_over(json!({"svc": {"old": 1}}));
    service.add_deprecation_provider("svc", |d| vec![d.renamed("old", "new")]);

    let changed = service.deprecated_config_paths();
    assert!(changed.try_recv().unwrap().is_empty());

    service.validate_with(ValidateOptions { log_deprecations: false }).unwrap();

    assert!(service.handled_deprecated_configs().is_empty());
    assert!(changed.try_recv().is_none());
}

#[test]
fn deprecation_rewrites_feed_the_validated_values() {
    let (_source, service) = service_over(json!({"svc": {"old": "kept"}}));
    service.add_deprecation_provider("svc", |d| vec![d.renamed("old", "new")]);
    service
        .set_schema("svc", ObjectSchema::new().field("new", StringSchema::new().with_default("unset")))
        .unwrap();

    let subscription = service.at_path("svc").unwrap();
    assert_eq!(*subscription.recv().unwrap().unwrap(), json!({"new": "kept"}));
}

#[test]
fn deprecated_config_paths_emit_after_each_pass() {
    let (_source, service) = service_over(json!({"svc": {"old": 1}}));
    service.add_deprecation_provider("svc", |d| vec![d.renamed("old", "new")]);
    service.set_schema("svc", ObjectSchema::new().field("new", NumberSchema::new())).unwrap();

    service.validate().unwrap();

    let changed = service.deprecated_config_paths();
    let paths = changed.recv().unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].old_path.as_deref(), Some("svc.old"));
    assert_eq!(paths[0].new_path.as_deref(), Some("svc.new"));
}

#[test]
fn at_path_sync_returns_the_value_after_validate() {
    let (_source, service) = service_over(json!({"key": "foo"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    service.validate().unwrap();

    assert_eq!(*service.at_path_sync("key").unwrap(), json!("foo"));
}

#[test]
fn at_path_sync_fails_before_validate() {
    let (_source, service) = service_over(json!({"key": "foo"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    let error = service.at_path_sync("key").unwrap_err();
    assert_eq!(error.to_string(), "`at_path_sync` called before config was validated");
}

#[test]
fn at_path_sync_tracks_raw_emissions_after_the_first_validate() {
    let (source, service) = service_over(json!({"key": "value"}));
    service.set_schema("key", StringSchema::new()).unwrap();

    service.validate().unwrap();
    assert_eq!(*service.at_path_sync("key").unwrap(), json!("value"));

    source.push(json!({"key": "new-value"}));
    assert_eq!(*service.at_path_sync("key").unwrap(), json!("new-value"));
}

#[test]
fn an_error_on_one_path_does_not_terminate_sibling_subscriptions() {
    let (source, service) = service_over(json!({"a": "one", "b": 2}));
    service.set_schema("a", StringSchema::new()).unwrap();
    service.set_schema("b", NumberSchema::new()).unwrap();

    let a = service.at_path("a").unwrap();
    let b = service.at_path("b").unwrap();
    assert_eq!(*a.recv().unwrap().unwrap(), json!("one"));
    assert_eq!(*b.recv().unwrap().unwrap(), json!(2));

    source.push(json!({"a": 123, "b": 3}));

    assert!(a.recv().unwrap().is_err());
    assert_eq!(*b.recv().unwrap().unwrap(), json!(3));

    // The failed path recovers on the next good emission.
    source.push(json!({"a": "back", "b": 3}));
    assert_eq!(*a.recv().unwrap().unwrap(), json!("back"));
}
