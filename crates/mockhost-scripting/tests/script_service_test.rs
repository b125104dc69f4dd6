//! Integration tests for the Rhai script service

use mockhost_scripting::dsl::{FailureSimulationType, ResponseBehaviourType};
use mockhost_scripting::prelude::*;
use mockhost_scripting::{FailureCause, ObjectProxyingStore};
use mockhost_store::{ObjectRef, StoreService, StoreValue};
use std::error::Error as _;
use std::sync::Arc;

fn service() -> RhaiScriptService {
    RhaiScriptService::new(ScriptingConfig::default())
}

#[test]
fn test_bindings_visible_by_name_and_namespace() {
    let service = service();
    let script = ScriptSource::new(
        "visibility.rhai",
        r#"
        if user != __bindings.user { throw "namespace mismatch"; }
        respond.withContent(user + ":" + __bindings.user);
        "#,
    );

    let behaviour = service
        .execute_script(&script, ScriptBindings::new().with("user", "ada".to_string()))
        .unwrap();

    assert_eq!(behaviour.content.as_deref(), Some("ada:ada"));
}

#[test]
fn test_eval_scripts_see_bare_names_only() {
    let service = service();
    let bindings = || ScriptBindings::new().with("method", "GET".to_string());

    assert!(service
        .execute_eval_script("cond", r#"method == "GET""#, bindings())
        .unwrap());
    assert!(service
        .execute_eval_script("cond", "__bindings.method", bindings())
        .is_err());
}

#[test]
fn test_sequential_invocations_are_isolated() {
    let service = service();
    let script = ScriptSource::new(
        "isolation.rhai",
        r#"
        let seen = if is_def_var("leak") { "leaked" } else { "clean" };
        let leak = 1;
        respond.withContent(seen);
        "#,
    );

    for _ in 0..3 {
        let behaviour = service
            .execute_script(&script, ScriptBindings::new())
            .unwrap();
        assert_eq!(behaviour.content.as_deref(), Some("clean"));
    }

    // A value bound for one call is gone on the next
    let probe = ScriptSource::new(
        "probe.rhai",
        r#"respond.withContent(type_of(__bindings.secret));"#,
    );
    service
        .execute_script(&probe, ScriptBindings::new().with("secret", 42_i64))
        .unwrap();
    let behaviour = service
        .execute_script(&probe, ScriptBindings::new())
        .unwrap();
    assert_eq!(behaviour.content.as_deref(), Some("()"));
}

#[test]
fn test_health_check_is_deterministic() {
    let service = service();
    let script = ScriptSource::new("health.rhai", r#"respond.withStatusCode(204);"#);

    for _ in 0..5 {
        service.init_script(&script).unwrap();
    }
}

#[test]
fn test_health_check_never_runs_body() {
    let service = service();
    let script = ScriptSource::new("body.rhai", r#"throw "run() must not be called";"#);

    service.init_script(&script).unwrap();
    assert!(service
        .execute_script(&script, ScriptBindings::new())
        .is_err());
}

#[test]
fn test_eval_boolean_semantics() {
    let service = service();
    let eval = |code: &str| {
        service
            .execute_eval_script("bool", code, ScriptBindings::new())
            .unwrap()
    };

    assert!(eval("true"));
    assert!(eval("1 < 2"));

    assert!(!eval("false"));
    assert!(!eval("1"));
    assert!(!eval(r#""true""#));
    assert!(!eval("()"));
    assert!(!eval(""));
    assert!(!eval("#{ ok: true }"));
}

#[test]
fn test_result_extraction() {
    let service = service();
    let script = ScriptSource::new(
        "result.rhai",
        r#"
        respond
            .withStatusCode(503)
            .withHeader("Retry-After", 30)
            .withExampleName("unavailable")
            .withDelay(250)
            .withFailure("EmptyResponse")
            .skipDefaultBehaviour();
        "#,
    );

    let behaviour = service
        .execute_script(&script, ScriptBindings::new())
        .unwrap();

    assert_eq!(behaviour.status_code, 503);
    assert_eq!(
        behaviour.headers.get("Retry-After").map(String::as_str),
        Some("30")
    );
    assert_eq!(behaviour.example_name.as_deref(), Some("unavailable"));
    assert_eq!(
        behaviour.performance.and_then(|p| p.exact_delay_ms),
        Some(250)
    );
    assert_eq!(
        behaviour.failure_type,
        Some(FailureSimulationType::EmptyResponse)
    );
    assert_eq!(behaviour.behaviour_type, ResponseBehaviourType::ShortCircuit);
}

#[test]
fn test_untouched_result_is_default() {
    let service = service();
    let behaviour = service
        .execute_script(&ScriptSource::inline("let x = 1;"), ScriptBindings::new())
        .unwrap();

    assert_eq!(behaviour, ResponseBehaviour::default());
}

#[test]
fn test_store_proxy_fallback_keeps_store_usable() {
    let stores = StoreService::new();
    let service = service();
    service.after_routes_configured(&stores);

    let script = ScriptSource::new(
        "fallback.rhai",
        r#"
        let s = stores.open("mixed");
        s.save("fn", Fn("uuid"));
        s.save("obj", #{ count: 1 });
        let obj = s.load("obj");
        obj["count"] = obj["count"] + 1;
        respond.withContent(type_of(s.load("fn")));
        "#,
    );

    let bindings = ScriptBindings::new().with("stores", StoresBinding::new(stores.clone()));
    let behaviour = service.execute_script(&script, bindings).unwrap();
    assert_eq!(behaviour.content.as_deref(), Some("Fn"));

    let store = stores.get_store("mixed").unwrap();
    let obj = store.load("obj").unwrap().unwrap();
    assert_eq!(
        obj.as_object().unwrap().get("count"),
        Some(StoreValue::Int(2))
    );
    assert!(store.load("fn").unwrap().unwrap().as_foreign().is_some());
}

#[test]
fn test_host_mutations_visible_through_proxy() {
    let stores = StoreService::new();
    stores.register_interceptor("rhai", ObjectProxyingStore::interceptor());

    let shared = ObjectRef::from_entries([("status", StoreValue::from("pending"))]);
    stores
        .open_store("orders")
        .save("o1", StoreValue::Object(shared.clone()))
        .unwrap();
    shared.insert("status", StoreValue::from("shipped"));

    let service = service();
    let script = ScriptSource::new(
        "orders.rhai",
        r#"respond.withContent(stores.open("orders").load("o1")["status"]);"#,
    );
    let behaviour = service
        .execute_script(
            &script,
            ScriptBindings::new().with("stores", StoresBinding::new(stores)),
        )
        .unwrap();

    assert_eq!(behaviour.content.as_deref(), Some("shipped"));
}

#[test]
fn test_failures_are_uniformly_wrapped() {
    let service = service();
    let cases = [
        ("syntax.rhai", "let = ;"),
        ("throws.rhai", r#"throw "bad";"#),
        ("runtime.rhai", "let x = 1 / 0;"),
        ("stray-brace.rhai", "}\nfn helper() { 1 }\n{"),
    ];

    for (id, code) in cases {
        let err = service
            .execute_script(&ScriptSource::new(id, code), ScriptBindings::new())
            .unwrap_err();

        assert_eq!(err.script(), id);
        assert_eq!(
            err.to_string(),
            format!("Script execution terminated abnormally: {id}")
        );
        assert!(err.source().is_some());
    }

    let err = service
        .execute_script(
            &ScriptSource::new("throws.rhai", r#"throw "bad";"#),
            ScriptBindings::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err.cause(),
        FailureCause::Invocation { operation: "run", .. }
    ));

    let err = service
        .execute_eval_script("eval.rhai", "missing + 1", ScriptBindings::new())
        .unwrap_err();
    assert!(matches!(err.cause(), FailureCause::Evaluation { .. }));
}

#[test]
fn test_service_usable_after_failure() {
    let service = service();
    let _ = service.execute_script(
        &ScriptSource::new("bad.rhai", r#"throw "x";"#),
        ScriptBindings::new(),
    );

    let behaviour = service
        .execute_script(
            &ScriptSource::new("good.rhai", "respond.withStatusCode(202);"),
            ScriptBindings::new(),
        )
        .unwrap();
    assert_eq!(behaviour.status_code, 202);
}

#[test]
fn test_concurrent_invocations_do_not_cross_talk() {
    let service = Arc::new(service());
    let script = ScriptSource::new(
        "echo.rhai",
        r#"
        let total = 0;
        for i in 0..100 { total += i; }
        respond.withStatusCode(200 + id % 100).withContent(`${id}:${total}`);
        "#,
    );

    std::thread::scope(|scope| {
        for thread in 0..8_i64 {
            let service = Arc::clone(&service);
            let script = script.clone();
            scope.spawn(move || {
                for round in 0..50_i64 {
                    let id = thread * 1_000 + round;
                    let behaviour = service
                        .execute_script(&script, ScriptBindings::new().with("id", id))
                        .unwrap();

                    assert_eq!(behaviour.content, Some(format!("{id}:4950")));
                    assert_eq!(i64::from(behaviour.status_code), 200 + id % 100);
                }
            });
        }
    });

    let stats = service.cache_stats();
    assert_eq!(stats.cached_scripts, 1);
    assert_eq!(stats.hits + stats.misses, 400);
}
