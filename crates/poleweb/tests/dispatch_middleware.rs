//! Tests for group middleware and chain control.

mod common;
use common::*;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use poleweb::{logger, Context, Engine, StatusCode};

fn only_for_v3(ctx: &mut Context) -> poleweb::Result<()> {
    let started = Instant::now();
    ctx.fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    tracing::info!(
        "[{}] {} in {:?} for group v3",
        ctx.status_code().as_u16(),
        ctx.request_uri(),
        started.elapsed()
    );
    Ok(())
}

fn recorder(trace: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl Fn(&mut Context) -> poleweb::Result<()> + Send + Sync + 'static {
    let trace = Arc::clone(trace);
    move |ctx: &mut Context| {
        trace.lock().unwrap().push(format!("{name}>"));
        ctx.next()?;
        trace.lock().unwrap().push(format!("<{name}"));
        Ok(())
    }
}

#[test]
fn v3_group_fails_with_500_and_logs() {
    let mut engine = Engine::new();
    engine.get("/hello/:name", hello).unwrap();
    let mut v3 = engine.group("/v3");
    v3.middleware(only_for_v3);
    v3.get("/hello/:name", hello).unwrap();

    let (res, logs) = capture_logs(|| get(&engine, "/v3/hello/x"));
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&res), r#"{"message":"Internal Server Error"}"#);
    assert!(!body(&res).contains("hello"));
    assert!(logs.contains("[500] /v3/hello/x"), "logs: {logs}");
    assert!(logs.contains("for group v3"), "logs: {logs}");

    let res = get(&engine, "/hello/x");
    assert_eq!(res.status, StatusCode::OK);
}

#[test]
fn group_middleware_is_scoped_to_its_prefix() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    engine.get("/v10/x", text("v10")).unwrap();
    engine.get("/x", text("root")).unwrap();
    let mut v1 = engine.group("/v1");
    v1.middleware(recorder(&trace, "v1"));
    v1.get("/x", text("v1")).unwrap();

    get(&engine, "/x");
    get(&engine, "/v10/x");
    assert!(trace.lock().unwrap().is_empty());

    assert_eq!(body(&get(&engine, "/v1/x")), "v1");
    assert_eq!(*trace.lock().unwrap(), ["v1>", "<v1"]);
}

#[test]
fn chain_runs_outer_to_inner() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    engine.middleware(recorder(&trace, "engine"));

    let mut api = engine.group("/api");
    api.middleware(recorder(&trace, "api"));
    let mut admin = api.group("/admin");
    admin.middleware(recorder(&trace, "admin"));
    let t = Arc::clone(&trace);
    admin
        .get("/users", move |ctx| {
            t.lock().unwrap().push("handler".to_string());
            ctx.string(StatusCode::OK, "users");
            Ok(())
        })
        .unwrap();

    assert_eq!(body(&get(&engine, "/api/admin/users")), "users");
    assert_eq!(
        *trace.lock().unwrap(),
        ["engine>", "api>", "admin>", "handler", "<admin", "<api", "<engine"]
    );
}

#[test]
fn middleware_without_next_short_circuits() {
    let reached = Arc::new(Mutex::new(false));
    let mut engine = Engine::new();
    let mut private = engine.group("/private");
    private.middleware(|ctx| {
        ctx.string(StatusCode::UNAUTHORIZED, "blocked");
        Ok(())
    });
    let r = Arc::clone(&reached);
    private
        .get("/data", move |ctx| {
            *r.lock().unwrap() = true;
            ctx.string(StatusCode::OK, "secret");
            Ok(())
        })
        .unwrap();

    let res = get(&engine, "/private/data");
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(body(&res), "blocked");
    assert!(!*reached.lock().unwrap());
}

#[test]
fn abort_stops_later_handlers_but_unwinds_outer_ones() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    engine.middleware(recorder(&trace, "outer"));
    engine.middleware(|ctx| {
        ctx.abort();
        ctx.string(StatusCode::FORBIDDEN, "aborted");
        ctx.next()
    });
    engine.get("/x", text("never")).unwrap();

    let res = get(&engine, "/x");
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(body(&res), "aborted");
    assert_eq!(*trace.lock().unwrap(), ["outer>", "<outer"]);
}

#[test]
fn logger_writes_one_line_per_request() {
    let mut engine = Engine::new();
    engine.middleware(logger());
    engine.get("/hello/:name", hello).unwrap();

    let (res, logs) = capture_logs(|| get(&engine, "/hello/trueno"));
    assert_eq!(res.status, StatusCode::OK);
    let line = logs
        .lines()
        .find(|l| l.contains("INFO"))
        .unwrap_or_else(|| panic!("no INFO line in {logs}"));
    assert!(line.contains("status=200"), "{line}");
    assert!(line.contains("method=GET"), "{line}");
    assert!(line.contains("uri=/hello/trueno"), "{line}");
}

#[test]
fn keys_flow_from_middleware_to_handler() {
    let mut engine = Engine::new();
    engine.middleware(|ctx| {
        ctx.set("user", "jack");
        ctx.next()
    });
    engine
        .get("/me", |ctx| {
            let user = ctx.get("user").cloned().unwrap_or_default();
            ctx.json(StatusCode::OK, &serde_json::json!({ "user": user }))
        })
        .unwrap();

    assert_eq!(body(&get(&engine, "/me")), r#"{"user":"jack"}"#);
}

fn blocked(ctx: &mut Context) -> poleweb::Result<()> {
    ctx.string(StatusCode::UNAUTHORIZED, "blocked");
    Ok(())
}

#[test]
fn empty_segments_do_not_skip_group_middleware() {
    let mut engine = Engine::new();
    let mut v3 = engine.group("/v3");
    v3.middleware(blocked);
    v3.get("/hello/:name", hello).unwrap();
    let mut v1 = engine.group("/v1");
    let mut admin = v1.group("/admin");
    admin.middleware(blocked);
    admin.get("/users/:id", hello).unwrap();

    for target in [
        "/v3/hello/x",
        "//v3/hello/x",
        "/v3//hello/x/",
        "/v1/admin/users/7",
        "/v1//admin/users/7",
        "//v1/admin//users/7",
    ] {
        let res = get(&engine, target);
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{target}");
        assert_eq!(body(&res), "blocked", "{target}");
    }
}

#[test]
fn group_prefix_with_param_scopes_its_middleware() {
    let mut engine = Engine::new();
    engine.get("/users/me/profile", text("me")).unwrap();
    let mut user = engine.group("/users/:id");
    user.middleware(blocked);
    user.get("/profile", hello).unwrap();

    let res = get(&engine, "/users/5/profile");
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(body(&res), "blocked");

    let res = get(&engine, "/users/me/profile");
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(body(&res), "me");
}
