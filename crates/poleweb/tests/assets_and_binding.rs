//! Tests for static files, templates and body binding through the engine.

mod common;
use common::*;

use std::fs;

use poleweb::{
    BindError, Engine, JinjaTemplates, Request, Schema, StatusCode, XmlBinder, TEXT_HTML,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct User {
    name: String,
    #[serde(default)]
    age: u32,
    #[serde(default)]
    addresses: Vec<String>,
    email: Option<String>,
}

fn user_schema() -> Schema {
    Schema::new().required(["name", "email"])
}

fn bind_engine() -> Engine {
    let mut engine = Engine::new();
    engine
        .post("/json", |ctx| match ctx.bind::<Vec<User>>(&user_schema()) {
            Ok(users) => ctx.json(StatusCode::OK, &users),
            Err(err) => {
                ctx.fail(StatusCode::BAD_REQUEST, &err.to_string());
                Ok(())
            }
        })
        .unwrap();
    engine
        .post("/xml", |ctx| {
            let user: User = ctx.should_bind_with(&XmlBinder, &user_schema())?;
            ctx.json(StatusCode::OK, &user)
        })
        .unwrap();
    engine
}

#[test]
fn static_dir_serves_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("css")).unwrap();
    fs::write(dir.path().join("css/a.css"), "body { margin: 0 }").unwrap();

    let mut engine = Engine::new();
    engine.static_dir("/assets", dir.path()).unwrap();

    let res = get(&engine, "/assets/css/a.css");
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.get_header("content-type"), Some("text/css"));
    assert_eq!(body(&res), "body { margin: 0 }");

    let res = get(&engine, "/assets/css/missing.css");
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(body(&res), "/assets/css/missing.css not found\n");

    let res = get(&engine, "/assets/../Cargo.toml");
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[test]
fn static_dir_inside_a_group() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("car.jpg"), b"\xff\xd8\xff").unwrap();

    let mut engine = Engine::new();
    engine.group("/test").static_dir("/files/", dir.path()).unwrap();

    let res = get(&engine, "/test/files/car.jpg");
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.get_header("content-type"), Some("image/jpeg"));
    assert_eq!(&res.body[..], b"\xff\xd8\xff");
}

#[test]
fn templates_render_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("arr.tmpl"),
        "{{ title }}:{% for s in stuArr %} {{ s.Name }}={{ s.Age }}{% endfor %}",
    )
    .unwrap();

    let mut engine = Engine::new();
    engine.load_templates(dir.path());
    engine
        .get("/students", |ctx| {
            ctx.template(
                StatusCode::OK,
                "arr.tmpl",
                &serde_json::json!({
                    "title": "pole",
                    "stuArr": [{"Name": "trueno", "Age": 23}, {"Name": "Jack", "Age": 22}],
                }),
            )
        })
        .unwrap();
    engine
        .get("/missing", |ctx| {
            ctx.template(StatusCode::OK, "nope.tmpl", &serde_json::Value::Null)
        })
        .unwrap();

    let res = get(&engine, "/students");
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.get_header("content-type"), Some(TEXT_HTML));
    assert_eq!(body(&res), "pole: trueno=23 Jack=22");

    assert_eq!(
        get(&engine, "/missing").status,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn inline_templates_escape_html() {
    let mut templates = JinjaTemplates::new();
    templates
        .add_template("login.html", "<p>{{ name }}</p>")
        .unwrap();

    let mut engine = Engine::new();
    engine.set_templates(templates);
    engine
        .any("/login", |ctx| {
            ctx.template(StatusCode::OK, "login.html", &serde_json::json!({"name": "<jack>"}))
        })
        .unwrap();

    assert_eq!(body(&get(&engine, "/login")), "<p>&lt;jack&gt;</p>");
}

#[test]
fn json_binding_checks_every_record() {
    let engine = bind_engine();

    let res = engine.handle_request(
        Request::post("/json")
            .header("content-type", "application/json")
            .body(r#"[{"name":"jack","age":20,"email":"j@x.io","addresses":["a"]}]"#),
    );
    assert_eq!(res.status, StatusCode::OK);
    assert!(body(&res).contains(r#""name":"jack""#));

    let res = engine.handle_request(
        Request::post("/json")
            .header("content-type", "application/json")
            .body(r#"[{"name":"jack","email":"j@x.io"},{"name":"anon"}]"#),
    );
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(body(&res), r#"{"message":"field [email] is required"}"#);
}

#[test]
fn bind_error_propagated_with_question_mark_is_a_500() {
    let engine = bind_engine();

    let res = engine.handle_request(
        Request::post("/xml")
            .header("content-type", "application/xml")
            .body("<user><name>jack</name><email>j@x.io</email></user>"),
    );
    assert_eq!(res.status, StatusCode::OK);
    assert!(body(&res).contains(r#""email":"j@x.io""#));

    let res = engine.handle_request(
        Request::post("/xml")
            .header("content-type", "application/xml")
            .body("<user><name>jack</name></user>"),
    );
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn post_form_values() {
    let mut engine = Engine::new();
    engine
        .post("/login", |ctx| {
            let reply = serde_json::json!({
                "username": ctx.post_form("username"),
                "password": ctx.post_form("password"),
            });
            ctx.json(StatusCode::OK, &reply)
        })
        .unwrap();

    let res = engine.handle_request(
        Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("username=jack&password=123"),
    );
    let reply: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(reply["username"], "jack");
    assert_eq!(reply["password"], "123");
}

#[test]
fn unsupported_content_type_is_reported_to_the_handler() {
    let mut engine = Engine::new();
    engine
        .post("/upload", |ctx| {
            let status = match ctx.bind::<User>(&user_schema()) {
                Err(BindError::UnsupportedContentType(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Err(_) => StatusCode::BAD_REQUEST,
                Ok(_) => StatusCode::OK,
            };
            ctx.status(status);
            Ok(())
        })
        .unwrap();

    let res = engine.handle_request(
        Request::post("/upload")
            .header("content-type", "multipart/form-data; boundary=x")
            .body("--x--"),
    );
    assert_eq!(res.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
