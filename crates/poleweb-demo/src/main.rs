//! poleweb demo server
//!
//! Serves the sample routes: greetings, a login form, versioned groups
//! (`/v3` always fails), static assets and a few template pages.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use poleweb::{
    handler, logger, Context, Engine, JinjaTemplates, RouteMethod, RouterError, Schema,
    ServerConfig, StatusCode,
};

/// Demo server for the poleweb toolkit.
#[derive(Parser)]
#[command(name = "poleweb-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, env = "POLEWEB_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides the configuration file.
    #[arg(short, long, env = "POLEWEB_BIND")]
    bind: Option<String>,

    /// Directory served under /assets.
    #[arg(long, env = "POLEWEB_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Directory holding the page templates.
    #[arg(long, env = "POLEWEB_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    /// Enable verbose output. Ignored when RUST_LOG is set.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct Student {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Age")]
    age: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct User {
    name: String,
    #[serde(default)]
    age: u32,
    #[serde(default)]
    addresses: Vec<String>,
    email: String,
}

fn user_schema() -> Schema {
    Schema::new()
        .required(["name", "email"])
        .optional(["age", "addresses"])
        .deny_unknown_fields()
}

fn format_as_date(value: String) -> String {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or(value)
}

fn templates(dir: &Path) -> JinjaTemplates {
    let mut templates = JinjaTemplates::from_dir(dir);
    templates
        .environment_mut()
        .add_function("FormatAsDate", format_as_date);
    templates
}

fn css_page(ctx: &mut Context) -> poleweb::Result<()> {
    ctx.template(StatusCode::OK, "css.tmpl", &serde_json::Value::Null)
}

fn hello_query(ctx: &mut Context) -> poleweb::Result<()> {
    let name = ctx.query("name").unwrap_or_default().to_string();
    let path = ctx.path().to_string();
    ctx.string_fmt(StatusCode::OK, format_args!("hello {name}, you're at {path}\n"))
}

fn hello_param(ctx: &mut Context) -> poleweb::Result<()> {
    let name = ctx.param("name").unwrap_or_default().to_string();
    let path = ctx.path().to_string();
    ctx.string_fmt(StatusCode::OK, format_args!("hello {name}, you're at {path}\n"))
}

fn login(ctx: &mut Context) -> poleweb::Result<()> {
    let reply = serde_json::json!({
        "username": ctx.post_form("username").unwrap_or_default(),
        "password": ctx.post_form("password").unwrap_or_default(),
    });
    ctx.json(StatusCode::OK, &reply)
}

fn only_for_v3(ctx: &mut Context) -> poleweb::Result<()> {
    let started = Instant::now();
    ctx.fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    info!(
        "[{}] {} in {:?} for group v3",
        ctx.status_code().as_u16(),
        ctx.request_uri(),
        started.elapsed()
    );
    Ok(())
}

fn log_around(ctx: &mut Context) -> poleweb::Result<()> {
    let started = Instant::now();
    info!(params = ?ctx.params(), query = ?ctx.request().query, "request parameters");
    let result = ctx.next();
    info!(elapsed = ?started.elapsed(), "route finished");
    result
}

fn build_engine(config: &ServerConfig) -> poleweb::Result<Engine> {
    let mut engine = Engine::with_config(config);
    engine.middleware(logger());
    if let Some(dir) = &config.template_dir {
        engine.set_templates(templates(dir));
    }
    if let Some(dir) = &config.static_dir {
        engine.static_dir("/assets", dir)?;
    }

    engine.get("/", css_page)?;
    engine.get("/hello", hello_query)?;
    engine.post("/login", login)?;
    engine.get("/hello/:name", hello_param)?;

    let mut v1 = engine.group("/v1");
    v1.get("/", css_page)?;
    v1.get("/hello", hello_query)?;

    let mut v2 = engine.group("/v2");
    v2.get("/hello/:name", hello_param)?;
    v2.post("/login", login)?;

    let mut v3 = engine.group("/v3");
    v3.middleware(only_for_v3);
    v3.get("/hello/:name", hello_param)?;

    engine.get("/students", |ctx| {
        let students = [
            Student {
                name: "trueno".to_string(),
                age: 23,
            },
            Student {
                name: "Jack".to_string(),
                age: 22,
            },
        ];
        ctx.template(
            StatusCode::OK,
            "arr.tmpl",
            &serde_json::json!({ "title": "pole", "stuArr": students }),
        )
    })?;

    engine.get("/date", |ctx| {
        let now = Utc
            .with_ymd_and_hms(2019, 8, 17, 0, 0, 0)
            .single()
            .ok_or_else(|| RouterError::fault("invalid demo date"))?;
        ctx.template(
            StatusCode::OK,
            "custom_func.tmpl",
            &serde_json::json!({ "title": "pole", "now": now }),
        )
    })?;

    let mut test = engine.group("test");
    test.any("/t1", |ctx| {
        let peer = ctx
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        ctx.string_fmt(StatusCode::OK, format_args!("{peer} hello world"))
    })?;
    test.any("/login", |ctx| {
        ctx.template(StatusCode::OK, "login.html", &serde_json::json!({ "Name": "jack" }))
    })?;
    test.handle_with(
        RouteMethod::Any,
        "/mid",
        vec![handler(log_around)],
        |ctx| {
            ctx.html(StatusCode::OK, "<h1>middleware chain</h1>");
            Ok(())
        },
    )?;
    test.post("/jsonParam", |ctx| match ctx.bind_json::<Vec<User>>(&user_schema()) {
        Ok(users) => ctx.json(StatusCode::OK, &users),
        Err(err) => {
            info!(error = %err, "rejected jsonParam body");
            ctx.fail(StatusCode::BAD_REQUEST, &err.to_string());
            Ok(())
        }
    })?;

    Ok(engine)
}

fn demo_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(dir) = cli.static_dir {
        config.static_dir = Some(dir);
    }
    if let Some(dir) = cli.template_dir {
        config.template_dir = Some(dir);
    }
    config.static_dir.get_or_insert_with(|| demo_dir("static"));
    config.template_dir.get_or_insert_with(|| demo_dir("templates"));

    let engine = build_engine(&config)?;
    for (method, pattern) in engine.routes() {
        info!("{method:<7} {pattern}");
    }
    engine.run(&config.bind_address).await?;
    Ok(())
}
