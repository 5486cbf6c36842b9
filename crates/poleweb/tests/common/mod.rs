#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use poleweb::{Context, Engine, Request, Response, Result, StatusCode};
use tracing_subscriber::fmt::MakeWriter;

/// `GET /hello/:name` handler from the demo application.
pub fn hello(ctx: &mut Context) -> Result<()> {
    let body = format!(
        "hello {}, you're at {}\n",
        ctx.param("name").unwrap_or_default(),
        ctx.path()
    );
    ctx.string(StatusCode::OK, &body);
    Ok(())
}

/// A handler answering 200 with a fixed body.
pub fn text(body: &'static str) -> impl Fn(&mut Context) -> Result<()> + Send + Sync + 'static {
    move |ctx: &mut Context| {
        ctx.string(StatusCode::OK, body);
        Ok(())
    }
}

pub fn get(engine: &Engine, target: &str) -> Response {
    engine.handle_request(Request::get(target))
}

pub fn body(res: &Response) -> String {
    res.body_string()
        .unwrap_or_else(|| panic!("response body is not UTF-8: {:?}", res.body))
}

/// Shared buffer that tracing output is written into.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a subscriber recording DEBUG and above; returns `f`'s
/// result and the log text.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}
