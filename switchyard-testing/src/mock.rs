// Recording interceptors and stub handlers

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;
use switchyard_core::{
    Controller, DispatchResult, Error, Flow, Handler, HandlerInterceptor, HandlerOutcome,
    HttpRequest, HttpResponse, Result,
};

/// Shared, ordered record of hook and handler calls.
#[derive(Clone, Default, Debug)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn was_called(&self, call: &str) -> bool {
        self.count(call) > 0
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Interceptor that logs `<label>.<hook>` for every hook it sees.
///
/// Completion is logged as `<label>.completion!` when it carries an error.
pub struct RecordingInterceptor {
    label: String,
    halt_status: Option<u16>,
    log: CallLog,
}

impl RecordingInterceptor {
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            halt_status: None,
            log: log.clone(),
        }
    }

    /// Halt the chain in `before`, answering with `status`.
    pub fn halting(mut self, status: u16) -> Self {
        self.halt_status = Some(status);
        self
    }

    pub fn into_arc(self) -> Arc<dyn HandlerInterceptor> {
        Arc::new(self)
    }

    fn record(&self, hook: &str) {
        self.log.record(format!("{}.{}", self.label, hook));
    }
}

#[async_trait]
impl HandlerInterceptor for RecordingInterceptor {
    async fn before(
        &self,
        _request: &mut HttpRequest,
        response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<Flow> {
        self.record("before");
        match self.halt_status {
            Some(status) => {
                response.send_error(status, format!("halted by {}", self.label));
                Ok(Flow::Halt)
            }
            None => Ok(Flow::Continue),
        }
    }

    async fn after(
        &self,
        _request: &mut HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        _result: Option<&mut DispatchResult>,
    ) -> Result<()> {
        self.record("after");
        Ok(())
    }

    async fn completion(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
        error: Option<&Error>,
    ) -> Result<()> {
        self.record(if error.is_some() { "completion!" } else { "completion" });
        Ok(())
    }

    async fn concurrent_handling_started(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _handler: &Handler,
    ) -> Result<()> {
        self.record("async");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

type ErrorFactory = Arc<dyn Fn() -> Error + Send + Sync>;

enum Reply {
    View(String, Vec<(String, Value)>),
    Text(String),
    Fail(ErrorFactory),
}

/// Controller with a canned reply that logs `<name>` on every call.
pub struct StubController {
    name: String,
    reply: Reply,
    last_modified: Option<SystemTime>,
    log: CallLog,
}

impl StubController {
    /// Reply with `view` and an empty model.
    pub fn view(name: impl Into<String>, view: impl Into<String>) -> Self {
        Self::with_reply(name, Reply::View(view.into(), Vec::new()))
    }

    /// Write `body` directly and render nothing.
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_reply(name, Reply::Text(body.into()))
    }

    /// Fail with a fresh error from `make` on every call.
    pub fn failing<F>(name: impl Into<String>, make: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        Self::with_reply(name, Reply::Fail(Arc::new(make)))
    }

    fn with_reply(name: impl Into<String>, reply: Reply) -> Self {
        Self {
            name: name.into(),
            reply,
            last_modified: None,
            log: CallLog::new(),
        }
    }

    /// Add a model attribute to a view reply.
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Reply::View(_, attributes) = &mut self.reply {
            attributes.push((key.into(), value));
        }
        self
    }

    pub fn last_modified_at(mut self, at: SystemTime) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Log calls into a shared log.
    pub fn logging_to(mut self, log: &CallLog) -> Self {
        self.log = log.clone();
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn into_handler(self) -> Handler {
        let name = self.name.clone();
        Handler::controller(name, self)
    }
}

#[async_trait]
impl Controller for StubController {
    async fn handle(
        &self,
        _request: &mut HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<HandlerOutcome> {
        self.log.record(self.name.as_str());
        match &self.reply {
            Reply::View(view, attributes) => {
                let mut result = DispatchResult::view_name(view.as_str());
                for (key, value) in attributes {
                    result.add_attribute(key.as_str(), value)?;
                }
                Ok(result.into())
            }
            Reply::Text(body) => {
                response.write_text(body.as_str());
                Ok(HandlerOutcome::handled())
            }
            Reply::Fail(make) => Err(make()),
        }
    }

    fn last_modified(&self, _request: &HttpRequest) -> Option<SystemTime> {
        self.last_modified
    }
}
