// Dispatchers assembled from configuration documents

use std::sync::Arc;
use switchyard_config::{FileFormat, InterceptorCatalog, SwitchyardConfig};
use switchyard_core::{Error, Handler, HttpRequest, HttpResponse, StaticHandlerRegistry};

const CONFIG: &str = r#"
[dispatcher]
throw_if_no_handler_found = true

[routes.paths]
"/greet/{name}" = "greeter"

[[routes.interceptors]]
name = "logging"
"#;

fn registry() -> Arc<StaticHandlerRegistry> {
    let registry = Arc::new(StaticHandlerRegistry::new());
    registry.register(Handler::from_fn("greeter", |req: HttpRequest| async move {
        let name = req.param("name").cloned().unwrap_or_default();
        Ok(HttpResponse::ok().with_body(format!("hello {}", name).into_bytes()))
    }));
    registry
}

#[tokio::test]
async fn test_dispatcher_from_toml() {
    let config = SwitchyardConfig::parse(CONFIG, FileFormat::Toml).unwrap();
    let dispatcher = config
        .dispatcher_builder(registry(), &InterceptorCatalog::new())
        .unwrap()
        .build()
        .unwrap();

    let mut req = HttpRequest::new("GET", "/greet/ada");
    let mut res = HttpResponse::ok();
    dispatcher.dispatch(&mut req, &mut res).await.unwrap();
    assert_eq!(res.body_string(), "hello ada");

    let mut req = HttpRequest::new("GET", "/nowhere");
    let mut res = HttpResponse::ok();
    let err = dispatcher.dispatch(&mut req, &mut res).await.unwrap_err();
    assert!(matches!(err, Error::NoHandlerFound { .. }));
}

#[tokio::test]
async fn test_empty_manifest_detects_named_handlers() {
    let registry = Arc::new(StaticHandlerRegistry::new());
    registry.register(Handler::from_fn("/ping", |_req| async {
        Ok(HttpResponse::ok().with_body(b"pong".to_vec()))
    }));

    let config = SwitchyardConfig::default();
    let dispatcher = config
        .dispatcher_builder(registry, &InterceptorCatalog::new())
        .unwrap()
        .build()
        .unwrap();

    let mut req = HttpRequest::new("GET", "/ping");
    let mut res = HttpResponse::ok();
    dispatcher.dispatch(&mut req, &mut res).await.unwrap();
    assert_eq!(res.body_string(), "pong");
}
