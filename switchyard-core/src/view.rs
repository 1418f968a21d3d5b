//! Views, view resolvers and default view names.
//!
//! A [`DispatchResult`](crate::DispatchResult) names a view logically. At
//! render time the dispatcher asks the [`ViewResolverChain`] to turn the name
//! into a [`View`], then renders the model through it. When a handler
//! produced a result without a view, a [`ViewNameTranslator`] derives a name
//! from the request.
//!
//! ```rust
//! use std::sync::Arc;
//! use switchyard_core::{JsonViewResolver, Locale, RedirectViewResolver, ViewResolverChain};
//!
//! let chain = ViewResolverChain::new()
//!     .with_resolver(JsonViewResolver::new())
//!     .with_resolver(RedirectViewResolver::new());
//!
//! let locale = Locale::default();
//! let view = chain.resolve_view_name("redirect:/login", &locale).unwrap().unwrap();
//! assert_eq!(view.name(), "redirect:/login");
//! let view = chain.resolve_view_name("users/show", &locale).unwrap().unwrap();
//! assert_eq!(view.name(), "json");
//! ```

use crate::error::{Error, Result};
use crate::flash::{FlashMapManagerHandle, OutputFlashMap};
use crate::http::{HttpRequest, HttpResponse, parse_query_string};
use crate::locale::Locale;
use crate::logging::{debug, trace};
use crate::mapping::LOWEST_PRECEDENCE;
use crate::path_helper::PathHelper;
use crate::result::Model;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// View Trait
// ============================================================================

/// Renders a model into a response.
#[async_trait]
pub trait View: Send + Sync + 'static {
    async fn render(
        &self,
        model: &Model,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()>;

    /// Name for logging; resolvers typically use the logical view name.
    fn name(&self) -> &str;

    fn content_type(&self) -> Option<&str> {
        None
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ============================================================================
// Built-in Views
// ============================================================================

/// Serializes the model as a JSON object.
#[derive(Debug, Clone)]
pub struct JsonView {
    name: String,
    pretty: bool,
    extract_single_key: bool,
    excluded: HashSet<String>,
}

impl JsonView {
    pub fn new() -> Self {
        Self {
            name: "json".to_string(),
            pretty: false,
            extract_single_key: false,
            excluded: HashSet::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Render the bare value when the model holds exactly one attribute.
    pub fn extract_single_key(mut self, extract: bool) -> Self {
        self.extract_single_key = extract;
        self
    }

    /// Leave `key` out of the output.
    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.excluded.insert(key.into());
        self
    }

    fn payload(&self, model: &Model) -> Value {
        let mut filtered: serde_json::Map<String, Value> = model
            .iter()
            .filter(|(k, _)| !self.excluded.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if self.extract_single_key
            && filtered.len() == 1
            && let Some((_, value)) = filtered.iter_mut().next()
        {
            return value.take();
        }
        Value::Object(filtered)
    }
}

impl Default for JsonView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl View for JsonView {
    async fn render(
        &self,
        model: &Model,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()> {
        let payload = self.payload(model);
        let body = if self.pretty {
            serde_json::to_vec_pretty(&payload)?
        } else {
            serde_json::to_vec(&payload)?
        };
        response.set_header("Content-Type", "application/json");
        response.body = body;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> Option<&str> {
        Some("application/json")
    }
}

/// Plain text with `{key}` placeholders filled from the model.
///
/// ```rust
/// use switchyard_core::{HttpRequest, HttpResponse, TextView, View};
///
/// # tokio_test::block_on(async {
/// let view = TextView::new("greeting", "Hello, {name}!");
/// let mut model = switchyard_core::Model::new();
/// model.insert("name".into(), "Ada".into());
/// let mut res = HttpResponse::ok();
/// view.render(&model, &HttpRequest::new("GET", "/"), &mut res).await.unwrap();
/// assert_eq!(res.body_string(), "Hello, Ada!");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TextView {
    name: String,
    template: String,
}

impl TextView {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    fn fill(&self, model: &Model) -> String {
        let mut out = self.template.clone();
        for (key, value) in model {
            let text = scalar_text(value).unwrap_or_else(|| value.to_string());
            out = out.replace(&format!("{{{}}}", key), &text);
        }
        out
    }
}

#[async_trait]
impl View for TextView {
    async fn render(
        &self,
        model: &Model,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()> {
        response.write_text(self.fill(model));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> Option<&str> {
        Some("text/plain; charset=utf-8")
    }
}

/// Redirects to a URL.
///
/// `{var}` placeholders in the URL are expanded from the request's template
/// variables and then the model. Remaining scalar model attributes are
/// appended as query parameters unless disabled. If the request carries a
/// non-empty [`OutputFlashMap`], it is saved for the redirect target.
#[derive(Debug, Clone)]
pub struct RedirectView {
    name: String,
    url: String,
    context_relative: bool,
    http10_compatible: bool,
    expose_model_attributes: bool,
    status: Option<u16>,
}

impl RedirectView {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: format!("redirect:{}", url),
            url,
            context_relative: true,
            http10_compatible: true,
            expose_model_attributes: true,
            status: None,
        }
    }

    /// Prefix absolute paths with the request's context path.
    pub fn context_relative(mut self, enabled: bool) -> Self {
        self.context_relative = enabled;
        self
    }

    /// `true` sends 302; `false` sends 303 See Other.
    pub fn http10_compatible(mut self, enabled: bool) -> Self {
        self.http10_compatible = enabled;
        self
    }

    pub fn expose_model_attributes(mut self, enabled: bool) -> Self {
        self.expose_model_attributes = enabled;
        self
    }

    /// Explicit status, overriding the 302/303 choice.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn target_url(&self, model: &Model, request: &HttpRequest) -> Result<String> {
        let mut used = HashSet::new();
        let mut url = String::with_capacity(self.url.len());
        let mut rest = self.url.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let var = &rest[start + 1..start + len];
            let value = request
                .path_params
                .get(var)
                .cloned()
                .or_else(|| model.get(var).and_then(scalar_text))
                .ok_or_else(|| {
                    Error::Internal(format!("no value for redirect URI variable '{}'", var))
                })?;
            url.push_str(&rest[..start]);
            url.push_str(&urlencoding::encode(&value));
            used.insert(var.to_string());
            rest = &rest[start + len + 1..];
        }
        url.push_str(rest);

        if self.context_relative && url.starts_with('/') {
            url = format!("{}{}", request.context_path.trim_end_matches('/'), url);
        }

        if self.expose_model_attributes {
            let query: Vec<String> = model
                .iter()
                .filter(|(k, _)| !used.contains(*k))
                .filter_map(|(k, v)| {
                    scalar_text(v).map(|text| {
                        format!("{}={}", urlencoding::encode(k), urlencoding::encode(&text))
                    })
                })
                .collect();
            if !query.is_empty() {
                let (fragment_free, fragment) = match url.split_once('#') {
                    Some((u, f)) => (u.to_string(), Some(f.to_string())),
                    None => (url.clone(), None),
                };
                let sep = if fragment_free.contains('?') { '&' } else { '?' };
                url = format!("{}{}{}", fragment_free, sep, query.join("&"));
                if let Some(fragment) = fragment {
                    url.push('#');
                    url.push_str(&fragment);
                }
            }
        }
        Ok(url)
    }

    fn save_flash(&self, target: &str, request: &HttpRequest) -> Result<()> {
        let (Some(output), Some(manager)) = (
            request.attribute::<OutputFlashMap>(),
            request.attribute::<FlashMapManagerHandle>(),
        ) else {
            return Ok(());
        };
        let mut flash = output.take();
        if flash.is_empty() {
            return Ok(());
        }
        let target = target.split_once('#').map_or(target, |(u, _)| u);
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        flash.set_target_path(path);
        for (name, value) in parse_query_string(query) {
            flash.add_target_param(name, value);
        }
        manager.0.save_output(flash, request)
    }
}

#[async_trait]
impl View for RedirectView {
    async fn render(
        &self,
        model: &Model,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<()> {
        let target = self.target_url(model, request)?;
        self.save_flash(&target, request)?;

        let status = self
            .status
            .unwrap_or(if self.http10_compatible { 302 } else { 303 });
        debug!(location = %target, status, "Redirecting");
        response.status = status;
        response.set_header("Location", target);
        response.commit();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// View Resolvers
// ============================================================================

/// Maps a logical view name to a view.
pub trait ViewResolver: Send + Sync + 'static {
    /// `None` lets the next resolver try.
    fn resolve_view_name(&self, view_name: &str, locale: &Locale) -> Result<Option<Arc<dyn View>>>;

    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }
}

/// Resolvers sorted by [`ViewResolver::order`]; the first view wins.
#[derive(Clone, Default)]
pub struct ViewResolverChain {
    resolvers: Vec<Arc<dyn ViewResolver>>,
}

impl ViewResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver<R: ViewResolver>(mut self, resolver: R) -> Self {
        self.push(Arc::new(resolver));
        self
    }

    pub fn with_resolver_arc(mut self, resolver: Arc<dyn ViewResolver>) -> Self {
        self.push(resolver);
        self
    }

    pub fn push(&mut self, resolver: Arc<dyn ViewResolver>) {
        self.resolvers.push(resolver);
        self.resolvers.sort_by_key(|r| r.order());
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve_view_name(&self, view_name: &str, locale: &Locale) -> Result<Option<Arc<dyn View>>> {
        for resolver in &self.resolvers {
            if let Some(view) = resolver.resolve_view_name(view_name, locale)? {
                trace!(view = view_name, resolved = view.name(), "Resolved view");
                return Ok(Some(view));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for ViewResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

/// Fixed table of named views, optionally per language.
#[derive(Clone, Default)]
pub struct StaticViewResolver {
    views: HashMap<String, Arc<dyn View>>,
    localized: HashMap<(String, String), Arc<dyn View>>,
    order: Option<i32>,
}

impl StaticViewResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view<V: View>(mut self, name: impl Into<String>, view: V) -> Self {
        self.views.insert(name.into(), Arc::new(view));
        self
    }

    /// View used only when the locale's language is `language`.
    pub fn with_localized_view<V: View>(
        mut self,
        name: impl Into<String>,
        language: impl Into<String>,
        view: V,
    ) -> Self {
        self.localized
            .insert((name.into(), language.into().to_lowercase()), Arc::new(view));
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

impl ViewResolver for StaticViewResolver {
    fn resolve_view_name(&self, view_name: &str, locale: &Locale) -> Result<Option<Arc<dyn View>>> {
        let key = (view_name.to_string(), locale.language.clone());
        Ok(self
            .localized
            .get(&key)
            .or_else(|| self.views.get(view_name))
            .cloned())
    }

    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE - 1)
    }
}

/// Resolves `redirect:<url>` names to a [`RedirectView`].
#[derive(Debug, Clone)]
pub struct RedirectViewResolver {
    http10_compatible: bool,
}

/// Prefix marking a view name as a redirect.
pub const REDIRECT_URL_PREFIX: &str = "redirect:";

impl RedirectViewResolver {
    pub fn new() -> Self {
        Self {
            http10_compatible: true,
        }
    }

    pub fn http10_compatible(mut self, enabled: bool) -> Self {
        self.http10_compatible = enabled;
        self
    }
}

impl Default for RedirectViewResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewResolver for RedirectViewResolver {
    fn resolve_view_name(&self, view_name: &str, _locale: &Locale) -> Result<Option<Arc<dyn View>>> {
        Ok(view_name.strip_prefix(REDIRECT_URL_PREFIX).map(|url| {
            Arc::new(RedirectView::new(url).http10_compatible(self.http10_compatible)) as Arc<dyn View>
        }))
    }

    fn order(&self) -> i32 {
        i32::MIN
    }
}

/// Catch-all resolver rendering every name as JSON.
#[derive(Clone)]
pub struct JsonViewResolver {
    view: Arc<JsonView>,
}

impl JsonViewResolver {
    pub fn new() -> Self {
        Self::with_view(JsonView::new())
    }

    pub fn with_view(view: JsonView) -> Self {
        Self { view: Arc::new(view) }
    }
}

impl Default for JsonViewResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewResolver for JsonViewResolver {
    fn resolve_view_name(&self, _view_name: &str, _locale: &Locale) -> Result<Option<Arc<dyn View>>> {
        Ok(Some(self.view.clone() as Arc<dyn View>))
    }
}

// ============================================================================
// View Name Translation
// ============================================================================

/// Supplies a view name when a handler did not.
pub trait ViewNameTranslator: Send + Sync + 'static {
    fn view_name(&self, request: &HttpRequest) -> Option<String>;
}

/// Derives the view name from the lookup path: `/users/list.html` becomes
/// `users/list`, then the prefix and suffix are added.
#[derive(Debug, Clone)]
pub struct DefaultViewNameTranslator {
    prefix: String,
    suffix: String,
    separator: Option<String>,
    strip_leading_slash: bool,
    strip_trailing_slash: bool,
    strip_extension: bool,
    path_helper: PathHelper,
}

impl DefaultViewNameTranslator {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            separator: None,
            strip_leading_slash: true,
            strip_trailing_slash: true,
            strip_extension: true,
            path_helper: PathHelper::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Replace `/` in the derived name.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn strip_leading_slash(mut self, strip: bool) -> Self {
        self.strip_leading_slash = strip;
        self
    }

    pub fn strip_trailing_slash(mut self, strip: bool) -> Self {
        self.strip_trailing_slash = strip;
        self
    }

    pub fn strip_extension(mut self, strip: bool) -> Self {
        self.strip_extension = strip;
        self
    }

    pub fn with_path_helper(mut self, path_helper: PathHelper) -> Self {
        self.path_helper = path_helper;
        self
    }

    fn transform(&self, lookup_path: &str) -> String {
        let mut path = lookup_path;
        if self.strip_leading_slash {
            path = path.strip_prefix('/').unwrap_or(path);
        }
        if self.strip_trailing_slash {
            path = path.strip_suffix('/').unwrap_or(path);
        }
        if self.strip_extension
            && let Some(dot) = path.rfind('.')
            && path[dot..].find('/').is_none()
        {
            path = &path[..dot];
        }
        match &self.separator {
            Some(sep) => path.replace('/', sep),
            None => path.to_string(),
        }
    }
}

impl Default for DefaultViewNameTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewNameTranslator for DefaultViewNameTranslator {
    fn view_name(&self, request: &HttpRequest) -> Option<String> {
        let name = self.transform(&self.path_helper.lookup_path(request));
        if name.is_empty() && self.prefix.is_empty() && self.suffix.is_empty() {
            return None;
        }
        Some(format!("{}{}{}", self.prefix, name, self.suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::{FlashMapManager, InMemoryFlashMapManager};

    fn model(pairs: &[(&str, Value)]) -> Model {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_json_view_renders_model() {
        let view = JsonView::new().exclude("secret");
        let mut res = HttpResponse::ok();
        let m = model(&[("id", 7.into()), ("secret", "x".into())]);
        view.render(&m, &HttpRequest::new("GET", "/"), &mut res).await.unwrap();
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        assert_eq!(res.body_string(), r#"{"id":7}"#);
    }

    #[tokio::test]
    async fn test_json_view_single_key() {
        let view = JsonView::new().extract_single_key(true);
        let mut res = HttpResponse::ok();
        let m = model(&[("items", serde_json::json!([1, 2]))]);
        view.render(&m, &HttpRequest::new("GET", "/"), &mut res).await.unwrap();
        assert_eq!(res.body_string(), "[1,2]");
    }

    #[tokio::test]
    async fn test_redirect_expands_and_appends_query() {
        let mut req = HttpRequest::new("POST", "/app/orders").with_context_path("/app");
        req.path_params.insert("id".into(), "42".into());
        let view = RedirectView::new("/orders/{id}").http10_compatible(false);
        let mut res = HttpResponse::ok();
        let m = model(&[("id", 1.into()), ("tab", "items".into())]);
        view.render(&m, &req, &mut res).await.unwrap();

        assert_eq!(res.status, 303);
        assert_eq!(res.header("Location"), Some("/app/orders/42?tab=items"));
        assert!(res.is_committed());
    }

    #[tokio::test]
    async fn test_redirect_missing_variable_fails() {
        let view = RedirectView::new("/orders/{id}");
        let mut res = HttpResponse::ok();
        let err = view
            .render(&Model::new(), &HttpRequest::new("GET", "/"), &mut res)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_redirect_saves_output_flash() {
        let manager = Arc::new(InMemoryFlashMapManager::new());
        let mut req = HttpRequest::new("POST", "/orders");
        let output = OutputFlashMap::new();
        output.put("notice", "created").unwrap();
        req.attributes.insert(output);
        req.attributes
            .insert(FlashMapManagerHandle(manager.clone() as Arc<dyn FlashMapManager>));

        let view = RedirectView::new("/orders/9?view=full").expose_model_attributes(false);
        let mut res = HttpResponse::ok();
        view.render(&Model::new(), &req, &mut res).await.unwrap();
        assert_eq!(res.status, 302);
        assert_eq!(manager.len(), 1);

        let next = HttpRequest::new("GET", "/orders/9?view=full");
        let flash = manager.retrieve_and_update(&next).unwrap();
        assert_eq!(flash.get("notice").unwrap(), "created");
    }

    #[test]
    fn test_chain_order_and_fallthrough() {
        let chain = ViewResolverChain::new()
            .with_resolver(JsonViewResolver::new())
            .with_resolver(StaticViewResolver::new().with_view("home", TextView::new("home", "hi")))
            .with_resolver(RedirectViewResolver::new());
        let locale = Locale::default();

        assert_eq!(chain.resolve_view_name("home", &locale).unwrap().unwrap().name(), "home");
        assert_eq!(chain.resolve_view_name("other", &locale).unwrap().unwrap().name(), "json");
        assert_eq!(
            chain.resolve_view_name("redirect:/x", &locale).unwrap().unwrap().name(),
            "redirect:/x"
        );
    }

    #[test]
    fn test_empty_chain_resolves_nothing() {
        let chain = ViewResolverChain::new();
        assert!(chain.resolve_view_name("any", &Locale::default()).unwrap().is_none());
    }

    #[test]
    fn test_localized_static_view() {
        let resolver = StaticViewResolver::new()
            .with_view("hello", TextView::new("hello-en", "Hello"))
            .with_localized_view("hello", "fr", TextView::new("hello-fr", "Bonjour"));
        let fr = Locale::new("fr", Some("CA"));
        let de = Locale::new("de", None);
        assert_eq!(resolver.resolve_view_name("hello", &fr).unwrap().unwrap().name(), "hello-fr");
        assert_eq!(resolver.resolve_view_name("hello", &de).unwrap().unwrap().name(), "hello-en");
    }

    #[test]
    fn test_default_view_name_translation() {
        let translator = DefaultViewNameTranslator::new();
        let req = HttpRequest::new("GET", "/users/list.html");
        assert_eq!(translator.view_name(&req).as_deref(), Some("users/list"));

        let req = HttpRequest::new("GET", "/app/reports/").with_context_path("/app");
        assert_eq!(translator.view_name(&req).as_deref(), Some("reports"));

        let req = HttpRequest::new("GET", "/v1.2/status");
        assert_eq!(translator.view_name(&req).as_deref(), Some("v1.2/status"));

        assert_eq!(translator.view_name(&HttpRequest::new("GET", "/")), None);
    }

    #[test]
    fn test_translation_prefix_suffix_separator() {
        let translator = DefaultViewNameTranslator::new()
            .with_prefix("views.")
            .with_suffix(".tpl")
            .with_separator(".");
        let req = HttpRequest::new("GET", "/admin/users");
        assert_eq!(translator.view_name(&req).as_deref(), Some("views.admin.users.tpl"));
    }
}
