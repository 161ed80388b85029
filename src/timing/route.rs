//! Route names used as metric-name suffixes.
//!
//! A route is `"{component}.{action}.{method}"`, lowercased. Its
//! cardinality is bounded by the handlers an application registers, never
//! by request content, so it is safe to append to metric names.

use std::any::type_name;
use std::borrow::Cow;

use axum::extract::MatchedPath;
use axum::http::Method;

/// Static asset request that no handler claimed.
pub const ASSETS: &str = "assets";
/// Any other request that no handler claimed (404s included).
pub const UNKNOWN_ENDPOINT: &str = "unknown_endpoint";
pub const UNKNOWN_ACTION: &str = "unknown_action";

/// What served a request, as far as route naming is concerned.
///
/// Any framework's handler notion can be plugged in by implementing this.
pub trait DispatchTarget: Send + Sync {
    /// Identity of the defining type or module, e.g. `app::OrdersController`.
    fn type_identity(&self) -> Cow<'_, str>;
    /// May be empty.
    fn action_name(&self) -> &str;
    fn request_method(&self) -> &Method;
}

// ─── Endpoint ────────────────────────────────────────────────────

/// An explicitly named dispatch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    type_identity: Cow<'static, str>,
    action: String,
    method: Method,
}

impl Endpoint {
    pub fn new(
        type_identity: impl Into<Cow<'static, str>>,
        action: impl Into<String>,
        method: Method,
    ) -> Self {
        Self {
            type_identity: type_identity.into(),
            action: action.into(),
            method,
        }
    }

    /// Target named after type `T`.
    pub fn of<T: ?Sized>(action: impl Into<String>, method: Method) -> Self {
        Self::new(type_name::<T>(), action, method)
    }

    /// Target named after a handler function: its module path becomes the
    /// component and the function name the action.
    ///
    /// `Endpoint::handler(orders::show, Method::GET)` names the route
    /// `<crate>.orders.show.get`.
    pub fn handler<H>(_handler: H, method: Method) -> Self {
        let path = strip_generics(type_name::<H>());
        match path.rsplit_once("::") {
            Some((module, name)) => Self::new(module, name, method),
            None => Self::new(path, "", method),
        }
    }
}

impl DispatchTarget for Endpoint {
    fn type_identity(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.type_identity)
    }

    fn action_name(&self) -> &str {
        &self.action
    }

    fn request_method(&self) -> &Method {
        &self.method
    }
}

// ─── MatchedRoute ────────────────────────────────────────────────

/// Adapter over axum's matched route template.
///
/// All template segments but the last form the component; the last one is
/// the action. Parameter sigils are dropped, so `/api/orders/:id` names the
/// route `api.orders.id.get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    component: String,
    action: String,
    method: Method,
}

impl MatchedRoute {
    pub fn new(template: &str, method: Method) -> Self {
        let mut segments: Vec<&str> = template
            .split('/')
            .map(|seg| seg.trim_start_matches([':', '*']))
            .map(|seg| seg.trim_start_matches('{').trim_end_matches('}'))
            .filter(|seg| !seg.is_empty())
            .collect();

        let action = segments.pop().unwrap_or_default().to_owned();
        let component = if segments.is_empty() {
            "root".to_owned()
        } else {
            segments.join(".")
        };

        Self {
            component,
            action,
            method,
        }
    }

    pub fn from_matched_path(path: &MatchedPath, method: &Method) -> Self {
        Self::new(path.as_str(), method.clone())
    }
}

impl DispatchTarget for MatchedRoute {
    fn type_identity(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.component)
    }

    fn action_name(&self) -> &str {
        &self.action
    }

    fn request_method(&self) -> &Method {
        &self.method
    }
}

// ─── Classifier ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    asset_prefixes: Vec<String>,
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self {
            asset_prefixes: vec!["/assets/".to_owned()],
        }
    }
}

impl RouteClassifier {
    pub fn with_asset_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            asset_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_asset(&self, path: &str) -> bool {
        self.asset_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn classify(&self, target: Option<&dyn DispatchTarget>, path: &str) -> String {
        let Some(target) = target else {
            return if self.is_asset(path) {
                ASSETS.to_owned()
            } else {
                UNKNOWN_ENDPOINT.to_owned()
            };
        };

        let component = dotify(&target.type_identity());
        let action = match sanitize(target.action_name()) {
            a if a.is_empty() => UNKNOWN_ACTION.to_owned(),
            a => a,
        };
        let method = target.request_method().as_str().to_ascii_lowercase();

        format!("{component}.{action}.{method}")
    }
}

/// Turn a type or module path into a dot-separated snake_case name.
///
/// `admin::OrdersController` → `admin.orders_controller`,
/// `Vec<u8>` → `vec`.
pub fn dotify(name: &str) -> String {
    strip_generics(name)
        .replace("::", ".")
        .split(['.', '/'])
        .map(snake_case)
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn strip_generics(name: &str) -> &str {
    name.split('<').next().unwrap_or(name)
}

fn snake_case(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c);
    }

    sanitize(&out)
}

/// Lowercase; anything outside `[a-z0-9_]` becomes `_`, edges trimmed.
fn sanitize(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OrdersController;

    mod handlers {
        pub fn show() {}
    }

    fn classify(target: Option<&dyn DispatchTarget>, path: &str) -> String {
        RouteClassifier::default().classify(target, path)
    }

    #[test]
    fn test_empty_action_falls_back() {
        let target = Endpoint::new("OrdersController", "", Method::GET);
        assert_eq!(
            classify(Some(&target), "/orders"),
            "orders_controller.unknown_action.get"
        );
    }

    #[test]
    fn test_no_target_buckets() {
        assert_eq!(classify(None, "/assets/app.js"), "assets");
        assert_eq!(classify(None, "/favicon.ico"), "unknown_endpoint");
        assert_eq!(classify(None, "/assets"), "unknown_endpoint");
    }

    #[test]
    fn test_custom_asset_prefixes() {
        let classifier = RouteClassifier::with_asset_prefixes(["/static/", "/packs/"]);
        assert_eq!(classifier.classify(None, "/packs/main.css"), "assets");
        assert_eq!(classifier.classify(None, "/assets/app.js"), "unknown_endpoint");
    }

    #[test]
    fn test_namespaced_type_dotified() {
        let target = Endpoint::new("Admin::OrdersController", "Index", Method::POST);
        assert_eq!(
            classify(Some(&target), "/admin/orders"),
            "admin.orders_controller.index.post"
        );
    }

    #[test]
    fn test_endpoint_of_type() {
        let target = Endpoint::of::<OrdersController>("show", Method::GET);
        let route = classify(Some(&target), "/orders/1");
        assert!(
            route.ends_with("tests.orders_controller.show.get"),
            "got {route}"
        );
        assert!(route.starts_with("request_timing.timing.route."), "got {route}");
    }

    #[test]
    fn test_endpoint_from_handler_fn() {
        let target = Endpoint::handler(handlers::show, Method::DELETE);
        assert_eq!(target.action_name(), "show");
        let route = classify(Some(&target), "/orders/1");
        assert!(route.ends_with("tests.handlers.show.delete"), "got {route}");
    }

    #[test]
    fn test_matched_route_template() {
        let target = MatchedRoute::new("/api/orders/:id", Method::GET);
        assert_eq!(classify(Some(&target), "/api/orders/7"), "api.orders.id.get");

        let target = MatchedRoute::new("/api/orders/{id}/items", Method::PUT);
        assert_eq!(
            classify(Some(&target), "/api/orders/7/items"),
            "api.orders.id.items.put"
        );

        let target = MatchedRoute::new("/", Method::GET);
        assert_eq!(classify(Some(&target), "/"), "root.unknown_action.get");
    }

    #[test]
    fn test_dotify_rules() {
        assert_eq!(dotify("OrdersController"), "orders_controller");
        assert_eq!(dotify("HTTPServer"), "http_server");
        assert_eq!(dotify("app::v2::Orders"), "app.v2.orders");
        assert_eq!(dotify("Wrapper<app::Orders>"), "wrapper");
        assert_eq!(dotify("/api/orders/"), "api.orders");
    }

    #[test]
    fn test_route_is_stable_across_calls() {
        let target = Endpoint::new("OrdersController", "show", Method::GET);
        assert_eq!(classify(Some(&target), "/a"), classify(Some(&target), "/b"));
    }
}
