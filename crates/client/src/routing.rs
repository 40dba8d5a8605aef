//! Route matching.
//!
//! Routes are checked in registration order and the first match wins; there
//! is no priority field. Predicates are pure functions of the request.

use std::collections::BTreeSet;

use shelter_core::{Destination, RequestDescriptor};
use url::Url;

use crate::strategy::Strategy;

/// Condition a request must satisfy for a route to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePredicate {
    /// Request destination is one of the given types.
    Destinations(BTreeSet<Destination>),
    /// Request origin (`scheme://host[:port]`) is one of the given origins.
    Origins(BTreeSet<String>),
    /// Request URL equals this URL exactly.
    ExactUrl(Url),
}

impl RoutePredicate {
    pub fn destinations(destinations: impl IntoIterator<Item = Destination>) -> Self {
        RoutePredicate::Destinations(destinations.into_iter().collect())
    }

    pub fn origins<S: Into<String>>(origins: impl IntoIterator<Item = S>) -> Self {
        RoutePredicate::Origins(origins.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        match self {
            RoutePredicate::Destinations(destinations) => destinations.contains(&request.destination),
            RoutePredicate::Origins(origins) => origins.contains(&request.origin()),
            RoutePredicate::ExactUrl(url) => request.url == *url,
        }
    }
}

/// A predicate bound to the strategy that handles matching requests.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub method: String,
    pub predicate: RoutePredicate,
    pub strategy: Strategy,
}

impl Route {
    /// A `GET` route.
    pub fn new(name: impl Into<String>, predicate: RoutePredicate, strategy: impl Into<Strategy>) -> Self {
        Self { name: name.into(), method: "GET".to_string(), predicate, strategy: strategy.into() }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        self.method == request.method && self.predicate.matches(request)
    }
}

/// Ordered route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_route(&mut self, route: Route) {
        tracing::debug!(route = %route.name, bucket = route.strategy.cache_name(), "registered route");
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route that matches, if any.
    pub fn find(&self, request: &RequestDescriptor) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(request))
    }

    /// Buckets written by registered routes, in registration order.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for route in &self.routes {
            let name = route.strategy.cache_name();
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginChain;
    use crate::strategy::{CacheFirst, StaleWhileRevalidate};
    use shelter_core::RequestMode;

    fn router() -> Router {
        let mut router = Router::new();
        router.register_route(Route::new(
            "static-assets",
            RoutePredicate::destinations([Destination::Image, Destination::Font]),
            CacheFirst::new("static-assets-v2", PluginChain::new()),
        ));
        router.register_route(Route::new(
            "google-fonts",
            RoutePredicate::origins(["https://fonts.googleapis.com", "https://fonts.gstatic.com"]),
            StaleWhileRevalidate::new("google-fonts-v1", PluginChain::new()),
        ));
        router.register_route(Route::new(
            "timetable-data",
            RoutePredicate::ExactUrl(Url::parse("https://script.google.com/macros/s/abc/exec").unwrap()),
            StaleWhileRevalidate::new("timetable-data-v2", PluginChain::new()),
        ));
        router
    }

    fn matched(router: &Router, request: &RequestDescriptor) -> Option<String> {
        router.find(request).map(|route| route.name.clone())
    }

    #[test]
    fn test_destination_route() {
        let router = router();
        let request = RequestDescriptor::get("https://app.example.com/images/org.png")
            .unwrap()
            .with_destination(Destination::Image);
        assert_eq!(matched(&router, &request).as_deref(), Some("static-assets"));
    }

    #[test]
    fn test_first_match_wins() {
        let router = router();
        let font_file = RequestDescriptor::get("https://fonts.gstatic.com/s/roboto/v30/a.woff2")
            .unwrap()
            .with_destination(Destination::Font);
        assert_eq!(matched(&router, &font_file).as_deref(), Some("static-assets"));

        let stylesheet = RequestDescriptor::get("https://fonts.googleapis.com/css2?family=Roboto")
            .unwrap()
            .with_destination(Destination::Style);
        assert_eq!(matched(&router, &stylesheet).as_deref(), Some("google-fonts"));
    }

    #[test]
    fn test_exact_url_route() {
        let router = router();
        let exact = RequestDescriptor::get("https://script.google.com/macros/s/abc/exec").unwrap();
        assert_eq!(matched(&router, &exact).as_deref(), Some("timetable-data"));

        let with_query = RequestDescriptor::get("https://script.google.com/macros/s/abc/exec?x=1").unwrap();
        assert_eq!(matched(&router, &with_query), None);
    }

    #[test]
    fn test_unmatched_falls_through() {
        let router = router();
        let script = RequestDescriptor::get("https://app.example.com/app.js")
            .unwrap()
            .with_destination(Destination::Script);
        assert_eq!(matched(&router, &script), None);

        let navigation = RequestDescriptor::navigation("https://app.example.com/about").unwrap();
        assert_eq!(navigation.mode, RequestMode::Navigate);
        assert_eq!(matched(&router, &navigation), None);
    }

    #[test]
    fn test_non_get_not_routed() {
        let router = router();
        let mut post = RequestDescriptor::get("https://script.google.com/macros/s/abc/exec").unwrap();
        post.method = "POST".to_string();
        assert_eq!(matched(&router, &post), None);
    }

    #[test]
    fn test_destination_set_collapses_duplicates() {
        let predicate = RoutePredicate::destinations([Destination::Font, Destination::Image, Destination::Font]);
        let RoutePredicate::Destinations(set) = &predicate else {
            panic!("expected a destination predicate");
        };
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![Destination::Image, Destination::Font]);

        let font = RequestDescriptor::get("https://app.example.com/a.woff2")
            .unwrap()
            .with_destination(Destination::Font);
        assert!(predicate.matches(&font));
    }

    #[test]
    fn test_cache_names() {
        assert_eq!(router().cache_names(), vec!["static-assets-v2", "google-fonts-v1", "timetable-data-v2"]);
    }
}
