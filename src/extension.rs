use tracing::warn;

use crate::server::dispatch::Request;
use crate::server::response::Response;
use crate::server::Wiki;

/// An extension that may claim a request before built-in routing.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &Request, wiki: &Wiki) -> Option<Response>;
}

/// An extension contributing entries to the main menu.
pub trait MenuContributor: Send + Sync {
    fn items(&self) -> Vec<MenuItem>;
}

#[derive(Debug, Clone)]
pub struct MenuItem {
    pub url: String,
    pub label: String,
}

/// An extension appending lines to page footers.
pub trait FooterContributor: Send + Sync {
    fn footer(&self, space: &str, name: &str) -> Option<String>;
}

/// Registered extensions, built once per configuration load.
///
/// Built-in extensions are enabled by name through the configuration;
/// embedders can register their own at compile time through the
/// `register_*` methods before handing the registry to the server.
#[derive(Default)]
pub struct Registry {
    handlers: Vec<Box<dyn RequestHandler>>,
    menu: Vec<Box<dyn MenuContributor>>,
    footers: Vec<Box<dyn FooterContributor>>,
    stylesheet: Option<String>,
    favicon: Option<Vec<u8>>,
}

impl Registry {
    /// Build a registry from the enabled extension names in the
    /// configuration. Unknown names are logged and skipped.
    #[must_use]
    pub fn from_names(names: &[String]) -> Self {
        let registry = Self::default();
        for name in names {
            warn!("unknown extension: {name}");
        }
        registry
    }

    pub fn register_handler(&mut self, handler: Box<dyn RequestHandler>) {
        self.handlers.push(handler);
    }

    pub fn register_menu(&mut self, contributor: Box<dyn MenuContributor>) {
        self.menu.push(contributor);
    }

    pub fn register_footer(&mut self, contributor: Box<dyn FooterContributor>) {
        self.footers.push(contributor);
    }

    pub fn set_stylesheet(&mut self, css: String) {
        self.stylesheet = Some(css);
    }

    pub fn set_favicon(&mut self, bytes: Vec<u8>) {
        self.favicon = Some(bytes);
    }

    /// Offer a request to the handlers in registration order; the first
    /// response wins.
    #[must_use]
    pub fn handle(&self, request: &Request, wiki: &Wiki) -> Option<Response> {
        self.handlers.iter().find_map(|h| h.handle(request, wiki))
    }

    #[must_use]
    pub fn menu_items(&self) -> Vec<MenuItem> {
        self.menu.iter().flat_map(|c| c.items()).collect()
    }

    #[must_use]
    pub fn footers(&self, space: &str, name: &str) -> Vec<String> {
        self.footers
            .iter()
            .filter_map(|c| c.footer(space, name))
            .collect()
    }

    #[must_use]
    pub fn stylesheet(&self) -> Option<&str> {
        self.stylesheet.as_deref()
    }

    #[must_use]
    pub fn favicon(&self) -> Option<&[u8]> {
        self.favicon.as_deref()
    }
}
