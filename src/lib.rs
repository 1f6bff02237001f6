//! A trie based, high performance path request router.
//!
//! The router matches incoming requests by the request path. If a handler is
//! registered for the path, it is called with the path parameters. The
//! registered pattern can contain two types of placeholders:
//!
//! | Syntax  | Type                |
//! |---------|---------------------|
//! | `:name` | named parameter     |
//! | `*name` | catch-all parameter |
//!
//! Named parameters are dynamic path segments. They match anything until the
//! next `/` or the path end:
//!
//! ```text
//! Pattern: /blog/:category/:post
//!
//!  /blog/go/request-routers            match: category="go", post="request-routers"
//!  /blog/go/request-routers/           no match, but a redirect is recommended
//!  /blog/go/                           no match
//! ```
//!
//! Catch-all parameters match anything until the path end, including the
//! directory index (the `/` before the catch-all). Since they match anything
//! until the end, catch-all parameters must always be the final path element:
//!
//! ```text
//! Pattern: /files/*filepath
//!
//!  /files/                             match: filepath="/"
//!  /files/LICENSE                      match: filepath="/LICENSE"
//!  /files/templates/article.html       match: filepath="/templates/article.html"
//!  /files                              no match, but a redirect is recommended
//! ```
//!
//! Because the router only ever returns explicit matches, registrations that
//! could make a request path ambiguous are rejected: a static route and a
//! placeholder cannot share a path segment.
//!
//! By default the router also repairs requests that almost match: a missing
//! or surplus trailing slash triggers an internal redirect, and if that
//! fails, the path is cleaned (`//`, `./` and `../` elements are removed)
//! and retried case-insensitively. Both behaviours can be switched off in
//! [`RouterConfig`].
//!
//! # Example
//!
//! ```
//! use pathrouter::{Params, Router};
//!
//! let mut router: Router<(), Vec<String>> = Router::new();
//! router.add("/", |_ctx: &(), _path, _params: &Params, out: &mut Vec<String>| {
//!     out.push("Welcome!".to_string());
//!     Ok(true)
//! });
//! router.add("/hello/:name", |_ctx: &(), _path, params: &Params, out: &mut Vec<String>| {
//!     out.push(format!("hello, {}!", params.by_name("name").unwrap_or("?")));
//!     Ok(true)
//! });
//!
//! let mut out = Vec::new();
//! router.serve(&(), "/", &mut out).unwrap();
//! router.serve(&(), "/hello/world", &mut out).unwrap();
//! assert_eq!(out, ["Welcome!", "hello, world!"]);
//! ```
//!
//! The context type (here `()`) and the writer type (here `Vec<String>`) are
//! opaque to the router; it only hands them through to the handlers.
//!
//! # Concurrency
//!
//! Registration is a build-time operation and takes `&mut self`. After the
//! last [`Router::add`], the router is effectively immutable:
//! [`Router::serve`] and [`Router::lookup`] take `&self` and are safe to
//! call from many threads at once. The only mutable state they touch is the
//! internal pool of parameter buffers.

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![warn(missing_docs)]

mod error;
mod params;
mod path;
mod router;
mod tree;

pub use error::RouteError;
pub use params::{Param, Params};
pub use path::clean;
pub use router::{BoxError, Handler, PanicTrap, Router, RouterConfig};
