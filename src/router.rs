use std::{
    any::Any,
    borrow::Cow,
    panic::{self, AssertUnwindSafe},
};

use tracing::debug;

use crate::{
    error::RouteError,
    params::{Params, ParamsPool},
    path::clean,
    tree::{RawParams, Tree},
};

/// The boxed error type handlers may return; it is propagated to the caller
/// of [`Router::serve`] verbatim.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A request handler registered with the router.
///
/// A handler is called with the request context, the request path, the bound
/// path parameters and the response writer. Returning `Ok(true)` means the
/// request was handled; `Ok(false)` means "not found here" and sends the
/// router on to its not-found fallback; an error is propagated as-is.
pub type Handler<C, W> =
    Box<dyn Fn(&C, &str, &Params, &mut W) -> Result<bool, BoxError> + Send + Sync>;

/// Invoked with the request context, the request path, the response writer
/// and the panic payload when a handler panics and a trap is configured.
pub type PanicTrap<C, W> = Box<dyn Fn(&C, &str, &mut W, &(dyn Any + Send)) + Send + Sync>;

/// Optional configuration for a [`Router`].
pub struct RouterConfig<C, W> {
    /// Enables automatic redirection if the current route can't be matched
    /// but a handler for the path with (without) the trailing slash exists.
    /// For example if `/foo/` is requested but a route only exists for
    /// `/foo`, the request is served as `/foo`.
    pub redirect_trailing_slash: bool,

    /// Tries to fix the request path if no handler is registered for it.
    /// First, superfluous elements like `../` or `//` are removed, then a
    /// case-insensitive lookup of the cleaned path is made. If a handler can
    /// be found this way, the request is served with the corrected path.
    /// For example `/FOO` and `/..//Foo` would both be served as `/foo`.
    /// Independent of `redirect_trailing_slash`.
    pub redirect_fixed_path: bool,

    not_found: Option<Handler<C, W>>,
    panic_trap: Option<PanicTrap<C, W>>,
}

impl<C, W> Default for RouterConfig<C, W> {
    /// Path auto-correction, including trailing slashes, is enabled by
    /// default.
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            not_found: None,
            panic_trap: None,
        }
    }
}

impl<C, W> RouterConfig<C, W> {
    /// Sets the handler called when no matching route is found. It is
    /// invoked with an empty parameter list.
    pub fn not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&C, &str, &Params, &mut W) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.not_found = Some(Box::new(handler));
        self
    }

    /// Sets the function handling panics recovered from handlers. Without a
    /// trap no panic is caught and unwinding continues past [`Router::serve`].
    pub fn panic_trap<F>(mut self, trap: F) -> Self
    where
        F: Fn(&C, &str, &mut W, &(dyn Any + Send)) + Send + Sync + 'static,
    {
        self.panic_trap = Some(Box::new(trap));
        self
    }
}

enum Invoked {
    Done(Result<bool, BoxError>),
    Trapped,
}

/// Dispatches request paths to handler functions via configurable routes.
///
/// `C` is the opaque request context type, `W` the opaque response writer
/// type; the router only forwards both to handlers.
///
/// Routes are registered up front with [`add`](Router::add) (which needs
/// `&mut self`); once serving starts the router is read-only and
/// [`serve`](Router::serve) / [`lookup`](Router::lookup) may be called from
/// any number of threads concurrently.
pub struct Router<C, W> {
    conf: RouterConfig<C, W>,
    tree: Tree<Handler<C, W>>,
    pool: ParamsPool,
    max_params: usize,
}

impl<C, W> Default for Router<C, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, W> Router<C, W> {
    /// Creates a router with the default configuration. Path
    /// auto-correction, including trailing slashes, is enabled by default.
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Creates a router with the given configuration.
    pub fn with_config(conf: RouterConfig<C, W>) -> Self {
        Self {
            conf,
            tree: Tree::default(),
            pool: ParamsPool::default(),
            max_params: 0,
        }
    }

    /// Registers a handler for the given pattern.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is rejected; see [`try_add`](Router::try_add)
    /// for the fallible variant.
    pub fn add<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&C, &str, &Params, &mut W) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        if let Err(err) = self.try_add(pattern, handler) {
            panic!("{err}");
        }
    }

    /// Registers a handler for the given pattern.
    ///
    /// An empty pattern registers the root path, and a missing leading `/`
    /// is prepended. See the crate documentation for the placeholder syntax.
    pub fn try_add<F>(&mut self, pattern: &str, handler: F) -> Result<(), RouteError>
    where
        F: Fn(&C, &str, &Params, &mut W) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        let pattern: Cow<'_, str> = if pattern.is_empty() {
            Cow::Borrowed("/")
        } else if !pattern.starts_with('/') {
            Cow::Owned(format!("/{pattern}"))
        } else {
            Cow::Borrowed(pattern)
        };

        self.tree.add(&pattern, Box::new(handler))?;
        self.max_params = self.max_params.max(count_params(&pattern));
        debug!(pattern = %pattern, "registered route");
        Ok(())
    }

    /// Manually looks up the handler for a path, e.g. to build a framework
    /// around the router.
    ///
    /// On a hit, returns the handler and the bound parameters. Otherwise the
    /// third value reports whether a handler exists for the same path with
    /// the trailing slash toggled (trailing slash recommendation).
    pub fn lookup(&self, path: &str) -> (Option<&Handler<C, W>>, Params, bool) {
        let mut raw = RawParams::new();
        let (handler, tsr) = self.tree.find(path.as_bytes(), &mut raw);
        match handler {
            Some(handler) if !raw.is_empty() => (Some(handler), self.bind(raw), tsr),
            Some(handler) => (Some(handler), Params::new(), tsr),
            None => (None, Params::new(), tsr),
        }
    }

    /// Serves a request: dispatches `path` to the matching handler.
    ///
    /// Returns whether the request was handled and any handler error,
    /// verbatim. A miss first tries the configured redirects (trailing
    /// slash, then cleaned-up case-insensitive repair) by re-entering
    /// `serve` with the corrected path, then falls back to the not-found
    /// handler. With a panic trap configured, a handler panic is reported to
    /// the trap and `Ok(false)` is returned instead of unwinding.
    pub fn serve(&self, ctx: &C, path: &str, writer: &mut W) -> Result<bool, BoxError> {
        let path = if path.is_empty() { "/" } else { path };

        let mut raw = RawParams::new();
        let (handler, tsr) = self.tree.find(path.as_bytes(), &mut raw);

        if let Some(handler) = handler {
            let pooled = !raw.is_empty();
            let params = if pooled { self.bind(raw) } else { Params::new() };
            let invoked = self.invoke(handler, ctx, path, &params, writer);
            if pooled {
                self.pool.put(params);
            }
            match invoked {
                Invoked::Trapped => return Ok(false),
                Invoked::Done(Ok(false)) => {} // not found at this handler
                Invoked::Done(done) => return done,
            }
        } else if path != "/" {
            if tsr && self.conf.redirect_trailing_slash {
                let redirect = if path.len() > 1 && path.ends_with('/') {
                    path[..path.len() - 1].to_string()
                } else {
                    format!("{path}/")
                };
                debug!(from = %path, to = %redirect, "trailing slash redirect");
                return self.serve(ctx, &redirect, writer);
            }

            if self.conf.redirect_fixed_path {
                let cleaned = clean(path);
                if let Some(fixed) = self
                    .tree
                    .find_case_insensitive(&cleaned, self.conf.redirect_trailing_slash)
                {
                    debug!(from = %path, to = %fixed, "fixed path redirect");
                    return self.serve(ctx, &fixed, writer);
                }
            }
        }

        match &self.conf.not_found {
            Some(not_found) => {
                let params = Params::new();
                match self.invoke(not_found, ctx, path, &params, writer) {
                    Invoked::Trapped => Ok(false),
                    Invoked::Done(done) => done,
                }
            }
            None => Ok(false),
        }
    }

    /// Moves the raw bindings into a pooled buffer.
    fn bind(&self, raw: RawParams<'_, '_>) -> Params {
        let mut params = self.pool.get(self.max_params);
        for (key, value) in raw {
            params.push(
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            );
        }
        params
    }

    fn invoke(
        &self,
        handler: &Handler<C, W>,
        ctx: &C,
        path: &str,
        params: &Params,
        writer: &mut W,
    ) -> Invoked {
        let Some(trap) = &self.conf.panic_trap else {
            return Invoked::Done(handler(ctx, path, params, writer));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, path, params, writer))) {
            Ok(done) => Invoked::Done(done),
            Err(payload) => {
                // if the trap itself panics, give up silently
                let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                    trap(ctx, path, writer, payload.as_ref())
                }));
                Invoked::Trapped
            }
        }
    }
}

/// Counts the placeholders of a pattern, i.e. the segments starting with
/// `:` or `*`.
fn count_params(pattern: &str) -> usize {
    pattern
        .as_bytes()
        .windows(2)
        .filter(|window| window[0] == b'/' && matches!(window[1], b':' | b'*'))
        .count()
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn test_count_params() {
        assert_eq!(count_params("/"), 0);
        assert_eq!(count_params("/user/:name"), 1);
        assert_eq!(count_params("/blog/:category/:post"), 2);
        assert_eq!(count_params("/files/*filepath"), 1);
        assert_eq!(count_params("/a/:b/c/*d"), 2);
    }

    #[test]
    fn test_router() {
        let mut router: Router<(), ()> = Router::new();

        let routed = Arc::new(AtomicBool::new(false));
        let flag = routed.clone();
        router.add("/user/:name", move |_: &(), _, params: &Params, _: &mut ()| {
            flag.store(true, Ordering::SeqCst);
            assert_eq!(params.by_name("name"), Some("gopher"));
            assert_eq!(params.len(), 1);
            assert_eq!(params[0].key, "name");
            Ok(true)
        });

        let found = router.serve(&(), "/user/gopher", &mut ()).unwrap();
        assert!(found);
        assert!(routed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_redirects() {
        // every row records the path its handler was finally invoked with
        let mut router: Router<(), String> = Router::new();
        let record = |_: &(), path: &str, _: &Params, last: &mut String| {
            *last = path.to_string();
            Ok(true)
        };
        router.add("/path", record);
        router.add("/dir/", record);
        router.add("", record);

        let cases = [
            ("/path/", true, "/path"),   // TSR -/
            ("/dir", true, "/dir/"),     // TSR +/
            ("", true, "/"),             // empty path
            ("/PATH", true, "/path"),    // fixed case
            ("/DIR/", true, "/dir/"),    // fixed case
            ("/PATH/", true, "/path"),   // fixed case, TSR -/
            ("/DIR", true, "/dir/"),     // fixed case, TSR +/
            ("/../path", true, "/path"), // cleaned path
            ("/nope", false, ""),        // not found
        ];
        for (path, found, location) in cases {
            let mut last = String::new();
            let handled = router.serve(&(), path, &mut last).unwrap();
            assert_eq!(handled, found, "serve({path:?})");
            assert_eq!(last, location, "serve({path:?})");
        }
    }

    #[test]
    fn test_redirects_disabled() {
        let mut conf = RouterConfig::<(), ()>::default();
        conf.redirect_trailing_slash = false;
        conf.redirect_fixed_path = false;
        let mut router = Router::with_config(conf);
        router.add("/path", |_: &(), _, _: &Params, _: &mut ()| Ok(true));

        assert!(router.serve(&(), "/path", &mut ()).unwrap());
        assert!(!router.serve(&(), "/path/", &mut ()).unwrap());
        assert!(!router.serve(&(), "/PATH", &mut ()).unwrap());
    }

    #[test]
    fn test_not_found_handler() {
        let not_found_called = Arc::new(AtomicBool::new(false));
        let flag = not_found_called.clone();
        let conf = RouterConfig::<(), ()>::default().not_found(
            move |_: &(), _, params: &Params, _: &mut ()| {
                assert!(params.is_empty());
                flag.store(true, Ordering::SeqCst);
                Ok(true)
            },
        );

        let mut router = Router::with_config(conf);
        router.add("/path", |_: &(), _, _: &Params, _: &mut ()| Ok(true));

        let found = router.serve(&(), "/nope", &mut ()).unwrap();
        assert!(found);
        assert!(not_found_called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handler_fallthrough() {
        // Ok(false) from a handler means "not found here"
        let not_found_called = Arc::new(AtomicBool::new(false));
        let flag = not_found_called.clone();
        let conf = RouterConfig::<(), ()>::default().not_found(
            move |_: &(), _, _: &Params, _: &mut ()| {
                flag.store(true, Ordering::SeqCst);
                Ok(true)
            },
        );

        let mut router = Router::with_config(conf);
        router.add("/skip", |_: &(), _, _: &Params, _: &mut ()| Ok(false));

        let found = router.serve(&(), "/skip", &mut ()).unwrap();
        assert!(found);
        assert!(not_found_called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handler_error_propagates() {
        let mut router: Router<(), ()> = Router::new();
        router.add("/boom", |_: &(), _, _: &Params, _: &mut ()| {
            Err("boom".into())
        });

        let err = router.serve(&(), "/boom", &mut ()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_panic_trap() {
        let trapped = Arc::new(AtomicBool::new(false));
        let flag = trapped.clone();
        let conf = RouterConfig::<(), ()>::default().panic_trap(
            move |_: &(), path: &str, _: &mut (), payload: &(dyn Any + Send)| {
                assert_eq!(path, "/user/gopher");
                assert_eq!(payload.downcast_ref::<&str>(), Some(&"oops!"));
                flag.store(true, Ordering::SeqCst);
            },
        );

        let mut router = Router::with_config(conf);
        router.add("/user/:name", |_: &(), _, _: &Params, _: &mut ()| {
            panic!("oops!")
        });

        let handled = router.serve(&(), "/user/gopher", &mut ()).unwrap();
        assert!(!handled);
        assert!(trapped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_lookup() {
        let router: Router<(), ()> = Router::new();

        // empty router first
        let (handler, params, tsr) = router.lookup("/nope");
        assert!(handler.is_none());
        assert!(params.is_empty());
        assert!(!tsr);

        let mut router = router;
        let handled = Arc::new(AtomicBool::new(false));
        let flag = handled.clone();
        router.add("/user/:name", move |_: &(), _, _: &Params, _: &mut ()| {
            flag.store(true, Ordering::SeqCst);
            Ok(true)
        });

        let (handler, params, _) = router.lookup("/user/gopher");
        let handler = handler.expect("got no handler");
        assert_eq!(params.by_name("name"), Some("gopher"));
        assert!(handler(&(), "/user/gopher", &params, &mut ()).unwrap());
        assert!(handled.load(Ordering::SeqCst));

        // route without parameters takes no buffer
        handled.store(false, Ordering::SeqCst);
        let flag = handled.clone();
        router.add("/user", move |_: &(), _, _: &Params, _: &mut ()| {
            flag.store(true, Ordering::SeqCst);
            Ok(true)
        });
        let (handler, params, _) = router.lookup("/user");
        assert!(handler.is_some());
        assert!(params.is_empty());

        let (handler, _, tsr) = router.lookup("/user/gopher/");
        assert!(handler.is_none());
        assert!(tsr);

        let (handler, _, tsr) = router.lookup("/nope");
        assert!(handler.is_none());
        assert!(!tsr);
    }

    #[test]
    fn test_catch_all_serve() {
        let mut router: Router<(), Vec<String>> = Router::new();
        router.add(
            "/files/*filepath",
            |_: &(), _, params: &Params, seen: &mut Vec<String>| {
                seen.push(params.by_name("filepath").unwrap_or("").to_string());
                Ok(true)
            },
        );

        let mut seen = Vec::new();
        assert!(router.serve(&(), "/files/a/b.txt", &mut seen).unwrap());
        assert!(router.serve(&(), "/files/", &mut seen).unwrap());
        // the bare mount point is redirected to the directory index
        assert!(router.serve(&(), "/files", &mut seen).unwrap());
        assert_eq!(seen, ["/a/b.txt", "/", "/"]);
    }

    #[test]
    fn test_add_conflict_panics() {
        let mut router: Router<(), ()> = Router::new();
        router.add("/user/:name", |_: &(), _, _: &Params, _: &mut ()| Ok(true));
        assert_eq!(
            router.try_add("/user/new", |_: &(), _, _: &Params, _: &mut ()| Ok(true)),
            Err(RouteError::Conflict {
                pattern: "/user/new".to_string(),
                existing: "/user/:name".to_string(),
            })
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            router.add("/user/new", |_: &(), _, _: &Params, _: &mut ()| Ok(true));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_leading_slash_is_added() {
        let mut router: Router<(), ()> = Router::new();
        router.add("hello/:name", |_: &(), _, _: &Params, _: &mut ()| Ok(true));
        assert!(router.serve(&(), "/hello/world", &mut ()).unwrap());
    }
}
