/// A possible error value when registering a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// A handler is already registered for this exact pattern.
    #[error("a handler is already registered for path `{0}`")]
    Duplicate(String),

    /// The pattern would make an existing registration ambiguous: a wildcard
    /// and a static route, or two different wildcards, would occupy the same
    /// path segment.
    #[error("path `{pattern}` conflicts with existing route `{existing}`")]
    Conflict {
        /// The rejected pattern.
        pattern: String,
        /// The already registered pattern it collides with.
        existing: String,
    },

    /// A catch-all parameter is only allowed as the final path segment.
    #[error("catch-all is only allowed at the end of the path in `{0}`")]
    CatchAllNotLast(String),

    /// A placeholder is malformed: the name is empty or contains `/`, `:` or
    /// `*`, or the sigil does not start a path segment.
    #[error("invalid parameter name in path `{0}`")]
    InvalidParam(String),
}
