//! Per-conversion error context: a JSON-Pointer path stack plus an
//! invalid-property accumulator, threaded by reference through the aspect
//! translators so none of them need to carry a path argument of their own.

use std::collections::BTreeSet;

/// Tracks the current JSON-Pointer breadcrumb and the set of property paths
/// that failed validation during one `iCalToJs`/`jsToICal` call.
#[derive(Debug, Default)]
pub struct ConversionContext {
    path: Vec<String>,
    invalid: BTreeSet<String>,
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a path segment for the duration of `f`, then pop it again.
    pub fn with_prop<T>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(encode_segment(&segment.into()));
        let result = f(self);
        self.path.pop();
        result
    }

    /// Record the current path (optionally joined with `sub_name`) as invalid.
    pub fn invalid_prop(&mut self, sub_name: Option<&str>) {
        let mut pointer = self.current_pointer();
        if let Some(sub) = sub_name {
            pointer.push('/');
            pointer.push_str(&encode_segment(sub));
        }
        self.invalid.insert(pointer);
    }

    /// The current JSON-Pointer, e.g. `/participants/p1/roles`.
    pub fn current_pointer(&self) -> String {
        if self.path.is_empty() {
            String::new()
        } else {
            format!("/{}", self.path.join("/"))
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.invalid.is_empty()
    }

    pub fn into_invalid_paths(self) -> Vec<String> {
        self.invalid.into_iter().collect()
    }
}

/// JSON-Pointer segment escaping: `~` → `~0`, `/` → `~1` (RFC 6901 §4).
fn encode_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_builds_pointer() {
        let mut ctx = ConversionContext::new();
        ctx.with_prop("participants", |ctx| {
            ctx.with_prop("p1", |ctx| {
                ctx.invalid_prop(Some("roles"));
            });
        });
        assert_eq!(
            ctx.into_invalid_paths(),
            vec!["/participants/p1/roles".to_string()]
        );
    }

    #[test]
    fn segment_with_slash_is_escaped() {
        let mut ctx = ConversionContext::new();
        ctx.with_prop("keywords", |ctx| {
            ctx.invalid_prop(Some("a/b"));
        });
        assert_eq!(ctx.into_invalid_paths(), vec!["/keywords/a~1b".to_string()]);
    }

    #[test]
    fn empty_context_has_no_errors() {
        let ctx = ConversionContext::new();
        assert!(!ctx.has_errors());
    }
}
