//! `{{name}}` placeholder templates for generated JavaScript.
//!
//! Every argument states how it is written into the code: strings become JSON
//! string literals, numbers and booleans print as-is, raw values (generated
//! identifiers, pre-rendered snippets) are inserted verbatim.

use std::borrow::Cow;
use std::fmt;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsArg<'a> {
    Str(Cow<'a, str>),
    Num(f64),
    Bool(bool),
    Raw(Cow<'a, str>),
}

impl<'a> JsArg<'a> {
    pub fn str(s: impl Into<Cow<'a, str>>) -> Self {
        JsArg::Str(s.into())
    }

    pub fn raw(s: impl Into<Cow<'a, str>>) -> Self {
        JsArg::Raw(s.into())
    }
}

impl From<bool> for JsArg<'_> {
    fn from(b: bool) -> Self {
        JsArg::Bool(b)
    }
}

impl From<u16> for JsArg<'_> {
    fn from(n: u16) -> Self {
        JsArg::Num(f64::from(n))
    }
}

impl From<usize> for JsArg<'_> {
    fn from(n: usize) -> Self {
        JsArg::Num(n as f64)
    }
}

impl fmt::Display for JsArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsArg::Str(s) => {
                let quoted = serde_json::to_string(s.as_ref()).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
            // integral values print without a trailing `.0`
            JsArg::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            JsArg::Num(n) => write!(f, "{n}"),
            JsArg::Bool(b) => write!(f, "{b}"),
            JsArg::Raw(s) => f.write_str(s),
        }
    }
}

/// Substitute `{{name}}` placeholders. Unknown names are left in place.
pub fn render(template: &str, args: &[(&str, JsArg<'_>)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match args.iter().find(|(n, _)| *n == name) {
                Some((_, arg)) => arg.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_by_kind() {
        let out = render(
            "f({{s}}, {{n}}, {{b}}, {{r}}, {{missing}})",
            &[
                ("s", JsArg::str("it's \"q\"\n")),
                ("n", JsArg::from(8081u16)),
                ("b", JsArg::from(false)),
                ("r", JsArg::raw("crxm_window")),
            ],
        );
        assert_eq!(
            out,
            r#"f("it's \"q\"\n", 8081, false, crxm_window, {{missing}})"#
        );
    }

    #[test]
    fn repeated_placeholders() {
        assert_eq!(render("{{a}}+{{a}}", &[("a", JsArg::Num(1.5))]), "1.5+1.5");
    }

    #[test]
    fn js_braces_are_untouched() {
        let src = "if (x) {{ y(); }}";
        assert_eq!(render(src, &[]), src);
    }
}
