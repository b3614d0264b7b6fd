//! One compiled resource wrapped as a named function.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::template::{render, JsArg};

/// Identifier for the function holding `path`'s code.
///
/// Standard base64 of the path, made identifier-safe: `=` → `$`, `+` → `_p`,
/// `/` → `_s`, and a leading `_` when the first character is a digit. `_`
/// never occurs in the base64 alphabet, so distinct paths keep distinct names.
pub fn function_name(path: &str) -> String {
    let encoded = STANDARD.encode(path.as_bytes());
    let mut name = String::with_capacity(encoded.len() + 8);
    if encoded.starts_with(|c: char| c.is_ascii_digit()) {
        name.push('_');
    }
    for c in encoded.chars() {
        match c {
            '=' => name.push('$'),
            '+' => name.push_str("_p"),
            '/' => name.push_str("_s"),
            other => name.push(other),
        }
    }
    name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Script,
    Style,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub file_path: String,
    pub code: String,
    pub function_name: String,
    pub kind: BlockKind,
}

const STYLE_FUNCTION: &str = r#"function {{name}}() {
  const css = {{css}};
  const doc = crxm_window.document;
  const style = doc.createElement('style');
  const policy = crxm_policy('crxm-trusted-style-policy');
  if (policy !== null) {
    style.innerHTML = policy.createHTML(css);
  } else {
    style.textContent = css;
  }
  (doc.head || doc.documentElement).appendChild(style);
}
"#;

impl CodeBlock {
    pub fn script(file_path: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(file_path.into(), code.into(), BlockKind::Script)
    }

    pub fn style(file_path: impl Into<String>, css: impl Into<String>) -> Self {
        Self::new(file_path.into(), css.into(), BlockKind::Style)
    }

    fn new(file_path: String, code: String, kind: BlockKind) -> Self {
        Self {
            function_name: function_name(&file_path),
            file_path,
            code,
            kind,
        }
    }

    pub fn functionalize(&self) -> String {
        let comment = self.file_path.replace(['\r', '\n'], " ");
        match self.kind {
            BlockKind::Script => format!(
                "\n// {comment}\nfunction {}() {{\n{}\n}}\n",
                self.function_name, self.code
            ),
            BlockKind::Style => {
                let body = render(
                    STYLE_FUNCTION,
                    &[
                        ("name", JsArg::raw(self.function_name.as_str())),
                        ("css", JsArg::str(self.code.as_str())),
                    ],
                );
                format!("\n// {comment}\n{body}")
            }
        }
    }
}
