//! Assembles one `.user.js` document from the header, the compiled blocks,
//! the optional popup menu command and the injector.

use tracing::warn;

use crate::js::reprint_script;
use crate::template::{render, JsArg};

use super::codeblock::CodeBlock;
use super::header::HeaderFactory;
use super::injector::{CodeInjector, PRELUDE};

/// Popup shown from the userscript manager's menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupMenu {
    pub title: String,
    pub html: String,
}

const POPUP_MENU: &str = r#"
function crxm_popup() {
  const doc = crxm_window.document;
  const existing = doc.getElementById('crxm-popup-frame');
  if (existing !== null) {
    existing.remove();
    return;
  }
  const html = {{html}};
  const frame = doc.createElement('iframe');
  frame.id = 'crxm-popup-frame';
  frame.setAttribute('sandbox', 'allow-scripts allow-forms');
  const policy = crxm_policy('crxm-trusted-popup-policy');
  frame.srcdoc = policy !== null ? policy.createHTML(html) : html;
  Object.assign(frame.style, {
    position: 'fixed',
    top: '12px',
    right: '12px',
    width: '360px',
    height: '480px',
    border: 'none',
    borderRadius: '8px',
    boxShadow: '0 4px 16px rgba(0, 0, 0, 0.3)',
    background: '#fff',
    zIndex: '2147483647',
  });
  frame.addEventListener('mouseleave', () => frame.remove());
  (doc.body || doc.documentElement).appendChild(frame);
}

if (typeof GM !== 'undefined' && typeof GM.registerMenuCommand === 'function') {
  GM.registerMenuCommand({{title}}, crxm_popup);
}
"#;

#[derive(Debug, Clone, Default)]
pub struct UserscriptBundle {
    header: HeaderFactory,
    blocks: Vec<CodeBlock>,
    injector: CodeInjector,
    popup: Option<PopupMenu>,
}

impl UserscriptBundle {
    pub fn new(header: HeaderFactory, injector: CodeInjector) -> Self {
        Self {
            header,
            injector,
            ..Self::default()
        }
    }

    pub fn header(&self) -> &HeaderFactory {
        &self.header
    }

    /// Add or replace the block for `block.file_path`.
    pub fn add_block(&mut self, block: CodeBlock) {
        match self
            .blocks
            .iter_mut()
            .find(|b| b.file_path == block.file_path && b.kind == block.kind)
        {
            Some(existing) => *existing = block,
            None => self.blocks.push(block),
        }
    }

    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    pub fn set_popup(&mut self, popup: PopupMenu) {
        self.popup = Some(popup);
    }

    /// Everything after the header, before formatting.
    pub fn raw_body(&self) -> String {
        let mut body = String::from(PRELUDE);
        for block in &self.blocks {
            body.push_str(&block.functionalize());
        }
        if let Some(popup) = &self.popup {
            body.push_str(&render(
                POPUP_MENU,
                &[
                    ("html", JsArg::str(popup.html.as_str())),
                    ("title", JsArg::str(popup.title.as_str())),
                ],
            ));
        }
        body.push_str(&self.injector.code());
        body
    }

    /// The complete userscript. A body that fails to parse is kept as written.
    pub fn render(&self) -> String {
        let raw = self.raw_body();
        let body = match reprint_script(&raw) {
            Ok(formatted) => formatted,
            Err(errors) => {
                warn!(
                    errors = errors.len(),
                    first = errors.first().map(String::as_str).unwrap_or_default(),
                    "userscript body did not parse, writing it unformatted"
                );
                raw
            }
        };
        format!("{}\n\n{body}", self.header)
    }
}
