//! Thin mutable wrapper around an html5ever DOM: reference collection,
//! attribute rewrites and inlining.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use tendril::StrTendril;

lazy_static! {
    /// Absolute URLs never enter the dependency graph.
    static ref EXTERNAL_URL: Regex = Regex::new(r"^(http:|https:|file:|data:)").unwrap();
}

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

pub const SCRIPT_TAGS: &[&str] = &["script"];
pub const HREF_TAGS: &[&str] = &["link"];
pub const MEDIA_TAGS: &[&str] = &["img", "video", "iframe"];

/// Whether `value` names a local resource worth tracking.
pub fn is_local_reference(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with('#') && !EXTERNAL_URL.is_match(value)
}

pub struct HtmlDocument {
    dom: RcDom,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> io::Result<Self> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut source.as_bytes())?;
        Ok(Self { dom })
    }

    /// Local `attr` values of elements named in `tags`, de-duplicated in
    /// document order. Elements carrying `no-bundle` (empty or `true`) are
    /// skipped.
    pub fn references(&self, tags: &[&str], attr: &str) -> Vec<String> {
        self.references_where(tags, attr, |_| true)
    }

    /// Local `<link rel="stylesheet" href>` values. Only these are compiled.
    pub fn stylesheet_references(&self) -> Vec<String> {
        self.references_where(HREF_TAGS, "href", is_stylesheet)
    }

    /// Every other local `<link href>`: icons, manifests, preloads. They are
    /// copied like media.
    pub fn link_asset_references(&self) -> Vec<String> {
        self.references_where(HREF_TAGS, "href", |n| !is_stylesheet(n))
    }

    fn references_where(&self, tags: &[&str], attr: &str, keep: impl Fn(&Handle) -> bool) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for node in self.elements(tags) {
            if opted_out(&node) || !keep(&node) {
                continue;
            }
            if let Some(value) = attr_value(&node, attr) {
                if is_local_reference(&value) && !out.contains(&value) {
                    out.push(value);
                }
            }
        }
        out
    }

    /// Set `attr` to `to` on every `tags` element whose `attr` is exactly
    /// `from`. Returns how many elements changed.
    pub fn rewrite_attr(&self, tags: &[&str], attr: &str, from: &str, to: &str) -> usize {
        let mut changed = 0;
        for node in self.elements(tags) {
            if let NodeData::Element { attrs, .. } = &node.data {
                for a in attrs.borrow_mut().iter_mut() {
                    if &*a.name.local == attr && &*a.value == from {
                        a.value = StrTendril::from_slice(to);
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    /// `<script src="raw">` → `<script>text</script>`.
    pub fn inline_script(&self, raw: &str, text: &str) -> usize {
        let text = text.replace("</script", "<\\/script");
        let targets: Vec<Handle> = self
            .elements(SCRIPT_TAGS)
            .into_iter()
            .filter(|n| attr_value(n, "src").as_deref() == Some(raw))
            .collect();

        for node in &targets {
            remove_attr(node, "src");
            set_text(node, &text);
        }
        targets.len()
    }

    /// `<link rel="stylesheet" href="raw">` → `<style>text</style>`.
    pub fn inline_stylesheet(&self, raw: &str, text: &str) -> usize {
        let targets: Vec<Handle> = self
            .elements(HREF_TAGS)
            .into_iter()
            .filter(|n| attr_value(n, "href").as_deref() == Some(raw) && is_stylesheet(n))
            .collect();

        for node in &targets {
            let style = element("style");
            set_text(&style, text);
            replace_node(node, style);
        }
        targets.len()
    }

    /// Append a `<style>` to `<head>` (or to the root element if the document
    /// somehow has no head).
    pub fn append_style(&self, css: &str) {
        let parent = self
            .elements(&["head"])
            .into_iter()
            .next()
            .or_else(|| self.elements(&["html"]).into_iter().next())
            .unwrap_or_else(|| self.dom.document.clone());

        let style = element("style");
        set_text(&style, css);
        append_child(&parent, style);
    }

    pub fn to_html(&self) -> io::Result<String> {
        let mut out = Vec::new();
        let handle: SerializableHandle = self.dom.document.clone().into();
        serialize(
            &mut out,
            &handle,
            SerializeOpts {
                traversal_scope: TraversalScope::ChildrenOnly(None),
                ..Default::default()
            },
        )?;
        String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn elements(&self, tags: &[&str]) -> Vec<Handle> {
        let mut out = Vec::new();
        collect_elements(&self.dom.document, tags, &mut out);
        out
    }
}

fn collect_elements(node: &Handle, tags: &[&str], out: &mut Vec<Handle>) {
    if let NodeData::Element { name, .. } = &node.data {
        if tags.contains(&&*name.local) {
            out.push(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, tags, out);
    }
}

fn attr_value(node: &Handle, attr: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == attr)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn is_stylesheet(node: &Handle) -> bool {
    attr_value(node, "rel")
        .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
        .unwrap_or(false)
}

fn opted_out(node: &Handle) -> bool {
    matches!(attr_value(node, "no-bundle").as_deref(), Some("") | Some("true"))
}

fn remove_attr(node: &Handle, attr: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|a| &*a.name.local != attr);
    }
}

fn element(local: &str) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NS), LocalName::from(local)),
        attrs: RefCell::new(Vec::<Attribute>::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

fn set_text(node: &Handle, text: &str) {
    let child = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    });
    child.parent.set(Some(Rc::downgrade(node)));
    *node.children.borrow_mut() = vec![child];
}

fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

fn replace_node(old: &Handle, new: Handle) {
    let Some(parent) = old.parent.take().and_then(|weak| weak.upgrade()) else {
        return;
    };
    new.parent.set(Some(Rc::downgrade(&parent)));
    let mut children = parent.children.borrow_mut();
    if let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, old)) {
        children[index] = new;
    }
}
