//! html5ever TreeSink implementation for ArenaDom.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as Html5Attribute, QualName};
use log::trace;

use super::arena::{ArenaDom, Attribute, NodeData, NodeId};

/// Handle used by TreeSink to reference nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle(pub NodeId);

impl Default for NodeHandle {
    fn default() -> Self {
        NodeHandle(NodeId::NONE)
    }
}

/// TreeSink implementation that builds an ArenaDom.
///
/// Uses interior mutability because html5ever's TreeSink trait takes `&self`.
pub struct ArenaSink {
    dom: RefCell<ArenaDom>,
    quirks_mode: Cell<QuirksMode>,
    errors: Cell<usize>,
}

impl Default for ArenaSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaSink {
    pub fn new() -> Self {
        Self {
            dom: RefCell::new(ArenaDom::new()),
            quirks_mode: Cell::new(QuirksMode::NoQuirks),
            errors: Cell::new(0),
        }
    }

    /// Consume the sink and return the DOM.
    pub fn into_dom(self) -> ArenaDom {
        self.dom.into_inner()
    }

    /// Number of recoverable parse errors seen while building the tree.
    pub fn error_count(&self) -> usize {
        self.errors.get()
    }
}

impl TreeSink for ArenaSink {
    type Handle = NodeHandle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        // Malformed markup is expected input; recover like a browser does.
        self.errors.set(self.errors.get() + 1);
        trace!("markup parse error: {msg}");
    }

    fn get_document(&self) -> Self::Handle {
        NodeHandle(self.dom.borrow().document())
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };

        let dom = self.dom.borrow();
        let name: *const QualName = match dom.get(target.0).map(|n| &n.data) {
            Some(NodeData::Element { name, .. }) => &**name,
            _ => return &EMPTY,
        };
        // SAFETY: element names are boxed and never replaced or freed while
        // the sink is alive, so the pointee outlives the RefCell borrow even
        // when the arena vector reallocates.
        unsafe { &*name }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Html5Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let converted_attrs: Vec<Attribute> = attrs
            .into_iter()
            .map(|a| Attribute {
                name: a.name,
                value: a.value.to_string(),
            })
            .collect();

        NodeHandle(self.dom.borrow_mut().create_element(name, converted_attrs))
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        NodeHandle(self.dom.borrow_mut().create_comment(text.to_string()))
    }

    fn create_pi(&self, _target: StrTendril, data: StrTendril) -> Self::Handle {
        // The HTML tokenizer never produces processing instructions; keep the
        // data as a comment so nothing is silently lost.
        NodeHandle(self.dom.borrow_mut().create_comment(data.to_string()))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => dom.append(parent.0, node.0),
            NodeOrText::AppendText(text) => dom.append_text(parent.0, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.dom.borrow().get(element.0).map(|n| n.parent);
        if let Some(parent) = parent
            && parent.is_some()
        {
            self.append_before_sibling(element, child);
            return;
        }
        self.append(prev_element, child);
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        let mut dom = self.dom.borrow_mut();
        let doc = dom.document();
        let doctype =
            dom.create_doctype(name.to_string(), public_id.to_string(), system_id.to_string());
        dom.append(doc, doctype);
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        // Template contents stay inline; content documents rarely use them.
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x.0 == y.0
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        self.quirks_mode.set(mode);
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut dom = self.dom.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => {
                dom.detach(node.0);
                dom.insert_before(sibling.0, node.0);
            }
            NodeOrText::AppendText(text) => {
                // Merge with a preceding text node when there is one
                let prev = dom.get(sibling.0).map(|n| n.prev_sibling).unwrap_or(NodeId::NONE);
                if let Some(node) = dom.get_mut(prev)
                    && let NodeData::Text(ref mut existing) = node.data
                {
                    existing.push_str(&text);
                    return;
                }
                let text_node = dom.create_text(text.to_string());
                dom.insert_before(sibling.0, text_node);
            }
        }
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Html5Attribute>) {
        let mut dom = self.dom.borrow_mut();
        if let Some(node) = dom.get_mut(target.0)
            && let NodeData::Element {
                attrs: existing, ..
            } = &mut node.data
        {
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(Attribute {
                        name: attr.name,
                        value: attr.value.to_string(),
                    });
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        self.dom.borrow_mut().detach(target.0);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.dom.borrow_mut().reparent_children(node.0, new_parent.0);
    }
}

#[cfg(test)]
mod tests {
    use html5ever::driver::ParseOpts;
    use html5ever::parse_document;
    use html5ever::tendril::TendrilSink;

    use super::*;

    fn parse_html(html: &str) -> ArenaDom {
        let sink = ArenaSink::new();
        let result = parse_document(sink, ParseOpts::default())
            .from_utf8()
            .one(html.as_bytes());
        result.into_dom()
    }

    #[test]
    fn test_basic_parse() {
        let dom = parse_html("<html><body><p>Hello</p></body></html>");

        let p = dom.find_by_tag("p").expect("should find p");
        assert_eq!(dom.element_name(p).unwrap().as_ref(), "p");

        let text_id = dom.children(p).next().expect("p should have child");
        assert_eq!(dom.text_content(text_id), Some("Hello"));
    }

    #[test]
    fn test_prefixed_attributes_survive() {
        let dom = parse_html(r#"<html xml:lang="fr" lang="fr"><body epub:type="bodymatter"></body></html>"#);

        let html = dom.find_by_tag("html").expect("should find html");
        assert_eq!(dom.get_attr(html, "xml:lang"), Some("fr"));
        assert_eq!(dom.get_attr(html, "lang"), Some("fr"));

        let body = dom.find_by_tag("body").expect("should find body");
        assert_eq!(dom.get_attr(body, "epub:type"), Some("bodymatter"));
    }

    #[test]
    fn test_misnested_markup_recovers() {
        let sink = ArenaSink::new();
        let sink = parse_document(sink, ParseOpts::default())
            .from_utf8()
            .one("<p><b>bold <i>both</b> italic</i></p><table><td>cell</table>".as_bytes());
        assert!(sink.error_count() > 0);

        let dom = sink.into_dom();
        assert!(dom.find_by_tag("td").is_some());
        assert!(dom.find_by_tag("i").is_some());
    }
}
