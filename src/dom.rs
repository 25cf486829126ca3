//! Mutable document-tree operations over the html5ever rcdom.
//!
//! The rewriter and injector need a small DOM surface: create elements,
//! append/insert children, query by tag or attribute, get/set attributes,
//! replace text content, serialize. Everything here is namespace-plain
//! HTML; the parser's error recovery guarantees `html`/`head`/`body`
//! wrappers exist on every parsed document.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{namespace_url, ns, Attribute, LocalName, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// Parse an HTML text into a document tree. html5ever recovers from any
/// malformed input, so the only failure mode is the reader's, which for
/// an in-memory buffer does not occur in practice.
pub fn parse_html(html: &str) -> io::Result<RcDom> {
    html5ever::parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
}

pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: (*value).into(),
        })
        .collect();
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(text.into()),
    })
}

pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

pub fn insert_first(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().insert(0, child);
}

pub fn remove_from_parent(child: &Handle) {
    let parent = match child.parent.take().and_then(|weak| weak.upgrade()) {
        Some(parent) => parent,
        None => return,
    };
    parent
        .children
        .borrow_mut()
        .retain(|sibling| !Rc::ptr_eq(sibling, child));
}

/// Lowercased tag name, or `None` for non-element nodes.
pub fn element_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

pub fn get_attribute(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// Set `attr_name` in place, appending it when absent.
pub fn set_attribute(node: &Handle, attr_name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(attr) = attrs.iter_mut().find(|a| a.name.local.as_ref() == attr_name) {
            attr.value = value.into();
            return;
        }
        attrs.push(Attribute {
            name: QualName::new(None, ns!(), LocalName::from(attr_name)),
            value: value.into(),
        });
    }
}

pub fn remove_attribute(node: &Handle, attr_name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs
            .borrow_mut()
            .retain(|attr| attr.name.local.as_ref() != attr_name);
    }
}

/// Replace the node's children with a single text node.
pub fn set_text_content(node: &Handle, text: &str) {
    node.children.borrow_mut().clear();
    append_child(node, create_text(text));
}

/// Concatenated text of the node's direct text children.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}

/// Depth-first pre-order visit of every element under `root`, `root`
/// included when it is an element.
pub fn walk_elements<F>(root: &Handle, visit: &mut F)
where
    F: FnMut(&Handle),
{
    if matches!(root.data, NodeData::Element { .. }) {
        visit(root);
    }
    let children: Vec<Handle> = root.children.borrow().iter().cloned().collect();
    for child in children {
        walk_elements(&child, visit);
    }
}

/// Every element under `root` satisfying `predicate`, in document order.
/// Collected up front so callers may mutate the tree while iterating.
pub fn collect_elements<F>(root: &Handle, predicate: F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut found = Vec::new();
    walk_elements(root, &mut |node| {
        if predicate(node) {
            found.push(node.clone());
        }
    });
    found
}

/// The `<html>` element of a parsed document.
pub fn document_element(dom: &RcDom) -> Option<Handle> {
    dom.document
        .children
        .borrow()
        .iter()
        .find(|node| element_name(node).as_deref() == Some("html"))
        .cloned()
}

/// The `<head>` element of a parsed document.
pub fn document_head(dom: &RcDom) -> Option<Handle> {
    let html = document_element(dom)?;
    let head = html
        .children
        .borrow()
        .iter()
        .find(|node| element_name(node).as_deref() == Some("head"))
        .cloned();
    head
}

/// Serialize the document element, tag included.
pub fn serialize_document_element(dom: &RcDom) -> io::Result<String> {
    let root = match document_element(dom) {
        Some(root) => root,
        None => return Ok(String::new()),
    };
    let mut bytes = Vec::new();
    let serializable: SerializableHandle = root.into();
    serialize(
        &mut bytes,
        &serializable,
        SerializeOpts {
            traversal_scope: TraversalScope::IncludeNode,
            ..Default::default()
        },
    )?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
