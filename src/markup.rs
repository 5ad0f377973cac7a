//! Markup Tree
//!
//! An owned, mutable tree for the markup files of an EPUB (content documents and
//! the package document). The tree is built from `quick_xml` events and written
//! back through a `quick_xml::Writer`, so that everything the conversion does not
//! touch comes out as it went in.
//!
//! Text and attribute values are kept in their escaped source form. Values read
//! through [XmlElement::get_attr] are unescaped, values stored through
//! [XmlElement::set_attr] and [Node::text] are escaped on the way in.
//!
//! Content documents are read in [MarkupMode::Html], which is lenient in the way
//! they need: HTML void elements written without a closing slash do not swallow
//! their siblings, mismatched end tags close the nearest matching element, stray
//! end tags are dropped and a bare `&` is taken as literal text. The package
//! document is read in [MarkupMode::Xml], where `<meta>` and `<link>` are
//! ordinary elements that may hold content.

use std::{borrow::Cow, io::Cursor};

use indexmap::IndexMap;
use quick_xml::{
    Reader, Writer,
    escape::{escape, unescape},
    events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event},
};

use crate::error::ConvertError;

pub(crate) type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// A child-index path from the document root down to a node
pub type NodePath = Vec<usize>;

/// HTML elements that never have content
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// How markup is interpreted while parsing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MarkupMode {
    /// HTML-tolerant reading for content documents
    #[default]
    Html,

    /// Well-formed XML, as in the package document
    Xml,
}

/// The `<?xml ...?>` declaration of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A node of the markup tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(XmlElement),

    /// Escaped character data
    Text(String),

    /// Raw comment content, without `<!--` and `-->`
    Comment(String),

    CData(String),

    /// Raw doctype content, e.g. `html`
    DocType(String),

    Declaration(Declaration),

    /// Raw processing instruction content, without `<?` and `?>`
    ProcessingInstruction(String),
}

impl Node {
    /// Creates a text node, escaping the given plain text
    pub fn text(value: &str) -> Self {
        Node::Text(escape(value).to_string())
    }

    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl From<XmlElement> for Node {
    fn from(value: XmlElement) -> Self {
        Node::Element(value)
    }
}

/// Represents an element node in a markup document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The attributes of the element in source order
    ///
    /// The key is the full attribute name, the value is the escaped attribute value.
    pub attributes: IndexMap<String, String>,

    /// The children of the element
    pub children: Vec<Node>,

    /// Whether the element was written as `<tag/>`
    pub self_closing: bool,
}

impl XmlElement {
    /// Create a new element
    ///
    /// A qualified name such as `opf:meta` is split into prefix and local name.
    pub fn new(name: &str) -> Self {
        let (prefix, name) = match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
            None => (None, name.to_string()),
        };

        Self {
            name,
            prefix,
            attributes: IndexMap::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Compares the local name, ignoring ASCII case
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.iter().any(|void| self.is(void))
    }

    /// Returns the unescaped value of the specified attribute
    ///
    /// Values containing entities unknown to XML, such as `&nbsp;`,
    /// are returned as written.
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(|raw| match unescape(raw) {
            Ok(value) => value.to_string(),
            Err(_) => raw.clone(),
        })
    }

    /// Sets an attribute, escaping the value
    ///
    /// An existing attribute keeps its position, a new one is appended.
    pub fn set_attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.attributes
            .insert(name.to_string(), escape(value).to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::text(text));
        self
    }

    pub fn append(&mut self, child: impl Into<Node>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    /// Checks the whitespace-separated `class` list for the given class
    pub fn has_class(&self, class: &str) -> bool {
        self.get_attr("class")
            .is_some_and(|value| value.split_whitespace().any(|item| item == class))
    }

    /// Gets the unescaped text content of the element and all its descendants
    pub fn text(&self) -> String {
        let mut result = String::new();
        collect_text(&self.children, &mut result);
        result
    }

    /// Find all elements with the specified local name, the element itself included
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        let mut elements = Vec::new();
        collect_elements(self, &mut elements);

        let name = name.to_string();
        elements.into_iter().filter(move |element| element.is(&name))
    }

    /// Get children elements
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(Node::as_element)
    }
}

fn collect_elements<'a>(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
    collection.push(element);
    for child in element.child_elements() {
        collect_elements(child, collection);
    }
}

fn collect_text(nodes: &[Node], result: &mut String) {
    for node in nodes {
        match node {
            Node::Text(raw) => match unescape(raw) {
                Ok(text) => result.push_str(&text),
                Err(_) => result.push_str(raw),
            },
            Node::CData(text) => result.push_str(text),
            Node::Element(element) => collect_text(&element.children, result),
            _ => {}
        }
    }
}

fn collect_paths<F>(nodes: &[Node], predicate: &F, current: &mut NodePath, paths: &mut Vec<NodePath>)
where
    F: Fn(&XmlElement) -> bool,
{
    for (index, node) in nodes.iter().enumerate() {
        if let Node::Element(element) = node {
            current.push(index);
            if predicate(element) {
                paths.push(current.clone());
            }
            collect_paths(&element.children, predicate, current, paths);
            current.pop();
        }
    }
}

/// A parsed markup document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Top-level nodes: declaration, doctype, comments and the root element
    pub children: Vec<Node>,
}

impl Document {
    /// Parses content document markup, tolerating HTML habits
    pub fn parse(content: &str) -> Result<Self, ConvertError> {
        MarkupReader::parse(content, MarkupMode::Html)
    }

    /// Parses well-formed XML such as the package document
    pub fn parse_xml(content: &str) -> Result<Self, ConvertError> {
        MarkupReader::parse(content, MarkupMode::Xml)
    }

    /// Serializes the document
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConvertError> {
        MarkupWriter::write(self)
    }

    /// The first top-level element
    pub fn root_element(&self) -> Option<&XmlElement> {
        self.children.iter().find_map(Node::as_element)
    }

    pub fn root_element_mut(&mut self) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(Node::as_element_mut)
    }

    /// Finds the first element with the specified local name in document order
    pub fn find_element(&self, name: &str) -> Option<&XmlElement> {
        let path = self.find_paths(|element| element.is(name)).into_iter().next()?;
        self.node(&path)?.as_element()
    }

    pub fn find_element_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        let path = self.find_paths(|element| element.is(name)).into_iter().next()?;
        self.node_mut(&path)?.as_element_mut()
    }

    /// Collects the paths of all elements matching the predicate
    ///
    /// Paths are returned in depth-first source order. They stay valid as long as
    /// no node is inserted into or removed from a sibling list before them.
    pub fn find_paths<F>(&self, predicate: F) -> Vec<NodePath>
    where
        F: Fn(&XmlElement) -> bool,
    {
        let mut paths = Vec::new();
        let mut current = Vec::new();
        collect_paths(&self.children, &predicate, &mut current, &mut paths);
        paths
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            node = node.as_element()?.children.get(*index)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            node = node.as_element_mut()?.children.get_mut(*index)?;
        }
        Some(node)
    }

    /// Returns the sibling list holding the node at `path` and its index in it
    fn siblings_mut(&mut self, path: &[usize]) -> Option<(&mut Vec<Node>, usize)> {
        let (last, parent) = path.split_last()?;
        if parent.is_empty() {
            return Some((&mut self.children, *last));
        }

        let siblings = &mut self.node_mut(parent)?.as_element_mut()?.children;
        Some((siblings, *last))
    }

    /// Inserts `node` right before the node at `path`, then removes the old node
    ///
    /// The new node takes over the position, so paths of other nodes stay valid.
    /// Returns the removed node.
    pub fn replace(&mut self, path: &[usize], node: Node) -> Option<Node> {
        let (siblings, index) = self.siblings_mut(path)?;
        if index >= siblings.len() {
            return None;
        }

        siblings.insert(index, node);
        Some(siblings.remove(index + 1))
    }

    /// Removes the node at `path`
    ///
    /// Paths of following siblings and their descendants are invalidated.
    pub fn remove(&mut self, path: &[usize]) -> Option<Node> {
        let (siblings, index) = self.siblings_mut(path)?;
        if index >= siblings.len() {
            return None;
        }

        Some(siblings.remove(index))
    }

    pub fn declaration_mut(&mut self) -> Option<&mut Declaration> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Declaration(declaration) => Some(declaration),
            _ => None,
        })
    }
}

/// Markup parser building a [Document] from `quick_xml` events
pub struct MarkupReader {}

impl MarkupReader {
    /// Parses markup from string and builds the document tree
    ///
    /// ## Parameters
    /// - `content`: The markup string to be parsed
    /// - `mode`: Whether HTML habits are tolerated
    ///
    /// ## Return
    /// - `Ok(Document)`: The document tree
    /// - `Err(ConvertError)`: The input is empty, has no element, or is malformed
    pub fn parse(content: &str, mode: MarkupMode) -> Result<Document, ConvertError> {
        if content.is_empty() {
            return Err(ConvertError::EmptyDataError);
        }

        let html = mode == MarkupMode::Html;
        let content = match mode {
            MarkupMode::Html => escape_stray_ampersands(content),
            MarkupMode::Xml => Cow::Borrowed(content),
        };

        let mut reader = Reader::from_str(&content);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = !html;
        config.allow_unmatched_ends = html;
        config.check_comments = false;

        let mut document = Document::default();
        let mut stack = Vec::<XmlElement>::new();

        loop {
            match reader.read_event() {
                // End of file, stop the loop
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::element_from(&e, false);

                    // `<br>` in HTML never gets a closing tag
                    if html && element.is_void() {
                        Self::push_node(&mut document, &mut stack, Node::Element(element));
                    } else {
                        stack.push(element);
                    }
                }

                Ok(Event::Empty(e)) => {
                    let element = Self::element_from(&e, true);
                    Self::push_node(&mut document, &mut stack, Node::Element(element));
                }

                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let position = stack
                        .iter()
                        .rposition(|element| element.tag_name().eq_ignore_ascii_case(&name));

                    // Close everything opened after the matching element;
                    // an end tag without a matching start is dropped.
                    if let Some(position) = position {
                        while stack.len() > position {
                            if let Some(element) = stack.pop() {
                                Self::push_node(&mut document, &mut stack, Node::Element(element));
                            }
                        }
                    }
                }

                Ok(Event::Text(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::push_text(&mut document, &mut stack, &text);
                }

                Ok(Event::GeneralRef(e)) => {
                    let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                    Self::push_text(&mut document, &mut stack, &entity);
                }

                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::push_node(&mut document, &mut stack, Node::CData(text));
                }

                Ok(Event::Comment(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::push_node(&mut document, &mut stack, Node::Comment(text));
                }

                Ok(Event::DocType(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    Self::push_node(&mut document, &mut stack, Node::DocType(text));
                }

                Ok(Event::PI(e)) => {
                    let text = String::from_utf8_lossy(&e).to_string();
                    Self::push_node(&mut document, &mut stack, Node::ProcessingInstruction(text));
                }

                Ok(Event::Decl(e)) => {
                    let version = e.version().map_err(quick_xml::Error::from)?;
                    let encoding = match e.encoding() {
                        Some(Ok(value)) => Some(String::from_utf8_lossy(&value).to_string()),
                        _ => None,
                    };
                    let standalone = match e.standalone() {
                        Some(Ok(value)) => Some(String::from_utf8_lossy(&value).to_string()),
                        _ => None,
                    };

                    let declaration = Declaration {
                        version: String::from_utf8_lossy(&version).to_string(),
                        encoding,
                        standalone,
                    };
                    Self::push_node(&mut document, &mut stack, Node::Declaration(declaration));
                }

                Err(err) => return Err(err.into()),

                #[allow(unreachable_patterns)]
                _ => continue,
            }
        }

        // Elements left open at the end of input are closed implicitly
        while let Some(element) = stack.pop() {
            Self::push_node(&mut document, &mut stack, Node::Element(element));
        }

        if document.root_element().is_none() {
            return Err(ConvertError::FailedParsingMarkup);
        }

        Ok(document)
    }

    fn element_from(start: &BytesStart, self_closing: bool) -> XmlElement {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(&name);
        element.self_closing = self_closing;

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        // `html_attributes` also accepts valueless attributes such as `hidden`
        for attr in start.html_attributes().flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let attr_value = String::from_utf8_lossy(&attr.value).to_string();
            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    fn push_node(document: &mut Document, stack: &mut [XmlElement], node: Node) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => document.children.push(node),
        }
    }

    /// Appends text, merging it into a directly preceding text node
    fn push_text(document: &mut Document, stack: &mut [XmlElement], text: &str) {
        let siblings = match stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut document.children,
        };

        match siblings.last_mut() {
            Some(Node::Text(previous)) => previous.push_str(text),
            _ => siblings.push(Node::Text(text.to_string())),
        }
    }
}

/// Rewrites every `&` that does not start a character or entity reference as `&amp;`
///
/// Comments, CDATA sections and processing instructions are copied as they are.
fn escape_stray_ampersands(content: &str) -> Cow<'_, str> {
    if !content.contains('&') {
        return Cow::Borrowed(content);
    }

    let mut result = String::with_capacity(content.len() + 16);
    let mut changed = false;
    let mut rest = content;

    while let Some(index) = rest.find(['&', '<']) {
        let (head, tail) = rest.split_at(index);
        result.push_str(head);

        if tail.starts_with('<') {
            let skip = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")]
                .iter()
                .find(|(open, _)| tail.starts_with(open))
                .map(|(open, close)| match tail[open.len()..].find(close) {
                    Some(end) => open.len() + end + close.len(),
                    None => tail.len(),
                })
                .unwrap_or(1);

            result.push_str(&tail[..skip]);
            rest = &tail[skip..];
            continue;
        }

        if starts_with_reference(&tail[1..]) {
            result.push('&');
        } else {
            result.push_str("&amp;");
            changed = true;
        }
        rest = &tail[1..];
    }
    result.push_str(rest);

    if changed {
        Cow::Owned(result)
    } else {
        Cow::Borrowed(content)
    }
}

/// Checks for `name;`, `#123;` or `#x1F;` at the start of `text`
fn starts_with_reference(text: &str) -> bool {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '#' | '_' | ':' | '.' | '-')))
        .unwrap_or(text.len());
    if !text[end..].starts_with(';') {
        return false;
    }

    let name = &text[..end];
    match name.strip_prefix('#') {
        Some(number) => match number.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()),
        },
        None => {
            let mut chars = name.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'))
        }
    }
}

/// Serializes a [Document] through a `quick_xml::Writer`
pub struct MarkupWriter {}

impl MarkupWriter {
    pub fn write(document: &Document) -> Result<Vec<u8>, ConvertError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        for node in &document.children {
            Self::write_node(&mut writer, node)?;
        }

        Ok(writer.into_inner().into_inner())
    }

    fn write_node(writer: &mut XmlWriter, node: &Node) -> Result<(), ConvertError> {
        match node {
            Node::Element(element) => Self::write_element(writer, element)?,

            Node::Text(raw) => {
                writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?
            }

            Node::Comment(raw) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(raw.as_str())))?
            }

            Node::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,

            Node::DocType(raw) => {
                writer.write_event(Event::DocType(BytesText::from_escaped(raw.as_str())))?
            }

            Node::Declaration(declaration) => writer.write_event(Event::Decl(BytesDecl::new(
                &declaration.version,
                declaration.encoding.as_deref(),
                declaration.standalone.as_deref(),
            )))?,

            Node::ProcessingInstruction(raw) => {
                writer.write_event(Event::PI(BytesPI::new(raw.as_str())))?
            }
        }

        Ok(())
    }

    fn write_element(writer: &mut XmlWriter, element: &XmlElement) -> Result<(), ConvertError> {
        let tag_name = element.tag_name();
        let mut start = BytesStart::new(tag_name.as_str());

        for (key, raw) in &element.attributes {
            // A value read from a single-quoted attribute may hold a bare `"`
            let value = raw.replace('"', "&quot;");
            start.push_attribute((key.as_bytes(), value.as_bytes()));
        }

        if element.children.is_empty() && (element.self_closing || element.is_void()) {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &element.children {
            Self::write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag_name.as_str())))?;

        Ok(())
    }
}
