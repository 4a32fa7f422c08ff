//! Native values to wire elements.
//!
//! Encoding is an explicit state machine rather than a recursive walk, so it
//! can stop in the middle of a document. A [`Producer`] keeps a stack of
//! frames: one per complex element still open, one per finite sequence being
//! iterated, and one per push source waiting for items. When the top frame is
//! a push source the producer suspends and hands control back to the caller,
//! who feeds it items one at a time with [`Producer::feed`].
//!
//! Every complex frame owns exactly one open element on the sink, so unwinding
//! the stack (on completion or on [`Feed::Cancel`]) always leaves the output
//! well-formed.

use helios_rpc_model::{
    BinaryEncoding, DescriptorId, Element, Fault, FaultDetail, Interface, Member, QName,
    SOAP_ENV_NS, TypeKind, Value, xsi_nil, xsi_type,
};
use tracing::{debug, trace, warn};

use crate::dict;
use crate::error::{Result, XmlError};
use crate::ingest::parse_fragment;
use crate::protocol::XmlDocument;
use crate::sink::WireSink;

/// Input for a suspended producer.
#[derive(Debug)]
pub enum Feed {
    /// One item from the push source the producer is waiting on.
    Item(Value),
    /// The push source is exhausted; continue with the rest of the document.
    Finish,
    /// Abandon the document, closing everything still open.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting for the next [`Feed`].
    Suspended,
    Done,
}

/// Outcome of a top-level encode.
#[derive(Debug)]
pub enum EncodeOutcome<'p> {
    Done,
    /// A push source was reached; drive the producer to finish the document.
    Suspended(Producer<'p>),
}

struct ComplexFrame {
    ty: DescriptorId,
    source: Value,
    order: Vec<Member>,
    cursor: usize,
    delayed: Vec<Member>,
}

type Items = Box<dyn Iterator<Item = std::result::Result<Value, Fault>> + Send>;

enum Frame {
    Complex(ComplexFrame),
    Items {
        ty: DescriptorId,
        tag: QName,
        items: Items,
    },
    Push {
        ty: DescriptorId,
        tag: QName,
        written: usize,
    },
}

enum Next {
    Suspend,
    Done,
    Emit(DescriptorId, Value, QName),
    Member(Member, Option<Value>),
    CloseComplex,
    PopItems,
    Fail(Fault),
}

/// A resumable encoder over one document.
pub struct Producer<'p> {
    protocol: &'p XmlDocument,
    binary_encoding: BinaryEncoding,
    stack: Vec<Frame>,
    finished: bool,
}

impl std::fmt::Debug for Producer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("depth", &self.stack.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'p> Producer<'p> {
    pub(crate) fn new(protocol: &'p XmlDocument, binary_encoding: BinaryEncoding) -> Self {
        Self {
            protocol,
            binary_encoding,
            stack: Vec::new(),
            finished: false,
        }
    }

    pub(crate) fn protocol(&self) -> &'p XmlDocument {
        self.protocol
    }

    fn interface(&self) -> &'p Interface {
        self.protocol.interface()
    }

    pub fn binary_encoding(&self) -> BinaryEncoding {
        self.binary_encoding
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Starts encoding `value` under `tag`. With `delegate`, a sub-protocol
    /// named by the type takes over the value.
    pub(crate) fn start(
        &mut self,
        sink: &mut dyn WireSink,
        ty: DescriptorId,
        value: Option<Value>,
        tag: QName,
        delegate: bool,
    ) -> Result<Step> {
        let started = if delegate {
            self.emit(sink, ty, value, &tag)
        } else {
            self.emit_local(sink, ty, value, &tag)
        };
        let step = started.and_then(|()| self.drive(sink));
        self.unwind_on_error(sink, step)
    }

    /// Resumes a suspended producer.
    ///
    /// Completion or cancellation of a finished producer does nothing; an
    /// item fed to it is an error. When encoding fails, every element still
    /// open is closed and the producer is finished before the error returns.
    pub fn feed(&mut self, sink: &mut dyn WireSink, feed: Feed) -> Result<Step> {
        if self.finished {
            return match feed {
                Feed::Item(_) => Err(XmlError::Type(
                    "item fed to a finished producer".to_string(),
                )),
                Feed::Finish | Feed::Cancel => Ok(Step::Done),
            };
        }
        let step = self.resume(sink, feed);
        self.unwind_on_error(sink, step)
    }

    fn resume(&mut self, sink: &mut dyn WireSink, feed: Feed) -> Result<Step> {
        match feed {
            Feed::Item(value) => {
                let Some(Frame::Push { ty, tag, written }) = self.stack.last_mut() else {
                    return Err(XmlError::Type(
                        "producer is not waiting for an item".to_string(),
                    ));
                };
                *written += 1;
                let (ty, tag) = (*ty, tag.clone());
                self.emit(sink, ty, Some(value), &tag)?;
                self.drive(sink)
            }
            Feed::Finish => {
                if let Some(Frame::Push { tag, written, .. }) = self.stack.last() {
                    debug!(tag = %tag, items = written, "push source finished");
                    self.stack.pop();
                }
                self.drive(sink)
            }
            Feed::Cancel => {
                self.cancel(sink)?;
                Ok(Step::Done)
            }
        }
    }

    fn unwind_on_error(&mut self, sink: &mut dyn WireSink, step: Result<Step>) -> Result<Step> {
        if let Err(err) = &step {
            debug!(error = %err, open = self.stack.len(), "encoding failed, unwinding");
            if let Err(close) = self.cancel(sink) {
                trace!(error = %close, "could not close every element");
                self.stack.clear();
                self.finished = true;
            }
        }
        step
    }

    fn cancel(&mut self, sink: &mut dyn WireSink) -> Result<()> {
        let mut closed = 0usize;
        while let Some(frame) = self.stack.pop() {
            if let Frame::Complex(_) = frame {
                sink.close()?;
                closed += 1;
            }
        }
        self.finished = true;
        debug!(closed, "producer cancelled");
        Ok(())
    }

    fn drive(&mut self, sink: &mut dyn WireSink) -> Result<Step> {
        loop {
            let interface = self.interface();
            let next = match self.stack.last_mut() {
                None => Next::Done,
                Some(Frame::Push { .. }) => Next::Suspend,
                Some(Frame::Items { ty, tag, items }) => match items.next() {
                    Some(Ok(value)) => Next::Emit(*ty, value, tag.clone()),
                    Some(Err(fault)) => Next::Fail(fault),
                    None => Next::PopItems,
                },
                Some(Frame::Complex(frame)) => match frame.order.get(frame.cursor) {
                    Some(member) => {
                        let member = member.clone();
                        frame.cursor += 1;
                        let value = read_member(interface, frame.ty, &frame.source, &member.key);
                        Next::Member(member, value)
                    }
                    None => Next::CloseComplex,
                },
            };
            match next {
                Next::Done => {
                    self.finished = true;
                    return Ok(Step::Done);
                }
                Next::Suspend => return Ok(Step::Suspended),
                Next::Emit(ty, value, tag) => self.emit(sink, ty, Some(value), &tag)?,
                Next::Fail(fault) => return Err(fault.into()),
                Next::PopItems => {
                    self.stack.pop();
                }
                Next::Member(member, value) => self.emit_member(sink, &member, value)?,
                Next::CloseComplex => {
                    if let Some(Frame::Complex(frame)) = self.stack.pop() {
                        self.fold_delayed(sink, &frame)?;
                    }
                    sink.close()?;
                }
            }
        }
    }

    /// Encodes one value, delegating to a sub-protocol when the type names one.
    fn emit(
        &mut self,
        sink: &mut dyn WireSink,
        ty: DescriptorId,
        value: Option<Value>,
        tag: &QName,
    ) -> Result<()> {
        if let Some(handle) = self.interface().get(ty).sub_protocol {
            let sub = self.protocol.sub_protocol(handle)?;
            trace!(tag = %tag, protocol = handle.0, "delegating to sub-protocol");
            return sub.subserialize(self.interface(), ty, value, sink, tag);
        }
        self.emit_local(sink, ty, value, tag)
    }

    fn emit_local(
        &mut self,
        sink: &mut dyn WireSink,
        ty: DescriptorId,
        value: Option<Value>,
        tag: &QName,
    ) -> Result<()> {
        let desc = self.interface().get(ty);
        let value = match value {
            None | Some(Value::Null) => desc.default.clone(),
            present => present,
        };
        match value {
            None => null_to_parent(self.interface(), sink, ty, tag),
            Some(value) => {
                let handler = self.protocol.registry().lookup_serializer(desc.category())?;
                handler(self, sink, ty, value, tag)
            }
        }
    }

    fn emit_member(
        &mut self,
        sink: &mut dyn WireSink,
        member: &Member,
        value: Option<Value>,
    ) -> Result<()> {
        let interface = self.interface();
        let field = interface.get(member.ty);
        let tag = if field.is_attribute() {
            attribute_name(interface, member)
        } else {
            interface.member_tag(member)
        };

        if field.is_repeating() {
            match value {
                Some(Value::Push(source)) => {
                    debug!(field = %member.key, source = ?source.label, "streaming push source");
                    self.stack.push(Frame::Push {
                        ty: member.ty,
                        tag,
                        written: 0,
                    });
                }
                Some(Value::Sequence(items)) => self.stack.push(Frame::Items {
                    ty: member.ty,
                    tag,
                    items: Box::new(items.into_iter().map(Ok::<Value, Fault>)),
                }),
                Some(Value::Lazy(lazy)) => match lazy.take() {
                    Some(items) => self.stack.push(Frame::Items {
                        ty: member.ty,
                        tag,
                        items,
                    }),
                    None => warn!(field = %member.key, "lazy sequence was already consumed"),
                },
                None if field.min_occurs == 0 => {
                    trace!(field = %member.key, "absent repeating field skipped");
                }
                other => self.emit(sink, member.ty, other, &tag)?,
            }
            return Ok(());
        }

        match value {
            None if field.min_occurs == 0 => {
                trace!(field = %member.key, "absent field skipped");
                Ok(())
            }
            other => self.emit(sink, member.ty, other, &tag),
        }
    }

    /// Opens the element of a complex value and schedules its members.
    fn open_complex(
        &mut self,
        sink: &mut dyn WireSink,
        declared: DescriptorId,
        value: Value,
        tag: &QName,
    ) -> Result<()> {
        let interface = self.interface();
        let runtime = match value.type_hint() {
            Some(hint) if hint != declared && interface.is_subtype(hint, declared) => hint,
            _ => declared,
        };
        let desc = interface.get(declared);
        let name = QName::qualified(
            desc.sub_namespace.as_deref().or(tag.namespace()),
            desc.sub_name.clone().unwrap_or_else(|| tag.local.clone()),
        );
        let mut element = Element::new(name);
        if runtime != declared {
            let actual = &interface.get(runtime).name;
            let hinted = actual
                .namespace()
                .map(|ns| (ns, self.protocol.prefix_for(ns)));
            element = match hinted {
                Some((ns, prefix)) => element
                    .with_attribute(xsi_type(), format!("{}:{}", prefix, actual.local))
                    .with_namespace(prefix, ns),
                None => element.with_attribute(xsi_type(), actual.local.clone()),
            };
            trace!(declared = %desc.name, runtime = %actual, "encoding subtype");
        }
        sink.open(element)?;
        self.push_complex(runtime, value);
        Ok(())
    }

    /// Attributes first, then the text-content field, then child elements.
    /// Attributes folded onto a sibling element wait until the element exists.
    fn push_complex(&mut self, ty: DescriptorId, source: Value) {
        let interface = self.interface();
        let mut attributes = Vec::new();
        let mut body = Vec::new();
        let mut elements = Vec::new();
        let mut delayed = Vec::new();
        for member in interface.members(ty) {
            let field = interface.get(member.ty);
            match &field.kind {
                TypeKind::Attribute {
                    attribute_of: Some(owner),
                    ..
                } if interface
                    .member(ty, owner)
                    .is_some_and(|o| !interface.get(o.ty).is_attribute()) =>
                {
                    delayed.push(member.clone())
                }
                TypeKind::Attribute { .. } => attributes.push(member.clone()),
                TypeKind::XmlBody { .. } => body.push(member.clone()),
                _ => elements.push(member.clone()),
            }
        }
        attributes.append(&mut body);
        attributes.append(&mut elements);
        self.stack.push(Frame::Complex(ComplexFrame {
            ty,
            source,
            order: attributes,
            cursor: 0,
            delayed,
        }));
    }

    fn fold_delayed(&mut self, sink: &mut dyn WireSink, frame: &ComplexFrame) -> Result<()> {
        let interface = self.interface();
        for member in &frame.delayed {
            let field = interface.get(member.ty);
            let Some(owner) = field.attribute_of().and_then(|key| interface.member(frame.ty, key))
            else {
                continue;
            };
            let owner_tag = interface.member_tag(owner);
            let name = attribute_name(interface, member);
            let value = match read_member(interface, frame.ty, &frame.source, &member.key) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };
            if interface.get(owner.ty).is_repeating() {
                let items = match value {
                    Value::Sequence(items) => items,
                    Value::Lazy(lazy) => lazy.collect_values()?,
                    single => vec![single],
                };
                for (position, item) in items.iter().enumerate() {
                    if item.is_null() {
                        continue;
                    }
                    let text = self.scalar_text(member.ty, item)?;
                    sink.fold_attribute(&owner_tag, Some(position), &name, text)?;
                }
            } else {
                let text = self.scalar_text(member.ty, &value)?;
                sink.fold_attribute(&owner_tag, None, &name, text)?;
            }
        }
        Ok(())
    }

    /// Text form of a scalar value of type `ty`.
    pub fn scalar_text(&self, ty: DescriptorId, value: &Value) -> Result<String> {
        let desc = self.interface().get(ty);
        match &desc.kind {
            TypeKind::Primitive(kind) => Ok(kind.to_text(value)?),
            TypeKind::Enum { .. } => value.as_str().map(str::to_string).ok_or_else(|| {
                XmlError::Type(format!(
                    "expected an enum member for {}, found {}",
                    desc.name,
                    value.kind_name()
                ))
            }),
            TypeKind::ByteArray => Ok(self.binary_encoding.encode(&bytes_of(value)?)),
            TypeKind::Attachment => Ok(BinaryEncoding::Base64.encode(&bytes_of(value)?)),
            TypeKind::Attribute { value: inner, .. } | TypeKind::XmlBody { value: inner } => {
                self.scalar_text(*inner, value)
            }
            _ => Err(XmlError::Type(format!(
                "{} has no text form",
                desc.name
            ))),
        }
    }
}

fn bytes_of(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Sequence(chunks) => {
            let mut out = Vec::new();
            for chunk in chunks {
                out.extend(bytes_of(chunk)?);
            }
            Ok(out)
        }
        other => Err(XmlError::Type(format!(
            "expected bytes, found {}",
            other.kind_name()
        ))),
    }
}

/// Attribute name of an attribute-kind member. Unqualified unless the field
/// names its own namespace.
fn attribute_name(interface: &Interface, member: &Member) -> QName {
    let field = interface.get(member.ty);
    QName::qualified(
        field.sub_namespace.as_deref(),
        field.sub_name.clone().unwrap_or_else(|| member.key.clone()),
    )
}

/// Reads a member off whatever kind of object carries it. A failed read
/// counts as absent.
fn read_member(interface: &Interface, ty: DescriptorId, source: &Value, key: &str) -> Option<Value> {
    match source {
        Value::Object(object) => object.get(key).cloned(),
        Value::Foreign(foreign) => match foreign.source().read_field(key) {
            Ok(value) => value,
            Err(err) => {
                trace!(field = key, error = %err, "field read failed; treated as absent");
                None
            }
        },
        Value::Fault(fault) => fault.extra.get(key).cloned(),
        container
            if matches!(
                interface.get(ty).kind,
                TypeKind::Array { .. } | TypeKind::Iterable { .. }
            ) =>
        {
            Some(container.clone())
        }
        _ => None,
    }
}

fn null_to_parent(
    interface: &Interface,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    tag: &QName,
) -> Result<()> {
    match interface.get(ty).kind {
        TypeKind::Attribute { .. } => Ok(()),
        TypeKind::XmlBody { .. } => sink.set_attribute(xsi_nil(), "true".to_string()),
        _ => sink.append(Element::new(tag.clone()).with_attribute(xsi_nil(), "true")),
    }
}

pub fn modelbase_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let text = producer.scalar_text(ty, &value)?;
    sink.append(Element::new(tag.clone()).with_text(text))
}

pub fn enum_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let text = producer.scalar_text(ty, &value)?;
    sink.append(Element::new(tag.clone()).with_text(text))
}

pub fn byte_array_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    _ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let text = producer.binary_encoding().encode(&bytes_of(&value)?);
    sink.append(Element::new(tag.clone()).with_text(text))
}

pub fn attachment_to_parent(
    _producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    _ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let text = BinaryEncoding::Base64.encode(&bytes_of(&value)?);
    sink.append(Element::new(tag.clone()).with_text(text))
}

pub fn xmlattribute_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let text = producer.scalar_text(ty, &value)?;
    sink.set_attribute(tag.clone(), text)
}

pub fn xmldata_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    _tag: &QName,
) -> Result<()> {
    let text = producer.scalar_text(ty, &value)?;
    sink.set_text(text)
}

pub fn complex_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let container = matches!(
        producer.interface().get(ty).kind,
        TypeKind::Array { .. } | TypeKind::Iterable { .. }
    );
    match &value {
        Value::Object(_) | Value::Foreign(_) | Value::Fault(_) => {}
        Value::Sequence(_) | Value::Lazy(_) | Value::Push(_) if container => {}
        other => {
            return Err(XmlError::Type(format!(
                "expected an object for {}, found {}",
                producer.interface().get(ty).name,
                other.kind_name()
            )));
        }
    }
    producer.open_complex(sink, ty, value, tag)
}

pub fn fault_to_parent(
    producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    ty: DescriptorId,
    value: Value,
    _tag: &QName,
) -> Result<()> {
    let Value::Fault(fault) = value else {
        return Err(XmlError::Type(format!(
            "expected a fault, found {}",
            value.kind_name()
        )));
    };
    let interface = producer.interface();
    let runtime = fault
        .ty
        .filter(|actual| interface.is_subtype(*actual, ty))
        .unwrap_or(ty);

    let detail = match &fault.detail {
        None => None,
        Some(FaultDetail::Text(text)) => Some(Element::new("detail").with_text(text.clone())),
        Some(FaultDetail::Mapping(serde_json::Value::Object(mapping))) => {
            let mut detail = Element::new("detail");
            dict::dict_to_children(mapping, &mut detail);
            Some(detail)
        }
        Some(FaultDetail::Mapping(other)) => {
            return Err(XmlError::Type(format!(
                "fault detail must be a mapping, text or markup; got {}",
                json_kind(other)
            )));
        }
        Some(FaultDetail::Markup(markup)) => {
            if markup.name == QName::unqualified("detail") {
                Some(markup.clone())
            } else {
                Some(Element::new("detail").with_child(markup.clone()))
            }
        }
    };

    let prefix = producer.protocol.prefix_for(SOAP_ENV_NS);
    let fixed = [
        Element::new("faultcode").with_text(format!("{}:{}", prefix, fault.code)),
        Element::new("faultstring").with_text(fault.message.clone()),
        Element::new("faultactor").with_text(fault.actor.clone().unwrap_or_default()),
    ];
    sink.open(Element::new(QName::new(SOAP_ENV_NS, "Fault")).with_namespace(prefix, SOAP_ENV_NS))?;
    // Every open element has a frame before the next fallible call.
    producer.push_complex(runtime, Value::Fault(fault));
    for element in fixed.into_iter().chain(detail) {
        sink.append(element)?;
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub fn xml_to_parent(
    _producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    _ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let content = match value {
        Value::Xml(element) => element,
        Value::String(markup) => {
            let fragment = parse_fragment(&markup)?;
            match <[Element; 1]>::try_from(fragment.children) {
                Ok([only]) => only,
                Err(_) => {
                    return Err(XmlError::Type(
                        "markup must have exactly one root element".to_string(),
                    ));
                }
            }
        }
        other => {
            return Err(XmlError::Type(format!(
                "expected markup, found {}",
                other.kind_name()
            )));
        }
    };
    sink.append(Element::new(tag.clone()).with_child(content))
}

pub fn html_to_parent(
    _producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    _ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let wrapper = Element::new(tag.clone());
    let element = match value {
        Value::Xml(element) => wrapper.with_child(element),
        Value::String(text) if text.is_empty() => wrapper,
        Value::String(text) => match parse_fragment(&text) {
            Ok(fragment) => wrapper.with_child(html_root(fragment)),
            Err(err) => {
                trace!(error = %err, "html is not well-formed; written as text");
                wrapper.with_text(text)
            }
        },
        other => {
            return Err(XmlError::Type(format!(
                "expected html, found {}",
                other.kind_name()
            )));
        }
    };
    sink.append(element)
}

/// A single element stands for itself; anything else is wrapped in `p`.
fn html_root(mut fragment: Element) -> Element {
    let has_text = fragment.text.as_deref().is_some_and(|t| !t.trim().is_empty())
        || fragment
            .children
            .iter()
            .any(|c| c.tail.as_deref().is_some_and(|t| !t.trim().is_empty()));
    if fragment.children.len() == 1 && !has_text {
        if let Some(mut only) = fragment.children.pop() {
            only.tail = None;
            return only;
        }
    }
    fragment.name = QName::unqualified("p");
    fragment
}

pub fn dict_to_parent(
    _producer: &mut Producer<'_>,
    sink: &mut dyn WireSink,
    _ty: DescriptorId,
    value: Value,
    tag: &QName,
) -> Result<()> {
    let mut element = Element::new(tag.clone());
    match value {
        Value::Dict(serde_json::Value::Object(mapping)) => {
            dict::dict_to_children(&mapping, &mut element);
        }
        Value::Dict(serde_json::Value::Null) => {}
        other => {
            return Err(XmlError::Type(format!(
                "expected a mapping, found {}",
                other.kind_name()
            )));
        }
    }
    sink.append(element)
}
