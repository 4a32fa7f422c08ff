//! The XML document protocol.
//!
//! [`XmlDocument`] is built once at startup and shared read-only by every
//! call. A call moves through it in a fixed order:
//!
//! 1. [`create_in_document`](XmlDocument::create_in_document) parses the
//!    request fragments under the parser policy
//! 2. [`decompose_incoming_envelope`](XmlDocument::decompose_incoming_envelope)
//!    takes the root as the body, derives the method request key and runs
//!    schema validation
//! 3. [`deserialize`](XmlDocument::deserialize) decodes the body into the
//!    in-object
//! 4. [`serialize`](XmlDocument::serialize) encodes the results (or the
//!    recorded fault), either into a tree or straight into the call's output
//!    stream
//! 5. [`create_out_string`](XmlDocument::create_out_string) turns the output
//!    tree into bytes

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use helios_rpc_model::{
    BinaryEncoding, DescriptorId, Element, Interface, Object, ProtocolHandle, QName, SOAP_ENV_NS,
    Value,
};
use tracing::{debug, error, warn};

use crate::config::{OutputConfig, ParserConfig, ValidatorMode};
use crate::context::{BodyStyle, CallContext, MessageDirection};
use crate::decode::Decoder;
use crate::egress;
use crate::encode::{EncodeOutcome, Feed, Producer, Step};
use crate::error::{Result, XmlError};
use crate::events::{EventManager, Listener, ProtocolEvent};
use crate::ingest::{self, Document};
use crate::namespaces::default_hints;
use crate::registry::HandlerRegistry;
use crate::sink::{TreeSink, WireSink};
use crate::stream::StreamSink;

pub const MIME_TYPE: &str = "text/xml";

/// Target for log lines carrying documents that failed to parse.
const INVALID_TARGET: &str = "helios_rpc_xml::invalid";

/// Whole-document structural check run at ingest.
pub trait SchemaValidator: Send + Sync {
    /// Returns the last diagnostic on failure.
    fn validate(&self, root: &Element) -> std::result::Result<(), String>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Element) -> std::result::Result<(), String> + Send + Sync,
{
    fn validate(&self, root: &Element) -> std::result::Result<(), String> {
        self(root)
    }
}

/// An alternate wire form a field can hand its value to.
pub trait SubProtocol: Send + Sync {
    fn subserialize(
        &self,
        interface: &Interface,
        ty: DescriptorId,
        value: Option<Value>,
        sink: &mut dyn WireSink,
        tag: &QName,
    ) -> Result<()>;

    fn subdeserialize(&self, interface: &Interface, ty: DescriptorId, element: &Element)
    -> Result<Value>;
}

#[derive(Clone)]
pub struct XmlDocument {
    interface: Arc<Interface>,
    hints: Arc<BTreeMap<String, String>>,
    validator: ValidatorMode,
    schema: Option<Arc<dyn SchemaValidator>>,
    binary_encoding: BinaryEncoding,
    parser: ParserConfig,
    output: OutputConfig,
    log_messages: bool,
    registry: Arc<HandlerRegistry>,
    sub_protocols: Arc<HashMap<ProtocolHandle, Arc<dyn SubProtocol>>>,
    events: Arc<EventManager>,
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument")
            .field("target_namespace", &self.interface.target_namespace())
            .field("validator", &self.validator)
            .field("schema", &self.schema.is_some())
            .field("binary_encoding", &self.binary_encoding)
            .field("parser", &self.parser)
            .field("output", &self.output)
            .field("log_messages", &self.log_messages)
            .field("sub_protocols", &self.sub_protocols.len())
            .finish()
    }
}

pub struct XmlDocumentBuilder {
    interface: Arc<Interface>,
    validator: ValidatorMode,
    schema: Option<Arc<dyn SchemaValidator>>,
    binary_encoding: BinaryEncoding,
    parser: ParserConfig,
    output: OutputConfig,
    log_messages: bool,
    registry: HandlerRegistry,
    sub_protocols: HashMap<ProtocolHandle, Arc<dyn SubProtocol>>,
    events: EventManager,
}

impl XmlDocumentBuilder {
    pub fn validator(mut self, mode: ValidatorMode) -> Self {
        self.validator = mode;
        self
    }

    pub fn schema_validator(mut self, schema: impl SchemaValidator + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn binary_encoding(mut self, encoding: BinaryEncoding) -> Self {
        self.binary_encoding = encoding;
        self
    }

    pub fn parser_config(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn output_config(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Log every valid incoming and outgoing document at debug level.
    pub fn log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn sub_protocol(mut self, handle: ProtocolHandle, protocol: Arc<dyn SubProtocol>) -> Self {
        self.sub_protocols.insert(handle, protocol);
        self
    }

    pub fn listener(mut self, event: ProtocolEvent, listener: Listener) -> Self {
        self.events.add(event, listener);
        self
    }

    pub fn build(self) -> std::result::Result<XmlDocument, Vec<String>> {
        let mut errors = Vec::new();
        if let Err(mut e) = self.parser.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.output.validate() {
            errors.append(&mut e);
        }
        if self.validator.schema && self.schema.is_none() {
            errors.push("schema validation requires a schema validator".to_string());
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(XmlDocument {
            hints: Arc::new(default_hints(self.interface.prefix_hints())),
            interface: self.interface,
            validator: self.validator,
            schema: self.schema,
            binary_encoding: self.binary_encoding,
            parser: self.parser,
            output: self.output,
            log_messages: self.log_messages,
            registry: Arc::new(self.registry),
            sub_protocols: Arc::new(self.sub_protocols),
            events: Arc::new(self.events),
        })
    }
}

/// Result of [`XmlDocument::serialize`].
pub enum Serialized<'p> {
    /// The response is in `out_document`, or fully written to `out_stream`.
    Complete,
    /// A push source was reached; feed it, then [`ResponseStream::complete`].
    Streaming(ResponseStream<'p>),
}

impl fmt::Debug for Serialized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Serialized::Complete => f.write_str("Complete"),
            Serialized::Streaming(stream) => f.debug_tuple("Streaming").field(stream).finish(),
        }
    }
}

enum ResponseSink {
    Tree(TreeSink),
    Stream(StreamSink<Box<dyn Write + Send>>),
}

impl ResponseSink {
    fn as_dyn(&mut self) -> &mut dyn WireSink {
        match self {
            ResponseSink::Tree(sink) => sink,
            ResponseSink::Stream(sink) => sink,
        }
    }

    /// Hands an output stream back to `ctx` after encoding failed, so the
    /// fault can still be written to it. Returns `err`.
    fn release(self, ctx: &mut CallContext, err: XmlError) -> XmlError {
        if let ResponseSink::Stream(sink) = self {
            match sink.finish() {
                Ok(stream) => ctx.out_stream = Some(stream),
                Err(finish) => warn!(error = %finish, "output stream lost after a failed response"),
            }
        }
        err
    }
}

/// A response suspended on a push source.
pub struct ResponseStream<'p> {
    producer: Producer<'p>,
    sink: ResponseSink,
}

impl fmt::Debug for ResponseStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("producer", &self.producer)
            .field("streaming", &matches!(self.sink, ResponseSink::Stream(_)))
            .finish()
    }
}

impl<'p> ResponseStream<'p> {
    /// Resumes the response. After an error the producer has already
    /// closed its elements; [`abort`](Self::abort) returns the output to the
    /// context.
    pub fn feed(&mut self, feed: Feed) -> Result<Step> {
        self.producer.feed(self.sink.as_dyn(), feed)
    }

    /// Encodes one item of the current push source.
    pub fn send(&mut self, item: Value) -> Result<Step> {
        self.feed(Feed::Item(item))
    }

    /// Stops the response, closing every open element.
    pub fn cancel(&mut self) -> Result<()> {
        self.feed(Feed::Cancel).map(|_| ())
    }

    pub fn is_finished(&self) -> bool {
        self.producer.is_finished()
    }

    /// Cancels the response and returns its output stream to `ctx` without
    /// firing [`ProtocolEvent::AfterSerialize`].
    pub fn abort(mut self, ctx: &mut CallContext) -> Result<()> {
        let cancelled = self.feed(Feed::Cancel);
        match self.sink {
            ResponseSink::Tree(_) => {}
            ResponseSink::Stream(sink) => ctx.out_stream = Some(sink.finish()?),
        }
        cancelled.map(|_| ())
    }

    /// Ends every remaining push source and stores the output on `ctx`.
    /// On failure the output stream is still returned to `ctx`.
    pub fn complete(mut self, ctx: &mut CallContext) -> Result<()> {
        while !self.producer.is_finished() {
            if let Err(err) = self.feed(Feed::Finish) {
                return Err(self.sink.release(ctx, err));
            }
        }
        match self.sink {
            ResponseSink::Tree(sink) => ctx.out_document = sink.into_first(),
            ResponseSink::Stream(sink) => ctx.out_stream = Some(sink.finish()?),
        }
        self.producer
            .protocol()
            .events
            .fire(ProtocolEvent::AfterSerialize, ctx);
        Ok(())
    }
}

impl XmlDocument {
    pub fn builder(interface: Arc<Interface>) -> XmlDocumentBuilder {
        XmlDocumentBuilder {
            interface,
            validator: ValidatorMode::NONE,
            schema: None,
            binary_encoding: BinaryEncoding::default(),
            parser: ParserConfig::default(),
            output: OutputConfig::default(),
            log_messages: false,
            registry: HandlerRegistry::with_defaults(),
            sub_protocols: HashMap::new(),
            events: EventManager::default(),
        }
    }

    /// A protocol with the default handlers and safe defaults everywhere.
    pub fn new(interface: Arc<Interface>) -> Self {
        Self {
            hints: Arc::new(default_hints(interface.prefix_hints())),
            interface,
            validator: ValidatorMode::NONE,
            schema: None,
            binary_encoding: BinaryEncoding::default(),
            parser: ParserConfig::default(),
            output: OutputConfig::default(),
            log_messages: false,
            registry: Arc::new(HandlerRegistry::with_defaults()),
            sub_protocols: Arc::new(HashMap::new()),
            events: Arc::new(EventManager::default()),
        }
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn validator(&self) -> ValidatorMode {
        self.validator
    }

    pub fn parser_config(&self) -> &ParserConfig {
        &self.parser
    }

    pub fn output_config(&self) -> &OutputConfig {
        &self.output
    }

    /// Namespace → preferred prefix, including the fixed bindings.
    pub fn hints(&self) -> &BTreeMap<String, String> {
        &self.hints
    }

    /// The prefix written for `namespace` in QName-valued attributes.
    /// Namespaces without a hint get the first `nsN` no hint uses.
    pub fn prefix_for(&self, namespace: &str) -> String {
        if let Some(prefix) = self.hints.get(namespace).filter(|p| !p.is_empty()) {
            return prefix.clone();
        }
        (0..)
            .map(|n| format!("ns{n}"))
            .find(|candidate| !self.hints.values().any(|p| p == candidate))
            .unwrap_or_default()
    }

    pub(crate) fn sub_protocol(&self, handle: ProtocolHandle) -> Result<Arc<dyn SubProtocol>> {
        self.sub_protocols
            .get(&handle)
            .cloned()
            .ok_or(XmlError::UnregisteredProtocol(handle.0))
    }

    pub fn new_context(&self) -> CallContext {
        CallContext::new(self.validator, self.binary_encoding)
    }

    /// Parses the request fragments into `ctx.in_document`.
    pub fn create_in_document(&self, ctx: &mut CallContext) -> Result<()> {
        match ingest::parse_fragments(&ctx.in_fragments, &self.parser) {
            Ok(document) => {
                if self.log_messages {
                    debug!(document = ?document.root, "received document");
                }
                ctx.in_document = Some(document);
                Ok(())
            }
            Err(err) => {
                let raw = String::from_utf8_lossy(&ctx.in_fragments.concat()).into_owned();
                error!(target: INVALID_TARGET, error = %err, document = %raw, "invalid document");
                Err(err)
            }
        }
    }

    /// Takes the document root as the body and validates it.
    pub fn decompose_incoming_envelope(&self, ctx: &mut CallContext) -> Result<()> {
        if let Some(document) = ctx.in_document.as_mut() {
            let body = std::mem::take(&mut document.root);
            let key = body.name.clark();
            debug!(method_request_key = %key, "decomposed incoming envelope");
            ctx.method_request_key = Some(key);
            ctx.in_body = Some(body);
        }
        self.validate_body(ctx)
    }

    /// Runs the schema validator over the body when schema validation is on.
    pub fn validate_body(&self, ctx: &CallContext) -> Result<()> {
        if !ctx.validator.schema {
            return Ok(());
        }
        let (Some(schema), Some(body)) = (&self.schema, &ctx.in_body) else {
            return Ok(());
        };
        match schema.validate(body) {
            Ok(()) => {
                debug!(method_request_key = ?ctx.method_request_key, "schema validation passed");
                Ok(())
            }
            Err(reason) => {
                debug!(method_request_key = ?ctx.method_request_key, reason = %reason, "schema validation failed");
                Err(XmlError::SchemaValidation(reason))
            }
        }
    }

    /// Decodes the body into `ctx.in_object`.
    pub fn deserialize(&self, ctx: &mut CallContext, direction: MessageDirection) -> Result<()> {
        self.events.fire(ProtocolEvent::BeforeDeserialize, ctx);

        let Some(method) = ctx.method.as_ref() else {
            if let Some(fault) = ctx.in_error.clone() {
                return Err(fault.into());
            }
            return Err(XmlError::MethodNotFound(
                ctx.method_request_key.clone().unwrap_or_default(),
            ));
        };
        let ty = method.message(direction);

        let in_object = match &ctx.in_body {
            None => Value::Sequence(vec![Value::Null; self.interface.members(ty).len()]),
            Some(body) => self.decode(ctx, ty, body)?,
        };
        ctx.in_object = Some(in_object);

        self.events.fire(ProtocolEvent::AfterDeserialize, ctx);
        Ok(())
    }

    /// Encodes the call's results, or its recorded fault.
    ///
    /// With an output stream on the context the document is written there
    /// as it is produced; otherwise it is built into `ctx.out_document`.
    pub fn serialize<'p>(
        &'p self,
        ctx: &mut CallContext,
        direction: MessageDirection,
    ) -> Result<Serialized<'p>> {
        self.events.fire(ProtocolEvent::BeforeSerialize, ctx);

        let (ty, value, tag) = match ctx.out_error.clone() {
            Some(fault) => {
                let ty = fault.ty.unwrap_or(self.interface.fault_type());
                (ty, Value::from(fault), QName::new(SOAP_ENV_NS, "Fault"))
            }
            None => {
                let Some(method) = ctx.method.clone() else {
                    return Err(XmlError::MethodNotFound(
                        ctx.method_request_key.clone().unwrap_or_default(),
                    ));
                };
                let ty = method.message(direction);
                let results = std::mem::take(&mut ctx.out_object);
                let value = match method.body_style {
                    BodyStyle::Wrapped => {
                        let mut object = Object::new(ty);
                        for (member, result) in self.interface.members(ty).iter().zip(results) {
                            object.set(member.key.clone(), result);
                        }
                        Value::Object(object)
                    }
                    BodyStyle::Bare => results.into_iter().next().unwrap_or_default(),
                };
                let desc = self.interface.get(ty);
                let tag = QName::new(
                    desc.namespace().unwrap_or(self.interface.target_namespace()),
                    desc.name.local.clone(),
                );
                (ty, value, tag)
            }
        };

        let mut producer = Producer::new(self, ctx.binary_encoding);
        let sink = match ctx.out_stream.take() {
            Some(stream) => {
                let mut sink = StreamSink::new(stream, &self.output, &self.hints)?;
                match producer.start(&mut sink, ty, Some(value), tag, true) {
                    Ok(Step::Done) => {
                        ctx.out_stream = Some(sink.finish()?);
                        self.finish_serialize(ctx);
                        return Ok(Serialized::Complete);
                    }
                    Ok(Step::Suspended) => ResponseSink::Stream(sink),
                    Err(err) => return Err(ResponseSink::Stream(sink).release(ctx, err)),
                }
            }
            None => {
                let mut sink = TreeSink::new();
                if producer.start(&mut sink, ty, Some(value), tag, true)? == Step::Done {
                    ctx.out_document = sink.into_first();
                    self.finish_serialize(ctx);
                    return Ok(Serialized::Complete);
                }
                ResponseSink::Tree(sink)
            }
        };
        debug!("response suspended on a push source");
        Ok(Serialized::Streaming(ResponseStream { producer, sink }))
    }

    fn finish_serialize(&self, ctx: &CallContext) {
        if self.log_messages {
            if let Some(document) = &ctx.out_document {
                debug!(document = ?document, "response document");
            }
        }
        self.events.fire(ProtocolEvent::AfterSerialize, ctx);
    }

    /// Writes `ctx.out_document` into `ctx.out_string`. `charset` overrides
    /// the configured output encoding. Streamed responses have nothing left
    /// to write.
    pub fn create_out_string(&self, ctx: &mut CallContext, charset: Option<&str>) -> Result<()> {
        let Some(document) = &ctx.out_document else {
            return Ok(());
        };
        let mut output = self.output.clone();
        if let Some(charset) = charset {
            output.output_encoding = charset.to_string();
        }
        let bytes = egress::write_document(document, &[], &output, &self.hints)?;
        ctx.out_string = vec![bytes];
        Ok(())
    }

    /// Encodes `value` of type `ty` under `tag` into `sink`.
    pub fn encode<'p>(
        &'p self,
        ctx: &CallContext,
        ty: DescriptorId,
        value: Option<Value>,
        sink: &mut dyn WireSink,
        tag: QName,
    ) -> Result<EncodeOutcome<'p>> {
        let mut producer = Producer::new(self, ctx.binary_encoding);
        match producer.start(sink, ty, value, tag, true)? {
            Step::Done => Ok(EncodeOutcome::Done),
            Step::Suspended => Ok(EncodeOutcome::Suspended(producer)),
        }
    }

    /// Decodes `element` as type `ty` under the call's validator mode.
    pub fn decode(&self, ctx: &CallContext, ty: DescriptorId, element: &Element) -> Result<Value> {
        Decoder::new(self, ctx.validator.soft, ctx.binary_encoding).decode(ty, element)
    }

    /// Encodes a value into a detached element tree. Push sources are not
    /// supported here.
    pub fn to_element(&self, ty: DescriptorId, value: Value, tag: QName) -> Result<Element> {
        let mut sink = TreeSink::new();
        let mut producer = Producer::new(self, self.binary_encoding);
        if producer.start(&mut sink, ty, Some(value), tag, true)? == Step::Suspended {
            producer.feed(&mut sink, Feed::Cancel)?;
            return Err(XmlError::Type(
                "push sources need a streaming response".to_string(),
            ));
        }
        sink.into_first()
            .ok_or_else(|| XmlError::Type("nothing was encoded".to_string()))
    }

    /// Decodes an element with the protocol's own validator mode.
    pub fn from_element(&self, ty: DescriptorId, element: &Element) -> Result<Value> {
        Decoder::new(self, self.validator.soft, self.binary_encoding).decode(ty, element)
    }

    /// Parses a whole document under the parser policy.
    pub fn parse(&self, bytes: &[u8]) -> Result<Document> {
        ingest::parse_document(bytes, &self.parser)
    }

    /// Writes an element tree as a complete document.
    pub fn to_bytes(&self, root: &Element) -> Result<Vec<u8>> {
        egress::write_document(root, &[], &self.output, &self.hints)
    }
}

impl SubProtocol for XmlDocument {
    fn subserialize(
        &self,
        _interface: &Interface,
        ty: DescriptorId,
        value: Option<Value>,
        sink: &mut dyn WireSink,
        tag: &QName,
    ) -> Result<()> {
        let mut producer = Producer::new(self, self.binary_encoding);
        if producer.start(sink, ty, value, tag.clone(), false)? == Step::Suspended {
            producer.feed(sink, Feed::Cancel)?;
            return Err(XmlError::Type(
                "push sources cannot cross a sub-protocol".to_string(),
            ));
        }
        Ok(())
    }

    fn subdeserialize(
        &self,
        _interface: &Interface,
        ty: DescriptorId,
        element: &Element,
    ) -> Result<Value> {
        Decoder::new(self, self.validator.soft, self.binary_encoding).dispatch(ty, element)
    }
}

#[cfg(test)]
mod tests {
    use helios_rpc_model::{InterfaceBuilder, PrimitiveKind, TypeDescriptor};

    use super::*;

    fn interface() -> Arc<Interface> {
        let mut b = InterfaceBuilder::new("urn:t");
        let s = b.primitive(PrimitiveKind::String);
        b.register(TypeDescriptor::complex(QName::new("urn:t", "T")).with_field("s", s))
            .unwrap();
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn test_builder_requires_schema_validator_for_schema_mode() {
        let errors = XmlDocument::builder(interface())
            .validator(ValidatorMode::SCHEMA)
            .build()
            .unwrap_err();
        assert_eq!(errors.len(), 1);

        let built = XmlDocument::builder(interface())
            .validator(ValidatorMode::SCHEMA | ValidatorMode::SOFT)
            .schema_validator(|_: &Element| -> std::result::Result<(), String> { Ok(()) })
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn test_builder_collects_config_errors() {
        let output = OutputConfig {
            output_encoding: "EBCDIC".to_string(),
            ..Default::default()
        };
        let parser = ParserConfig {
            allow_network_access: true,
            ..Default::default()
        };
        let errors = XmlDocument::builder(interface())
            .output_config(output)
            .parser_config(parser)
            .build()
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_prefix_for_uses_hints() {
        let protocol = XmlDocument::new(interface());
        assert_eq!(protocol.prefix_for("urn:t"), "tns");
        assert_eq!(protocol.prefix_for(SOAP_ENV_NS), "soap11env");
        assert_eq!(protocol.prefix_for(helios_rpc_model::XSI_NS), "xsi");
    }

    #[test]
    fn test_prefix_for_unhinted_namespace_is_generated() {
        let protocol = XmlDocument::new(interface());
        let prefix = protocol.prefix_for("urn:unhinted");
        assert_eq!(prefix, "ns0");
        assert!(!protocol.hints().values().any(|p| *p == prefix));
    }

    #[test]
    fn test_unknown_sub_protocol() {
        let protocol = XmlDocument::new(interface());
        assert!(matches!(
            protocol.sub_protocol(ProtocolHandle(7)),
            Err(XmlError::UnregisteredProtocol(7))
        ));
    }
}
