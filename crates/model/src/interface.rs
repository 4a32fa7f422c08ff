//! The descriptor arena and class registry.
//!
//! An [`Interface`] is assembled once through [`InterfaceBuilder`] and is
//! read-only afterwards. Building validates occurrence bounds and extension
//! chains and precomputes, per complex type:
//!
//! - the flattened member list (ancestor fields first, then own fields; a
//!   field redeclared by a subtype keeps its position and takes the new type)
//! - the alternate-name table used when matching wire children to fields
//!
//! Named types registered with [`InterfaceBuilder::register`] are reachable
//! by their Clark key, which is what polymorphic `xsi:type` lookup uses.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::descriptor::{DescriptorId, Field, MaxOccurs, Member, TypeDescriptor, TypeKind};
use crate::error::{ModelError, Result};
use crate::primitive::PrimitiveKind;
use crate::qname::{QName, SOAP_ENV_NS, XML_NS, XS_NS, XSI_NS};

pub struct InterfaceBuilder {
    target_namespace: String,
    descriptors: Vec<TypeDescriptor>,
    classes: HashMap<String, DescriptorId>,
    primitives: HashMap<PrimitiveKind, DescriptorId>,
    fault: DescriptorId,
}

impl InterfaceBuilder {
    pub fn new(target_namespace: impl Into<String>) -> Self {
        let fault_name = QName::new(SOAP_ENV_NS, "Fault");
        let mut classes = HashMap::new();
        classes.insert(fault_name.clark(), DescriptorId(0));
        Self {
            target_namespace: target_namespace.into(),
            descriptors: vec![TypeDescriptor::new(fault_name, TypeKind::Fault)],
            classes,
            primitives: HashMap::new(),
            fault: DescriptorId(0),
        }
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// The built-in `{soap-env}Fault` type. Fault subtypes extend it.
    pub fn fault_type(&self) -> DescriptorId {
        self.fault
    }

    pub fn get(&self, id: DescriptorId) -> Option<&TypeDescriptor> {
        self.descriptors.get(id.index())
    }

    /// Adds an anonymous descriptor (not reachable through `xsi:type`).
    pub fn add(&mut self, desc: TypeDescriptor) -> DescriptorId {
        let id = DescriptorId(self.descriptors.len() as u32);
        self.descriptors.push(desc);
        id
    }

    /// Adds a named type and makes it resolvable by its qualified name.
    pub fn register(&mut self, desc: TypeDescriptor) -> Result<DescriptorId> {
        let key = desc.name.clark();
        if self.classes.contains_key(&key) {
            return Err(ModelError::DuplicateType(key));
        }
        let id = self.add(desc);
        self.classes.insert(key, id);
        Ok(id)
    }

    /// Adds a copy of `base` with per-field facets changed by `customize`.
    pub fn customize<F>(&mut self, base: DescriptorId, customize: F) -> Result<DescriptorId>
    where
        F: FnOnce(TypeDescriptor) -> TypeDescriptor,
    {
        let desc = self
            .get(base)
            .cloned()
            .ok_or(ModelError::UnknownDescriptor(base))?;
        Ok(self.add(customize(desc)))
    }

    /// The shared descriptor of a primitive kind.
    pub fn primitive(&mut self, kind: PrimitiveKind) -> DescriptorId {
        if let Some(id) = self.primitives.get(&kind) {
            return *id;
        }
        let id = self.add(TypeDescriptor::new(kind.qname(), TypeKind::Primitive(kind)));
        self.primitives.insert(kind, id);
        id
    }

    /// A container whose children are all of type `item`, decoded eagerly.
    pub fn array(&mut self, item: DescriptorId) -> Result<DescriptorId> {
        self.container(item, |item| TypeKind::Array { item })
    }

    /// Like [`array`](Self::array), decoded lazily.
    pub fn iterable(&mut self, item: DescriptorId) -> Result<DescriptorId> {
        self.container(item, |item| TypeKind::Iterable { item })
    }

    fn container(
        &mut self,
        item: DescriptorId,
        kind: impl FnOnce(DescriptorId) -> TypeKind,
    ) -> Result<DescriptorId> {
        let item_desc = self.get(item).ok_or(ModelError::UnknownDescriptor(item))?;
        let key = item_desc
            .sub_name
            .clone()
            .unwrap_or_else(|| item_desc.name.local.clone());
        let namespace = match item_desc.namespace() {
            Some(ns) if ns != XS_NS => ns.to_string(),
            _ => self.target_namespace.clone(),
        };
        let name = QName::new(namespace, format!("{}Array", item_desc.name.local));
        let repeated = self.customize(item, |d| d.with_occurs(0, MaxOccurs::Unbounded))?;
        Ok(self.add(TypeDescriptor::new(name, kind(repeated)).with_field(key, repeated)))
    }

    /// An attribute-kind wrapper around `value`, optionally folded onto the
    /// sibling element field named `attribute_of`.
    pub fn attribute(
        &mut self,
        value: DescriptorId,
        attribute_of: Option<&str>,
    ) -> Result<DescriptorId> {
        let name = self
            .get(value)
            .ok_or(ModelError::UnknownDescriptor(value))?
            .name
            .clone();
        Ok(self.add(TypeDescriptor::new(
            name,
            TypeKind::Attribute {
                value,
                attribute_of: attribute_of.map(str::to_string),
            },
        )))
    }

    /// A wrapper mapping `value` to the text content of the parent element.
    pub fn xml_body(&mut self, value: DescriptorId) -> Result<DescriptorId> {
        let name = self
            .get(value)
            .ok_or(ModelError::UnknownDescriptor(value))?
            .name
            .clone();
        Ok(self.add(TypeDescriptor::new(name, TypeKind::XmlBody { value })))
    }

    pub fn build(self) -> Result<Interface> {
        let count = self.descriptors.len();
        for desc in &self.descriptors {
            check_references(desc, count)?;
            if let MaxOccurs::Bounded(max) = desc.max_occurs {
                if desc.min_occurs > max {
                    return Err(ModelError::InvalidOccurs {
                        type_name: desc.name.to_string(),
                        min: desc.min_occurs,
                        max,
                    });
                }
            }
        }
        for desc in &self.descriptors {
            let mut steps = 0;
            let mut cursor = desc.extends;
            while let Some(parent) = cursor {
                steps += 1;
                if steps > count {
                    return Err(ModelError::CyclicExtension {
                        type_name: desc.name.to_string(),
                    });
                }
                cursor = self.descriptors[parent.index()].extends;
            }
        }

        let mut members: Vec<Option<Vec<Member>>> = vec![None; count];
        for index in 0..count {
            flatten(&self.descriptors, DescriptorId(index as u32), &mut members);
        }
        let members: Vec<Vec<Member>> = members.into_iter().map(Option::unwrap_or_default).collect();

        let alternates = members
            .iter()
            .map(|flat| alternate_names(&self.descriptors, flat))
            .collect();

        let prefixes = prefix_hints(&self.target_namespace, &self.descriptors);

        Ok(Interface {
            target_namespace: self.target_namespace,
            descriptors: self.descriptors,
            members,
            alternates,
            classes: self.classes,
            prefixes,
            fault: self.fault,
        })
    }
}

fn check_references(desc: &TypeDescriptor, count: usize) -> Result<()> {
    let check = |id: DescriptorId| {
        if id.index() < count {
            Ok(())
        } else {
            Err(ModelError::UnknownDescriptor(id))
        }
    };
    if let Some(parent) = desc.extends {
        check(parent)?;
    }
    for Field { ty, .. } in &desc.fields {
        check(*ty)?;
    }
    match &desc.kind {
        TypeKind::Array { item } | TypeKind::Iterable { item } => check(*item),
        TypeKind::Attribute { value, .. } | TypeKind::XmlBody { value } => check(*value),
        _ => Ok(()),
    }
}

fn flatten(descriptors: &[TypeDescriptor], id: DescriptorId, memo: &mut [Option<Vec<Member>>]) {
    if memo[id.index()].is_some() {
        return;
    }
    let desc = &descriptors[id.index()];
    let mut flat = match desc.extends {
        Some(parent) => {
            flatten(descriptors, parent, memo);
            memo[parent.index()].clone().unwrap_or_default()
        }
        None => Vec::new(),
    };
    for field in &desc.fields {
        let member = Member {
            key: field.key.clone(),
            ty: field.ty,
            owner: id,
        };
        match flat.iter_mut().find(|m| m.key == field.key) {
            Some(slot) => *slot = member,
            None => flat.push(member),
        }
    }
    memo[id.index()] = Some(flat);
}

fn alternate_names(descriptors: &[TypeDescriptor], flat: &[Member]) -> HashMap<String, String> {
    let mut alt = HashMap::new();
    for member in flat {
        let field = &descriptors[member.ty.index()];
        if field.sub_name.is_none() && field.sub_namespace.is_none() {
            continue;
        }
        let local = field.sub_name.as_deref().unwrap_or(&member.key);
        let namespace = field
            .sub_namespace
            .as_deref()
            .or(descriptors[member.owner.index()].namespace());
        alt.insert(local.to_string(), member.key.clone());
        alt.insert(QName::qualified(namespace, local).clark(), member.key.clone());
    }
    alt
}

fn prefix_hints(target_namespace: &str, descriptors: &[TypeDescriptor]) -> BTreeMap<String, String> {
    let reserved = [XS_NS, XSI_NS, SOAP_ENV_NS, XML_NS, target_namespace];
    let others: BTreeSet<&str> = descriptors
        .iter()
        .flat_map(|d| [d.namespace(), d.sub_namespace.as_deref()])
        .flatten()
        .filter(|ns| !reserved.contains(ns))
        .collect();

    let mut prefixes = BTreeMap::new();
    prefixes.insert(target_namespace.to_string(), "tns".to_string());
    for (index, ns) in others.into_iter().enumerate() {
        prefixes.insert(ns.to_string(), format!("s{}", index));
    }
    prefixes
}

/// Read-only view over every type an application exposes.
#[derive(Debug)]
pub struct Interface {
    target_namespace: String,
    descriptors: Vec<TypeDescriptor>,
    members: Vec<Vec<Member>>,
    alternates: Vec<HashMap<String, String>>,
    classes: HashMap<String, DescriptorId>,
    prefixes: BTreeMap<String, String>,
    fault: DescriptorId,
}

impl Interface {
    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// Ids are only minted by the builder of this interface.
    pub fn get(&self, id: DescriptorId) -> &TypeDescriptor {
        &self.descriptors[id.index()]
    }

    pub fn fault_type(&self) -> DescriptorId {
        self.fault
    }

    /// Flattened members of a complex type; empty for other kinds.
    pub fn members(&self, id: DescriptorId) -> &[Member] {
        &self.members[id.index()]
    }

    pub fn member(&self, id: DescriptorId, key: &str) -> Option<&Member> {
        self.members(id).iter().find(|m| m.key == key)
    }

    /// Matches a wire child to a member: by key, then by alternate local
    /// name, then by alternate qualified tag.
    pub fn resolve_child(&self, id: DescriptorId, tag: &QName) -> Option<&Member> {
        if let Some(member) = self.member(id, &tag.local) {
            return Some(member);
        }
        let alt = &self.alternates[id.index()];
        alt.get(&tag.local)
            .or_else(|| alt.get(&tag.clark()))
            .and_then(|key| self.member(id, key))
    }

    /// The element tag a member is written under.
    pub fn member_tag(&self, member: &Member) -> QName {
        let field = self.get(member.ty);
        let local = field.sub_name.clone().unwrap_or_else(|| member.key.clone());
        let namespace = field
            .sub_namespace
            .as_deref()
            .or(self.get(member.owner).namespace());
        QName::qualified(namespace, local)
    }

    /// The member mapping the parent's text content, if any.
    pub fn xml_body_member(&self, id: DescriptorId) -> Option<&Member> {
        self.members(id)
            .iter()
            .find(|m| matches!(self.get(m.ty).kind, TypeKind::XmlBody { .. }))
    }

    pub fn lookup_class(&self, name: &QName) -> Option<DescriptorId> {
        self.classes.get(&name.clark()).copied()
    }

    /// The type followed by each ancestor in its extension chain.
    pub fn ancestry(&self, id: DescriptorId) -> impl Iterator<Item = DescriptorId> + '_ {
        std::iter::successors(Some(id), move |cur| self.get(*cur).extends)
    }

    pub fn is_subtype(&self, candidate: DescriptorId, base: DescriptorId) -> bool {
        self.ancestry(candidate).any(|id| id == base)
    }

    /// Namespace URI → preferred prefix.
    pub fn prefix_hints(&self) -> &BTreeMap<String, String> {
        &self.prefixes
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
