use std::cell::Cell;
use std::rc::Rc;

use crate::source::{RecordId, SourceModel};

/// Render-state property types the scene tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Alpha,
    ZBuffer,
    Material,
    Texturing,
    Specular,
    Wireframe,
    VertexColor,
    Stencil,
}

impl PropertyKind {
    /// Maps a source record type to a property kind.
    pub fn from_kind_name(name: &str) -> Option<Self> {
        match name {
            "NiAlphaProperty" => Some(Self::Alpha),
            "NiZBufferProperty" => Some(Self::ZBuffer),
            "NiMaterialProperty" => Some(Self::Material),
            "NiTexturingProperty" => Some(Self::Texturing),
            "NiSpecularProperty" => Some(Self::Specular),
            "NiWireframeProperty" => Some(Self::Wireframe),
            "NiVertexColorProperty" => Some(Self::VertexColor),
            "NiStencilProperty" => Some(Self::Stencil),
            _ => None,
        }
    }
}

/// A render-state property shared by every node that links to its record.
#[derive(Debug)]
pub struct Property {
    record: RecordId,
    kind: PropertyKind,
    flags: Cell<u32>,
}

impl Property {
    /// Decodes a property record. Unknown record types yield `None`.
    pub fn from_source<S: SourceModel>(source: &S, record: RecordId) -> Option<Self> {
        let kind = PropertyKind::from_kind_name(source.kind(record)?)?;
        Some(Self {
            record,
            kind,
            flags: Cell::new(source.get::<u32>(record, "Flags").unwrap_or(0)),
        })
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn flags(&self) -> u32 {
        self.flags.get()
    }

    /// Re-reads the property's fields. Every node sharing the handle sees
    /// the new values.
    pub fn refresh<S: SourceModel>(&self, source: &S) {
        self.flags.set(source.get::<u32>(self.record, "Flags").unwrap_or(0));
    }
}

/// The properties attached to one node.
#[derive(Debug, Clone, Default)]
pub struct PropertyList {
    properties: Vec<Rc<Property>>,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle unless the same property is already attached.
    pub fn add(&mut self, property: Rc<Property>) {
        if !self.properties.iter().any(|p| Rc::ptr_eq(p, &property)) {
            self.properties.push(property);
        }
    }

    /// First property of the given kind.
    pub fn find(&self, kind: PropertyKind) -> Option<&Rc<Property>> {
        self.properties.iter().find(|p| p.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Property>> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }
}
