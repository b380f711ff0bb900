use serde::Serialize;

/// Receives the structure of a device tree as it is decoded.
///
/// Calls arrive synchronously and in stream order: `begin_node`/`end_node` pairs are properly
/// nested, and a node's properties arrive after its `begin_node` and before its first child's
/// `begin_node` (or its own `end_node`).
///
/// The slices passed in borrow the blob and are only valid for the duration of the call;
/// implementations copy whatever they need to keep. If decoding fails midway the visitor will
/// have seen a well-formed prefix of the tree, and should treat it as incomplete.
pub trait FdtVisitor {
    fn begin_node(&mut self, name: &[u8]);
    fn end_node(&mut self);
    fn insert_property(&mut self, name: &[u8], value: &[u8]);
}

impl<V: FdtVisitor + ?Sized> FdtVisitor for &mut V {
    fn begin_node(&mut self, name: &[u8]) {
        (**self).begin_node(name)
    }

    fn end_node(&mut self) {
        (**self).end_node()
    }

    fn insert_property(&mut self, name: &[u8], value: &[u8]) {
        (**self).insert_property(name, value)
    }
}

/// One structural event, borrowing names and values from the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtEvent<'a> {
    BeginNode { name: &'a [u8] },
    EndNode,
    Property { name: &'a [u8], value: &'a [u8] },
}

impl FdtEvent<'_> {
    pub fn to_owned_event(&self) -> OwnedFdtEvent {
        match *self {
            FdtEvent::BeginNode { name } => OwnedFdtEvent::BeginNode {
                name: name.to_vec(),
            },
            FdtEvent::EndNode => OwnedFdtEvent::EndNode,
            FdtEvent::Property { name, value } => OwnedFdtEvent::Property {
                name: name.to_vec(),
                value: value.to_vec(),
            },
        }
    }

    /// Forwards this event to the matching visitor callback.
    pub fn visit(&self, visitor: &mut impl FdtVisitor) {
        match *self {
            FdtEvent::BeginNode { name } => visitor.begin_node(name),
            FdtEvent::EndNode => visitor.end_node(),
            FdtEvent::Property { name, value } => visitor.insert_property(name, value),
        }
    }
}

/// An [`FdtEvent`] that owns its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OwnedFdtEvent {
    BeginNode { name: Vec<u8> },
    EndNode,
    Property { name: Vec<u8>, value: Vec<u8> },
}

impl OwnedFdtEvent {
    pub fn begin_node(name: impl AsRef<[u8]>) -> Self {
        OwnedFdtEvent::BeginNode {
            name: name.as_ref().to_vec(),
        }
    }

    pub fn property(name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        OwnedFdtEvent::Property {
            name: name.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        }
    }
}

/// Records every event, copying names and values.
impl FdtVisitor for Vec<OwnedFdtEvent> {
    fn begin_node(&mut self, name: &[u8]) {
        self.push(OwnedFdtEvent::begin_node(name));
    }

    fn end_node(&mut self) {
        self.push(OwnedFdtEvent::EndNode);
    }

    fn insert_property(&mut self, name: &[u8], value: &[u8]) {
        self.push(OwnedFdtEvent::property(name, value));
    }
}
