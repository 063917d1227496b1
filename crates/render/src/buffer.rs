//! Vertex and index buffer descriptions.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Device-side buffer object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Vertex,
}

/// Where a buffer's contents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Device(BufferId),
    Host,
}

/// Semantic of a vertex element. Each usage maps to a fixed attribute index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementUsage {
    Position,
    Normal,
    Color,
    Tangent,
    Userdata,
    TexCoord,
}

impl ElementUsage {
    pub const ALL: [ElementUsage; 6] = [
        ElementUsage::Position,
        ElementUsage::Normal,
        ElementUsage::Color,
        ElementUsage::Tangent,
        ElementUsage::Userdata,
        ElementUsage::TexCoord,
    ];

    pub const fn attribute_index(self) -> u32 {
        match self {
            ElementUsage::Position => 0,
            ElementUsage::Normal => 1,
            ElementUsage::Color => 2,
            ElementUsage::Tangent => 3,
            ElementUsage::Userdata => 4,
            ElementUsage::TexCoord => 5,
        }
    }
}

/// First of the four attribute slots holding the per-instance world matrix.
/// Eight slots past the texcoord index are reserved for extra texcoords.
pub const INSTANCE_MATRIX_ATTRIBUTE: u32 = ElementUsage::TexCoord.attribute_index() + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Float,
    Double,
    UnsignedByte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// Four normalized unsigned bytes.
    Color,
    Double1,
    Double2,
    Double3,
    Double4,
    Float1,
    Float2,
    Float3,
    Float4,
}

impl ElementType {
    pub fn component_count(self) -> u32 {
        match self {
            ElementType::Double1 | ElementType::Float1 => 1,
            ElementType::Double2 | ElementType::Float2 => 2,
            ElementType::Double3 | ElementType::Float3 => 3,
            ElementType::Color | ElementType::Double4 | ElementType::Float4 => 4,
        }
    }

    pub fn attribute_type(self) -> AttributeType {
        match self {
            ElementType::Color => AttributeType::UnsignedByte,
            ElementType::Double1
            | ElementType::Double2
            | ElementType::Double3
            | ElementType::Double4 => AttributeType::Double,
            _ => AttributeType::Float,
        }
    }

    pub fn size(self) -> u32 {
        match self.attribute_type() {
            AttributeType::UnsignedByte => 4,
            AttributeType::Double => 8 * self.component_count(),
            AttributeType::Float => 4 * self.component_count(),
        }
    }

    pub fn is_normalized(self) -> bool {
        self == ElementType::Color
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub usage: ElementUsage,
    pub ty: ElementType,
    pub offset: u32,
}

/// Layout of one vertex: at most one element per usage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexDeclaration {
    elements: Vec<VertexElement>,
    stride: u32,
}

impl VertexDeclaration {
    /// Build a tightly packed declaration from `(usage, type)` pairs in order.
    /// A repeated usage replaces the earlier element.
    pub fn packed(layout: &[(ElementUsage, ElementType)]) -> Self {
        let mut elements: Vec<VertexElement> = Vec::with_capacity(layout.len());
        let mut offset = 0;
        for &(usage, ty) in layout {
            elements.retain(|e| e.usage != usage);
            elements.push(VertexElement { usage, ty, offset });
            offset += ty.size();
        }
        Self {
            elements,
            stride: offset,
        }
    }

    pub fn element(&self, usage: ElementUsage) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.usage == usage)
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }
}

/// Identity of one [`VertexBuffer`], assigned at construction.
///
/// Several vertex buffers may share device storage under different
/// declarations, so the storage id alone does not identify a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexBufferId(u64);

impl VertexBufferId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    id: VertexBufferId,
    storage: Storage,
    declaration: Rc<VertexDeclaration>,
    vertex_count: u32,
}

impl VertexBuffer {
    pub fn new(storage: Storage, declaration: Rc<VertexDeclaration>, vertex_count: u32) -> Rc<Self> {
        Rc::new(Self {
            id: VertexBufferId::next(),
            storage,
            declaration,
            vertex_count,
        })
    }

    pub fn id(&self) -> VertexBufferId {
        self.id
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn declaration(&self) -> &Rc<VertexDeclaration> {
        &self.declaration
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn device_buffer(&self) -> Option<BufferId> {
        match self.storage {
            Storage::Device(id) => Some(id),
            Storage::Host => None,
        }
    }

    pub fn is_device_resident(&self) -> bool {
        self.device_buffer().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Index source for a draw: explicit indices, or an implicit sequential run.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexBuffer {
    Sequential { start: u32, count: u32 },
    Indexed {
        storage: Storage,
        index_type: IndexType,
        count: u32,
    },
}

impl IndexBuffer {
    pub fn sequential(start: u32, count: u32) -> Rc<Self> {
        Rc::new(IndexBuffer::Sequential { start, count })
    }

    pub fn indexed(storage: Storage, index_type: IndexType, count: u32) -> Rc<Self> {
        Rc::new(IndexBuffer::Indexed {
            storage,
            index_type,
            count,
        })
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, IndexBuffer::Sequential { .. })
    }

    pub fn index_count(&self) -> u32 {
        match *self {
            IndexBuffer::Sequential { count, .. } | IndexBuffer::Indexed { count, .. } => count,
        }
    }

    /// Device buffer holding explicit indices, if any.
    pub fn device_buffer(&self) -> Option<BufferId> {
        match *self {
            IndexBuffer::Indexed {
                storage: Storage::Device(id),
                ..
            } => Some(id),
            _ => None,
        }
    }

    /// Sequential runs need no storage; explicit indices must be on the device.
    pub fn is_bindable(&self) -> bool {
        self.is_sequential() || self.device_buffer().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_declaration_offsets() {
        let decl = VertexDeclaration::packed(&[
            (ElementUsage::Position, ElementType::Float3),
            (ElementUsage::Color, ElementType::Color),
            (ElementUsage::TexCoord, ElementType::Float2),
        ]);
        assert_eq!(decl.stride(), 12 + 4 + 8);
        assert_eq!(decl.element(ElementUsage::Color).map(|e| e.offset), Some(12));
        assert_eq!(decl.element(ElementUsage::TexCoord).map(|e| e.offset), Some(16));
        assert!(decl.element(ElementUsage::Normal).is_none());
    }

    #[test]
    fn instance_matrix_follows_texcoords() {
        assert_eq!(
            INSTANCE_MATRIX_ATTRIBUTE,
            ElementUsage::TexCoord.attribute_index() + 8
        );
    }

    #[test]
    fn index_buffer_bindability() {
        assert!(IndexBuffer::sequential(0, 6).is_bindable());
        assert!(IndexBuffer::indexed(Storage::Device(BufferId(2)), IndexType::U16, 6).is_bindable());
        assert!(!IndexBuffer::indexed(Storage::Host, IndexType::U32, 6).is_bindable());
    }

    #[test]
    fn vertex_buffers_over_one_storage_are_distinct() {
        let storage = Storage::Device(BufferId(9));
        let layout = Rc::new(VertexDeclaration::packed(&[(ElementUsage::Position, ElementType::Float3)]));
        let a = VertexBuffer::new(storage, layout.clone(), 3);
        let b = VertexBuffer::new(storage, layout, 3);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.device_buffer(), b.device_buffer());
        assert_eq!(a.as_ref().clone().id(), a.id());
    }
}
