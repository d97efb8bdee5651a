//! Opaque resource identities.
//!
//! The graph never looks into a buffer or texture. It only needs a stable identity it can use as a map key, and
//! optionally the state a resource is in when it is first seen. Backends implement [BufferResource] and [TextureResource]
//! for their native objects and hand them to the graph wrapped in [BufferHandle] / [TextureHandle].
//!
//! Handles compare and hash by *identity* (the shared allocation), never by value. Two distinct buffers with the same
//! name are two distinct resources.

use std::{
    any::Any,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

///The execution state a resource is in, or has to be in for some node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ResourceUsage {
    #[default]
    Undefined,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    ShaderResource,
    PixelShaderResource,
    StreamOut,
    IndirectArgument,
    CopyDst,
    CopySrc,
    GenericRead,
    Present,
    Common,
    AccelerationStructureRead,
    AccelerationStructureWrite,
    AccelerationStructureGeometry,
    ShaderBindingTable,
}

impl ResourceUsage {
    ///True if work in this state may write the resource.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ResourceUsage::RenderTarget
                | ResourceUsage::UnorderedAccess
                | ResourceUsage::DepthWrite
                | ResourceUsage::StreamOut
                | ResourceUsage::CopyDst
                | ResourceUsage::Common
                | ResourceUsage::AccelerationStructureWrite
        )
    }
}

///A buffer as seen by the graph.
pub trait BufferResource: Debug + Send + Sync + 'static {
    ///Debug name, used in logs and errors.
    fn name(&self) -> &str;
    ///State the buffer is in before the graph touched it.
    fn initial_state(&self) -> ResourceUsage {
        ResourceUsage::Undefined
    }
    fn as_any(&self) -> &dyn Any;
}

///A texture as seen by the graph.
pub trait TextureResource: Debug + Send + Sync + 'static {
    fn name(&self) -> &str;
    fn initial_state(&self) -> ResourceUsage {
        ResourceUsage::Undefined
    }
    fn mip_levels(&self) -> u32 {
        1
    }
    fn array_layers(&self) -> u32 {
        1
    }
    fn as_any(&self) -> &dyn Any;
}

///Shared, identity-compared buffer handle.
#[derive(Clone)]
pub struct BufferHandle(Arc<dyn BufferResource>);

///Shared, identity-compared texture handle.
#[derive(Clone)]
pub struct TextureHandle(Arc<dyn TextureResource>);

macro_rules! impl_handle {
    ($handle:ident, $res:ident) => {
        impl $handle {
            pub fn new(resource: impl $res) -> Self {
                $handle(Arc::new(resource))
            }

            pub fn from_arc(resource: Arc<dyn $res>) -> Self {
                $handle(resource)
            }

            pub fn resource(&self) -> &dyn $res {
                self.0.as_ref()
            }

            pub fn name(&self) -> &str {
                self.0.name()
            }

            ///Address of the shared allocation. Stable for the lifetime of the resource.
            pub fn address(&self) -> usize {
                Arc::as_ptr(&self.0) as *const () as usize
            }

            ///Downcasts the backend object.
            pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
                self.0.as_any().downcast_ref::<T>()
            }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                self.address() == other.address()
            }
        }

        impl Eq for $handle {}

        impl Hash for $handle {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.address().hash(state)
            }
        }

        impl Debug for $handle {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({}@{:#x})", stringify!($handle), self.name(), self.address())
            }
        }

        impl Display for $handle {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }
    };
}

impl_handle!(BufferHandle, BufferResource);
impl_handle!(TextureHandle, TextureResource);

///Key that orders any resource by identity. Buffers sort before textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    Buffer(usize),
    Texture(usize),
}

impl From<&BufferHandle> for ResourceKey {
    fn from(b: &BufferHandle) -> Self {
        ResourceKey::Buffer(b.address())
    }
}

impl From<&TextureHandle> for ResourceKey {
    fn from(t: &TextureHandle) -> Self {
        ResourceKey::Texture(t.address())
    }
}
