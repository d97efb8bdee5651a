use smallvec::SmallVec;

use crate::{BufferHandle, QueueType, ResourceUsage, TextureHandle};

///Ownership transfer of a resource between two queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTransfer {
    pub source: QueueType,
    pub destination: QueueType,
}

///Single mip level / array layer of a texture. Barriers without a subresource cover the whole texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subresource {
    pub mip_level: u32,
    pub array_layer: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub old_state: ResourceUsage,
    pub new_state: ResourceUsage,
    pub queue_transfer: Option<QueueTransfer>,
    pub subresource: Option<Subresource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub old_state: ResourceUsage,
    pub new_state: ResourceUsage,
}

///Barrier batch recorded by a single `pipeline_barrier` call. Lets you add barriers for textures and buffers
/// via a simple builder API.
///
/// Uses smallvec internally. [STACK_ALLOCATION](Self::STACK_ALLOCATION) barriers per type live inline, the batch
/// however can outgrow that value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBarrier {
    pub textures: SmallVec<[TextureBarrier; Self::STACK_ALLOCATION]>,
    pub buffers: SmallVec<[BufferBarrier; Self::STACK_ALLOCATION]>,
}

impl PipelineBarrier {
    ///Ammount of barriers that can be stack allocated.
    pub const STACK_ALLOCATION: usize = 6;

    pub fn new() -> Self {
        PipelineBarrier::default()
    }

    ///Whole-texture state transition on the owning queue.
    pub fn texture_barrier(
        &mut self,
        texture: TextureHandle,
        old_state: ResourceUsage,
        new_state: ResourceUsage,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("texture_transition[{}] {:?} -> {:?}", texture, old_state, new_state);

        self.textures.push(TextureBarrier {
            texture,
            old_state,
            new_state,
            queue_transfer: None,
            subresource: None,
        });
        self
    }

    ///State transition that also hands the texture from `source` to `destination`.
    pub fn texture_queue_transition(
        &mut self,
        texture: TextureHandle,
        old_state: ResourceUsage,
        new_state: ResourceUsage,
        source: QueueType,
        destination: QueueType,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!(
            "texture_queue_transition[{}] {:?}@{} -> {:?}@{}",
            texture,
            old_state,
            source,
            new_state,
            destination
        );

        self.textures.push(TextureBarrier {
            texture,
            old_state,
            new_state,
            queue_transfer: Some(QueueTransfer {
                source,
                destination,
            }),
            subresource: None,
        });
        self
    }

    ///Transition of a single mip level / array layer.
    pub fn texture_subresource_barrier(
        &mut self,
        texture: TextureHandle,
        subresource: Subresource,
        old_state: ResourceUsage,
        new_state: ResourceUsage,
    ) -> &mut Self {
        self.textures.push(TextureBarrier {
            texture,
            old_state,
            new_state,
            queue_transfer: None,
            subresource: Some(subresource),
        });
        self
    }

    pub fn buffer_barrier(
        &mut self,
        buffer: BufferHandle,
        old_state: ResourceUsage,
        new_state: ResourceUsage,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("buffer_transition[{}] {:?} -> {:?}", buffer, old_state, new_state);

        self.buffers.push(BufferBarrier {
            buffer,
            old_state,
            new_state,
        });
        self
    }

    ///Moves all barriers of `other` into `self`.
    pub fn append(&mut self, other: PipelineBarrier) -> &mut Self {
        self.textures.extend(other.textures);
        self.buffers.extend(other.buffers);
        self
    }

    pub fn has_barrier(&self) -> bool {
        !self.textures.is_empty() || !self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.textures.len() + self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_barrier()
    }

    ///Prepares a freshly acquired swapchain image for rendering.
    pub fn undefined_to_render_target(texture: TextureHandle) -> Self {
        let mut barrier = PipelineBarrier::new();
        barrier.texture_barrier(texture, ResourceUsage::Undefined, ResourceUsage::RenderTarget);
        barrier
    }

    ///Hands a rendered swapchain image over to presentation.
    pub fn render_target_to_present(texture: TextureHandle) -> Self {
        let mut barrier = PipelineBarrier::new();
        barrier.texture_barrier(texture, ResourceUsage::RenderTarget, ResourceUsage::Present);
        barrier
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::TextureResource;

    #[derive(Debug)]
    struct Tex;

    impl TextureResource for Tex {
        fn name(&self) -> &str {
            "tex"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn builder_collects_batches() {
        let tex = TextureHandle::new(Tex);
        let mut barrier = PipelineBarrier::new();
        assert!(!barrier.has_barrier());

        barrier
            .texture_barrier(tex.clone(), ResourceUsage::Undefined, ResourceUsage::CopyDst)
            .texture_queue_transition(
                tex.clone(),
                ResourceUsage::CopyDst,
                ResourceUsage::ShaderResource,
                QueueType::Copy,
                QueueType::Graphics,
            );

        assert_eq!(barrier.len(), 2);
        assert_eq!(barrier.textures[0].queue_transfer, None);
        assert_eq!(
            barrier.textures[1].queue_transfer,
            Some(QueueTransfer {
                source: QueueType::Copy,
                destination: QueueType::Graphics
            })
        );
    }

    #[test]
    fn swapchain_helpers() {
        let tex = TextureHandle::new(Tex);
        let pre = PipelineBarrier::undefined_to_render_target(tex.clone());
        let post = PipelineBarrier::render_target_to_present(tex.clone());
        assert_eq!(pre.textures[0].new_state, ResourceUsage::RenderTarget);
        assert_eq!(post.textures[0].old_state, ResourceUsage::RenderTarget);
        assert_eq!(post.textures[0].new_state, ResourceUsage::Present);

        let mut merged = pre;
        merged.append(post);
        assert_eq!(merged.len(), 2);
        assert!(merged.buffers.is_empty());
    }
}
