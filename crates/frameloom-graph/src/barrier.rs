//! Barrier issuer.
//!
//! Before a node records, its declared usages are compared against the [StateRegistry]. Every resource that is in a
//! different state, or owned by a different queue, gets exactly one barrier. All barriers of a node are batched into a
//! single [PipelineBarrier]. The registry is updated before the node's own commands are recorded.

use std::sync::atomic::{AtomicU64, Ordering};

use frameloom::{PipelineBarrier, QueueType};
use parking_lot::MutexGuard;
use smallvec::SmallVec;

use crate::{
    node::NodeResourceUsage,
    state::{JournalEntry, JournalResource, ResourceState, StateRegistry},
};

///Result of issuing the barriers of one node.
pub(crate) struct IssuedBarriers {
    pub(crate) barrier: PipelineBarrier,
    pub(crate) journal: Vec<JournalEntry>,
}

///Computes and applies the transitions `usages` require when recorded on `queue` for frame slot `slot`.
///
/// `usages` must be sorted by [key](NodeResourceUsage::key). Entry locks are taken in that order and held until all
/// transitions of the node are applied, so two nodes can't deadlock on each other's entries.
pub(crate) fn issue(
    registry: &StateRegistry,
    sequence: &AtomicU64,
    usages: &[NodeResourceUsage],
    queue: QueueType,
    slot: u32,
    #[allow(unused_variables)] node: &str,
) -> IssuedBarriers {
    debug_assert!(usages.windows(2).all(|w| w[0].key() <= w[1].key()));

    let mut guards: SmallVec<[(&NodeResourceUsage, MutexGuard<'_, ResourceState>); 8]> =
        SmallVec::new();
    for usage in usages.iter().filter(|u| u.applies_to(slot)) {
        //entry locks are not reentrant, one guard per resource
        if guards
            .last()
            .is_some_and(|(locked, _)| locked.key() == usage.key())
        {
            continue;
        }
        let guard = match usage {
            NodeResourceUsage::Buffer(b) => registry.lock(&b.buffer),
            NodeResourceUsage::Texture(t) => registry.lock(&t.texture),
        };
        match guard {
            Some(guard) => guards.push((usage, guard)),
            None => {
                #[cfg(feature = "logging")]
                log::error!(
                    "Resource {} of node \"{}\" is not registered, skipping its transition",
                    usage.resource_name(),
                    node
                );
            }
        }
    }

    let mut barrier = PipelineBarrier::new();
    let mut journal = Vec::with_capacity(guards.len());

    for (usage, current) in guards.iter_mut() {
        let usage = *usage;
        let required = usage.state();
        let owner_changes = current.queue.is_some_and(|q| q != queue);

        if current.state == required && !owner_changes {
            if current.queue.is_none() {
                journal.push(journal_entry(sequence, usage, **current));
                current.queue = Some(queue);
            }
            #[cfg(feature = "log_reasoning")]
            log::trace!(
                "[{}] {} already in {:?}",
                node,
                usage.resource_name(),
                required
            );
            continue;
        }

        #[cfg(feature = "log_reasoning")]
        log::trace!(
            "[{}] {} {:?}@{:?} -> {:?}@{}",
            node,
            usage.resource_name(),
            current.state,
            current.queue,
            required,
            queue
        );

        match usage {
            NodeResourceUsage::Buffer(b) => {
                barrier.buffer_barrier(b.buffer.clone(), current.state, required);
            }
            NodeResourceUsage::Texture(t) => match current.queue {
                Some(src) if owner_changes => {
                    barrier.texture_queue_transition(
                        t.texture.clone(),
                        current.state,
                        required,
                        src,
                        queue,
                    );
                }
                _ => {
                    barrier.texture_barrier(t.texture.clone(), current.state, required);
                }
            },
        }

        journal.push(journal_entry(sequence, usage, **current));
        **current = ResourceState {
            state: required,
            queue: Some(queue),
        };
    }

    drop(guards);

    IssuedBarriers { barrier, journal }
}

fn journal_entry(
    sequence: &AtomicU64,
    usage: &NodeResourceUsage,
    previous: ResourceState,
) -> JournalEntry {
    JournalEntry {
        sequence: sequence.fetch_add(1, Ordering::Relaxed),
        resource: match usage {
            NodeResourceUsage::Buffer(b) => JournalResource::Buffer(b.buffer.clone()),
            NodeResourceUsage::Texture(t) => JournalResource::Texture(t.texture.clone()),
        },
        previous,
    }
}

///Sorts usages into lock order.
pub(crate) fn sort_usages(usages: &mut [NodeResourceUsage]) {
    usages.sort_by_key(|u| u.key());
}

///Barriers the present node records around its callback.
pub(crate) fn present_barriers(
    render_target: &frameloom::TextureHandle,
) -> (PipelineBarrier, PipelineBarrier) {
    (
        PipelineBarrier::undefined_to_render_target(render_target.clone()),
        PipelineBarrier::render_target_to_present(render_target.clone()),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use frameloom::{QueueTransfer, QueueType, ResourceUsage};
    use frameloom_headless::{HeadlessDesc, HeadlessDevice};

    use super::*;
    use crate::node::{BufferUsage, TextureUsage};

    fn tex_usage(t: &frameloom::TextureHandle, state: ResourceUsage) -> NodeResourceUsage {
        NodeResourceUsage::Texture(TextureUsage {
            texture: t.clone(),
            state,
            frame: None,
        })
    }

    #[test]
    fn one_barrier_per_differing_resource() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let shadow = device.create_texture(Some("shadow"));
        let lights = device.create_buffer(Some("lights"));
        registry.register(&shadow);
        registry.register(&lights);
        let seq = AtomicU64::new(0);

        let mut usages = vec![
            tex_usage(&shadow, ResourceUsage::DepthWrite),
            NodeResourceUsage::Buffer(BufferUsage {
                buffer: lights.clone(),
                state: ResourceUsage::ShaderResource,
                frame: None,
            }),
        ];
        sort_usages(&mut usages);

        let first = issue(&registry, &seq, &usages, QueueType::Graphics, 0, "Shadow");
        assert_eq!(first.barrier.textures.len(), 1);
        assert_eq!(first.barrier.buffers.len(), 1);
        assert_eq!(first.journal.len(), 2);
        assert_eq!(
            registry.current_state(&shadow).state,
            ResourceUsage::DepthWrite
        );

        //same requirements again: nothing to do
        let second = issue(&registry, &seq, &usages, QueueType::Graphics, 0, "Shadow");
        assert!(!second.barrier.has_barrier());
        assert!(second.journal.is_empty());
    }

    #[test]
    fn queue_change_transfers_texture_ownership() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let target = device.create_texture(Some("hdr"));
        registry.register(&target);
        let seq = AtomicU64::new(0);

        issue(
            &registry,
            &seq,
            &[tex_usage(&target, ResourceUsage::UnorderedAccess)],
            QueueType::Compute,
            0,
            "Cull",
        );
        //same state, other queue
        let issued = issue(
            &registry,
            &seq,
            &[tex_usage(&target, ResourceUsage::UnorderedAccess)],
            QueueType::Graphics,
            0,
            "Resolve",
        );
        assert_eq!(issued.barrier.textures.len(), 1);
        assert_eq!(
            issued.barrier.textures[0].queue_transfer,
            Some(QueueTransfer {
                source: QueueType::Compute,
                destination: QueueType::Graphics
            })
        );
        assert_eq!(
            registry.current_state(&target).queue,
            Some(QueueType::Graphics)
        );
    }

    #[test]
    fn frame_filtered_usage_only_applies_to_its_slot() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let ubo = device.create_buffer(Some("camera1"));
        registry.register(&ubo);
        let seq = AtomicU64::new(0);
        let usages = [NodeResourceUsage::Buffer(BufferUsage {
            buffer: ubo.clone(),
            state: ResourceUsage::CopyDst,
            frame: Some(1),
        })];

        let slot0 = issue(&registry, &seq, &usages, QueueType::Copy, 0, "Upload");
        assert!(!slot0.barrier.has_barrier());
        let slot1 = issue(&registry, &seq, &usages, QueueType::Copy, 1, "Upload");
        assert_eq!(slot1.barrier.buffers.len(), 1);
    }

    #[test]
    fn resource_declared_twice_is_locked_once() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let depth = device.create_texture(Some("depth"));
        registry.register(&depth);
        let seq = AtomicU64::new(0);
        let usages = [
            tex_usage(&depth, ResourceUsage::DepthWrite),
            NodeResourceUsage::Texture(TextureUsage {
                texture: depth.clone(),
                state: ResourceUsage::DepthWrite,
                frame: Some(0),
            }),
        ];

        let issued = issue(&registry, &seq, &usages, QueueType::Graphics, 0, "Prepass");
        assert_eq!(issued.barrier.textures.len(), 1);
        assert_eq!(issued.journal.len(), 1);
        assert_eq!(
            registry.current_state(&depth).state,
            ResourceUsage::DepthWrite
        );
    }
}
