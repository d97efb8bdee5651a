//! Resource state registry.
//!
//! Tracks for every buffer and texture the graph knows the state it was last transitioned to and the queue that owns
//! it. Buffers and textures live in separate maps. Every entry carries its own lock, so unrelated resources can be
//! transitioned concurrently by nodes recording on different workers.
//!
//! While a frame records, the maps themselves are never changed, only entry contents. All declared resources are
//! registered when the graph is built.

use std::hash::Hash;

use ahash::AHashMap;
use frameloom::{BufferHandle, QueueType, ResourceKey, ResourceUsage, TextureHandle};
use parking_lot::{Mutex, MutexGuard};

///Last known state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceState {
    pub state: ResourceUsage,
    ///Queue that owns the resource. `None` until some queue used it.
    pub queue: Option<QueueType>,
}

impl Default for ResourceState {
    fn default() -> Self {
        ResourceState {
            state: ResourceUsage::Undefined,
            queue: None,
        }
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for frameloom::BufferHandle {}
    impl Sealed for frameloom::TextureHandle {}
}

///Resource kinds the registry can track. Implemented for [BufferHandle] and [TextureHandle].
pub trait TrackedResource: private::Sealed + Clone + Eq + Hash {
    #[doc(hidden)]
    fn map(registry: &StateRegistry) -> &AHashMap<Self, Mutex<ResourceState>>;
    #[doc(hidden)]
    fn map_mut(registry: &mut StateRegistry) -> &mut AHashMap<Self, Mutex<ResourceState>>;
    fn initial_state(&self) -> ResourceUsage;
    fn key(&self) -> ResourceKey;
    fn display_name(&self) -> &str;
}

impl TrackedResource for BufferHandle {
    fn map(registry: &StateRegistry) -> &AHashMap<Self, Mutex<ResourceState>> {
        &registry.buffers
    }
    fn map_mut(registry: &mut StateRegistry) -> &mut AHashMap<Self, Mutex<ResourceState>> {
        &mut registry.buffers
    }
    fn initial_state(&self) -> ResourceUsage {
        self.resource().initial_state()
    }
    fn key(&self) -> ResourceKey {
        ResourceKey::from(self)
    }
    fn display_name(&self) -> &str {
        self.name()
    }
}

impl TrackedResource for TextureHandle {
    fn map(registry: &StateRegistry) -> &AHashMap<Self, Mutex<ResourceState>> {
        &registry.textures
    }
    fn map_mut(registry: &mut StateRegistry) -> &mut AHashMap<Self, Mutex<ResourceState>> {
        &mut registry.textures
    }
    fn initial_state(&self) -> ResourceUsage {
        self.resource().initial_state()
    }
    fn key(&self) -> ResourceKey {
        ResourceKey::from(self)
    }
    fn display_name(&self) -> &str {
        self.name()
    }
}

#[derive(Default)]
pub struct StateRegistry {
    buffers: AHashMap<BufferHandle, Mutex<ResourceState>>,
    textures: AHashMap<TextureHandle, Mutex<ResourceState>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        StateRegistry::default()
    }

    ///Starts tracking `resource` as being in `state`, owned by `queue`. Overwrites any known state.
    pub fn track<R: TrackedResource>(&mut self, resource: &R, state: ResourceUsage, queue: QueueType) {
        let new_state = ResourceState {
            state,
            queue: Some(queue),
        };
        if let Some(old) = R::map_mut(self).insert(resource.clone(), Mutex::new(new_state)) {
            #[cfg(feature = "logging")]
            log::warn!(
                "Resource {} was already tracked in {:?}, overwriting with {:?}",
                resource.display_name(),
                old.into_inner(),
                new_state
            );
            #[cfg(not(feature = "logging"))]
            let _ = old;
        }
    }

    ///Forgets `resource`. Returns its last known state.
    pub fn untrack<R: TrackedResource>(&mut self, resource: &R) -> Option<ResourceState> {
        R::map_mut(self).remove(resource).map(|s| s.into_inner())
    }

    ///Registers `resource` in its initial state if it is unknown.
    pub(crate) fn register<R: TrackedResource>(&mut self, resource: &R) {
        R::map_mut(self).entry(resource.clone()).or_insert_with(|| {
            Mutex::new(ResourceState {
                state: resource.initial_state(),
                queue: None,
            })
        });
    }

    ///Records `state` and `queue` for an already registered resource. Returns false if the resource is unknown.
    pub fn record_state<R: TrackedResource>(
        &self,
        resource: &R,
        state: ResourceUsage,
        queue: QueueType,
    ) -> bool {
        if let Some(entry) = R::map(self).get(resource) {
            *entry.lock() = ResourceState {
                state,
                queue: Some(queue),
            };
            true
        } else {
            false
        }
    }

    ///Current state of `resource`. Unknown resources are reported in their initial state, which is
    /// [Undefined](ResourceUsage::Undefined) unless the backend says otherwise.
    pub fn current_state<R: TrackedResource>(&self, resource: &R) -> ResourceState {
        R::map(self)
            .get(resource)
            .map(|s| *s.lock())
            .unwrap_or(ResourceState {
                state: resource.initial_state(),
                queue: None,
            })
    }

    pub fn is_tracked<R: TrackedResource>(&self, resource: &R) -> bool {
        R::map(self).contains_key(resource)
    }

    ///Locks the entry of `resource` for a compare-and-transition.
    pub(crate) fn lock<'a, R: TrackedResource + 'a>(
        &'a self,
        resource: &R,
    ) -> Option<MutexGuard<'a, ResourceState>> {
        R::map(self).get(resource).map(|s| s.lock())
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.textures.clear();
    }
}

#[derive(Debug, Clone)]
pub(crate) enum JournalResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

///A transition applied during a frame, together with the state it replaced.
#[derive(Debug, Clone)]
pub(crate) struct JournalEntry {
    ///Global application order within the frame.
    pub(crate) sequence: u64,
    pub(crate) resource: JournalResource,
    pub(crate) previous: ResourceState,
}

///Transitions applied while recording one frame. Used to restore the registry if the frame is aborted.
#[derive(Debug, Default)]
pub(crate) struct StateJournal {
    entries: Vec<JournalEntry>,
}

impl StateJournal {
    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = JournalEntry>) {
        self.entries.extend(entries);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    ///Restores every touched entry to the state it had before the frame.
    pub(crate) fn rollback(mut self, registry: &StateRegistry) {
        self.entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        for entry in self.entries {
            let guard = match &entry.resource {
                JournalResource::Buffer(b) => registry.lock(b),
                JournalResource::Texture(t) => registry.lock(t),
            };
            if let Some(mut guard) = guard {
                *guard = entry.previous;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use frameloom::{QueueType, ResourceUsage};
    use frameloom_headless::{HeadlessDesc, HeadlessDevice};

    use super::*;

    #[test]
    fn unknown_resources_are_undefined() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let registry = StateRegistry::new();
        let buffer = device.create_buffer(Some("vertices"));
        let state = registry.current_state(&buffer);
        assert_eq!(state.state, ResourceUsage::Undefined);
        assert_eq!(state.queue, None);
        assert!(!registry.record_state(&buffer, ResourceUsage::CopyDst, QueueType::Copy));
    }

    #[test]
    fn buffers_and_textures_are_separate() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let buffer = device.create_buffer(None);
        let texture = device.create_texture_in_state(None, ResourceUsage::ShaderResource);

        registry.register(&buffer);
        registry.register(&texture);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.current_state(&texture).state,
            ResourceUsage::ShaderResource
        );

        assert!(registry.record_state(&buffer, ResourceUsage::CopyDst, QueueType::Copy));
        assert_eq!(
            registry.current_state(&buffer),
            ResourceState {
                state: ResourceUsage::CopyDst,
                queue: Some(QueueType::Copy)
            }
        );
        assert_eq!(
            registry.current_state(&texture).state,
            ResourceUsage::ShaderResource
        );
    }

    #[test]
    fn register_keeps_known_state() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let texture = device.create_texture(Some("albedo"));
        registry.track(&texture, ResourceUsage::ShaderResource, QueueType::Copy);
        registry.register(&texture);
        assert_eq!(
            registry.current_state(&texture).queue,
            Some(QueueType::Copy)
        );

        let old = registry.untrack(&texture).unwrap();
        assert_eq!(old.state, ResourceUsage::ShaderResource);
        assert!(!registry.is_tracked(&texture));
    }

    #[test]
    fn journal_restores_pre_frame_state() {
        let device = HeadlessDevice::new(HeadlessDesc::default());
        let mut registry = StateRegistry::new();
        let texture = device.create_texture(None);
        registry.register(&texture);
        let before = registry.current_state(&texture);

        let mut journal = StateJournal::default();
        let mut seq = 0;
        for (state, queue) in [
            (ResourceUsage::RenderTarget, QueueType::Graphics),
            (ResourceUsage::ShaderResource, QueueType::Compute),
        ] {
            let mut guard = registry.lock(&texture).unwrap();
            journal.extend([JournalEntry {
                sequence: seq,
                resource: JournalResource::Texture(texture.clone()),
                previous: *guard,
            }]);
            *guard = ResourceState {
                state,
                queue: Some(queue),
            };
            seq += 1;
        }
        assert_eq!(journal.len(), 2);
        assert_eq!(
            registry.current_state(&texture).state,
            ResourceUsage::ShaderResource
        );

        journal.rollback(&registry);
        assert_eq!(registry.current_state(&texture), before);
    }
}
