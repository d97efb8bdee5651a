//! Per frame executor.
//!
//! Recording and submission are two separate phases.
//!
//! Recording runs one task per node on the worker pool. A node's task is spawned once all of its predecessors finished
//! *recording*. No worker ever blocks on another task or on the GPU. Each task issues the node's barriers against the
//! registry, then runs the node's callback into the node's own command list.
//!
//! Submission happens on the calling thread once every node recorded. Nodes are submitted batch by batch. Each
//! submission waits on the semaphores of its incoming edges and signals those of its outgoing edges. The present node
//! is submitted last: it additionally waits on the image-acquired semaphore, signals work-finished and the slot's
//! fence, and finally presents.
//!
//! If any node fails to record, none of its work is submitted and the registry is rolled back to its pre-frame state.
//! A swapchain image the aborted frame already acquired is handed back by submitting the present list with nothing but
//! the layout transitions, which consumes the image-acquired semaphore, and presenting the image unrendered.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use ahash::AHashMap;
use crossbeam::channel::{Sender, unbounded};
use frameloom::{
    CommandList, DeviceError, ExecuteDesc, Fence, PresentResult, QueueType, Semaphore, Swapchain,
    TextureHandle,
};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    FrameError,
    barrier::{issue, present_barriers},
    builder::Dag,
    frame::FrameSlot,
    node::{NodeExecute, PresentExecute},
    state::{JournalEntry, StateJournal, StateRegistry},
};

///Runtime part of a built node.
#[derive(Clone)]
pub(crate) enum NodeCallback {
    Node(Arc<dyn NodeExecute>),
    Present {
        swapchain: Arc<dyn Swapchain>,
        execute: Option<Arc<dyn PresentExecute>>,
    },
}

type ListRef<'f> = &'f mut Box<dyn CommandList>;

struct NodeOutcome {
    node: usize,
    journal: Vec<JournalEntry>,
    result: Result<(), FrameError>,
}

///State shared by all node tasks of one frame.
struct FrameRecording<'f> {
    dag: &'f Dag,
    callbacks: &'f [NodeCallback],
    registry: &'f StateRegistry,
    slot: u32,
    image_acquired: &'f dyn Semaphore,
    ///Command list of every node. Taken by the node's task only.
    lists: Vec<Mutex<Option<ListRef<'f>>>>,
    ///Predecessors that did not finish recording yet.
    pending: Vec<AtomicUsize>,
    aborted: AtomicBool,
    sequence: AtomicU64,
    acquired: Mutex<Option<(u32, TextureHandle)>>,
    outcomes: Sender<NodeOutcome>,
}

impl<'f> FrameRecording<'f> {
    fn launch<'s>(&'s self, scope: &rayon::Scope<'s>, node: usize) {
        scope.spawn(move |scope| self.run_node(scope, node));
    }

    fn run_node<'s>(&'s self, scope: &rayon::Scope<'s>, node: usize) {
        if self.aborted.load(Ordering::Acquire) {
            return;
        }

        let (journal, result) = self.record(node);
        let failed = result.is_err();
        if failed {
            self.aborted.store(true, Ordering::Release);
        }
        //the receiver lives until all tasks are done
        let _ = self.outcomes.send(NodeOutcome {
            node,
            journal,
            result,
        });
        if failed {
            return;
        }

        for succ in self.dag.successors[node].iter() {
            if self.pending[*succ].fetch_sub(1, Ordering::AcqRel) == 1 {
                self.launch(scope, *succ);
            }
        }
    }

    fn record(&self, node: usize) -> (Vec<JournalEntry>, Result<(), FrameError>) {
        let name = self.dag.names[node].as_str();

        #[cfg(feature = "profiling")]
        puffin::profile_scope!("record node", name);

        let Some(list) = self.lists[node].lock().take() else {
            return (
                Vec::new(),
                Err(FrameError::Device(DeviceError::InvalidState(format!(
                    "no command list for node \"{}\"",
                    name
                )))),
            );
        };

        let mut journal = Vec::new();
        let result = match &self.callbacks[node] {
            NodeCallback::Node(execute) => {
                self.record_node(node, name, &mut **list, execute.as_ref(), &mut journal)
            }
            NodeCallback::Present { swapchain, execute } => self.record_present(
                node,
                &mut **list,
                swapchain.as_ref(),
                execute.as_deref(),
                &mut journal,
            ),
        };

        *self.lists[node].lock() = Some(list);
        (journal, result)
    }

    fn record_node(
        &self,
        node: usize,
        name: &str,
        list: &mut dyn CommandList,
        execute: &dyn NodeExecute,
        journal: &mut Vec<JournalEntry>,
    ) -> Result<(), FrameError> {
        list.begin(name)?;

        let issued = issue(
            self.registry,
            &self.sequence,
            &self.dag.usages[node],
            self.dag.queues[node],
            self.slot,
            name,
        );
        journal.extend(issued.journal);
        if issued.barrier.has_barrier() {
            list.pipeline_barrier(&issued.barrier);
        }

        execute
            .execute(self.slot, list)
            .map_err(|source| FrameError::NodeFailed {
                node: name.to_owned(),
                source,
            })?;

        list.end()?;
        Ok(())
    }

    fn record_present(
        &self,
        node: usize,
        list: &mut dyn CommandList,
        swapchain: &dyn Swapchain,
        execute: Option<&dyn PresentExecute>,
        journal: &mut Vec<JournalEntry>,
    ) -> Result<(), FrameError> {
        let name = self.dag.names[node].as_str();

        let image = swapchain.acquire_next_image(self.image_acquired)?;
        let render_target = swapchain.render_target(image);
        *self.acquired.lock() = Some((image, render_target.clone()));

        list.begin(name)?;

        let mut issued = issue(
            self.registry,
            &self.sequence,
            &self.dag.usages[node],
            self.dag.queues[node],
            self.slot,
            name,
        );
        journal.extend(issued.journal);

        let (to_render_target, to_present) = present_barriers(&render_target);
        issued.barrier.append(to_render_target);
        list.pipeline_barrier(&issued.barrier);

        if let Some(execute) = execute {
            execute
                .execute(self.slot, list, &render_target)
                .map_err(|source| FrameError::NodeFailed {
                    node: name.to_owned(),
                    source,
                })?;
        }

        list.pipeline_barrier(&to_present);
        list.end()?;
        Ok(())
    }
}

///Records and submits one frame into `slot`. The slot must be in `Recording` state.
pub(crate) fn run_frame(
    workers: &rayon::ThreadPool,
    dag: &Dag,
    callbacks: &[NodeCallback],
    registry: &StateRegistry,
    slot: &mut FrameSlot,
) -> Result<PresentResult, FrameError> {
    let node_count = dag.node_count();

    //hand each node its command list
    let mut owner: AHashMap<(QueueType, usize), usize> = AHashMap::with_capacity(node_count);
    for (node, list) in dag.command_lists.iter().enumerate() {
        owner.insert(*list, node);
    }
    let mut lists: Vec<Mutex<Option<ListRef<'_>>>> =
        (0..node_count).map(|_| Mutex::new(None)).collect();
    for pool in slot.pools.iter_mut() {
        let queue = pool.queue_type();
        for (idx, list) in pool.command_lists().iter_mut().enumerate() {
            if let Some(node) = owner.get(&(queue, idx)) {
                *lists[*node].get_mut() = Some(list);
            }
        }
    }

    let (sender, receiver) = unbounded();
    let recording = FrameRecording {
        dag,
        callbacks,
        registry,
        slot: slot.index,
        image_acquired: slot.image_acquired.as_ref(),
        lists,
        pending: dag
            .predecessors
            .iter()
            .map(|p| AtomicUsize::new(p.len()))
            .collect(),
        aborted: AtomicBool::new(false),
        sequence: AtomicU64::new(0),
        acquired: Mutex::new(None),
        outcomes: sender,
    };

    {
        #[cfg(feature = "profiling")]
        puffin::profile_scope!("record frame");

        workers.scope(|scope| {
            for root in dag.order.iter().filter(|n| dag.predecessors[**n].is_empty()) {
                recording.launch(scope, *root);
            }
        });
    }

    let FrameRecording {
        lists, acquired, ..
    } = recording;

    let mut journal = StateJournal::default();
    let mut recorded = 0;
    let mut failures = Vec::new();
    for outcome in receiver.try_iter() {
        journal.extend(outcome.journal);
        match outcome.result {
            Ok(()) => recorded += 1,
            Err(err) => failures.push((outcome.node, err)),
        }
    }

    if !failures.is_empty() || recorded != node_count {
        #[cfg(feature = "logging")]
        log::error!(
            "Aborting frame in slot {}: {} of {} node(s) recorded, rolling back {} transition(s)",
            slot.index,
            recorded,
            node_count,
            journal.len()
        );
        journal.rollback(registry);

        //an acquired image still has to be handed back, or its semaphore stays signaled
        if let Some((image, render_target)) = acquired.into_inner() {
            let present = dag.present_index();
            let released = match lists.into_iter().nth(present).and_then(|l| l.into_inner()) {
                Some(list) => release_image(
                    &mut **list,
                    &dag.names[present],
                    slot.image_acquired.clone(),
                    slot.work_finished.clone(),
                    slot.fence.as_ref(),
                    &render_target,
                ),
                None => Err(DeviceError::InvalidState(
                    "present node kept its command list".to_owned(),
                )),
            };
            match released {
                Ok(()) => {
                    slot.mark_submitted();
                    if let NodeCallback::Present { swapchain, .. } = &callbacks[present] {
                        if let Err(_err) = swapchain.present(&[slot.work_finished.as_ref()], image) {
                            #[cfg(feature = "logging")]
                            log::warn!("Presenting image {} of aborted frame failed: {}", image, _err);
                        }
                    }
                    #[cfg(feature = "logging")]
                    log::warn!("Handed back image {} of aborted frame unrendered", image);
                }
                Err(_err) => {
                    #[cfg(feature = "logging")]
                    log::error!("Could not release image {} of aborted frame: {}", image, _err);
                }
            }
        }

        //report the failure that comes first in topological order
        failures.sort_by_key(|(node, _)| dag.order.iter().position(|o| o == node));
        return Err(failures
            .into_iter()
            .next()
            .map(|(_, err)| err)
            .unwrap_or_else(|| {
                FrameError::Device(DeviceError::InvalidState(format!(
                    "only {} of {} nodes recorded",
                    recorded, node_count
                )))
            }));
    }

    let Some((image, _render_target)) = acquired.into_inner() else {
        return Err(FrameError::Device(DeviceError::InvalidState(
            "present node did not acquire an image".to_owned(),
        )));
    };

    let mut lists = lists
        .into_iter()
        .map(|l| l.into_inner())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            FrameError::Device(DeviceError::InvalidState(
                "command list not returned by its node".to_owned(),
            ))
        })?;

    #[cfg(feature = "profiling")]
    puffin::profile_scope!("submit frame");

    let present = dag.present_index();
    let edge_semaphores = &slot.edge_semaphores;
    for batch in dag.batches.iter() {
        for node in batch.iter().copied() {
            let mut wait: SmallVec<[Arc<dyn Semaphore>; 4]> = dag.incoming_edges[node]
                .iter()
                .map(|e| edge_semaphores[*e].clone())
                .collect();
            let mut signal: SmallVec<[Arc<dyn Semaphore>; 4]> = dag.outgoing_edges[node]
                .iter()
                .map(|e| edge_semaphores[*e].clone())
                .collect();

            if node == present {
                wait.insert(0, slot.image_acquired.clone());
                signal.push(slot.work_finished.clone());
            }

            let fence = if node == present {
                Some(slot.fence.as_ref())
            } else {
                None
            };
            lists[node].execute(&ExecuteDesc {
                label: &dag.names[node],
                wait: &wait,
                signal: &signal,
                fence,
            })?;
        }
    }
    slot.mark_submitted();

    #[cfg(feature = "logging")]
    log::trace!("Submitted slot {}, presenting image {}", slot.index, image);

    let NodeCallback::Present { swapchain, .. } = &callbacks[present] else {
        return Err(FrameError::Device(DeviceError::InvalidState(
            "last node is not the present node".to_owned(),
        )));
    };
    let result = swapchain.present(&[slot.work_finished.as_ref()], image)?;

    #[cfg(feature = "logging")]
    if result == PresentResult::Suboptimal {
        log::debug!("Swapchain image {} presented suboptimal", image);
    }

    Ok(result)
}

///Re-records `list` as an empty present submission for `render_target` and submits it into the slot's fence.
fn release_image(
    list: &mut dyn CommandList,
    label: &str,
    image_acquired: Arc<dyn Semaphore>,
    work_finished: Arc<dyn Semaphore>,
    fence: &dyn Fence,
    render_target: &TextureHandle,
) -> Result<(), DeviceError> {
    let (mut barrier, to_present) = present_barriers(render_target);
    barrier.append(to_present);

    list.begin(label)?;
    list.pipeline_barrier(&barrier);
    list.end()?;
    list.execute(&ExecuteDesc {
        label,
        wait: &[image_acquired],
        signal: &[work_finished],
        fence: Some(fence),
    })
}
