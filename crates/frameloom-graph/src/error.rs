use frameloom::{DeviceError, QueueType};
use thiserror::Error;

///Reasons [build_graph](crate::RenderGraph::build_graph) rejects a graph. The graph stays unbuilt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Node names must not be empty")]
    EmptyNodeName,
    #[error("Node name \"{0}\" is reserved for the present node")]
    ReservedName(String),
    #[error("Node \"{0}\" was added more than once")]
    DuplicateNode(String),
    #[error("Graph has no present node")]
    MissingPresentNode,
    #[error("Graph has {0} present nodes, exactly one is allowed")]
    DuplicatePresentNode(usize),
    #[error("Node \"{node}\" depends on \"{dependency}\", which does not exist")]
    MissingDependency { node: String, dependency: String },
    #[error("Node \"{0}\" depends on the present node")]
    DependsOnPresent(String),
    #[error("Node \"{node}\" declares conflicting states for resource {resource}")]
    ConflictingStates { node: String, resource: String },
    #[error("Dependency cycle through node \"{node}\"")]
    Cycle { node: String },
    #[error("Node \"{0}\" does not lead to the present node")]
    DisconnectedNode(String),
    #[error("Not enough command lists for the queue type {queue}: requested {requested}, available {available}")]
    OutOfCommandLists {
        queue: QueueType,
        requested: usize,
        available: usize,
    },
    #[error("Nodes \"{first}\" and \"{second}\" access {resource} without an ordering dependency")]
    UnorderedResourceAccess {
        resource: String,
        first: String,
        second: String,
    },
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

///Errors of a single [update](crate::RenderGraph::update). The frame was not (completely) submitted.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Graph is not built")]
    NotBuilt,
    #[error("Node \"{node}\" failed to record: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Invalid graph description: {0}")]
    InvalidDescription(String),
    #[error("Could not create worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Build error: {0}")]
    Build(#[from] BuildError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}
