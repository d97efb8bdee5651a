#![allow(dead_code)]

use std::sync::Arc;

use frameloom_graph::{RenderGraph, RenderGraphDesc};
use frameloom_headless::{HeadlessDesc, HeadlessDevice};

///Installs a logger once. Output is controlled through `RUST_LOG`.
pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new().env().init();
}

pub fn device() -> HeadlessDevice {
    init_logger();
    HeadlessDevice::new(HeadlessDesc::default())
}

pub fn deferred_device() -> HeadlessDevice {
    init_logger();
    HeadlessDevice::new(HeadlessDesc {
        deferred_completion: true,
    })
}

pub fn desc(device: &HeadlessDevice) -> RenderGraphDesc {
    RenderGraphDesc::new(Arc::new(device.clone()))
}

pub fn graph(device: &HeadlessDevice, num_frames: u32) -> RenderGraph {
    RenderGraph::new(desc(device).with_num_frames(num_frames)).unwrap()
}
