use std::any::Any;

use frameloom::{BufferResource, ResourceUsage, TextureResource};

#[derive(Debug)]
pub struct HeadlessBuffer {
    pub name: String,
    pub initial_state: ResourceUsage,
}

impl BufferResource for HeadlessBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initial_state(&self) -> ResourceUsage {
        self.initial_state
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HeadlessTexture {
    pub name: String,
    pub initial_state: ResourceUsage,
}

impl TextureResource for HeadlessTexture {
    fn name(&self) -> &str {
        &self.name
    }

    fn initial_state(&self) -> ResourceUsage {
        self.initial_state
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
